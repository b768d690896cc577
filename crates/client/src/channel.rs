//! Live push channel
//!
//! WebSocket client for real-time notification and chat delivery. One
//! transport per consuming view: a held [`ChannelHandle`] is the
//! idempotent-connect guard. On connect the channel registers the current
//! identity so the server can route pushes here; frames are then applied
//! to the notification store and re-published on the event bus in transport
//! delivery order.
//!
//! Delivery is best-effort: the runner reconnects with capped exponential
//! backoff after a transport drop (disconnected → connecting → connected),
//! and anything pushed while the channel is down is expected to be picked
//! up by the next bulk fetch.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use gigline_protocol::{ClientMessage, Identity, ServerMessage};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::bus::{AppEvent, EventBus};
use crate::error::ClientError;
use crate::store::SharedNotificationStore;

const OUTBOUND_BUFFER: usize = 100;

/// Connection lifecycle of the push channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Disconnected,
    Connecting,
    Connected,
}

/// Channel endpoint and reconnect policy.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// WebSocket endpoint, e.g. `ws://localhost:4000/ws`.
    pub url: String,
    /// Reconnect after a transport drop. Disabled, the runner exits on the
    /// first disconnect and the view falls back to refetching.
    pub reconnect: bool,
    /// First reconnect delay; doubled per failed attempt.
    pub reconnect_base: Duration,
    /// Upper bound for the reconnect delay.
    pub reconnect_cap: Duration,
}

impl ChannelConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reconnect: true,
            reconnect_base: Duration::from_secs(1),
            reconnect_cap: Duration::from_secs(30),
        }
    }
}

/// A live channel slot, owned by the consuming view for its mounted
/// lifetime. `connect` while a runner is alive returns the existing handle
/// instead of opening a second transport for the same identity.
pub struct LiveChannel {
    config: ChannelConfig,
    handle: Option<ChannelHandle>,
}

impl LiveChannel {
    pub fn new(config: ChannelConfig) -> Self {
        Self {
            config,
            handle: None,
        }
    }

    /// Spawn the channel runner, or return the handle already held.
    pub fn connect(
        &mut self,
        identity: &Identity,
        store: SharedNotificationStore,
        bus: EventBus,
    ) -> &ChannelHandle {
        let stale = self
            .handle
            .as_ref()
            .map(|h| h.task.is_finished())
            .unwrap_or(true);
        if stale {
            self.handle = Some(ChannelHandle::spawn(
                self.config.clone(),
                identity.id.clone(),
                store,
                bus,
            ));
        } else {
            debug!(
                component = "channel",
                event = "channel.connect.already_held",
                "Connect requested while a live handle is held"
            );
        }
        self.handle
            .as_ref()
            .unwrap_or_else(|| unreachable!("handle set above"))
    }

    /// Tear the channel down. Undelivered events are dropped.
    pub async fn disconnect(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.close().await;
        }
    }

    pub fn state(&self) -> ChannelState {
        self.handle
            .as_ref()
            .map(|h| h.state())
            .unwrap_or(ChannelState::Disconnected)
    }
}

/// Cloneable sending half of the channel, detached from the handle that
/// owns the connection lifecycle. Lets components such as the dispatcher
/// queue frames without holding the handle itself; sends fail with
/// [`ClientError::ChannelClosed`] once the runner has stopped.
#[derive(Clone)]
pub struct ChannelSender {
    pub(crate) tx: mpsc::Sender<ClientMessage>,
}

impl ChannelSender {
    pub async fn send(&self, msg: ClientMessage) -> Result<(), ClientError> {
        self.tx
            .send(msg)
            .await
            .map_err(|_| ClientError::ChannelClosed)
    }
}

/// Handle to a running channel task.
pub struct ChannelHandle {
    outbound_tx: mpsc::Sender<ClientMessage>,
    shutdown_tx: watch::Sender<bool>,
    state_rx: watch::Receiver<ChannelState>,
    task: JoinHandle<()>,
}

impl ChannelHandle {
    fn spawn(
        config: ChannelConfig,
        user_id: String,
        store: SharedNotificationStore,
        bus: EventBus,
    ) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_BUFFER);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (state_tx, state_rx) = watch::channel(ChannelState::Disconnected);

        let task = tokio::spawn(run_channel(
            config,
            user_id,
            store,
            bus,
            outbound_rx,
            shutdown_rx,
            state_tx,
        ));

        Self {
            outbound_tx,
            shutdown_tx,
            state_rx,
            task,
        }
    }

    /// Queue a frame for the server (chat send or read acknowledgement).
    pub async fn send(&self, msg: ClientMessage) -> Result<(), ClientError> {
        self.outbound_tx
            .send(msg)
            .await
            .map_err(|_| ClientError::ChannelClosed)
    }

    /// Detach a cloneable sending half for components that outlive or sit
    /// beside the handle.
    pub fn sender(&self) -> ChannelSender {
        ChannelSender {
            tx: self.outbound_tx.clone(),
        }
    }

    pub fn state(&self) -> ChannelState {
        *self.state_rx.borrow()
    }

    /// Watch connection state transitions (disconnected → connecting →
    /// connected), e.g. to defer sends until the channel is up.
    pub fn state_changes(&self) -> watch::Receiver<ChannelState> {
        self.state_rx.clone()
    }

    /// Stop reconnecting, drop the transport and wait for the runner to
    /// finish. Events not yet applied are dropped.
    pub async fn close(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.task.await {
            if !e.is_cancelled() {
                warn!(
                    component = "channel",
                    event = "channel.task.join_failed",
                    error = %e,
                    "Channel task ended abnormally"
                );
            }
        }
    }
}

/// Runner: connect, register, pump frames; reconnect with backoff until
/// shut down.
async fn run_channel(
    config: ChannelConfig,
    user_id: String,
    store: SharedNotificationStore,
    bus: EventBus,
    mut outbound_rx: mpsc::Receiver<ClientMessage>,
    mut shutdown_rx: watch::Receiver<bool>,
    state_tx: watch::Sender<ChannelState>,
) {
    let mut failed_attempts: u32 = 0;

    loop {
        if *shutdown_rx.borrow() {
            break;
        }
        let _ = state_tx.send(ChannelState::Connecting);

        match connect_async(config.url.as_str()).await {
            Ok((ws, _)) => {
                info!(
                    component = "channel",
                    event = "channel.connected",
                    url = %config.url,
                    "Push channel connected"
                );
                let _ = state_tx.send(ChannelState::Connected);
                failed_attempts = 0;

                pump(
                    ws,
                    &user_id,
                    &store,
                    &bus,
                    &mut outbound_rx,
                    &mut shutdown_rx,
                )
                .await;

                let _ = state_tx.send(ChannelState::Disconnected);
            }
            Err(e) => {
                let _ = state_tx.send(ChannelState::Disconnected);
                warn!(
                    component = "channel",
                    event = "channel.connect_failed",
                    url = %config.url,
                    error = %e,
                    "Push channel connection failed"
                );
            }
        }

        if *shutdown_rx.borrow() || !config.reconnect {
            break;
        }

        let delay = backoff_delay(&config, failed_attempts);
        failed_attempts = failed_attempts.saturating_add(1);
        debug!(
            component = "channel",
            event = "channel.reconnect.scheduled",
            delay_ms = delay.as_millis() as u64,
            attempt = failed_attempts,
        );
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown_rx.changed() => break,
        }
    }

    let _ = state_tx.send(ChannelState::Disconnected);
    info!(
        component = "channel",
        event = "channel.stopped",
        "Push channel runner stopped"
    );
}

fn backoff_delay(config: &ChannelConfig, failed_attempts: u32) -> Duration {
    let factor = 2u32.saturating_pow(failed_attempts.min(16));
    config
        .reconnect_base
        .saturating_mul(factor)
        .min(config.reconnect_cap)
}

/// Drive one connected transport until it drops or shutdown is requested.
async fn pump<S>(
    mut ws: tokio_tungstenite::WebSocketStream<S>,
    user_id: &str,
    store: &SharedNotificationStore,
    bus: &EventBus,
    outbound_rx: &mut mpsc::Receiver<ClientMessage>,
    shutdown_rx: &mut watch::Receiver<bool>,
) where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    // Register first so the server can route pushes to this connection.
    let register = ClientMessage::Register {
        user_id: user_id.to_string(),
    };
    if let Err(e) = send_frame(&mut ws, &register).await {
        warn!(
            component = "channel",
            event = "channel.register_failed",
            error = %e,
            "Failed to send registration frame"
        );
        return;
    }

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                // Flush frames already queued before closing, so a send
                // followed by an immediate teardown still reaches the wire.
                while let Ok(msg) = outbound_rx.try_recv() {
                    if send_frame(&mut ws, &msg).await.is_err() {
                        break;
                    }
                }
                let _ = ws.close(None).await;
                return;
            }
            queued = outbound_rx.recv() => {
                // `None` cannot happen while the handle holds the sender.
                if let Some(msg) = queued {
                    if let Err(e) = send_frame(&mut ws, &msg).await {
                        warn!(
                            component = "channel",
                            event = "channel.send_failed",
                            error = %e,
                            "Failed to send frame, dropping transport"
                        );
                        return;
                    }
                }
            }
            frame = ws.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ServerMessage>(text.as_str()) {
                            Ok(msg) => apply_server_message(msg, store, bus).await,
                            Err(e) => {
                                warn!(
                                    component = "channel",
                                    event = "channel.frame.unparseable",
                                    error = %e,
                                    "Ignoring unparseable push frame"
                                );
                            }
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = ws.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) => {
                        info!(
                            component = "channel",
                            event = "channel.closed_by_server",
                            "Server sent close frame"
                        );
                        return;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(
                            component = "channel",
                            event = "channel.transport_error",
                            error = %e,
                            "Push channel transport error"
                        );
                        return;
                    }
                    None => {
                        info!(
                            component = "channel",
                            event = "channel.transport_eof",
                            "Push channel transport ended"
                        );
                        return;
                    }
                }
            }
        }
    }
}

async fn send_frame<S>(
    ws: &mut tokio_tungstenite::WebSocketStream<S>,
    msg: &ClientMessage,
) -> Result<(), ClientError>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    let json = serde_json::to_string(msg)?;
    ws.send(Message::Text(json.into()))
        .await
        .map_err(|e| ClientError::Channel(e.to_string()))
}

/// Apply one push to local state and fan it out on the bus.
///
/// Store mutation and counter update happen under one lock; the
/// cross-component proposal signal fires exactly once per actionable push.
pub(crate) async fn apply_server_message(
    msg: ServerMessage,
    store: &SharedNotificationStore,
    bus: &EventBus,
) {
    match msg {
        ServerMessage::Notification { notification } => {
            {
                let mut guard = store.lock().await;
                guard.upsert(notification.clone());
            }
            let actionable = notification.is_actionable();
            let proposal_id = notification.proposal_ref().map(str::to_string);
            bus.publish(AppEvent::NotificationArrived { notification });
            if actionable {
                bus.publish(AppEvent::ProposalsChanged { proposal_id });
            }
        }
        ServerMessage::DirectMessageCreated { message } => {
            bus.publish(AppEvent::DirectMessageArrived { message });
        }
        ServerMessage::Error { code, message } => {
            warn!(
                component = "channel",
                event = "channel.server_error",
                code = %code,
                message = %message,
                "Server reported an error on the push channel"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gigline_protocol::{Notification, NotificationPayload, Role};
    use tokio::net::TcpListener;
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(5);

    fn identity() -> Identity {
        Identity {
            id: "u1".to_string(),
            name: None,
            email: None,
            role: Role::Freelancer,
        }
    }

    fn proposal_push(id: &str, proposal_id: &str) -> ServerMessage {
        ServerMessage::Notification {
            notification: Notification {
                id: id.to_string(),
                kind: "proposal_received".to_string(),
                title: None,
                message: None,
                payload: Some(NotificationPayload {
                    proposal_id: Some(proposal_id.to_string()),
                    project_id: None,
                    extra: Default::default(),
                }),
                read: false,
                created_at: "2026-08-01T12:00:00Z".to_string(),
            },
        }
    }

    async fn expect_register<S>(ws: &mut tokio_tungstenite::WebSocketStream<S>)
    where
        S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
    {
        let frame = timeout(WAIT, ws.next())
            .await
            .expect("frame before timeout")
            .expect("open stream")
            .expect("readable frame");
        let msg: ClientMessage =
            serde_json::from_str(frame.to_text().expect("text frame")).expect("client message");
        assert!(matches!(msg, ClientMessage::Register { user_id } if user_id == "u1"));
    }

    #[tokio::test]
    async fn registers_then_applies_pushes_in_order() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.expect("accept");
            let mut ws = tokio_tungstenite::accept_async(stream).await.expect("ws");
            expect_register(&mut ws).await;

            let push = serde_json::to_string(&proposal_push("n1", "p1")).expect("json");
            ws.send(Message::Text(push.into())).await.expect("push");

            // The client acknowledges the read over the same channel.
            let frame = timeout(WAIT, ws.next())
                .await
                .expect("ack before timeout")
                .expect("open stream")
                .expect("readable frame");
            let msg: ClientMessage = serde_json::from_str(frame.to_text().expect("text frame"))
                .expect("client message");
            assert!(matches!(
                msg,
                ClientMessage::ReadNotification { notification_id } if notification_id == "n1"
            ));

            // Hold the connection open until the client tears down.
            while let Some(Ok(_)) = ws.next().await {}
        });

        let store = crate::store::NotificationStore::shared();
        let bus = EventBus::new(8);
        let mut events = bus.subscribe();

        let mut config = ChannelConfig::new(format!("ws://{addr}"));
        config.reconnect = false;
        let mut channel = LiveChannel::new(config);
        let handle = channel.connect(&identity(), store.clone(), bus.clone());
        let sender = handle.sender();

        match timeout(WAIT, events.recv()).await.expect("event").expect("recv") {
            AppEvent::NotificationArrived { notification } => {
                assert_eq!(notification.id, "n1");
            }
            other => panic!("unexpected event: {:?}", other),
        }
        match timeout(WAIT, events.recv()).await.expect("event").expect("recv") {
            AppEvent::ProposalsChanged { proposal_id } => {
                assert_eq!(proposal_id.as_deref(), Some("p1"));
            }
            other => panic!("unexpected event: {:?}", other),
        }

        {
            let guard = store.lock().await;
            let held = guard.get("n1").expect("record held");
            assert!(!held.read);
            assert_eq!(held.proposal_ref(), Some("p1"));
            assert_eq!(guard.unread_count(), 1);
        }

        sender
            .send(ClientMessage::read_ack("n1"))
            .await
            .expect("queue ack");

        // The proposal signal fired exactly once for one push.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(events.try_recv().is_err());

        channel.disconnect().await;
        server.await.expect("server task");
    }

    #[tokio::test]
    async fn connect_while_held_does_not_open_a_second_transport() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");

        let server = tokio::spawn(async move {
            let mut accepted = 0u32;
            // Count every connection until the test ends.
            while let Ok(Ok((stream, _))) =
                timeout(Duration::from_millis(500), listener.accept()).await
            {
                let mut ws = tokio_tungstenite::accept_async(stream).await.expect("ws");
                accepted += 1;
                tokio::spawn(async move { while let Some(Ok(_)) = ws.next().await {} });
            }
            accepted
        });

        let store = crate::store::NotificationStore::shared();
        let bus = EventBus::new(8);
        let mut config = ChannelConfig::new(format!("ws://{addr}"));
        config.reconnect = false;
        let mut channel = LiveChannel::new(config);

        channel.connect(&identity(), store.clone(), bus.clone());
        tokio::time::sleep(Duration::from_millis(100)).await;
        channel.connect(&identity(), store.clone(), bus.clone());

        assert_eq!(server.await.expect("count"), 1);
        channel.disconnect().await;
    }

    #[tokio::test]
    async fn reconnects_and_reregisters_after_transport_drop() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");

        let server = tokio::spawn(async move {
            // First connection: register, then drop immediately.
            let (stream, _) = listener.accept().await.expect("accept");
            let mut ws = tokio_tungstenite::accept_async(stream).await.expect("ws");
            expect_register(&mut ws).await;
            drop(ws);

            // The client must come back and register again.
            let (stream, _) = timeout(WAIT, listener.accept())
                .await
                .expect("reconnect before timeout")
                .expect("accept");
            let mut ws = tokio_tungstenite::accept_async(stream).await.expect("ws");
            expect_register(&mut ws).await;
        });

        let store = crate::store::NotificationStore::shared();
        let bus = EventBus::new(8);
        let mut config = ChannelConfig::new(format!("ws://{addr}"));
        config.reconnect_base = Duration::from_millis(10);
        config.reconnect_cap = Duration::from_millis(50);
        let mut channel = LiveChannel::new(config);
        channel.connect(&identity(), store, bus);

        timeout(WAIT, server)
            .await
            .expect("server before timeout")
            .expect("server task");
        channel.disconnect().await;
    }

    #[tokio::test]
    async fn disconnect_flushes_queued_frames() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.expect("accept");
            let mut ws = tokio_tungstenite::accept_async(stream).await.expect("ws");
            expect_register(&mut ws).await;

            // The queued chat send must arrive before the close frame.
            let frame = timeout(WAIT, ws.next())
                .await
                .expect("frame before timeout")
                .expect("open stream")
                .expect("readable frame");
            let msg: ClientMessage = serde_json::from_str(frame.to_text().expect("text frame"))
                .expect("client message");
            assert!(matches!(
                msg,
                ClientMessage::SendDirectMessage { receiver_id, content, .. }
                    if receiver_id == "u9" && content == "on my way"
            ));

            while let Some(Ok(_)) = ws.next().await {}
        });

        let store = crate::store::NotificationStore::shared();
        let bus = EventBus::new(8);
        let mut config = ChannelConfig::new(format!("ws://{addr}"));
        config.reconnect = false;
        let mut channel = LiveChannel::new(config);
        let handle = channel.connect(&identity(), store, bus);

        let mut state = handle.state_changes();
        while *state.borrow() != ChannelState::Connected {
            state.changed().await.expect("state change");
        }
        handle
            .send(ClientMessage::direct_message("u9", "on my way"))
            .await
            .expect("queue send");
        channel.disconnect().await;

        timeout(WAIT, server)
            .await
            .expect("server before timeout")
            .expect("server task");
    }

    #[tokio::test]
    async fn close_stops_the_reconnect_cycle() {
        // No server at this address: the runner keeps cycling through
        // Connecting/Disconnected until closed.
        let mut config = ChannelConfig::new("ws://127.0.0.1:1");
        config.reconnect_base = Duration::from_millis(10);
        config.reconnect_cap = Duration::from_millis(20);
        let mut channel = LiveChannel::new(config);

        let store = crate::store::NotificationStore::shared();
        let bus = EventBus::new(8);
        channel.connect(&identity(), store, bus);

        channel.disconnect().await;
        assert_eq!(channel.state(), ChannelState::Disconnected);
    }
}
