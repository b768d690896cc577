//! Action dispatcher
//!
//! Translates user actions on notifications into backend calls and
//! reconciles the local store afterwards. Decisions (accept/reject) are
//! strict: the backend call comes first and local state only changes on
//! success. Read-marking is optimistic against an idempotent endpoint.
//!
//! When a live channel is attached, every read flip also sends a
//! `read_notification` acknowledgement over it so the push side stops
//! counting the record immediately; the REST PATCH remains the durable
//! record of the read.

use futures::future::join_all;
use gigline_protocol::{ClientMessage, Notification, ProposalOutcome};
use tracing::{debug, warn};

use crate::api::Backend;
use crate::bus::{AppEvent, EventBus};
use crate::channel::ChannelSender;
use crate::error::ClientError;
use crate::store::SharedNotificationStore;

pub struct ActionDispatcher<B: Backend> {
    backend: B,
    store: SharedNotificationStore,
    bus: EventBus,
    channel: Option<ChannelSender>,
}

impl<B: Backend> ActionDispatcher<B> {
    pub fn new(backend: B, store: SharedNotificationStore, bus: EventBus) -> Self {
        Self {
            backend,
            store,
            bus,
            channel: None,
        }
    }

    /// Attach the sending half of a live channel. Read flips then also
    /// acknowledge over the channel, best-effort.
    pub fn with_channel(mut self, channel: ChannelSender) -> Self {
        self.channel = Some(channel);
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn store(&self) -> SharedNotificationStore {
        self.store.clone()
    }

    /// Bulk-fetch notifications into the store. On failure the store is
    /// left untouched; the caller decides how to render a partial view.
    pub async fn refresh(&self) -> Result<(), ClientError> {
        let notifications = self.backend.fetch_notifications().await?;
        let mut guard = self.store.lock().await;
        guard.load(notifications);
        debug!(
            component = "dispatcher",
            event = "dispatcher.refreshed",
            held = guard.len(),
            unread = guard.unread_count(),
        );
        Ok(())
    }

    /// Accept the proposal the notification refers to.
    pub async fn accept(&self, notification: &Notification) -> Result<(), ClientError> {
        self.decide(notification, ProposalOutcome::Accepted).await
    }

    /// Reject the proposal the notification refers to.
    pub async fn reject(&self, notification: &Notification) -> Result<(), ClientError> {
        self.decide(notification, ProposalOutcome::Rejected).await
    }

    async fn decide(
        &self,
        notification: &Notification,
        outcome: ProposalOutcome,
    ) -> Result<(), ClientError> {
        let proposal_id = notification
            .proposal_ref()
            .ok_or_else(|| ClientError::NotActionable(notification.id.clone()))?
            .to_string();

        // Backend first; local state and the cross-component signal only
        // move on success.
        match outcome {
            ProposalOutcome::Accepted => self.backend.accept_proposal(&proposal_id).await?,
            ProposalOutcome::Rejected => self.backend.reject_proposal(&proposal_id).await?,
        }

        {
            let mut guard = self.store.lock().await;
            guard.mark_read(&notification.id);
        }
        self.ack_read(&notification.id).await;
        self.bus.publish(AppEvent::ProposalDecided {
            proposal_id,
            outcome,
        });
        Ok(())
    }

    /// Mark one notification read: optimistic local flip, then the PATCH.
    /// The endpoint is idempotent, so a failed call is surfaced without
    /// rolling back the flip; a later `refresh` or retry converges.
    pub async fn mark_read(&self, id: &str) -> Result<(), ClientError> {
        {
            let mut guard = self.store.lock().await;
            guard.mark_read(id);
        }
        self.ack_read(id).await;
        self.backend.mark_notification_read(id).await
    }

    /// Mark everything read: one local flip, then one concurrent PATCH per
    /// previously-unread record. Individual failures are swallowed — local
    /// state keeps zero unread either way and the drift heals on the next
    /// bulk fetch.
    pub async fn mark_all_read(&self) {
        let ids = {
            let mut guard = self.store.lock().await;
            guard.mark_all_read()
        };
        if ids.is_empty() {
            return;
        }

        for id in &ids {
            self.ack_read(id).await;
        }
        let calls = ids.iter().map(|id| self.backend.mark_notification_read(id));
        let failures = join_all(calls)
            .await
            .into_iter()
            .filter(|r| r.is_err())
            .count();
        if failures > 0 {
            warn!(
                component = "dispatcher",
                event = "dispatcher.mark_all_read.partial_failure",
                attempted = ids.len(),
                failed = failures,
                "Some read acknowledgements failed; server state lags local"
            );
        }
    }

    /// Push a `read_notification` frame over the attached channel, if any.
    /// Best-effort: the PATCH is the durable record, so a closed channel is
    /// only worth a debug line.
    async fn ack_read(&self, id: &str) {
        if let Some(channel) = &self.channel {
            if channel.send(ClientMessage::read_ack(id)).await.is_err() {
                debug!(
                    component = "dispatcher",
                    event = "dispatcher.read_ack.dropped",
                    notification_id = %id,
                    "Read acknowledgement dropped, channel closed"
                );
            }
        }
    }
}
