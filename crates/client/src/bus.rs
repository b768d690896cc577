//! Typed application event bus
//!
//! Independently-rendered views (dashboard, proposals panel, message page)
//! react to pushes and decisions without sharing a data store. The bus is
//! owned by the application root and handed by reference to whatever needs
//! to publish or subscribe; payloads are typed, not ambient JSON blobs.

use gigline_protocol::{DirectMessage, Notification, ProposalOutcome};
use tokio::sync::broadcast;
use tracing::trace;

/// Events crossing component boundaries.
#[derive(Debug, Clone)]
pub enum AppEvent {
    /// A notification arrived over the push channel.
    NotificationArrived { notification: Notification },
    /// A chat message arrived over the push channel.
    DirectMessageArrived { message: DirectMessage },
    /// An actionable (proposal-family) push was received; views holding a
    /// proposal list should refetch their derived state.
    ProposalsChanged { proposal_id: Option<String> },
    /// The user decided on a proposal and the backend accepted the call.
    ProposalDecided {
        proposal_id: String,
        outcome: ProposalOutcome,
    },
    /// The session was signed out or defensively invalidated.
    SessionInvalidated,
}

/// Broadcast fan-out for [`AppEvent`]s.
///
/// Cloning is cheap; all clones publish into the same channel. Slow
/// subscribers may observe `Lagged` and should refetch, matching the
/// best-effort semantics of the push channel itself.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<AppEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AppEvent> {
        self.tx.subscribe()
    }

    /// Publish an event. Having no subscribers is not an error.
    pub fn publish(&self, event: AppEvent) {
        if self.tx.send(event).is_err() {
            trace!(
                component = "bus",
                event = "bus.publish.no_subscribers",
                "Dropped event with no live subscribers"
            );
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(64)
    }
}
