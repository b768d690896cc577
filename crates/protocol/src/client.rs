//! Client → Server messages

use serde::{Deserialize, Serialize};

use crate::new_id;

/// Messages sent from client to server over the push channel.
///
/// The channel is authenticated implicitly: `Register` is sent exactly once
/// after the transport connects, and the server routes subsequent pushes to
/// this client based on the registered user id. Chat sends and read
/// acknowledgements are the only business events a client pushes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Register {
        user_id: String,
    },
    ReadNotification {
        notification_id: String,
    },
    SendDirectMessage {
        /// Client-minted reference for this send, so the server can
        /// deduplicate resends and correlate the created message.
        client_ref: String,
        receiver_id: String,
        content: String,
    },
}

impl ClientMessage {
    /// Build a chat send with a freshly minted client reference.
    pub fn direct_message(receiver_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::SendDirectMessage {
            client_ref: new_id(),
            receiver_id: receiver_id.into(),
            content: content.into(),
        }
    }

    /// Acknowledge that a notification was read.
    pub fn read_ack(notification_id: impl Into<String>) -> Self {
        Self::ReadNotification {
            notification_id: notification_id.into(),
        }
    }
}
