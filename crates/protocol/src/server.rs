//! Server → Client messages

use serde::{Deserialize, Serialize};

use crate::types::{DirectMessage, Notification};

/// Messages pushed from server to client over the push channel.
///
/// Frames are processed in transport delivery order; the client performs no
/// reordering or timestamp-based sequencing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Notification {
        notification: Notification,
    },
    DirectMessageCreated {
        message: DirectMessage,
    },
    Error {
        code: String,
        message: String,
    },
}
