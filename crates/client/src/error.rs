//! Client error types

use thiserror::Error;

/// Errors surfaced by the sync layer.
///
/// Every backend-call failure is caught at the call site and converted into
/// one of these; nothing here is allowed to escape as a panic.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("backend rejected request ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("push channel error: {0}")]
    Channel(String),

    #[error("channel is closed")]
    ChannelClosed,

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("credential storage error: {0}")]
    Credentials(String),

    #[error("notification {0} carries no pending decision")]
    NotActionable(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
