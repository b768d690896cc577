//! Gigline Protocol
//!
//! Shared types for communication between the marketplace backend and its
//! clients. These types are serialized as JSON, both over the WebSocket
//! push channel and at the REST boundary.

use uuid::Uuid;

// Re-exports
pub mod client;
pub mod server;
pub mod types;

pub use client::ClientMessage;
pub use server::ServerMessage;
pub use types::*;

/// Mint a unique client-side reference, used to tag outbound chat sends.
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}
