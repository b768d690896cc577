//! Gigline client sync layer
//!
//! The session, live-update and notification machinery behind the
//! marketplace front-end: resolve who is signed in from persisted
//! credentials, hold the in-memory notification working set, keep it in
//! sync over a WebSocket push channel, and dispatch user decisions to the
//! REST backend.
//!
//! Wiring order matters and mirrors the dependency chain: build an
//! [`EventBus`], resolve identity through a [`SessionContext`], then
//! connect a [`LiveChannel`] feeding the shared [`NotificationStore`], and
//! route user actions through an [`ActionDispatcher`].

pub mod api;
pub mod bus;
pub mod channel;
pub mod conversations;
pub mod credentials;
pub mod dispatcher;
pub mod error;
pub mod session;
pub mod store;

pub use api::{Backend, HttpBackend};
pub use bus::{AppEvent, EventBus};
pub use channel::{ChannelConfig, ChannelHandle, ChannelSender, ChannelState, LiveChannel};
pub use conversations::{aggregate, apply_incoming, Conversation};
pub use credentials::{CredentialStore, FileCredentialStore, MemoryCredentialStore};
pub use dispatcher::ActionDispatcher;
pub use error::ClientError;
pub use session::SessionContext;
pub use store::{NotificationStore, SharedNotificationStore};
