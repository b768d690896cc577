//! Core types shared across the protocol

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Marketplace user role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Client,
    Freelancer,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Client => write!(f, "client"),
            Role::Freelancer => write!(f, "freelancer"),
        }
    }
}

/// The resolved current user. Derived once per session from persisted
/// credentials and read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    pub role: Role,
}

/// Loosely-typed bag attached to a notification. The typed fields drive
/// action buttons; anything else the backend sends rides along in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotificationPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proposal_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// A server-issued record representing an event relevant to the current
/// user. Created server-side; the client only ever flips its `read` flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    /// Event family, e.g. `proposal_received` or `payment_settled`.
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<NotificationPayload>,
    #[serde(default)]
    pub read: bool,
    /// RFC 3339 timestamp assigned by the backend.
    pub created_at: String,
}

/// Kind prefix marking notifications that carry a pending decision.
pub const ACTIONABLE_KIND_PREFIX: &str = "proposal_";

impl Notification {
    /// Whether this notification belongs to the actionable family
    /// (proposal-related, carries accept/reject buttons).
    pub fn is_actionable(&self) -> bool {
        self.kind.starts_with(ACTIONABLE_KIND_PREFIX)
    }

    /// The proposal this notification refers to, if any.
    pub fn proposal_ref(&self) -> Option<&str> {
        self.payload
            .as_ref()
            .and_then(|p| p.proposal_id.as_deref())
    }
}

/// A direct message between two users. Append-only from the client's
/// point of view within a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectMessage {
    pub id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub content: String,
    #[serde(default)]
    pub read: bool,
    pub created_at: String,
}

/// Outcome of a proposal decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalOutcome {
    Accepted,
    Rejected,
}
