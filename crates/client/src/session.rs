//! Session resolution
//!
//! Derives the current authenticated identity from persisted credentials:
//! the stored user blob first, falling back to the self-contained claims of
//! the stored bearer token. Purely local and synchronous — the backend owns
//! actual authentication; this layer only answers "who is signed in here".

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use gigline_protocol::{Identity, Role};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::bus::{AppEvent, EventBus};
use crate::credentials::CredentialStore;

/// Claims we care about inside the bearer token payload.
#[derive(Debug, Deserialize)]
struct TokenClaims {
    #[serde(alias = "sub")]
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    email: Option<String>,
    role: Role,
}

/// The session context: credential storage plus a cached resolved identity.
///
/// One instance is created at application start and passed by reference to
/// the components that need identity, replacing ad-hoc storage reads.
pub struct SessionContext {
    credentials: Arc<dyn CredentialStore>,
    cached: ArcSwapOption<Identity>,
    bus: EventBus,
}

impl SessionContext {
    pub fn new(credentials: Arc<dyn CredentialStore>, bus: EventBus) -> Self {
        Self {
            credentials,
            cached: ArcSwapOption::empty(),
            bus,
        }
    }

    pub fn credentials(&self) -> &Arc<dyn CredentialStore> {
        &self.credentials
    }

    /// Resolve the current identity, caching the result for the session.
    ///
    /// `None` means "not authenticated" — including when persisted
    /// credentials exist but cannot be decoded. In that case the corrupt
    /// credentials are cleared (forced sign-out), never surfaced as an
    /// error.
    pub fn resolve_identity(&self) -> Option<Identity> {
        if let Some(cached) = self.cached.load_full() {
            return Some((*cached).clone());
        }

        let mut saw_credentials = false;

        if let Some(blob) = self.credentials.load_user() {
            saw_credentials = true;
            match serde_json::from_value::<Identity>(blob) {
                Ok(identity) => {
                    self.cached.store(Some(Arc::new(identity.clone())));
                    return Some(identity);
                }
                Err(e) => {
                    debug!(
                        component = "session",
                        event = "session.user_blob.unparseable",
                        error = %e,
                        "Stored user blob unusable, falling back to token claims"
                    );
                }
            }
        }

        if let Some(token) = self.credentials.load_token() {
            saw_credentials = true;
            match decode_claims(&token) {
                Ok(claims) => {
                    let identity = Identity {
                        id: claims.id,
                        name: claims.name,
                        email: claims.email,
                        role: claims.role,
                    };
                    self.cached.store(Some(Arc::new(identity.clone())));
                    return Some(identity);
                }
                Err(reason) => {
                    debug!(
                        component = "session",
                        event = "session.token.undecodable",
                        reason,
                        "Stored token undecodable"
                    );
                }
            }
        }

        if saw_credentials {
            // Credentials were present but unusable: corrupt or from an
            // incompatible version. Forced sign-out, not a fatal error.
            warn!(
                component = "session",
                event = "session.invalidated.corrupt_credentials",
                "Clearing undecodable persisted credentials"
            );
            self.invalidate();
        }
        None
    }

    /// Explicit sign-out: drop the cached identity, clear persisted
    /// credentials and tell the rest of the application.
    pub fn invalidate(&self) {
        self.cached.store(None);
        if let Err(e) = self.credentials.clear() {
            warn!(
                component = "session",
                event = "session.clear_failed",
                error = %e,
                "Failed to clear persisted credentials"
            );
        }
        self.bus.publish(AppEvent::SessionInvalidated);
    }
}

/// Decode the claims segment of a self-contained bearer token.
///
/// No signature verification: the backend validates tokens on every call;
/// the client only reads the claims to reconstruct identity fields.
fn decode_claims(token: &str) -> Result<TokenClaims, &'static str> {
    let mut segments = token.split('.');
    let (Some(_header), Some(payload), Some(_sig), None) = (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) else {
        return Err("token is not three dot-separated segments");
    };

    let raw = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|_| "claims segment is not base64url")?;
    serde_json::from_slice(&raw).map_err(|_| "claims are not the expected JSON shape")
}
