//! REST backend boundary
//!
//! Thin wrapper over the marketplace REST API. The [`Backend`] trait is the
//! seam for tests; [`HttpBackend`] is the production implementation. Every
//! call maps a non-success status to [`ClientError::Api`] with a
//! best-effort body, so callers can always show a transient notice.

use async_trait::async_trait;
use gigline_protocol::{DirectMessage, Notification};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use tracing::debug;

use crate::error::ClientError;

/// The marketplace REST API as seen by this layer.
#[async_trait]
pub trait Backend: Send + Sync {
    /// `GET /notifications` — ordered newest-first by the backend.
    async fn fetch_notifications(&self) -> Result<Vec<Notification>, ClientError>;

    /// `PATCH /notifications/{id}/read` — idempotent, no meaningful body.
    async fn mark_notification_read(&self, id: &str) -> Result<(), ClientError>;

    /// `POST /proposals/{id}/accept`
    async fn accept_proposal(&self, id: &str) -> Result<(), ClientError>;

    /// `POST /proposals/{id}/reject`
    async fn reject_proposal(&self, id: &str) -> Result<(), ClientError>;

    /// `GET /messages` — the flat message list; conversations are derived
    /// client-side.
    async fn fetch_messages(&self) -> Result<Vec<DirectMessage>, ClientError>;
}

/// reqwest-backed implementation of [`Backend`].
pub struct HttpBackend {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        debug!(
            component = "api",
            event = "api.request",
            method = %method,
            url = %url,
        );
        let builder = self.http.request(method, url);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn check(response: Response) -> Result<Response, ClientError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response
            .text()
            .await
            .unwrap_or_else(|_| status_fallback(status));
        Err(ClientError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

fn status_fallback(status: StatusCode) -> String {
    status
        .canonical_reason()
        .unwrap_or("request failed")
        .to_string()
}

#[async_trait]
impl Backend for HttpBackend {
    async fn fetch_notifications(&self) -> Result<Vec<Notification>, ClientError> {
        let response = self.request(Method::GET, "/notifications").send().await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn mark_notification_read(&self, id: &str) -> Result<(), ClientError> {
        let response = self
            .request(Method::PATCH, &format!("/notifications/{id}/read"))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn accept_proposal(&self, id: &str) -> Result<(), ClientError> {
        let response = self
            .request(Method::POST, &format!("/proposals/{id}/accept"))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn reject_proposal(&self, id: &str) -> Result<(), ClientError> {
        let response = self
            .request(Method::POST, &format!("/proposals/{id}/reject"))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn fetch_messages(&self) -> Result<Vec<DirectMessage>, ClientError> {
        let response = self.request(Method::GET, "/messages").send().await?;
        Ok(Self::check(response).await?.json().await?)
    }
}
