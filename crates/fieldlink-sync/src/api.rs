//! # Case API Collaborator
//!
//! The narrow, read-only interface to the (out-of-scope) CRUD case service.
//! The sync engine pulls deltas through it and never calls a mutation
//! endpoint.
//!
//! ## Endpoints
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Case API (read-only)                              │
//! │                                                                         │
//! │  GET /cases?updatedSince=<rfc3339>   cases with a newer                 │
//! │                                      serverUpdatedAt than the local     │
//! │                                      watermark                          │
//! │                                                                         │
//! │  GET /cases/<id>                     one case, 404 → None               │
//! │                                                                         │
//! │  Auth: Bearer <token> - same opaque token as the notification           │
//! │  handshake. 401/403 map to auth errors (no retry); everything else     │
//! │  transient maps to retryable network/api errors.                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use async_trait::async_trait;
use reqwest::StatusCode;
use tokio::sync::RwLock;
use tracing::debug;
use url::Url;

use fieldlink_core::case::RemoteCase;
use fieldlink_core::session::Watermark;

use crate::config::ApiSettings;
use crate::error::{SyncError, SyncResult};

// =============================================================================
// Trait
// =============================================================================

/// Read-only case API seam. Injected into the sync engine so tests can
/// substitute a double.
#[async_trait]
pub trait CaseApi: Send + Sync {
    /// All cases whose `server_updated_at` exceeds the watermark for this
    /// device/user.
    async fn cases_updated_since(&self, watermark: Watermark) -> SyncResult<Vec<RemoteCase>>;

    /// One case by id, `None` when the server does not know it.
    async fn case_by_id(&self, case_id: &str) -> SyncResult<Option<RemoteCase>>;
}

// =============================================================================
// HTTP Implementation
// =============================================================================

/// reqwest-backed case API client.
pub struct HttpCaseApi {
    client: reqwest::Client,
    base_url: Url,
    /// Bearer token; updated on login/refresh by the embedder.
    token: RwLock<Option<String>>,
}

impl HttpCaseApi {
    pub fn new(settings: &ApiSettings) -> SyncResult<Self> {
        let base_url = Url::parse(&settings.base_url)?;

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(settings.request_timeout_secs))
            .build()
            .map_err(|e| SyncError::Api(e.to_string()))?;

        Ok(HttpCaseApi {
            client,
            base_url,
            token: RwLock::new(None),
        })
    }

    /// Installs the access token used for subsequent requests.
    pub async fn set_token(&self, token: impl Into<String>) {
        *self.token.write().await = Some(token.into());
    }

    /// Drops the token (logout).
    pub async fn clear_token(&self) {
        *self.token.write().await = None;
    }

    async fn bearer(&self) -> SyncResult<String> {
        self.token
            .read()
            .await
            .clone()
            .ok_or_else(|| SyncError::Auth("no access token installed".into()))
    }

    fn check_status(status: StatusCode) -> SyncResult<()> {
        if status.is_success() {
            return Ok(());
        }
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(SyncError::Auth(format!(
                "case api returned {}",
                status
            ))),
            other => Err(SyncError::Api(format!("case api returned {}", other))),
        }
    }
}

#[async_trait]
impl CaseApi for HttpCaseApi {
    async fn cases_updated_since(&self, watermark: Watermark) -> SyncResult<Vec<RemoteCase>> {
        let token = self.bearer().await?;
        let url = self.base_url.join("cases")?;

        debug!(%url, watermark = %watermark.to_rfc3339(), "Pulling case deltas");

        let response = self
            .client
            .get(url)
            .bearer_auth(token)
            .query(&[("updatedSince", watermark.to_rfc3339())])
            .send()
            .await?;

        Self::check_status(response.status())?;

        let cases: Vec<RemoteCase> = response.json().await?;
        debug!(count = cases.len(), "Pulled case deltas");
        Ok(cases)
    }

    async fn case_by_id(&self, case_id: &str) -> SyncResult<Option<RemoteCase>> {
        let token = self.bearer().await?;
        let url = self.base_url.join(&format!("cases/{}", case_id))?;

        let response = self.client.get(url).bearer_auth(token).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Self::check_status(response.status())?;

        Ok(Some(response.json().await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert!(HttpCaseApi::check_status(StatusCode::OK).is_ok());

        let err = HttpCaseApi::check_status(StatusCode::UNAUTHORIZED).unwrap_err();
        assert!(err.is_auth());

        let err = HttpCaseApi::check_status(StatusCode::SERVICE_UNAVAILABLE).unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn missing_token_is_an_auth_error() {
        let api = HttpCaseApi::new(&ApiSettings {
            base_url: "https://api.example.com".to_string(),
            request_timeout_secs: 5,
        })
        .unwrap();

        let err = api
            .cases_updated_since(fieldlink_core::session::watermark_epoch())
            .await
            .unwrap_err();
        assert!(err.is_auth());
    }
}
