//! Revision computer seam and the HTTP client for the Argo CD API server's
//! change-revision endpoint.

use std::time::Duration;

use acr_core::{AcrError, AcrResult};
use serde::Deserialize;
use tracing::debug;

/// Resolves the change revision between two deployed source revisions.
#[async_trait::async_trait]
pub trait RevisionComputer: Send + Sync {
    /// `Ok(None)` means the backend could not determine a revision.
    async fn resolve(&self, app_name: &str, namespace: &str, current: &str, previous: &str) -> AcrResult<Option<String>>;
}

#[derive(Debug, Deserialize)]
struct ChangeRevisionResponse {
    #[serde(default)]
    revision: Option<String>,
}

/// `GET {base}/api/v1/applications/{name}/change-revision`
pub struct HttpRevisionComputer {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpRevisionComputer {
    pub fn new(base_url: &str, token: Option<String>, timeout: Duration) -> AcrResult<Self> {
        let base_url = base_url.trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(AcrError::Config("revision computer base URL is empty".into()));
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AcrError::Config(format!("building http client: {}", e)))?;
        Ok(Self { client, base_url, token: token.filter(|t| !t.is_empty()) })
    }

    pub fn endpoint(&self, app_name: &str) -> String {
        format!("{}/api/v1/applications/{}/change-revision", self.base_url, app_name)
    }
}

#[async_trait::async_trait]
impl RevisionComputer for HttpRevisionComputer {
    async fn resolve(&self, app_name: &str, namespace: &str, current: &str, previous: &str) -> AcrResult<Option<String>> {
        let url = self.endpoint(app_name);
        let mut req = self
            .client
            .get(&url)
            .query(&[("appNamespace", namespace), ("currentRevision", current), ("previousRevision", previous)]);
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }
        let resp = req.send().await.map_err(|e| AcrError::RevisionComputer(format!("GET {}: {}", url, e)))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AcrError::RevisionComputer(format!("GET {} returned {}: {}", url, status, body.trim())));
        }
        let parsed: ChangeRevisionResponse =
            resp.json().await.map_err(|e| AcrError::Decode(format!("change revision response: {}", e)))?;
        debug!(app = %app_name, ns = %namespace, revision = ?parsed.revision, "change revision response");
        Ok(parsed.revision.filter(|r| !r.is_empty()))
    }
}
