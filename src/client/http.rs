use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::RemoteTreeMatchClient;
use crate::error::RemoteError;
use crate::models::{
    CandidateMatch, IdentificationRequest, LicenseInfo, MatchType, NodeKind, ProjectHandle,
    SubtreeSelection, TreeNode,
};

const USER_AGENT: &str = concat!("license-autoid/", env!("CARGO_PKG_VERSION"));

/// Connection parameters for [`HttpClient`].
#[derive(Debug, Clone)]
pub struct Connection {
    pub base_url: String,
    pub username: String,
    pub password: String,
    pub timeout: Duration,
}

/// REST/JSON client for the code-inspection service.
///
/// Every request is authenticated with HTTP basic auth. The owned
/// `reqwest::Client` is the only connection state; nothing is shared globally.
pub struct HttpClient {
    client: Client,
    conn: Connection,
}

#[derive(Debug, Deserialize)]
struct PendingCount {
    count: u64,
}

#[derive(Debug, Deserialize)]
struct VersionInfo {
    name: String,
}

#[derive(Debug, Serialize)]
struct DiscoveryQuery<'a> {
    selection: &'a SubtreeSelection,
    match_types: &'a [MatchType],
}

#[derive(Debug, Serialize)]
struct RefreshRequest {
    synchronous: bool,
    partial: bool,
}

impl HttpClient {
    pub fn new(conn: Connection) -> Result<Self, RemoteError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(conn.timeout)
            .build()
            .map_err(|e| RemoteError::Transport(format!("cannot build HTTP client: {e}")))?;

        Ok(Self { client, conn })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1{}", self.conn.base_url.trim_end_matches('/'), path)
    }

    fn get(&self, path: &str) -> RequestBuilder {
        self.client
            .get(self.url(path))
            .basic_auth(&self.conn.username, Some(&self.conn.password))
    }

    fn post(&self, path: &str) -> RequestBuilder {
        self.client
            .post(self.url(path))
            .basic_auth(&self.conn.username, Some(&self.conn.password))
    }

    /// Send a request and turn any non-success status into a [`RemoteError`].
    async fn send(&self, request: RequestBuilder) -> Result<Response, RemoteError> {
        let response = request
            .send()
            .await
            .map_err(|e| RemoteError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(classify_status(status, &body))
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, RemoteError> {
        let response = self.send(request).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| RemoteError::Transport(format!("malformed response: {e}")))
    }

    /// Like [`send_json`](Self::send_json) but maps 404 to `None`.
    async fn send_json_opt<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<Option<T>, RemoteError> {
        let response = request
            .send()
            .await
            .map_err(|e| RemoteError::Transport(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }

        response
            .json::<T>()
            .await
            .map(Some)
            .map_err(|e| RemoteError::Transport(format!("malformed response: {e}")))
    }
}

/// Map an HTTP error status (and its body) onto the remote fault taxonomy.
fn classify_status(status: StatusCode, body: &str) -> RemoteError {
    let message = error_message(body).unwrap_or_else(|| {
        status
            .canonical_reason()
            .unwrap_or("unexpected status")
            .to_string()
    });

    match status {
        StatusCode::UNAUTHORIZED => RemoteError::Authentication(message),
        StatusCode::FORBIDDEN => RemoteError::Service(format!("permission denied: {message}")),
        s if s.is_client_error() => RemoteError::Service(message),
        s => RemoteError::Transport(format!("{}: {}", s.as_u16(), message)),
    }
}

/// Pull the `message` field out of a JSON error body, if there is one.
fn error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value
        .get("message")
        .and_then(|m| m.as_str())
        .map(str::to_string)
}

fn kinds_param(kinds: &[NodeKind]) -> String {
    kinds
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

#[async_trait]
impl RemoteTreeMatchClient for HttpClient {
    async fn validate_session(&self) -> Result<(), RemoteError> {
        debug!(url = %self.conn.base_url, user = %self.conn.username, "validating session");
        self.send(self.get("/session")).await.map(|_| ())
    }

    async fn find_project_by_name(&self, name: &str) -> Result<Option<ProjectHandle>, RemoteError> {
        let request = self.get("/projects").query(&[("name", name.trim())]);
        self.send_json_opt(request).await
    }

    async fn get_subtree(
        &self,
        project_id: &str,
        path: &str,
        depth: i32,
        include_root: bool,
        kinds: &[NodeKind],
    ) -> Result<Vec<TreeNode>, RemoteError> {
        let request = self
            .get(&format!("/projects/{project_id}/codetree"))
            .query(&[
                ("path", path.to_string()),
                ("depth", depth.to_string()),
                ("include_root", include_root.to_string()),
                ("kinds", kinds_param(kinds)),
            ]);
        self.send_json(request).await
    }

    async fn get_pending_match_count(
        &self,
        project_id: &str,
        selection: &SubtreeSelection,
    ) -> Result<u64, RemoteError> {
        let request = self
            .post(&format!("/projects/{project_id}/discoveries/pending-count"))
            .json(selection);
        let count: PendingCount = self.send_json(request).await?;
        Ok(count.count)
    }

    async fn get_candidate_matches(
        &self,
        project_id: &str,
        selection: &SubtreeSelection,
        match_types: &[MatchType],
    ) -> Result<Vec<CandidateMatch>, RemoteError> {
        let request = self
            .post(&format!("/projects/{project_id}/discoveries/code-matches"))
            .json(&DiscoveryQuery {
                selection,
                match_types,
            });
        self.send_json(request).await
    }

    async fn record_identification(
        &self,
        project_id: &str,
        path: &str,
        request: &IdentificationRequest,
    ) -> Result<(), RemoteError> {
        let request = self
            .post(&format!("/projects/{project_id}/identifications"))
            .query(&[("path", path)])
            .json(request);
        self.send(request).await.map(|_| ())
    }

    async fn refresh_bill_of_materials(
        &self,
        project_id: &str,
        synchronous: bool,
        partial: bool,
    ) -> Result<(), RemoteError> {
        let request = self
            .post(&format!("/projects/{project_id}/bom/refresh"))
            .json(&RefreshRequest {
                synchronous,
                partial,
            });
        self.send(request).await.map(|_| ())
    }

    async fn lookup_component_version_label(
        &self,
        component_id: &str,
        version_id: Option<&str>,
    ) -> Result<String, RemoteError> {
        let version_id = version_id
            .ok_or_else(|| RemoteError::Service(format!("{component_id} has no version id")))?;
        let info: VersionInfo = self
            .send_json(self.get(&format!("/components/{component_id}/versions/{version_id}")))
            .await?;
        Ok(info.name)
    }

    async fn lookup_license(&self, license_id: &str) -> Result<Option<LicenseInfo>, RemoteError> {
        self.send_json_opt(self.get(&format!("/licenses/{license_id}")))
            .await
    }
}
