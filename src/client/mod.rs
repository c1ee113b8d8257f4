//! The remote code-inspection service, seen through one narrow trait.
//!
//! - [`http`]: JSON-over-HTTPS transport built on `reqwest`.
//! - [`memory`]: a simulated service held in memory, for tests and offline runs.

pub mod http;
pub mod memory;

use async_trait::async_trait;

use crate::error::RemoteError;
use crate::models::{
    CandidateMatch, IdentificationRequest, LicenseInfo, MatchType, NodeKind, ProjectHandle,
    SubtreeSelection, TreeNode,
};

/// Depth argument for [`RemoteTreeMatchClient::get_subtree`] meaning "recurse fully".
pub const DEPTH_ALL: i32 = -1;

/// Operations the identification engine needs from the remote service.
///
/// An empty list is a valid answer for every query. Implementations report
/// authentication and transport problems as the matching [`RemoteError`]
/// variants so the engine can tell them apart from per-request rejections.
#[async_trait]
pub trait RemoteTreeMatchClient: Send + Sync {
    /// Confirm the configured credentials are accepted.
    async fn validate_session(&self) -> Result<(), RemoteError>;

    async fn find_project_by_name(&self, name: &str) -> Result<Option<ProjectHandle>, RemoteError>;

    /// `depth`: 0 = the node itself, 1 = immediate children, [`DEPTH_ALL`] = everything below.
    async fn get_subtree(
        &self,
        project_id: &str,
        path: &str,
        depth: i32,
        include_root: bool,
        kinds: &[NodeKind],
    ) -> Result<Vec<TreeNode>, RemoteError>;

    /// Number of nodes in `selection` that still have pending code matches.
    async fn get_pending_match_count(
        &self,
        project_id: &str,
        selection: &SubtreeSelection,
    ) -> Result<u64, RemoteError>;

    async fn get_candidate_matches(
        &self,
        project_id: &str,
        selection: &SubtreeSelection,
        match_types: &[MatchType],
    ) -> Result<Vec<CandidateMatch>, RemoteError>;

    async fn record_identification(
        &self,
        project_id: &str,
        path: &str,
        request: &IdentificationRequest,
    ) -> Result<(), RemoteError>;

    async fn refresh_bill_of_materials(
        &self,
        project_id: &str,
        synchronous: bool,
        partial: bool,
    ) -> Result<(), RemoteError>;

    async fn lookup_component_version_label(
        &self,
        component_id: &str,
        version_id: Option<&str>,
    ) -> Result<String, RemoteError>;

    async fn lookup_license(&self, license_id: &str) -> Result<Option<LicenseInfo>, RemoteError>;
}

/// Label used when a component version cannot be resolved.
pub const UNKNOWN_VERSION: &str = "unknown";

/// Resolve a version label, substituting [`UNKNOWN_VERSION`] on any failure.
pub async fn version_label_or_unknown<C>(client: &C, candidate: &CandidateMatch) -> String
where
    C: RemoteTreeMatchClient + ?Sized,
{
    match client
        .lookup_component_version_label(&candidate.component_id, candidate.version_id.as_deref())
        .await
    {
        Ok(label) => label,
        Err(e) => {
            tracing::debug!(component = %candidate.component_id, error = %e, "version lookup failed");
            UNKNOWN_VERSION.to_string()
        }
    }
}
