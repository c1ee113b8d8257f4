use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{RemoteTreeMatchClient, DEPTH_ALL};
use crate::error::RemoteError;
use crate::models::{
    CandidateMatch, IdentificationRequest, IdentificationStatus, LicenseInfo, MatchType, NodeKind,
    ProjectHandle, SubtreeSelection, TreeNode,
};

/// Seed data for [`InMemoryClient`], loadable from JSON.
///
/// One fixture describes one project's code tree; `projects` only feeds name lookup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Fixture {
    pub projects: Vec<ProjectHandle>,
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub candidates: Vec<CandidateMatch>,
    /// Candidates that only appear once another path has been identified.
    #[serde(default)]
    pub unlocks: Vec<Unlock>,
    #[serde(default)]
    pub licenses: Vec<LicenseInfo>,
    #[serde(default)]
    pub versions: Vec<VersionLabel>,
    /// When set, recording never clears a file's pending status.
    #[serde(default)]
    pub stuck: bool,
    #[serde(default)]
    pub reject_credentials: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Unlock {
    pub after: String,
    pub candidate: CandidateMatch,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionLabel {
    pub component_id: String,
    pub version_id: String,
    pub name: String,
}

impl Fixture {
    pub fn new(project_id: &str, project_name: &str) -> Self {
        Self {
            projects: vec![ProjectHandle {
                id: project_id.to_string(),
                name: project_name.to_string(),
            }],
            ..Default::default()
        }
    }

    pub fn file(mut self, path: &str) -> Self {
        self.files.push(path.to_string());
        self
    }

    pub fn candidate(mut self, candidate: CandidateMatch) -> Self {
        self.candidates.push(candidate);
        self
    }

    pub fn unlock(mut self, after: &str, candidate: CandidateMatch) -> Self {
        self.unlocks.push(Unlock {
            after: after.to_string(),
            candidate,
        });
        self
    }

    pub fn license(mut self, id: &str, name: &str) -> Self {
        self.licenses.push(LicenseInfo {
            id: id.to_string(),
            name: name.to_string(),
        });
        self
    }

    pub fn version(mut self, component_id: &str, version_id: &str, name: &str) -> Self {
        self.versions.push(VersionLabel {
            component_id: component_id.to_string(),
            version_id: version_id.to_string(),
            name: name.to_string(),
        });
        self
    }

    pub fn stuck(mut self) -> Self {
        self.stuck = true;
        self
    }

    pub fn reject_credentials(mut self) -> Self {
        self.reject_credentials = true;
        self
    }
}

/// Per-operation call counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub subtree: usize,
    pub pending_count: usize,
    pub candidates: usize,
    pub record: usize,
    pub refresh: usize,
    pub version_lookup: usize,
    pub license_lookup: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    PendingCount,
    Candidates,
    Record,
    Refresh,
}

#[derive(Debug, Default)]
struct State {
    candidates: Vec<CandidateMatch>,
    unlocks: Vec<Unlock>,
    recorded: Vec<(String, IdentificationRequest)>,
    faults: HashMap<(Operation, String), RemoteError>,
    calls: CallCounts,
}

/// A code-inspection service simulated in memory.
///
/// Recording an identification marks the file's candidates as identified and
/// releases any [`Unlock`]s waiting on that path, so multi-pass behaviour can be
/// reproduced without a server.
pub struct InMemoryClient {
    projects: Vec<ProjectHandle>,
    /// Every node in the tree keyed by path, folders included.
    nodes: BTreeMap<String, NodeKind>,
    licenses: Vec<LicenseInfo>,
    versions: Vec<VersionLabel>,
    stuck: bool,
    reject_credentials: bool,
    state: Mutex<State>,
}

impl InMemoryClient {
    pub fn new(fixture: Fixture) -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert("/".to_string(), NodeKind::Folder);
        for file in &fixture.files {
            let mut parent = parent_of(file);
            while let Some(dir) = parent {
                nodes.entry(dir.to_string()).or_insert(NodeKind::Folder);
                parent = parent_of(dir);
            }
            nodes.insert(file.clone(), NodeKind::File);
        }

        Self {
            projects: fixture.projects,
            nodes,
            licenses: fixture.licenses,
            versions: fixture.versions,
            stuck: fixture.stuck,
            reject_credentials: fixture.reject_credentials,
            state: Mutex::new(State {
                candidates: fixture.candidates,
                unlocks: fixture.unlocks,
                ..Default::default()
            }),
        }
    }

    /// Load a fixture from a JSON file.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading fixture {}", path.display()))?;
        let fixture: Fixture = serde_json::from_str(&content)
            .with_context(|| format!("parsing fixture {}", path.display()))?;
        Ok(Self::new(fixture))
    }

    /// Make `op` fail with `err` whenever it touches `path`.
    pub fn fail_on(&self, op: Operation, path: &str, err: RemoteError) {
        self.lock().faults.insert((op, path.to_string()), err);
    }

    pub fn calls(&self) -> CallCounts {
        self.lock().calls
    }

    /// Identifications written so far, in order.
    pub fn recorded(&self) -> Vec<(String, IdentificationRequest)> {
        self.lock().recorded.clone()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Files covered by a selection: file nodes themselves, and every file below folder nodes.
    fn selected_files(&self, selection: &SubtreeSelection) -> Vec<String> {
        let mut files = Vec::new();
        for node in &selection.nodes {
            match self.nodes.get(&node.path) {
                Some(NodeKind::File) => files.push(node.path.clone()),
                Some(_) => files.extend(
                    self.nodes
                        .iter()
                        .filter(|(p, k)| **k == NodeKind::File && is_descendant(p, &node.path))
                        .map(|(p, _)| p.clone()),
                ),
                None => {}
            }
        }
        files
    }
}

fn parent_of(path: &str) -> Option<&str> {
    if path == "/" {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some("/"),
        Some(i) => Some(&path[..i]),
        None => None,
    }
}

fn is_descendant(path: &str, ancestor: &str) -> bool {
    if path == ancestor {
        return false;
    }
    if ancestor == "/" {
        return path.starts_with('/');
    }
    path.strip_prefix(ancestor)
        .is_some_and(|rest| rest.starts_with('/'))
}

/// Number of path segments between `ancestor` and `path`.
fn relative_depth(path: &str, ancestor: &str) -> i32 {
    let rest = if ancestor == "/" {
        &path[1..]
    } else {
        &path[ancestor.len() + 1..]
    };
    rest.split('/').count() as i32
}

fn injected(state: &State, op: Operation, paths: &[String]) -> Result<(), RemoteError> {
    for path in paths {
        if let Some(err) = state.faults.get(&(op, path.clone())) {
            return Err(err.clone());
        }
    }
    Ok(())
}

#[async_trait]
impl RemoteTreeMatchClient for InMemoryClient {
    async fn validate_session(&self) -> Result<(), RemoteError> {
        if self.reject_credentials {
            return Err(RemoteError::Authentication("invalid username or password".into()));
        }
        Ok(())
    }

    async fn find_project_by_name(&self, name: &str) -> Result<Option<ProjectHandle>, RemoteError> {
        let name = name.trim();
        Ok(self.projects.iter().find(|p| p.name == name).cloned())
    }

    async fn get_subtree(
        &self,
        _project_id: &str,
        path: &str,
        depth: i32,
        include_root: bool,
        kinds: &[NodeKind],
    ) -> Result<Vec<TreeNode>, RemoteError> {
        self.lock().calls.subtree += 1;

        let mut out = Vec::new();
        for (node_path, kind) in &self.nodes {
            if !kinds.contains(kind) {
                continue;
            }
            let wanted = if node_path == path {
                include_root
            } else {
                is_descendant(node_path, path)
                    && (depth == DEPTH_ALL || relative_depth(node_path, path) <= depth)
            };
            if wanted {
                out.push(TreeNode {
                    path: node_path.clone(),
                    kind: *kind,
                });
            }
        }
        Ok(out)
    }

    async fn get_pending_match_count(
        &self,
        _project_id: &str,
        selection: &SubtreeSelection,
    ) -> Result<u64, RemoteError> {
        let files = self.selected_files(selection);
        let mut state = self.lock();
        state.calls.pending_count += 1;
        injected(&state, Operation::PendingCount, &files)?;

        let pending = files
            .iter()
            .filter(|f| {
                state
                    .candidates
                    .iter()
                    .any(|c| c.file_path == **f && c.is_pending())
            })
            .count();
        Ok(pending as u64)
    }

    async fn get_candidate_matches(
        &self,
        _project_id: &str,
        selection: &SubtreeSelection,
        match_types: &[MatchType],
    ) -> Result<Vec<CandidateMatch>, RemoteError> {
        let files = self.selected_files(selection);
        let mut state = self.lock();
        state.calls.candidates += 1;
        injected(&state, Operation::Candidates, &files)?;

        Ok(state
            .candidates
            .iter()
            .filter(|c| files.contains(&c.file_path) && match_types.contains(&c.match_type))
            .cloned()
            .collect())
    }

    async fn record_identification(
        &self,
        _project_id: &str,
        path: &str,
        request: &IdentificationRequest,
    ) -> Result<(), RemoteError> {
        let mut state = self.lock();
        state.calls.record += 1;
        injected(&state, Operation::Record, &[path.to_string()])?;

        state.recorded.push((path.to_string(), request.clone()));

        if !self.stuck {
            for candidate in state.candidates.iter_mut().filter(|c| c.file_path == path) {
                candidate.status = IdentificationStatus::Identified;
            }
        }

        let (released, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut state.unlocks)
            .into_iter()
            .partition(|u| u.after == path);
        state.unlocks = waiting;
        state
            .candidates
            .extend(released.into_iter().map(|u| u.candidate));

        Ok(())
    }

    async fn refresh_bill_of_materials(
        &self,
        _project_id: &str,
        _synchronous: bool,
        _partial: bool,
    ) -> Result<(), RemoteError> {
        let mut state = self.lock();
        state.calls.refresh += 1;
        injected(&state, Operation::Refresh, &["/".to_string()])
    }

    async fn lookup_component_version_label(
        &self,
        component_id: &str,
        version_id: Option<&str>,
    ) -> Result<String, RemoteError> {
        self.lock().calls.version_lookup += 1;
        self.versions
            .iter()
            .find(|v| v.component_id == component_id && Some(v.version_id.as_str()) == version_id)
            .map(|v| v.name.clone())
            .ok_or_else(|| RemoteError::Service(format!("no version {version_id:?} of {component_id}")))
    }

    async fn lookup_license(&self, license_id: &str) -> Result<Option<LicenseInfo>, RemoteError> {
        self.lock().calls.license_lookup += 1;
        Ok(self.licenses.iter().find(|l| l.id == license_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> InMemoryClient {
        InMemoryClient::new(
            Fixture::new("p-1", "demo")
                .file("/src/a.c")
                .file("/src/lib/b.c")
                .file("/README")
                .candidate(CandidateMatch::new("/src/a.c", "zlib", 80))
                .candidate(CandidateMatch::new("/src/lib/b.c", "zlib", 60).identified()),
        )
    }

    #[tokio::test]
    async fn test_subtree_depths() {
        let c = client();
        let all = c.get_subtree("p-1", "/", DEPTH_ALL, false, NodeKind::FILES).await.unwrap();
        let paths: Vec<_> = all.iter().map(|n| n.path.as_str()).collect();
        assert_eq!(paths, vec!["/README", "/src/a.c", "/src/lib/b.c"]);

        let root = c.get_subtree("p-1", "/src", 0, true, NodeKind::ALL).await.unwrap();
        assert_eq!(root, vec![TreeNode::folder("/src")]);

        let children = c.get_subtree("p-1", "/src", 1, false, NodeKind::ALL).await.unwrap();
        let paths: Vec<_> = children.iter().map(|n| n.path.as_str()).collect();
        assert_eq!(paths, vec!["/src/a.c", "/src/lib"]);
        assert_eq!(c.calls().subtree, 3);
    }

    #[tokio::test]
    async fn test_pending_count_for_folder_and_files() {
        let c = client();
        let folder = SubtreeSelection::new("/", vec![TreeNode::folder("/src")]);
        assert_eq!(c.get_pending_match_count("p-1", &folder).await.unwrap(), 1);

        let files = SubtreeSelection::new("/src/lib", vec![TreeNode::file("/src/lib/b.c")]);
        assert_eq!(c.get_pending_match_count("p-1", &files).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_record_clears_pending_and_releases_unlocks() {
        let c = InMemoryClient::new(
            Fixture::new("p-1", "demo")
                .file("/a.c")
                .file("/b.c")
                .candidate(CandidateMatch::new("/a.c", "zlib", 90))
                .unlock("/a.c", CandidateMatch::new("/b.c", "zlib", 70)),
        );
        let request = IdentificationRequest::Declared {
            component_id: "zlib".into(),
            version_id: None,
            license: None,
            usage_level: crate::models::UsageLevel::Component,
            comment: String::new(),
        };
        c.record_identification("p-1", "/a.c", &request).await.unwrap();

        let root = SubtreeSelection::new("/", vec![TreeNode::folder("/")]);
        let candidates = c
            .get_candidate_matches("p-1", &root, &[MatchType::Precision])
            .await
            .unwrap();
        assert_eq!(candidates.len(), 2);
        assert!(!candidates[0].is_pending());
        assert!(candidates[1].is_pending());
        assert_eq!(c.recorded().len(), 1);
    }

    #[tokio::test]
    async fn test_generic_matches_filtered_out() {
        let c = InMemoryClient::new(
            Fixture::new("p-1", "demo")
                .file("/a.c")
                .candidate(CandidateMatch::new("/a.c", "zlib", 90).generic()),
        );
        let sel = SubtreeSelection::new("/", vec![TreeNode::file("/a.c")]);
        let found = c
            .get_candidate_matches("p-1", &sel, &[MatchType::Precision])
            .await
            .unwrap();
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn test_project_lookup_trims_name() {
        let c = client();
        let found = c.find_project_by_name("  demo ").await.unwrap();
        assert_eq!(found.map(|p| p.id), Some("p-1".to_string()));
        assert!(c.find_project_by_name("other").await.unwrap().is_none());
    }

    #[test]
    fn test_fixture_from_json() {
        let json = r#"{
            "projects": [{"id": "p-9", "name": "fixture"}],
            "files": ["/x/y.c"],
            "candidates": [
                {"file_path": "/x/y.c", "component_id": "openssl", "score": 75, "status": "pending"}
            ]
        }"#;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fixture.json");
        std::fs::write(&path, json).unwrap();

        let c = InMemoryClient::from_json_file(&path).unwrap();
        assert_eq!(c.nodes.get("/x"), Some(&NodeKind::Folder));
        assert_eq!(c.lock().candidates[0].match_type, MatchType::Precision);
    }
}
