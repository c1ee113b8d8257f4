use serde::{Deserialize, Serialize};

/// The remote project being processed. Resolved once, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectHandle {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    File,
    Folder,
    ExpandedArchive,
}

impl NodeKind {
    /// Filter used when walking files only.
    pub const FILES: &'static [NodeKind] = &[NodeKind::File];

    /// Filter used when fetching a directory node itself.
    pub const ALL: &'static [NodeKind] =
        &[NodeKind::File, NodeKind::Folder, NodeKind::ExpandedArchive];
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeKind::File => write!(f, "file"),
            NodeKind::Folder => write!(f, "folder"),
            NodeKind::ExpandedArchive => write!(f, "expanded_archive"),
        }
    }
}

/// One entry of the remote code tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeNode {
    pub path: String,
    pub kind: NodeKind,
}

impl TreeNode {
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: NodeKind::File,
        }
    }

    pub fn folder(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: NodeKind::Folder,
        }
    }
}

/// A set of nodes under a common parent, passed to count and discovery queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubtreeSelection {
    pub parent_path: String,
    pub nodes: Vec<TreeNode>,
}

impl SubtreeSelection {
    pub fn new(parent_path: impl Into<String>, nodes: Vec<TreeNode>) -> Self {
        Self {
            parent_path: parent_path.into(),
            nodes,
        }
    }
}

/// Match-type category. Only `Precision` is ever requested by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    Precision,
    Generic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentificationStatus {
    Pending,
    Identified,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRange {
    pub first_line: u32,
    pub line_count: u32,
}

/// A discovered code match for a single file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateMatch {
    pub file_path: String,
    pub component_id: String,
    #[serde(default)]
    pub version_id: Option<String>,
    #[serde(default)]
    pub license_id: Option<String>,
    /// Match ratio as an integer percentage, 0 to 100.
    #[serde(deserialize_with = "deserialize_score")]
    pub score: u8,
    #[serde(default)]
    pub matched_lines: SourceRange,
    #[serde(default = "default_match_type")]
    pub match_type: MatchType,
    pub status: IdentificationStatus,
}

fn default_match_type() -> MatchType {
    MatchType::Precision
}

pub const MAX_SCORE: u8 = 100;

fn deserialize_score<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let score = u8::deserialize(deserializer)?;
    if score > MAX_SCORE {
        return Err(serde::de::Error::custom(format!(
            "score {score} is outside 0..={MAX_SCORE}"
        )));
    }
    Ok(score)
}

impl CandidateMatch {
    /// A pending precision match with no version, license or line range.
    pub fn new(file_path: impl Into<String>, component_id: impl Into<String>, score: u8) -> Self {
        Self {
            file_path: file_path.into(),
            component_id: component_id.into(),
            version_id: None,
            license_id: None,
            score,
            matched_lines: SourceRange::default(),
            match_type: MatchType::Precision,
            status: IdentificationStatus::Pending,
        }
    }

    pub fn with_version(mut self, version_id: impl Into<String>) -> Self {
        self.version_id = Some(version_id.into());
        self
    }

    pub fn with_license(mut self, license_id: impl Into<String>) -> Self {
        self.license_id = Some(license_id.into());
        self
    }

    pub fn with_lines(mut self, first_line: u32, line_count: u32) -> Self {
        self.matched_lines = SourceRange {
            first_line,
            line_count,
        };
        self
    }

    pub fn identified(mut self) -> Self {
        self.status = IdentificationStatus::Identified;
        self
    }

    pub fn generic(mut self) -> Self {
        self.match_type = MatchType::Generic;
        self
    }

    pub fn is_pending(&self) -> bool {
        self.status == IdentificationStatus::Pending
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicenseInfo {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageLevel {
    Component,
    File,
    Snippet,
}

/// The identification written back to the service for a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IdentificationRequest {
    /// Declare the whole file as belonging to a component.
    Declared {
        component_id: String,
        version_id: Option<String>,
        license: Option<LicenseInfo>,
        usage_level: UsageLevel,
        comment: String,
    },
    /// Confirm a code match over the matched line range.
    CodeMatch {
        component_id: String,
        version_id: Option<String>,
        matched_lines: SourceRange,
        usage_level: UsageLevel,
        comment: String,
    },
}

impl IdentificationRequest {
    pub fn component_id(&self) -> &str {
        match self {
            IdentificationRequest::Declared { component_id, .. }
            | IdentificationRequest::CodeMatch { component_id, .. } => component_id,
        }
    }
}

/// Audit entry for one identification made during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentificationRecord {
    pub path: String,
    pub first_line: u32,
    pub line_count: u32,
    pub component_id: String,
    pub version_id: Option<String>,
    pub version_label: String,
    pub score: u8,
}

impl IdentificationRecord {
    pub fn from_candidate(path: &str, candidate: &CandidateMatch, version_label: String) -> Self {
        Self {
            path: path.to_string(),
            first_line: candidate.matched_lines.first_line,
            line_count: candidate.matched_lines.line_count,
            component_id: candidate.component_id.clone(),
            version_id: candidate.version_id.clone(),
            version_label,
            score: candidate.score,
        }
    }
}

impl std::fmt::Display for IdentificationRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} [{}+{}] -> {}/{} ({}%)",
            self.path,
            self.first_line,
            self.line_count,
            self.component_id,
            self.version_label,
            self.score
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidate_score_range_enforced() {
        let json = |score: u32| {
            format!(r#"{{"file_path": "/a.c", "component_id": "zlib", "score": {score}, "status": "pending"}}"#)
        };

        let edge: CandidateMatch = serde_json::from_str(&json(100)).unwrap();
        assert_eq!(edge.score, 100);
        assert_eq!(edge.match_type, MatchType::Precision);

        let err = serde_json::from_str::<CandidateMatch>(&json(101)).unwrap_err();
        assert!(err.to_string().contains("outside 0..=100"));
        assert!(serde_json::from_str::<CandidateMatch>(&json(300)).is_err());
    }
}
