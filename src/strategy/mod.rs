//! Pluggable identification strategies.
//!
//! A strategy decides how the best candidate for a file is written back to the
//! service, and declares two run-level policies: whether a BOM refresh is needed
//! afterwards and whether the tree must be walked repeatedly until it settles.
//!
//! - [`declare`]: declare the whole file as the matched component.
//! - [`code_match`]: confirm the code match over its line range only.

pub mod code_match;
pub mod declare;

use async_trait::async_trait;
use serde::Deserialize;

use crate::client::RemoteTreeMatchClient;
use crate::error::RemoteError;
use crate::models::{CandidateMatch, ProjectHandle};

pub use code_match::CodeMatchStrategy;
pub use declare::DeclareStrategy;

/// What a strategy did with a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// Exactly one identification was written.
    Recorded,
    /// Nothing was written; the file stays pending.
    Skipped,
}

/// Everything a strategy may touch while recording.
pub struct StrategyContext<'a> {
    pub client: &'a dyn RemoteTreeMatchClient,
    pub project: &'a ProjectHandle,
}

#[async_trait]
pub trait IdentificationStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Record `candidate` as the identification of `path`.
    ///
    /// Errors are the remote write's own faults; choosing not to record is
    /// `Ok(RecordOutcome::Skipped)`, never an error.
    async fn record_match(
        &self,
        ctx: &StrategyContext<'_>,
        path: &str,
        candidate: &CandidateMatch,
    ) -> Result<RecordOutcome, RemoteError>;

    fn requires_final_refresh(&self) -> bool;

    fn requires_multiple_passes(&self) -> bool;
}

/// Built-in strategies, selectable from config or the command line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
    #[default]
    Declare,
    CodeMatch,
}

impl StrategyKind {
    pub fn build(self, program_name: &str, min_score: u8) -> Box<dyn IdentificationStrategy> {
        match self {
            StrategyKind::Declare => Box::new(DeclareStrategy::new(program_name)),
            StrategyKind::CodeMatch => Box::new(CodeMatchStrategy::new(program_name, min_score)),
        }
    }
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StrategyKind::Declare => write!(f, "declare"),
            StrategyKind::CodeMatch => write!(f, "code-match"),
        }
    }
}

/// Audit comment attached to every identification a strategy writes.
fn stamp(action: &str, program_name: &str) -> String {
    format!(
        "{} Id-ed by {} at {}",
        action,
        program_name,
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_builds_matching_policy() {
        let declare = StrategyKind::Declare.build("t", 0);
        assert_eq!(declare.name(), "declare");
        assert!(declare.requires_final_refresh());
        assert!(!declare.requires_multiple_passes());

        let code = StrategyKind::CodeMatch.build("t", 0);
        assert_eq!(code.name(), "code-match");
        assert!(!code.requires_final_refresh());
        assert!(code.requires_multiple_passes());
    }

    #[test]
    fn test_stamp_names_program() {
        let comment = stamp("Declare", "license-autoid");
        assert!(comment.starts_with("Declare Id-ed by license-autoid at "));
    }
}
