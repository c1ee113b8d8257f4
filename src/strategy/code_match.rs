use async_trait::async_trait;
use tracing::{debug, info};

use super::{stamp, IdentificationStrategy, RecordOutcome, StrategyContext};
use crate::error::RemoteError;
use crate::models::{CandidateMatch, IdentificationRequest, UsageLevel};

/// Confirms the code match itself, limited to the matched line range.
///
/// The service refreshes the BOM as part of each code-match identification, so
/// no trailing refresh is needed. Confirming one match can change which
/// discoveries remain pending elsewhere, so the tree is walked until it settles.
pub struct CodeMatchStrategy {
    program_name: String,
    min_score: u8,
}

impl CodeMatchStrategy {
    pub fn new(program_name: &str, min_score: u8) -> Self {
        Self {
            program_name: program_name.to_string(),
            min_score,
        }
    }
}

#[async_trait]
impl IdentificationStrategy for CodeMatchStrategy {
    fn name(&self) -> &'static str {
        "code-match"
    }

    async fn record_match(
        &self,
        ctx: &StrategyContext<'_>,
        path: &str,
        candidate: &CandidateMatch,
    ) -> Result<RecordOutcome, RemoteError> {
        if candidate.score < self.min_score {
            debug!(
                path,
                score = candidate.score,
                min_score = self.min_score,
                "below minimum score, leaving pending"
            );
            return Ok(RecordOutcome::Skipped);
        }

        let request = IdentificationRequest::CodeMatch {
            component_id: candidate.component_id.clone(),
            version_id: candidate.version_id.clone(),
            matched_lines: candidate.matched_lines,
            usage_level: UsageLevel::Snippet,
            comment: stamp("Code match", &self.program_name),
        };

        info!(
            path,
            component = %candidate.component_id,
            first_line = candidate.matched_lines.first_line,
            lines = candidate.matched_lines.line_count,
            "adding code match identification"
        );
        ctx.client
            .record_identification(&ctx.project.id, path, &request)
            .await?;

        Ok(RecordOutcome::Recorded)
    }

    fn requires_final_refresh(&self) -> bool {
        false
    }

    fn requires_multiple_passes(&self) -> bool {
        true
    }
}
