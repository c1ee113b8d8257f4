use async_trait::async_trait;
use tracing::{debug, info};

use super::{stamp, IdentificationStrategy, RecordOutcome, StrategyContext};
use crate::error::RemoteError;
use crate::models::{CandidateMatch, IdentificationRequest, LicenseInfo, UsageLevel};

/// Declares the whole file as belonging to the matched component.
///
/// The version is left unset and the license is copied from the match when the
/// service can resolve it. Declarations are written without an inline BOM
/// refresh, so one refresh is needed at the end of the run.
pub struct DeclareStrategy {
    program_name: String,
}

impl DeclareStrategy {
    pub fn new(program_name: &str) -> Self {
        Self {
            program_name: program_name.to_string(),
        }
    }

    /// An unresolvable license is not an error: the file is declared without one.
    async fn resolve_license(
        &self,
        ctx: &StrategyContext<'_>,
        candidate: &CandidateMatch,
    ) -> Option<LicenseInfo> {
        let license_id = candidate.license_id.as_deref()?;
        match ctx.client.lookup_license(license_id).await {
            Ok(Some(license)) => {
                debug!(component = %candidate.component_id, license = %license.name, "license resolved");
                Some(license)
            }
            Ok(None) => None,
            Err(e) => {
                debug!(license_id, error = %e, "license lookup failed");
                None
            }
        }
    }
}

#[async_trait]
impl IdentificationStrategy for DeclareStrategy {
    fn name(&self) -> &'static str {
        "declare"
    }

    async fn record_match(
        &self,
        ctx: &StrategyContext<'_>,
        path: &str,
        candidate: &CandidateMatch,
    ) -> Result<RecordOutcome, RemoteError> {
        let request = IdentificationRequest::Declared {
            component_id: candidate.component_id.clone(),
            version_id: None,
            license: self.resolve_license(ctx, candidate).await,
            usage_level: UsageLevel::Component,
            comment: stamp("Declare", &self.program_name),
        };

        info!(path, component = request.component_id(), "adding declaration");
        ctx.client
            .record_identification(&ctx.project.id, path, &request)
            .await?;

        Ok(RecordOutcome::Recorded)
    }

    fn requires_final_refresh(&self) -> bool {
        true
    }

    fn requires_multiple_passes(&self) -> bool {
        false
    }
}
