//! The identification engine.
//!
//! # Flow
//! 1. Validate the session and resolve the project ([`Engine::new`]).
//! 2. Walk every file below the start path in batches ([`Engine::run`]).
//! 3. Skip batches with no pending matches; otherwise fetch precision matches.
//! 4. Pick the best pending match per file ([`select::best_match`]).
//! 5. Hand it to the [`IdentificationStrategy`] and log the identification.
//! 6. Repeat the walk while a multi-pass strategy keeps making progress.
//! 7. Refresh the bill of materials if enabled and the strategy needs it.

pub mod select;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::audit::IdentificationLog;
use crate::client::{version_label_or_unknown, RemoteTreeMatchClient, DEPTH_ALL};
use crate::error::{EngineError, FaultKind, FileFault, RemoteError};
use crate::models::{
    CandidateMatch, IdentificationRecord, MatchType, NodeKind, ProjectHandle, SubtreeSelection,
    TreeNode,
};
use crate::strategy::{IdentificationStrategy, RecordOutcome, StrategyContext};

use select::{best_match, group_by_path};

/// Only the highest-precision discoveries are ever considered.
const MATCH_TYPES: &[MatchType] = &[MatchType::Precision];

#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Caller opt-out for the trailing BOM refresh.
    pub refresh_enabled: bool,
    /// Upper bound on tree walks for multi-pass strategies.
    pub max_passes: u32,
    pub batch_size: usize,
    pub start_path: String,
    pub cancel: CancellationToken,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            refresh_enabled: true,
            max_passes: 10,
            batch_size: 100,
            start_path: "/".to_string(),
            cancel: CancellationToken::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    Initializing,
    ResolvingProject,
    Traversing,
    Recording,
    Refreshing,
    Done,
    Failed,
}

/// Outcome of a run that finished, possibly with skipped files.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub passes: u32,
    /// Identifications recorded across all passes of this run.
    pub recorded: usize,
    pub faults: Vec<FileFault>,
    pub refreshed: bool,
    pub refresh_skipped: bool,
}

impl RunReport {
    pub fn is_clean(&self) -> bool {
        self.faults.is_empty()
    }

    /// Permission rejections seen during the run, as a single error.
    pub fn permission_error(&self) -> Option<EngineError> {
        let mut denied = self
            .faults
            .iter()
            .filter(|f| f.kind == FaultKind::InsufficientPermission);
        let first = denied.next()?;
        Some(EngineError::InsufficientPermission {
            count: 1 + denied.count(),
            first_path: first.path.clone(),
        })
    }
}

/// Walks a project's code tree and records identifications through a strategy.
pub struct Engine<C> {
    client: C,
    strategy: Box<dyn IdentificationStrategy>,
    project: ProjectHandle,
    options: EngineOptions,
    log: IdentificationLog,
    state: EngineState,
}

impl<C: RemoteTreeMatchClient> Engine<C> {
    /// Validate the connection and resolve `project_name`.
    pub async fn new(
        client: C,
        strategy: Box<dyn IdentificationStrategy>,
        project_name: &str,
        options: EngineOptions,
    ) -> Result<Self, EngineError> {
        debug!(state = ?EngineState::Initializing, "validating session");
        client.validate_session().await.map_err(|e| {
            error!(error = %e, "session validation failed");
            match e {
                RemoteError::Transport(m) => EngineError::Transport(m),
                other => EngineError::Authentication(other.message().to_string()),
            }
        })?;

        debug!(state = ?EngineState::ResolvingProject, project = project_name, "loading project");
        let project = client
            .find_project_by_name(project_name)
            .await
            .map_err(|e| match e {
                RemoteError::Service(_) => EngineError::ProjectNotFound(project_name.to_string()),
                fatal => EngineError::from(fatal),
            })?
            .ok_or_else(|| EngineError::ProjectNotFound(project_name.to_string()))?;
        info!(project = %project.name, id = %project.id, strategy = strategy.name(), "project loaded");

        Ok(Self {
            client,
            strategy,
            project,
            options,
            log: IdentificationLog::new(),
            state: EngineState::ResolvingProject,
        })
    }

    pub fn project(&self) -> &ProjectHandle {
        &self.project
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Every identification made so far, including by runs that failed part-way.
    pub fn identifications_made(&self) -> &IdentificationLog {
        &self.log
    }

    /// Run all passes and the trailing refresh.
    ///
    /// `Ok` means the run finished; the report lists files that were skipped
    /// because the service rejected an operation. `Err` means it did not finish.
    pub async fn run(&mut self) -> Result<RunReport, EngineError> {
        let multi_pass = self.strategy.requires_multiple_passes();
        let final_refresh = self.strategy.requires_final_refresh();
        let mut report = RunReport::default();

        let outcome = self
            .run_to_completion(multi_pass, final_refresh, &mut report)
            .await;

        match outcome {
            Ok(()) => {
                self.set_state(EngineState::Done);
                info!(
                    passes = report.passes,
                    recorded = report.recorded,
                    skipped = report.faults.len(),
                    "identification run complete"
                );
                Ok(report)
            }
            Err(e) => {
                self.set_state(EngineState::Failed);
                error!(error = %e, recorded = self.log.len(), "identification run aborted");
                Err(e)
            }
        }
    }

    async fn run_to_completion(
        &mut self,
        multi_pass: bool,
        final_refresh: bool,
        report: &mut RunReport,
    ) -> Result<(), EngineError> {
        self.run_passes(multi_pass, report).await?;
        self.check_cancelled(report.passes)?;
        self.refresh(final_refresh, report).await
    }

    async fn run_passes(&mut self, multi_pass: bool, report: &mut RunReport) -> Result<(), EngineError> {
        let max_passes = self.options.max_passes.max(1);
        let mut pass = 0;

        loop {
            pass += 1;
            report.passes = pass;

            let recorded = self.traverse(pass, report).await?;
            report.recorded += recorded;
            info!(pass, recorded, "pass complete");

            if !multi_pass || recorded == 0 {
                return Ok(());
            }
            if !self.has_pending_work(report).await? {
                debug!(pass, "no pending matches left");
                return Ok(());
            }
            if pass >= max_passes {
                return Err(EngineError::Convergence { passes: pass });
            }
        }
    }

    /// One walk over every file below the start path. Returns the number recorded.
    async fn traverse(&mut self, pass: u32, report: &mut RunReport) -> Result<usize, EngineError> {
        self.check_cancelled(pass)?;
        self.set_state(EngineState::Traversing);
        let start = self.options.start_path.clone();

        let files = match self
            .client
            .get_subtree(&self.project.id, &start, DEPTH_ALL, false, NodeKind::FILES)
            .await
        {
            Ok(files) => files,
            Err(e) => {
                absorb(&start, e, report)?;
                return Ok(0);
            }
        };
        debug!(pass, path = %start, files = files.len(), "walking code tree");

        let mut recorded = 0;
        for batch in files.chunks(self.options.batch_size.max(1)) {
            self.check_cancelled(pass)?;
            let candidates = self.batch_candidates(pass, &start, batch, report).await?;
            if candidates.is_empty() {
                continue;
            }
            let mut groups = group_by_path(candidates);

            for node in batch {
                self.check_cancelled(pass)?;

                let Some(group) = groups.remove(&node.path) else {
                    continue;
                };
                let Some(best) = best_match(&group) else {
                    debug!(path = %node.path, "no pending match, skipping");
                    continue;
                };

                self.set_state(EngineState::Recording);
                let ctx = StrategyContext {
                    client: &self.client,
                    project: &self.project,
                };
                match self.strategy.record_match(&ctx, &node.path, best).await {
                    Ok(RecordOutcome::Recorded) => {
                        let label = version_label_or_unknown(&self.client, best).await;
                        let record = IdentificationRecord::from_candidate(&node.path, best, label);
                        info!(%record, "identification recorded");
                        self.log.push(record);
                        recorded += 1;
                    }
                    Ok(RecordOutcome::Skipped) => {
                        debug!(path = %node.path, strategy = self.strategy.name(), "strategy declined match");
                    }
                    Err(e) => absorb(&node.path, e, report)?,
                }
            }
        }

        Ok(recorded)
    }

    /// Pending precision candidates for one batch.
    ///
    /// A service fault on the batch query is retried one file at a time, so
    /// only files whose own query fails are reported and skipped.
    async fn batch_candidates(
        &self,
        pass: u32,
        parent: &str,
        batch: &[TreeNode],
        report: &mut RunReport,
    ) -> Result<Vec<CandidateMatch>, EngineError> {
        let selection = SubtreeSelection::new(parent.to_string(), batch.to_vec());
        let err = match self.selection_candidates(&selection).await {
            Ok(candidates) => return Ok(candidates),
            Err(e) if e.is_fatal() || batch.len() == 1 => {
                absorb(&batch[0].path, e, report)?;
                return Ok(Vec::new());
            }
            Err(e) => e,
        };

        warn!(files = batch.len(), error = %err, "batch query rejected, retrying file by file");
        let mut candidates = Vec::new();
        for node in batch {
            self.check_cancelled(pass)?;
            let single = SubtreeSelection::new(node.path.clone(), vec![node.clone()]);
            match self.selection_candidates(&single).await {
                Ok(found) => candidates.extend(found),
                Err(e) => absorb(&node.path, e, report)?,
            }
        }
        Ok(candidates)
    }

    /// Candidates are only fetched when the selection has pending matches.
    async fn selection_candidates(
        &self,
        selection: &SubtreeSelection,
    ) -> Result<Vec<CandidateMatch>, RemoteError> {
        let nodes = selection.nodes.len();
        let pending = self
            .client
            .get_pending_match_count(&self.project.id, selection)
            .await?;
        if pending == 0 {
            debug!(nodes, "no pending matches");
            return Ok(Vec::new());
        }
        debug!(pending, nodes, "fetching candidate matches");
        self.client
            .get_candidate_matches(&self.project.id, selection, MATCH_TYPES)
            .await
    }

    /// Whether anything below the start path is still pending, checked on its
    /// directory node alone.
    async fn has_pending_work(&self, report: &mut RunReport) -> Result<bool, EngineError> {
        let start = &self.options.start_path;
        let root = match self
            .client
            .get_subtree(&self.project.id, start, 0, true, NodeKind::ALL)
            .await
        {
            Ok(nodes) => nodes,
            Err(e) => {
                absorb(start, e, report)?;
                return Ok(false);
            }
        };

        let selection = SubtreeSelection::new(start.clone(), root);
        match self
            .client
            .get_pending_match_count(&self.project.id, &selection)
            .await
        {
            Ok(count) => Ok(count > 0),
            Err(e) => {
                absorb(start, e, report)?;
                Ok(false)
            }
        }
    }

    async fn refresh(&mut self, required: bool, report: &mut RunReport) -> Result<(), EngineError> {
        if !self.options.refresh_enabled {
            info!("skipping BOM refresh as requested");
            report.refresh_skipped = true;
            return Ok(());
        }
        if !required {
            debug!(strategy = self.strategy.name(), "no final BOM refresh required");
            return Ok(());
        }

        self.set_state(EngineState::Refreshing);
        info!(project = %self.project.name, "refreshing BOM");
        match self
            .client
            .refresh_bill_of_materials(&self.project.id, true, false)
            .await
        {
            Ok(()) => report.refreshed = true,
            Err(e) if e.is_fatal() => return Err(e.into()),
            Err(e) => {
                warn!(error = %e, "BOM refresh rejected");
                report.faults.push(FileFault {
                    path: self.options.start_path.clone(),
                    kind: FaultKind::Refresh,
                    message: e.message().to_string(),
                });
            }
        }
        Ok(())
    }

    fn check_cancelled(&self, pass: u32) -> Result<(), EngineError> {
        if self.options.cancel.is_cancelled() {
            warn!(pass, recorded = self.log.len(), "cancellation requested");
            return Err(EngineError::Cancelled { pass });
        }
        Ok(())
    }

    fn set_state(&mut self, next: EngineState) {
        if self.state != next {
            debug!(from = ?self.state, to = ?next, "engine state");
            self.state = next;
        }
    }
}

/// Fatal faults abort; service faults are recorded against `path` and the walk continues.
fn absorb(path: &str, err: RemoteError, report: &mut RunReport) -> Result<(), EngineError> {
    if err.is_fatal() {
        return Err(err.into());
    }
    warn!(path, error = %err, "skipping after service fault");
    report.faults.push(FileFault::from_service(path, &err));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::memory::{Fixture, InMemoryClient, Operation};
    use crate::models::CandidateMatch;
    use crate::strategy::{CodeMatchStrategy, DeclareStrategy};

    async fn engine(fixture: Fixture, strategy: Box<dyn IdentificationStrategy>) -> Engine<InMemoryClient> {
        Engine::new(
            InMemoryClient::new(fixture),
            strategy,
            "demo",
            EngineOptions::default(),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_rejected_credentials_fail_construction() {
        let result = Engine::new(
            InMemoryClient::new(Fixture::new("p-1", "demo").reject_credentials()),
            Box::new(DeclareStrategy::new("t")),
            "demo",
            EngineOptions::default(),
        )
        .await;
        assert!(matches!(result, Err(EngineError::Authentication(_))));
    }

    #[tokio::test]
    async fn test_unknown_project_fails_construction() {
        let result = Engine::new(
            InMemoryClient::new(Fixture::new("p-1", "demo")),
            Box::new(DeclareStrategy::new("t")),
            "missing",
            EngineOptions::default(),
        )
        .await;
        assert_eq!(
            result.err(),
            Some(EngineError::ProjectNotFound("missing".into()))
        );
    }

    #[tokio::test]
    async fn test_declare_run_records_and_refreshes() {
        let fixture = Fixture::new("p-1", "demo")
            .file("/src/a.c")
            .file("/src/b.c")
            .candidate(CandidateMatch::new("/src/a.c", "zlib", 40).with_version("v1"))
            .candidate(CandidateMatch::new("/src/a.c", "openssl", 90).with_lines(3, 20))
            .candidate(CandidateMatch::new("/src/b.c", "zlib", 55).identified())
            .version("zlib", "v1", "1.2.11");
        let mut engine = engine(fixture, Box::new(DeclareStrategy::new("t"))).await;

        let report = engine.run().await.unwrap();
        assert_eq!(report.passes, 1);
        assert_eq!(report.recorded, 1);
        assert!(report.refreshed);
        assert_eq!(engine.state(), EngineState::Done);

        let records = engine.identifications_made().records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].path, "/src/a.c");
        assert_eq!(records[0].component_id, "openssl");
        assert_eq!((records[0].first_line, records[0].line_count), (3, 20));
        assert_eq!(records[0].version_label, "unknown");
        let calls = engine.client().calls();
        assert_eq!(calls.refresh, 1);
        assert_eq!(calls.version_lookup, 1);
        assert_eq!(calls.license_lookup, 0);
    }

    #[tokio::test]
    async fn test_version_label_resolved_when_known() {
        let fixture = Fixture::new("p-1", "demo")
            .file("/a.c")
            .candidate(CandidateMatch::new("/a.c", "zlib", 80).with_version("v1"))
            .version("zlib", "v1", "1.2.11");
        let mut engine = engine(fixture, Box::new(DeclareStrategy::new("t"))).await;

        engine.run().await.unwrap();
        assert_eq!(engine.identifications_made().records()[0].version_label, "1.2.11");
    }

    #[tokio::test]
    async fn test_batches_split_by_batch_size() {
        let mut fixture = Fixture::new("p-1", "demo");
        for i in 0..5 {
            let path = format!("/f{i}.c");
            fixture = fixture
                .file(&path)
                .candidate(CandidateMatch::new(&path, "zlib", 50));
        }
        let mut engine = Engine::new(
            InMemoryClient::new(fixture),
            Box::new(DeclareStrategy::new("t")),
            "demo",
            EngineOptions {
                batch_size: 2,
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let report = engine.run().await.unwrap();
        assert_eq!(report.recorded, 5);
        let calls = engine.client().calls();
        assert_eq!(calls.pending_count, 3);
        assert_eq!(calls.candidates, 3);
    }

    #[tokio::test]
    async fn test_start_path_limits_walk() {
        let fixture = Fixture::new("p-1", "demo")
            .file("/src/a.c")
            .file("/vendor/b.c")
            .candidate(CandidateMatch::new("/src/a.c", "zlib", 50))
            .candidate(CandidateMatch::new("/vendor/b.c", "zlib", 50));
        let mut engine = Engine::new(
            InMemoryClient::new(fixture),
            Box::new(DeclareStrategy::new("t")),
            "demo",
            EngineOptions {
                start_path: "/vendor".into(),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        engine.run().await.unwrap();
        let paths: Vec<_> = engine.identifications_made().iter().map(|r| r.path.as_str()).collect();
        assert_eq!(paths, vec!["/vendor/b.c"]);
    }

    #[tokio::test]
    async fn test_candidate_fetch_fault_retries_batch_per_file() {
        let fixture = Fixture::new("p-1", "demo")
            .file("/a.c")
            .file("/b.c")
            .candidate(CandidateMatch::new("/a.c", "zlib", 50))
            .candidate(CandidateMatch::new("/b.c", "zlib", 50));
        let mut engine = engine(fixture, Box::new(DeclareStrategy::new("t"))).await;
        engine.client().fail_on(
            Operation::Candidates,
            "/a.c",
            RemoteError::Service("insufficient permission to view discoveries".into()),
        );

        let report = engine.run().await.unwrap();
        assert_eq!(report.recorded, 1);
        assert_eq!(engine.identifications_made().records()[0].path, "/b.c");
        assert_eq!(report.faults.len(), 1);
        assert_eq!(
            report.permission_error(),
            Some(EngineError::InsufficientPermission {
                count: 1,
                first_path: "/a.c".into()
            })
        );
        // The batch query, then one query per file.
        assert_eq!(engine.client().calls().candidates, 3);
    }

    #[tokio::test]
    async fn test_single_file_batch_fault_not_retried() {
        let fixture = Fixture::new("p-1", "demo")
            .file("/a.c")
            .candidate(CandidateMatch::new("/a.c", "zlib", 50));
        let mut engine = engine(fixture, Box::new(DeclareStrategy::new("t"))).await;
        engine
            .client()
            .fail_on(Operation::Candidates, "/a.c", RemoteError::Service("bad discovery".into()));

        let report = engine.run().await.unwrap();
        assert_eq!(report.recorded, 0);
        assert_eq!(report.faults[0].kind, FaultKind::Service);
        assert_eq!(engine.client().calls().candidates, 1);
    }

    #[tokio::test]
    async fn test_refresh_service_fault_reported_not_fatal() {
        let fixture = Fixture::new("p-1", "demo")
            .file("/a.c")
            .candidate(CandidateMatch::new("/a.c", "zlib", 50));
        let mut engine = engine(fixture, Box::new(DeclareStrategy::new("t"))).await;
        engine
            .client()
            .fail_on(Operation::Refresh, "/", RemoteError::Service("BOM locked".into()));

        let report = engine.run().await.unwrap();
        assert!(!report.refreshed);
        assert_eq!(report.faults[0].kind, FaultKind::Refresh);
    }

    #[tokio::test]
    async fn test_code_match_strategy_skips_low_scores() {
        let fixture = Fixture::new("p-1", "demo")
            .file("/a.c")
            .file("/b.c")
            .candidate(CandidateMatch::new("/a.c", "zlib", 80))
            .candidate(CandidateMatch::new("/b.c", "zlib", 20));
        let mut engine = engine(fixture, Box::new(CodeMatchStrategy::new("t", 50))).await;

        let report = engine.run().await.unwrap();
        assert_eq!(report.recorded, 1);
        // b.c stays pending, so a second pass runs and records nothing.
        assert_eq!(report.passes, 2);
        assert_eq!(engine.client().calls().refresh, 0);
    }

    #[tokio::test]
    async fn test_cancelled_before_run_records_nothing() {
        let fixture = Fixture::new("p-1", "demo")
            .file("/a.c")
            .candidate(CandidateMatch::new("/a.c", "zlib", 50));
        let options = EngineOptions::default();
        options.cancel.cancel();
        let mut engine = Engine::new(
            InMemoryClient::new(fixture),
            Box::new(DeclareStrategy::new("t")),
            "demo",
            options,
        )
        .await
        .unwrap();

        assert_eq!(engine.run().await.err(), Some(EngineError::Cancelled { pass: 1 }));
        assert!(engine.identifications_made().is_empty());
        assert_eq!(engine.state(), EngineState::Failed);
    }

    #[tokio::test]
    async fn test_cancelled_empty_walk_skips_refresh() {
        let options = EngineOptions::default();
        options.cancel.cancel();
        let mut engine = Engine::new(
            InMemoryClient::new(Fixture::new("p-1", "demo")),
            Box::new(DeclareStrategy::new("t")),
            "demo",
            options,
        )
        .await
        .unwrap();

        assert_eq!(engine.run().await.err(), Some(EngineError::Cancelled { pass: 1 }));
        let calls = engine.client().calls();
        assert_eq!(calls.subtree, 0);
        assert_eq!(calls.refresh, 0);
    }
}
