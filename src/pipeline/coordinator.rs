//! Analysis coordinator - wires the four stages together with tokio
//!
//! Each stage runs as its own task with its own store connection, joined to
//! its neighbours by bounded channels. Dropping a sender is the end-of-stream
//! signal, so a stage that fails simply returns and the others unwind:
//! upstream stages see a closed channel, downstream stages see end of input.
//! A supervisor task joins all four, keeps the root-cause error, and
//! compresses the forest only when every stage succeeded.

use super::aggregator::aggregate_records;
use super::classifier::classify_keys;
use super::scanner::{scan_keys, ScanEnd, ScanSettings};
use super::sizer::size_records;
use super::stats::{AnalysisProgress, PipelineStats};
use super::{STAGE_AGGREGATE, STAGE_CLASSIFY, STAGE_SCAN, STAGE_SIZE};
use crate::config::AnalysisConfig;
use crate::error::{PipelineError, Result, StoreResult};
use crate::store::StoreConnector;
use crate::tree::{KeyspaceForest, SharedForest};
use crate::types::SizingMode;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tracing::{error, info};

/// Outcome of a finished analysis
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisSummary {
    pub target: String,
    pub sizing: SizingMode,
    pub keys_scanned: u64,
    pub keys_skipped: u64,
    pub keys_classified: u64,
    pub keys_dropped: u64,
    pub keys_aggregated: u64,
    pub total_size: i64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_secs: f64,
    /// False when the scan stopped on the shutdown flag
    pub completed: bool,
    /// True when the scan stopped on the key cap rather than cursor wrap
    pub limit_reached: bool,
}

/// Summary plus the compressed forest, returned by [`Analyzer::run`]
#[derive(Debug)]
pub struct AnalysisReport {
    pub summary: AnalysisSummary,
    pub forest: KeyspaceForest,
}

/// Progress and completion of a started analysis
#[derive(Debug)]
pub struct AnalysisHandle {
    stats: Arc<PipelineStats>,
    started: Instant,
    started_at: DateTime<Utc>,
    supervisor: JoinHandle<std::result::Result<AnalysisSummary, PipelineError>>,
}

impl AnalysisHandle {
    /// Live counters
    pub fn progress(&self) -> AnalysisProgress {
        self.stats.snapshot(self.started.elapsed())
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn is_finished(&self) -> bool {
        self.supervisor.is_finished()
    }

    /// Wait for every stage to finish
    pub async fn wait(self) -> std::result::Result<AnalysisSummary, PipelineError> {
        self.supervisor
            .await
            .unwrap_or_else(|e| Err(join_failure("supervisor", e)))
    }
}

/// Runs one analysis against one store
pub struct Analyzer<C: StoreConnector> {
    config: Arc<AnalysisConfig>,
    connector: C,
    shutdown: Arc<AtomicBool>,
    stats: Arc<PipelineStats>,
    forest: SharedForest,
}

impl<C: StoreConnector> Analyzer<C> {
    pub fn new(config: AnalysisConfig, connector: C) -> Self {
        let forest = KeyspaceForest::shared(config.separators.clone());
        Self {
            config: Arc::new(config),
            connector,
            shutdown: Arc::new(AtomicBool::new(false)),
            stats: Arc::new(PipelineStats::default()),
            forest,
        }
    }

    /// Get shutdown flag for signal handlers
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Counters updated by the stages
    pub fn stats(&self) -> Arc<PipelineStats> {
        Arc::clone(&self.stats)
    }

    /// Forest the aggregation stage will fill; empty until [`start`] runs.
    ///
    /// [`start`]: Analyzer::start
    pub fn forest(&self) -> SharedForest {
        Arc::clone(&self.forest)
    }

    /// Dial every connection, spawn the stages and return immediately.
    ///
    /// Fails only when a connection cannot be established; nothing is
    /// spawned in that case.
    pub async fn start(self) -> StoreResult<(SharedForest, AnalysisHandle)> {
        let started = Instant::now();
        let started_at = Utc::now();
        let config = Arc::clone(&self.config);
        let target = self.connector.target();

        info!(
            target = %target,
            pattern = %config.pattern,
            batch_size = config.batch_size,
            key_limit = config.key_limit,
            sizing = %config.sizing,
            "Starting analysis"
        );

        let scan_conn = self.connector.connect().await?;
        let classify_conn = self.connector.connect().await?;
        let size_conn = self.connector.connect().await?;

        let forest = self.forest;
        let capacity = config.queue_capacity;
        let (keys_tx, keys_rx) = mpsc::channel(capacity);
        let (typed_tx, typed_rx) = mpsc::channel(capacity);
        let (sized_tx, sized_rx) = mpsc::channel(capacity);

        let scan = tokio::spawn(scan_keys(
            scan_conn,
            ScanSettings {
                pattern: config.pattern.clone(),
                batch_size: config.batch_size,
                key_limit: config.key_limit,
            },
            keys_tx,
            Arc::clone(&self.stats),
            Arc::clone(&self.shutdown),
        ));
        let classify = tokio::spawn(classify_keys(
            classify_conn,
            config.types.clone(),
            keys_rx,
            typed_tx,
            Arc::clone(&self.stats),
        ));
        let size = tokio::spawn(size_records(
            size_conn,
            config.sizing,
            config.pause,
            typed_rx,
            sized_tx,
            Arc::clone(&self.stats),
        ));
        let aggregate = tokio::spawn(aggregate_records(
            Arc::clone(&forest),
            sized_rx,
            Arc::clone(&self.stats),
        ));

        let supervisor = tokio::spawn(supervise(
            Stages {
                scan,
                classify,
                size,
                aggregate,
            },
            Arc::clone(&forest),
            Arc::clone(&self.stats),
            target,
            config.sizing,
            started,
            started_at,
        ));

        let handle = AnalysisHandle {
            stats: self.stats,
            started,
            started_at,
            supervisor,
        };
        Ok((forest, handle))
    }

    /// Run the analysis to completion
    pub async fn run(self) -> Result<AnalysisReport> {
        let (forest, handle) = self.start().await?;
        let summary = handle.wait().await?;

        let forest = match Arc::try_unwrap(forest) {
            Ok(lock) => RwLock::into_inner(lock),
            Err(shared) => shared.read().clone(),
        };
        Ok(AnalysisReport { summary, forest })
    }
}

struct Stages {
    scan: JoinHandle<std::result::Result<ScanEnd, PipelineError>>,
    classify: JoinHandle<std::result::Result<(), PipelineError>>,
    size: JoinHandle<std::result::Result<(), PipelineError>>,
    aggregate: JoinHandle<u64>,
}

fn join_failure(stage: &'static str, err: JoinError) -> PipelineError {
    PipelineError::Panicked {
        stage,
        message: err.to_string(),
    }
}

/// First non-secondary error in stage order, else the first error
fn root_cause(errors: Vec<PipelineError>) -> Option<PipelineError> {
    let primary = errors.iter().position(|e| !e.is_secondary());
    let mut errors = errors;
    match primary {
        Some(i) => Some(errors.swap_remove(i)),
        None => errors.into_iter().next(),
    }
}

#[allow(clippy::too_many_arguments)]
async fn supervise(
    stages: Stages,
    forest: SharedForest,
    stats: Arc<PipelineStats>,
    target: String,
    sizing: SizingMode,
    started: Instant,
    started_at: DateTime<Utc>,
) -> std::result::Result<AnalysisSummary, PipelineError> {
    let scan = stages
        .scan
        .await
        .unwrap_or_else(|e| Err(join_failure(STAGE_SCAN, e)));
    let classify = stages
        .classify
        .await
        .unwrap_or_else(|e| Err(join_failure(STAGE_CLASSIFY, e)));
    let size = stages
        .size
        .await
        .unwrap_or_else(|e| Err(join_failure(STAGE_SIZE, e)));
    let aggregate = stages
        .aggregate
        .await
        .map_err(|e| join_failure(STAGE_AGGREGATE, e));

    let mut errors = Vec::new();
    let scan_end = scan.map_err(|e| errors.push(e)).ok();
    classify.map_err(|e| errors.push(e)).ok();
    size.map_err(|e| errors.push(e)).ok();
    let aggregated = aggregate.map_err(|e| errors.push(e)).ok();

    if let Some(err) = root_cause(errors) {
        error!(target = %target, error = %err, "Analysis failed");
        return Err(err);
    }
    let (Some(scan_end), Some(keys_aggregated)) = (scan_end, aggregated) else {
        return Err(PipelineError::Panicked {
            stage: STAGE_AGGREGATE,
            message: "stage result missing".to_string(),
        });
    };

    let total_size = {
        let mut forest = forest.write();
        forest.merge_single_child_nodes();
        forest.total_size()
    };

    let progress = stats.snapshot(started.elapsed());
    let duration = started.elapsed();
    let summary = AnalysisSummary {
        target,
        sizing,
        keys_scanned: progress.keys_scanned,
        keys_skipped: progress.keys_skipped,
        keys_classified: progress.keys_classified,
        keys_dropped: progress.keys_dropped,
        keys_aggregated,
        total_size,
        started_at,
        finished_at: Utc::now(),
        duration_secs: duration.as_secs_f64(),
        completed: scan_end != ScanEnd::Interrupted,
        limit_reached: scan_end == ScanEnd::LimitReached,
    };

    info!(
        target = %summary.target,
        keys = summary.keys_aggregated,
        bytes = summary.total_size,
        duration_secs = duration.as_secs(),
        completed = summary.completed,
        "Analysis completed"
    );
    Ok(summary)
}

/// Poll interval for callers that watch a running analysis
pub const PROGRESS_INTERVAL: Duration = Duration::from_millis(250);

/// Set the shutdown flag
pub fn request_shutdown(flag: &AtomicBool) {
    flag.store(true, Ordering::SeqCst);
}
