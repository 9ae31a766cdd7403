//! Per-target analysis sessions
//!
//! A [`SessionManager`] owns at most one session per target. Starting an
//! analysis registers the session under a fresh generation number and spawns
//! a watcher task that waits on the [`AnalysisHandle`] and records the
//! outcome exactly once, under the registry lock, and only if the session
//! still carries the same generation. Removing or restarting a session
//! therefore makes a stale watcher a no-op.
//!
//! [`AnalysisHandle`]: crate::pipeline::AnalysisHandle

use crate::config::AnalysisConfig;
use crate::error::{PipelineError, SessionError, SessionResult, StoreResult};
use crate::pipeline::{request_shutdown, AnalysisProgress, AnalysisSummary, Analyzer, PipelineStats};
use crate::store::{KeyInspection, StoreConnection, StoreConnector};
use crate::tree::{top_children, ChildSummary, SharedForest, SortBy};
use crate::types::ValueType;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Builds a connector for a validated configuration
pub type ConnectorFactory<C> = dyn Fn(&AnalysisConfig) -> StoreResult<C> + Send + Sync;

/// Lifecycle of one session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Running,
    Finished,
    Failed,
}

/// Externally visible state of one session
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub target: String,
    pub state: SessionState,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub finished: bool,
    pub error: Option<String>,
    pub progress: AnalysisProgress,
    pub summary: Option<AnalysisSummary>,
}

struct Session<C> {
    generation: u64,
    state: SessionState,
    started: Instant,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
    error: Option<String>,
    summary: Option<AnalysisSummary>,
    stats: Arc<PipelineStats>,
    final_progress: Option<AnalysisProgress>,
    shutdown: Arc<AtomicBool>,
    forest: Option<SharedForest>,
    connector: Option<C>,
}

impl<C> Session<C> {
    fn status(&self, target: &str) -> SessionStatus {
        SessionStatus {
            target: target.to_string(),
            state: self.state,
            started_at: self.started_at,
            finished_at: self.finished_at,
            finished: self.state == SessionState::Finished,
            error: self.error.clone(),
            progress: self
                .final_progress
                .clone()
                .unwrap_or_else(|| self.stats.snapshot(self.started.elapsed())),
            summary: self.summary.clone(),
        }
    }

    fn fail(&mut self, reason: String) {
        self.state = SessionState::Failed;
        self.finished_at = Some(Utc::now());
        self.error = Some(reason);
        self.final_progress = Some(self.stats.snapshot(self.started.elapsed()));
        self.forest = None;
    }
}

/// Registry of analysis sessions keyed by target
pub struct SessionManager<C: StoreConnector> {
    sessions: Mutex<HashMap<String, Session<C>>>,
    generation: AtomicU64,
    factory: Box<ConnectorFactory<C>>,
}

impl<C: StoreConnector> SessionManager<C> {
    pub fn new<F>(factory: F) -> Arc<Self>
    where
        F: Fn(&AnalysisConfig) -> StoreResult<C> + Send + Sync + 'static,
    {
        Arc::new(Self {
            sessions: Mutex::new(HashMap::new()),
            generation: AtomicU64::new(0),
            factory: Box::new(factory),
        })
    }

    /// Start an analysis for the config's target.
    ///
    /// Fails with `AlreadyRunning` while a previous analysis for the target
    /// is in flight, and with `Store` when the connections cannot be dialled;
    /// the session is recorded as failed in that case.
    pub async fn start(self: &Arc<Self>, config: AnalysisConfig) -> SessionResult<SessionStatus> {
        let target = config.target.to_string();
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;

        let connector = (self.factory)(&config).map_err(|e| SessionError::Store {
            target: target.clone(),
            reason: e.to_string(),
        })?;
        let analyzer = Analyzer::new(config, connector.clone());

        {
            let mut sessions = self.sessions.lock();
            if let Some(existing) = sessions.get(&target) {
                if existing.state == SessionState::Running {
                    return Err(SessionError::AlreadyRunning(target));
                }
            }
            sessions.insert(
                target.clone(),
                Session {
                    generation,
                    state: SessionState::Running,
                    started: Instant::now(),
                    started_at: Utc::now(),
                    finished_at: None,
                    error: None,
                    summary: None,
                    stats: analyzer.stats(),
                    final_progress: None,
                    shutdown: analyzer.shutdown_flag(),
                    forest: Some(analyzer.forest()),
                    connector: Some(connector),
                },
            );
        }

        let (_, handle) = match analyzer.start().await {
            Ok(started) => started,
            Err(e) => {
                warn!(target = %target, error = %e, "Failed to start analysis");
                self.with_generation(&target, generation, |s| s.fail(e.to_string()));
                return Err(SessionError::Store {
                    target,
                    reason: e.to_string(),
                });
            }
        };

        info!(target = %target, generation, "Analysis session started");

        let manager = Arc::clone(self);
        let watched = target.clone();
        tokio::spawn(async move {
            let outcome = handle.wait().await;
            manager.finish(&watched, generation, outcome);
        });

        self.status(&target)
    }

    fn with_generation(&self, target: &str, generation: u64, f: impl FnOnce(&mut Session<C>)) {
        let mut sessions = self.sessions.lock();
        if let Some(session) = sessions.get_mut(target) {
            if session.generation == generation {
                f(session);
            }
        }
    }

    fn finish(&self, target: &str, generation: u64, outcome: Result<AnalysisSummary, PipelineError>) {
        self.with_generation(target, generation, |session| match outcome {
            Ok(summary) => {
                session.state = SessionState::Finished;
                session.finished_at = Some(summary.finished_at);
                session.final_progress = Some(session.stats.snapshot(session.started.elapsed()));
                session.summary = Some(summary);
                info!(target = %target, generation, "Analysis session finished");
            }
            Err(e) => {
                warn!(target = %target, generation, error = %e, "Analysis session failed");
                session.fail(e.to_string());
            }
        });
    }

    /// Status of every session, ordered by target
    pub fn list(&self) -> Vec<SessionStatus> {
        let sessions = self.sessions.lock();
        let mut list: Vec<SessionStatus> = sessions
            .iter()
            .map(|(target, session)| session.status(target))
            .collect();
        list.sort_by(|a, b| a.target.cmp(&b.target));
        list
    }

    pub fn status(&self, target: &str) -> SessionResult<SessionStatus> {
        self.sessions
            .lock()
            .get(target)
            .map(|s| s.status(target))
            .ok_or_else(|| SessionError::UnknownTarget(target.to_string()))
    }

    /// Forget a session, stopping its scan if it is still running
    pub fn remove(&self, target: &str) -> SessionResult<()> {
        let session = self
            .sessions
            .lock()
            .remove(target)
            .ok_or_else(|| SessionError::UnknownTarget(target.to_string()))?;
        if session.state == SessionState::Running {
            request_shutdown(&session.shutdown);
        }
        info!(target = %target, "Analysis session removed");
        Ok(())
    }

    /// Forest of a session. Running sessions expose their partial,
    /// uncompressed aggregates, which are empty while connections are still
    /// being dialled.
    fn forest(&self, target: &str) -> SessionResult<SharedForest> {
        let sessions = self.sessions.lock();
        let session = sessions
            .get(target)
            .ok_or_else(|| SessionError::UnknownTarget(target.to_string()))?;
        if let Some(error) = &session.error {
            return Err(SessionError::AnalysisFailed {
                target: target.to_string(),
                reason: error.clone(),
            });
        }
        session
            .forest
            .clone()
            .ok_or_else(|| SessionError::AnalysisFailed {
                target: target.to_string(),
                reason: "analysis results were discarded".to_string(),
            })
    }

    /// Value types that hold at least one key
    pub fn types(&self, target: &str) -> SessionResult<Vec<ValueType>> {
        Ok(self.forest(target)?.read().types_present())
    }

    pub fn aggregate_size(&self, target: &str, value_type: &str, prefix: &str) -> SessionResult<i64> {
        let value_type = parse_value_type(value_type)?;
        Ok(self.forest(target)?.read().aggregate_size(prefix, value_type))
    }

    /// The `limit` largest children of `prefix`, ranked by `sort`. An
    /// unresolved prefix yields no children.
    pub fn expand(
        &self,
        target: &str,
        value_type: &str,
        prefix: &str,
        limit: usize,
        sort: SortBy,
    ) -> SessionResult<Vec<ChildSummary>> {
        let value_type = parse_value_type(value_type)?;
        let forest = self.forest(target)?;
        let children = forest.read().children(prefix, value_type);
        Ok(children
            .map(|c| top_children(c.into_values(), limit, sort))
            .unwrap_or_default())
    }

    /// Type, TTL and value preview of one key, read live from the store
    pub async fn inspect(&self, target: &str, key: &str, limit: usize) -> SessionResult<KeyInspection> {
        let connector = {
            let sessions = self.sessions.lock();
            sessions
                .get(target)
                .and_then(|s| s.connector.clone())
                .ok_or_else(|| SessionError::UnknownTarget(target.to_string()))?
        };

        let store_error = |e: crate::error::StoreError| SessionError::Store {
            target: target.to_string(),
            reason: e.to_string(),
        };
        let mut conn = connector.connect().await.map_err(store_error)?;
        conn.inspect(key, limit).await.map_err(store_error)
    }
}

fn parse_value_type(name: &str) -> SessionResult<ValueType> {
    ValueType::from_str(name).map_err(|_| SessionError::UnknownValueType(name.to_string()))
}
