//! Scan stage: cursor-based keyspace enumeration

use super::stats::PipelineStats;
use super::STAGE_SCAN;
use crate::error::PipelineError;
use crate::store::StoreConnection;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Scan parameters taken from the run configuration
#[derive(Debug, Clone)]
pub(crate) struct ScanSettings {
    pub pattern: String,
    pub batch_size: usize,
    pub key_limit: u64,
}

/// How the scan ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ScanEnd {
    /// Cursor wrapped to 0
    Exhausted,
    /// Key cap reached at a batch boundary
    LimitReached,
    /// Shutdown flag observed
    Interrupted,
}

/// Issue `SCAN` until the cursor wraps or the cap is reached, emitting one
/// batch per reply. The cap is checked only between batches, so the last
/// batch may overshoot it.
pub(crate) async fn scan_keys<C: StoreConnection>(
    mut conn: C,
    settings: ScanSettings,
    tx: mpsc::Sender<Vec<String>>,
    stats: Arc<PipelineStats>,
    shutdown: Arc<AtomicBool>,
) -> Result<ScanEnd, PipelineError> {
    let mut cursor = 0u64;
    let mut emitted = 0u64;

    let end = loop {
        if shutdown.load(Ordering::Relaxed) {
            break ScanEnd::Interrupted;
        }

        let page = conn
            .scan(cursor, &settings.pattern, settings.batch_size)
            .await
            .map_err(|source| PipelineError::StageFailed {
                stage: STAGE_SCAN,
                source,
            })?;

        let raw = page.keys.len();
        let keys: Vec<String> = page
            .keys
            .into_iter()
            .filter_map(|bytes| match String::from_utf8(bytes) {
                Ok(key) => Some(key),
                Err(e) => {
                    warn!(key = %String::from_utf8_lossy(e.as_bytes()), "Skipping non UTF-8 key");
                    None
                }
            })
            .collect();

        let count = keys.len() as u64;
        emitted += count;
        stats.record_scan(count, (raw - keys.len()) as u64);
        debug!(cursor = page.cursor, keys = count, total = emitted, "Scanned batch");

        tx.send(keys)
            .await
            .map_err(|_| PipelineError::ChannelClosed { stage: STAGE_SCAN })?;

        cursor = page.cursor;
        if cursor == 0 {
            break ScanEnd::Exhausted;
        }
        if emitted >= settings.key_limit {
            break ScanEnd::LimitReached;
        }
    };

    info!(keys = emitted, end = ?end, "Scan finished");
    Ok(end)
}
