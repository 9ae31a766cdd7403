//! Live counters shared by the pipeline stages

use serde::Serialize;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Duration;

/// Statistics collected during an analysis
#[derive(Debug, Default)]
pub struct PipelineStats {
    pub batches_scanned: AtomicU64,
    pub keys_scanned: AtomicU64,
    pub keys_skipped: AtomicU64,
    pub keys_classified: AtomicU64,
    pub keys_dropped: AtomicU64,
    pub keys_sized: AtomicU64,
    pub keys_aggregated: AtomicU64,
    pub bytes_estimated: AtomicI64,
}

impl PipelineStats {
    pub fn record_scan(&self, keys: u64, skipped: u64) {
        self.batches_scanned.fetch_add(1, Ordering::Relaxed);
        self.keys_scanned.fetch_add(keys, Ordering::Relaxed);
        if skipped > 0 {
            self.keys_skipped.fetch_add(skipped, Ordering::Relaxed);
        }
    }

    pub fn record_classified(&self, kept: u64, dropped: u64) {
        self.keys_classified.fetch_add(kept, Ordering::Relaxed);
        self.keys_dropped.fetch_add(dropped, Ordering::Relaxed);
    }

    pub fn record_sized(&self, keys: u64, bytes: i64) {
        self.keys_sized.fetch_add(keys, Ordering::Relaxed);
        self.bytes_estimated.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_aggregated(&self, keys: u64) {
        self.keys_aggregated.fetch_add(keys, Ordering::Relaxed);
    }

    /// Consistent-enough copy of the counters for display
    pub fn snapshot(&self, elapsed: Duration) -> AnalysisProgress {
        AnalysisProgress {
            batches_scanned: self.batches_scanned.load(Ordering::Relaxed),
            keys_scanned: self.keys_scanned.load(Ordering::Relaxed),
            keys_skipped: self.keys_skipped.load(Ordering::Relaxed),
            keys_classified: self.keys_classified.load(Ordering::Relaxed),
            keys_dropped: self.keys_dropped.load(Ordering::Relaxed),
            keys_sized: self.keys_sized.load(Ordering::Relaxed),
            keys_aggregated: self.keys_aggregated.load(Ordering::Relaxed),
            bytes_estimated: self.bytes_estimated.load(Ordering::Relaxed),
            elapsed_secs: elapsed.as_secs_f64(),
        }
    }
}

/// Point-in-time view of [`PipelineStats`]
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AnalysisProgress {
    pub batches_scanned: u64,
    pub keys_scanned: u64,
    /// Keys skipped because their names are not UTF-8
    pub keys_skipped: u64,
    pub keys_classified: u64,
    /// Keys whose type was unclassified or filtered out
    pub keys_dropped: u64,
    pub keys_sized: u64,
    pub keys_aggregated: u64,
    pub bytes_estimated: i64,
    pub elapsed_secs: f64,
}

impl AnalysisProgress {
    /// Keys aggregated per second
    pub fn keys_per_second(&self) -> f64 {
        if self.elapsed_secs > 0.0 {
            self.keys_aggregated as f64 / self.elapsed_secs
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot() {
        let stats = PipelineStats::default();
        stats.record_scan(10, 1);
        stats.record_classified(7, 3);
        stats.record_sized(7, 700);
        stats.record_aggregated(7);

        let snap = stats.snapshot(Duration::from_secs(2));
        assert_eq!(snap.batches_scanned, 1);
        assert_eq!(snap.keys_skipped, 1);
        assert_eq!(snap.keys_dropped, 3);
        assert_eq!(snap.bytes_estimated, 700);
        assert_eq!(snap.keys_per_second(), 3.5);
    }
}
