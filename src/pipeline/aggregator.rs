//! Aggregate stage: fold sized records into the forest

use super::stats::PipelineStats;
use crate::tree::SharedForest;
use crate::types::KeyRecord;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Log a line every this many keys
const LOG_EVERY: u64 = 1000;

/// Insert every inbound record, taking the write lock once per batch.
/// Returns the number of keys aggregated.
pub(crate) async fn aggregate_records(
    forest: SharedForest,
    mut rx: mpsc::Receiver<Vec<KeyRecord>>,
    stats: Arc<PipelineStats>,
) -> u64 {
    let mut total = 0u64;

    while let Some(records) = rx.recv().await {
        {
            let mut forest = forest.write();
            for record in &records {
                forest.insert(record);
            }
        }

        let before = total;
        total += records.len() as u64;
        stats.record_aggregated(records.len() as u64);
        debug!(keys = records.len(), "Aggregated batch");

        if total / LOG_EVERY > before / LOG_EVERY {
            info!(keys = total, "Aggregated {} thousand keys", total / LOG_EVERY);
        }
    }

    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{KeyspaceForest, Separators};
    use crate::types::ValueType;

    #[tokio::test]
    async fn test_aggregates_until_closed() {
        let forest = KeyspaceForest::shared(Separators::new(b":"));
        let (tx, rx) = mpsc::channel(4);

        let mut batch = vec![
            KeyRecord::new("foo:bar", ValueType::String),
            KeyRecord::new("foo:qux", ValueType::String),
        ];
        batch[0].size = 1;
        batch[1].size = 3;
        tx.send(batch).await.unwrap();
        tx.send(Vec::new()).await.unwrap();
        drop(tx);

        let total = aggregate_records(forest.clone(), rx, Arc::default()).await;
        assert_eq!(total, 2);
        assert_eq!(forest.read().aggregate_size("foo:", ValueType::String), 4);
    }
}
