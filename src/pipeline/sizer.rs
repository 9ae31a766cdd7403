//! Size stage: exact or sampled footprint per key, then a fixed pause

use super::stats::PipelineStats;
use super::STAGE_SIZE;
use crate::error::{PipelineError, StoreError};
use crate::sizing::{self, SAMPLE_SIZE};
use crate::store::StoreConnection;
use crate::types::{KeyRecord, SizingMode};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Fill in `size` for every record of a batch
async fn size_batch<C: StoreConnection>(
    conn: &mut C,
    mode: SizingMode,
    records: &mut [KeyRecord],
) -> Result<(), StoreError> {
    if records.is_empty() {
        return Ok(());
    }

    match mode {
        SizingMode::Exact => {
            let keys: Vec<String> = records.iter().map(|r| r.key.clone()).collect();
            let usage = conn.memory_usage(&keys).await?;
            if usage.len() != records.len() {
                return Err(StoreError::unexpected(
                    "MEMORY USAGE",
                    format!("{} replies for {} keys", usage.len(), records.len()),
                ));
            }
            for (record, bytes) in records.iter_mut().zip(usage) {
                record.size = bytes.unwrap_or(0);
            }
        }
        SizingMode::Sampled => {
            let samples = conn.sample(records, SAMPLE_SIZE).await?;
            if samples.len() != records.len() {
                return Err(StoreError::unexpected(
                    "sample",
                    format!("{} replies for {} keys", samples.len(), records.len()),
                ));
            }
            for (record, sample) in records.iter_mut().zip(&samples) {
                record.size = sizing::estimate(&record.key, record.value_type, sample);
            }
        }
    }
    Ok(())
}

/// Size every inbound batch, forward it, then sleep `pause`
pub(crate) async fn size_records<C: StoreConnection>(
    mut conn: C,
    mode: SizingMode,
    pause: Duration,
    mut rx: mpsc::Receiver<Vec<KeyRecord>>,
    tx: mpsc::Sender<Vec<KeyRecord>>,
    stats: Arc<PipelineStats>,
) -> Result<(), PipelineError> {
    let mut total = 0u64;

    while let Some(mut records) = rx.recv().await {
        size_batch(&mut conn, mode, &mut records)
            .await
            .map_err(|source| PipelineError::StageFailed {
                stage: STAGE_SIZE,
                source,
            })?;

        let keys = records.len() as u64;
        let bytes: i64 = records.iter().map(|r| r.size).sum();
        total += keys;
        stats.record_sized(keys, bytes);
        debug!(keys, bytes, "Sized batch");

        tx.send(records)
            .await
            .map_err(|_| PipelineError::ChannelClosed { stage: STAGE_SIZE })?;

        if !pause.is_zero() {
            tokio::time::sleep(pause).await;
        }
    }

    info!(keys = total, mode = %mode, "Sizing finished");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, StoreConnector, StoredValue};
    use crate::types::ValueType;

    #[tokio::test]
    async fn test_exact_sizes_and_vanished_key() {
        let store = MemoryStore::new("mem");
        store.insert("a", StoredValue::string("x"));
        store.set_memory_usage("a", 72);
        let mut conn = store.connect().await.unwrap();

        let mut records = vec![
            KeyRecord::new("a", ValueType::String),
            KeyRecord::new("gone", ValueType::String),
        ];
        size_batch(&mut conn, SizingMode::Exact, &mut records)
            .await
            .unwrap();
        assert_eq!(records[0].size, 72);
        assert_eq!(records[1].size, 0);
    }

    #[tokio::test]
    async fn test_sampled_sizes() {
        let store = MemoryStore::new("mem");
        let members: Vec<String> = (0..100).map(|i| format!("{i:04}")).collect();
        store.insert("k", StoredValue::list(&members));
        store.insert("s", StoredValue::string("0123456789"));
        let mut conn = store.connect().await.unwrap();

        let mut records = vec![
            KeyRecord::new("k", ValueType::List),
            KeyRecord::new("s", ValueType::String),
        ];
        size_batch(&mut conn, SizingMode::Sampled, &mut records)
            .await
            .unwrap();
        assert_eq!(records[0].size, 657);
        assert_eq!(records[1].size, 56 + 1 + 8 + 10 + 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_after_each_batch() {
        let store = MemoryStore::new("mem");
        store.insert("a", StoredValue::string("x"));
        let conn = store.connect().await.unwrap();

        let (in_tx, in_rx) = mpsc::channel(4);
        let (out_tx, mut out_rx) = mpsc::channel(4);
        in_tx.send(vec![KeyRecord::new("a", ValueType::String)]).await.unwrap();
        in_tx.send(vec![KeyRecord::new("a", ValueType::String)]).await.unwrap();
        drop(in_tx);

        let start = tokio::time::Instant::now();
        size_records(
            conn,
            SizingMode::Exact,
            Duration::from_millis(500),
            in_rx,
            out_tx,
            Arc::default(),
        )
        .await
        .unwrap();

        assert!(start.elapsed() >= Duration::from_millis(1000));
        assert_eq!(out_rx.recv().await.unwrap()[0].size, 58);
    }
}
