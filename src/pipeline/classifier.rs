//! Classify stage: pipelined `TYPE` per key

use super::stats::PipelineStats;
use super::STAGE_CLASSIFY;
use crate::error::{PipelineError, StoreError};
use crate::store::StoreConnection;
use crate::types::{KeyRecord, TypeFilter};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Type every inbound batch and forward the keys the filter admits. One
/// outbound batch per inbound batch, possibly empty.
pub(crate) async fn classify_keys<C: StoreConnection>(
    mut conn: C,
    filter: TypeFilter,
    mut rx: mpsc::Receiver<Vec<String>>,
    tx: mpsc::Sender<Vec<KeyRecord>>,
    stats: Arc<PipelineStats>,
) -> Result<(), PipelineError> {
    let failed = |source| PipelineError::StageFailed {
        stage: STAGE_CLASSIFY,
        source,
    };
    let mut total = 0u64;

    while let Some(keys) = rx.recv().await {
        let types = if keys.is_empty() {
            Vec::new()
        } else {
            conn.key_types(&keys).await.map_err(failed)?
        };
        if types.len() != keys.len() {
            return Err(failed(StoreError::unexpected(
                "TYPE",
                format!("{} replies for {} keys", types.len(), keys.len()),
            )));
        }

        let inbound = keys.len() as u64;
        let records: Vec<KeyRecord> = keys
            .into_iter()
            .zip(types)
            .filter_map(|(key, reply)| filter.admit(&reply).map(|t| KeyRecord::new(key, t)))
            .collect();

        let kept = records.len() as u64;
        total += kept;
        stats.record_classified(kept, inbound - kept);
        debug!(keys = inbound, kept, "Classified batch");

        tx.send(records)
            .await
            .map_err(|_| PipelineError::ChannelClosed {
                stage: STAGE_CLASSIFY,
            })?;
    }

    info!(keys = total, "Classification finished");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, StoreConnector, StoredValue};
    use crate::types::ValueType;

    #[tokio::test]
    async fn test_filter_and_unclassified() {
        let store = MemoryStore::new("mem");
        store.insert("s", StoredValue::string("x"));
        store.insert("h", StoredValue::hash([("f", "v")]));
        store.insert("st", StoredValue::Other("stream".into()));
        let conn = store.connect().await.unwrap();

        let (in_tx, in_rx) = mpsc::channel(4);
        let (out_tx, mut out_rx) = mpsc::channel(4);
        let stats = Arc::new(PipelineStats::default());

        in_tx
            .send(vec!["s".into(), "h".into(), "st".into(), "gone".into()])
            .await
            .unwrap();
        in_tx.send(Vec::new()).await.unwrap();
        drop(in_tx);

        let filter = TypeFilter::only([ValueType::Hash]);
        classify_keys(conn, filter, in_rx, out_tx, stats.clone())
            .await
            .unwrap();

        let first = out_rx.recv().await.unwrap();
        assert_eq!(first, vec![KeyRecord::new("h", ValueType::Hash)]);
        assert!(out_rx.recv().await.unwrap().is_empty());
        assert!(out_rx.recv().await.is_none());
        assert_eq!(store.call_count("TYPE"), 1);
    }

    #[tokio::test]
    async fn test_closed_downstream() {
        let store = MemoryStore::new("mem");
        store.insert("s", StoredValue::string("x"));
        let conn = store.connect().await.unwrap();

        let (in_tx, in_rx) = mpsc::channel(4);
        let (out_tx, out_rx) = mpsc::channel(4);
        drop(out_rx);
        in_tx.send(vec!["s".to_string()]).await.unwrap();
        drop(in_tx);

        let err = classify_keys(conn, TypeFilter::all(), in_rx, out_tx, Arc::default())
            .await
            .unwrap_err();
        assert!(err.is_secondary());
    }
}
