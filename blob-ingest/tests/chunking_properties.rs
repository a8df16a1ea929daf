//! Chunk boundaries chosen by the client never change the outcome of an upload.

use std::sync::Arc;

use bytes::Bytes;
use proptest::prelude::*;

use blob_ingest::{
    BlobCtx, BlobIngestionController, BlobStore, ByteStream, IngestConfig, IngestError,
    IngestResult, MemoryBlobStore, MemoryFeatureFlags, QuotaRecord, StoreQuotaOracle,
};

const LIMIT: u64 = 1000;

/// Cut `payload` into pieces whose sizes cycle through `sizes`
fn split(payload: &[u8], sizes: &[usize]) -> Vec<Vec<u8>> {
    if sizes.is_empty() {
        return vec![payload.to_vec()];
    }
    let mut chunks = Vec::new();
    let mut offset = 0;
    while offset < payload.len() {
        let n = sizes[chunks.len() % sizes.len()].min(payload.len() - offset);
        chunks.push(payload[offset..offset + n].to_vec());
        offset += n;
    }
    chunks
}

fn upload(used: u64, payload: Vec<u8>, sizes: Vec<usize>) -> (IngestResult<u64>, MemoryBlobStore) {
    tokio_test::block_on(async move {
        let store = MemoryBlobStore::new();
        if used > 0 {
            store
                .put("ws", "existing", Bytes::from(vec![0u8; used as usize]))
                .await
                .unwrap();
        }
        let config = IngestConfig::default().with_default_per_blob_limit(10_000);
        let oracle = StoreQuotaOracle::from_config(
            Arc::new(store.clone()),
            Arc::new(MemoryFeatureFlags::new()),
            &config,
        );
        oracle.set_quota("ws", QuotaRecord::new(LIMIT));
        let controller = BlobIngestionController::new(Arc::new(store.clone()), Arc::new(oracle), config);

        let chunks: Vec<Result<Bytes, std::io::Error>> = split(&payload, &sizes)
            .into_iter()
            .map(|c| Ok(Bytes::from(c)))
            .collect();
        let body: ByteStream = Box::pin(futures_util::stream::iter(chunks));

        let result = controller
            .ingest(BlobCtx::new("ws".to_string()), "blob", body)
            .await
            .map(|receipt| receipt.size_bytes);
        (result, store)
    })
}

proptest! {
    #[test]
    fn over_quota_fails_for_any_chunking(
        used in 0u64..LIMIT,
        overshoot in 1u64..300,
        sizes in proptest::collection::vec(1usize..128, 0..6),
    ) {
        let payload = vec![1u8; (LIMIT - used + overshoot) as usize];
        let (result, store) = upload(used, payload, sizes);

        let is_quota_exceeded = matches!(result, Err(IngestError::QuotaExceeded { .. }));
        prop_assert!(is_quota_exceeded);
        let stored = tokio_test::block_on(store.get("ws", "blob")).unwrap();
        prop_assert!(stored.is_none());
    }

    #[test]
    fn fitting_upload_succeeds_for_any_chunking(
        used in 0u64..LIMIT,
        fill in 0u64..=100,
        sizes in proptest::collection::vec(1usize..128, 0..6),
    ) {
        let room = LIMIT - used;
        let len = room * fill / 100;
        let payload: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
        let (result, store) = upload(used, payload.clone(), sizes);

        prop_assert_eq!(result.ok(), Some(len));
        let stored = tokio_test::block_on(store.get("ws", "blob")).unwrap();
        prop_assert_eq!(stored, Some(Bytes::from(payload)));
    }
}

#[test]
fn split_covers_the_payload_in_order() {
    let payload: Vec<u8> = (0..10).collect();
    let chunks = split(&payload, &[3, 1]);
    assert_eq!(chunks, vec![vec![0, 1, 2], vec![3], vec![4, 5, 6], vec![7], vec![8, 9]]);
    assert_eq!(split(&payload, &[]), vec![payload.clone()]);
}
