//! Tenant storage quotas.
//!
//! A [`QuotaOracle`] answers how much a tenant stores and what it may store.
//! Ingestion reads it exactly once per upload, through
//! [`QuotaOracle::snapshot`], and evaluates every chunk against that frozen
//! [`QuotaSnapshot`].

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::{BlobStore, IngestConfig, IngestError, IngestResult};

/// Point-in-time view of a tenant's usage and limits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaSnapshot {
    quota_limit_bytes: Option<u64>,
    used_bytes: u64,
    per_blob_limit_bytes: u64,
    unlimited: bool,
}

impl QuotaSnapshot {
    /// `quota_limit_bytes = None` means the tenant has no quota record.
    pub fn new(
        quota_limit_bytes: Option<u64>,
        used_bytes: u64,
        per_blob_limit_bytes: u64,
    ) -> IngestResult<Self> {
        if per_blob_limit_bytes == 0 {
            return Err(IngestError::invalid("per-blob limit must be > 0"));
        }
        Ok(Self {
            quota_limit_bytes,
            used_bytes,
            per_blob_limit_bytes,
            unlimited: false,
        })
    }

    /// Waive the aggregate cap. The per-blob cap still applies.
    pub fn with_unlimited(mut self, unlimited: bool) -> Self {
        self.unlimited = unlimited;
        self
    }

    pub fn quota_limit_bytes(&self) -> Option<u64> {
        self.quota_limit_bytes
    }

    pub fn used_bytes(&self) -> u64 {
        self.used_bytes
    }

    pub fn per_blob_limit_bytes(&self) -> u64 {
        self.per_blob_limit_bytes
    }

    pub fn unlimited(&self) -> bool {
        self.unlimited
    }

    /// Bytes a single upload may still add, or `None` when no cap can be computed
    pub fn remaining_bytes(&self) -> Option<u64> {
        let workspace = if self.unlimited {
            u64::MAX
        } else {
            self.quota_limit_bytes?.saturating_sub(self.used_bytes)
        };
        Some(workspace.min(self.per_blob_limit_bytes))
    }
}

/// A tenant's configured storage quota
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaRecord {
    pub storage_limit_bytes: u64,
    /// Overrides the oracle's default per-blob limit
    pub per_blob_limit_bytes: Option<u64>,
}

impl QuotaRecord {
    pub fn new(storage_limit_bytes: u64) -> Self {
        Self {
            storage_limit_bytes,
            per_blob_limit_bytes: None,
        }
    }

    pub fn with_per_blob_limit(mut self, bytes: u64) -> Self {
        self.per_blob_limit_bytes = Some(bytes);
        self
    }
}

/// Source of tenant usage and limits
#[async_trait]
pub trait QuotaOracle: Send + Sync {
    /// The tenant's quota record, `None` if it has none
    async fn quota_record(&self, tenant_id: &str) -> IngestResult<Option<QuotaRecord>>;

    /// Bytes currently stored by the tenant
    async fn used_bytes(&self, tenant_id: &str) -> IngestResult<u64>;

    /// Largest single blob the tenant may store
    async fn per_blob_limit(&self, tenant_id: &str) -> IngestResult<u64>;

    /// Whether the tenant's aggregate cap is waived
    async fn has_unlimited_feature(&self, tenant_id: &str) -> IngestResult<bool>;

    /// Everything above, frozen into one value
    async fn snapshot(&self, tenant_id: &str) -> IngestResult<QuotaSnapshot> {
        let record = self.quota_record(tenant_id).await?;
        let used_bytes = self.used_bytes(tenant_id).await?;
        let per_blob_limit = self.per_blob_limit(tenant_id).await?;
        let unlimited = self.has_unlimited_feature(tenant_id).await?;

        Ok(QuotaSnapshot::new(
            record.map(|r| r.storage_limit_bytes),
            used_bytes,
            per_blob_limit,
        )?
        .with_unlimited(unlimited))
    }
}

/// Feature flag collaborator
#[async_trait]
pub trait FeatureFlags: Send + Sync {
    async fn has_unlimited_feature(&self, tenant_id: &str) -> IngestResult<bool>;
}

/// Feature flags held in memory
#[derive(Debug, Default)]
pub struct MemoryFeatureFlags {
    unlimited: RwLock<HashSet<String>>,
}

impl MemoryFeatureFlags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enable_unlimited<S: Into<String>>(&self, tenant_id: S) {
        self.unlimited.write().insert(tenant_id.into());
    }

    pub fn disable_unlimited(&self, tenant_id: &str) {
        self.unlimited.write().remove(tenant_id);
    }
}

#[async_trait]
impl FeatureFlags for MemoryFeatureFlags {
    async fn has_unlimited_feature(&self, tenant_id: &str) -> IngestResult<bool> {
        Ok(self.unlimited.read().contains(tenant_id))
    }
}

/// Quota oracle that measures usage in the durable store itself.
///
/// Quota records live in memory; usage is `BlobStore::total_size`.
pub struct StoreQuotaOracle {
    store: Arc<dyn BlobStore>,
    features: Arc<dyn FeatureFlags>,
    records: RwLock<HashMap<String, QuotaRecord>>,
    default_per_blob_limit_bytes: u64,
}

impl StoreQuotaOracle {
    pub fn new(
        store: Arc<dyn BlobStore>,
        features: Arc<dyn FeatureFlags>,
        default_per_blob_limit_bytes: u64,
    ) -> Self {
        Self {
            store,
            features,
            records: RwLock::new(HashMap::new()),
            default_per_blob_limit_bytes,
        }
    }

    /// Oracle whose default per-blob cap is `config.default_per_blob_limit_bytes`
    pub fn from_config(
        store: Arc<dyn BlobStore>,
        features: Arc<dyn FeatureFlags>,
        config: &IngestConfig,
    ) -> Self {
        Self::new(store, features, config.default_per_blob_limit_bytes)
    }

    pub fn set_quota<S: Into<String>>(&self, tenant_id: S, record: QuotaRecord) {
        self.records.write().insert(tenant_id.into(), record);
    }

    pub fn remove_quota(&self, tenant_id: &str) -> Option<QuotaRecord> {
        self.records.write().remove(tenant_id)
    }
}

#[async_trait]
impl QuotaOracle for StoreQuotaOracle {
    async fn quota_record(&self, tenant_id: &str) -> IngestResult<Option<QuotaRecord>> {
        Ok(self.records.read().get(tenant_id).copied())
    }

    async fn used_bytes(&self, tenant_id: &str) -> IngestResult<u64> {
        Ok(self.store.total_size(tenant_id).await?)
    }

    async fn per_blob_limit(&self, tenant_id: &str) -> IngestResult<u64> {
        Ok(self
            .records
            .read()
            .get(tenant_id)
            .and_then(|r| r.per_blob_limit_bytes)
            .unwrap_or(self.default_per_blob_limit_bytes))
    }

    async fn has_unlimited_feature(&self, tenant_id: &str) -> IngestResult<bool> {
        self.features.has_unlimited_feature(tenant_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryBlobStore;
    use bytes::Bytes;

    fn oracle(store: &MemoryBlobStore, flags: Arc<MemoryFeatureFlags>) -> StoreQuotaOracle {
        StoreQuotaOracle::from_config(
            Arc::new(store.clone()),
            flags,
            &IngestConfig::default().with_default_per_blob_limit(4096),
        )
    }

    #[test]
    fn zero_per_blob_limit_is_rejected() {
        assert!(QuotaSnapshot::new(Some(10), 0, 0).is_err());
    }

    #[test]
    fn remaining_bytes_takes_the_tighter_cap() {
        let snapshot = QuotaSnapshot::new(Some(1000), 900, 2000).unwrap();
        assert_eq!(snapshot.remaining_bytes(), Some(100));

        let snapshot = snapshot.with_unlimited(true);
        assert_eq!(snapshot.remaining_bytes(), Some(2000));

        let missing = QuotaSnapshot::new(None, 0, 2000).unwrap();
        assert_eq!(missing.remaining_bytes(), None);
    }

    #[tokio::test]
    async fn snapshot_reads_usage_from_the_store() {
        let store = MemoryBlobStore::new();
        store.put("ws", "a", Bytes::from(vec![0u8; 900])).await.unwrap();
        let flags = Arc::new(MemoryFeatureFlags::new());
        let oracle = oracle(&store, flags.clone());
        oracle.set_quota("ws", QuotaRecord::new(1000).with_per_blob_limit(2000));

        let snapshot = oracle.snapshot("ws").await.unwrap();
        assert_eq!(snapshot.quota_limit_bytes(), Some(1000));
        assert_eq!(snapshot.used_bytes(), 900);
        assert_eq!(snapshot.per_blob_limit_bytes(), 2000);
        assert!(!snapshot.unlimited());

        flags.enable_unlimited("ws");
        assert!(oracle.snapshot("ws").await.unwrap().unlimited());
    }

    #[tokio::test]
    async fn missing_record_yields_absent_limit_and_default_per_blob() {
        let store = MemoryBlobStore::new();
        let oracle = oracle(&store, Arc::new(MemoryFeatureFlags::new()));

        let snapshot = oracle.snapshot("nobody").await.unwrap();
        assert_eq!(snapshot.quota_limit_bytes(), None);
        assert_eq!(snapshot.per_blob_limit_bytes(), 4096);
    }

    #[tokio::test]
    async fn configured_default_per_blob_limit_applies() {
        let store = MemoryBlobStore::new();
        let config = IngestConfig::from_vars("BLOBS", [("BLOBS__DEFAULT_PER_BLOB_LIMIT_BYTES", "10")]).unwrap();
        let oracle = StoreQuotaOracle::from_config(
            Arc::new(store.clone()),
            Arc::new(MemoryFeatureFlags::new()),
            &config,
        );
        oracle.set_quota("ws", QuotaRecord::new(1000));
        oracle.set_quota("ws-big", QuotaRecord::new(1000).with_per_blob_limit(500));

        assert_eq!(oracle.snapshot("ws").await.unwrap().per_blob_limit_bytes(), 10);
        assert_eq!(oracle.snapshot("ws-big").await.unwrap().per_blob_limit_bytes(), 500);
    }
}
