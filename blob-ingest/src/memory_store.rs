use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;

use crate::{BlobEntry, BlobStore, StoreError, StoreResult};

// tenant_id -> name -> content
type TenantBlobs = HashMap<String, HashMap<String, Bytes>>;

/// In-memory store for testing and development
#[derive(Clone)]
pub struct MemoryBlobStore {
    blobs: Arc<RwLock<TenantBlobs>>,
    available: Arc<AtomicBool>,
    puts_failing: Arc<AtomicBool>,
    puts: Arc<AtomicUsize>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self {
            blobs: Arc::new(RwLock::new(HashMap::new())),
            available: Arc::new(AtomicBool::new(true)),
            puts_failing: Arc::new(AtomicBool::new(false)),
            puts: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Simulate an outage: while unavailable every call fails
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Make only `put` fail; reads and deletes keep working
    pub fn set_put_failing(&self, failing: bool) {
        self.puts_failing.store(failing, Ordering::SeqCst);
    }

    /// Number of successful puts since creation
    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    fn ensure_available(&self) -> StoreResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::unavailable("memory store is offline"))
        }
    }
}

impl Default for MemoryBlobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, tenant_id: &str, name: &str, content: Bytes) -> StoreResult<()> {
        self.ensure_available()?;
        if self.puts_failing.load(Ordering::SeqCst) {
            return Err(StoreError::unavailable("memory store rejects writes"));
        }
        self.blobs
            .write()
            .entry(tenant_id.to_string())
            .or_default()
            .insert(name.to_string(), content);
        self.puts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn get(&self, tenant_id: &str, name: &str) -> StoreResult<Option<Bytes>> {
        self.ensure_available()?;
        Ok(self
            .blobs
            .read()
            .get(tenant_id)
            .and_then(|blobs| blobs.get(name))
            .cloned())
    }

    async fn delete(&self, tenant_id: &str, name: &str) -> StoreResult<()> {
        self.ensure_available()?;
        let mut blobs = self.blobs.write();
        if let Some(tenant) = blobs.get_mut(tenant_id) {
            tenant.remove(name);
            if tenant.is_empty() {
                blobs.remove(tenant_id);
            }
        }
        Ok(())
    }

    async fn list(&self, tenant_id: &str) -> StoreResult<Vec<BlobEntry>> {
        self.ensure_available()?;
        Ok(self
            .blobs
            .read()
            .get(tenant_id)
            .map(|blobs| {
                blobs
                    .iter()
                    .map(|(name, content)| BlobEntry::new(name.clone(), content.len() as u64))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn total_size(&self, tenant_id: &str) -> StoreResult<u64> {
        self.ensure_available()?;
        Ok(self
            .blobs
            .read()
            .get(tenant_id)
            .map(|blobs| blobs.values().map(|content| content.len() as u64).sum())
            .unwrap_or(0))
    }
}
