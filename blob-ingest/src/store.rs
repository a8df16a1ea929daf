use async_trait::async_trait;
use bytes::Bytes;

use crate::{BlobEntry, StoreResult};

/// Durable blob storage, keyed by `(tenant_id, name)`.
///
/// Every method fails with [`crate::StoreError::Unavailable`] on transport
/// errors. Retrying is the store client's business, never the caller's.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store a fully assembled blob. Overwrites an existing blob of the same name.
    async fn put(&self, tenant_id: &str, name: &str, content: Bytes) -> StoreResult<()>;

    /// Fetch a blob's content
    async fn get(&self, tenant_id: &str, name: &str) -> StoreResult<Option<Bytes>>;

    /// Delete a blob. Deleting a missing blob succeeds.
    async fn delete(&self, tenant_id: &str, name: &str) -> StoreResult<()>;

    /// All blobs of a tenant, in no particular order
    async fn list(&self, tenant_id: &str) -> StoreResult<Vec<BlobEntry>>;

    /// Sum of the sizes of all blobs of a tenant
    async fn total_size(&self, tenant_id: &str) -> StoreResult<u64>;
}
