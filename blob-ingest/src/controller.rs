use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use chrono::Utc;
use futures_util::StreamExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info, instrument, warn};

use crate::cache::ArgValues;
use crate::{
    AllowAll, Authorizer, BlobCtx, BlobEntry, BlobKey, BlobStore, ByteStream,
    CacheInvalidationTag, CacheInvalidationTagger, ChunkSizeGuard, IngestConfig, IngestError,
    IngestEvent, IngestReceipt, IngestResult, KeyedLocks, PermissionLevel, QuotaOracle,
    QuotaSnapshot,
};

/// Cache tag shared by every blob read and mutation
pub const BLOBS_TAG: &str = "blobs";
/// Argument that keys blob cache entries
pub const WORKSPACE_ARG: &str = "workspaceId";

const LIST_BLOBS: &str = "listBlobs";
const BLOBS_SIZE: &str = "blobsSize";
const SET_BLOB: &str = "setBlob";
const DELETE_BLOB: &str = "deleteBlob";

/// Ingests uploads under tenant quotas and fronts the blob store
pub struct BlobIngestionController {
    store: Arc<dyn BlobStore>,
    quotas: Arc<dyn QuotaOracle>,
    auth: Arc<dyn Authorizer>,
    cache: Arc<CacheInvalidationTagger>,
    locks: KeyedLocks,
    events: broadcast::Sender<IngestEvent>,
    config: IngestConfig,
}

impl BlobIngestionController {
    /// Create a controller that lets every caller through
    pub fn new(store: Arc<dyn BlobStore>, quotas: Arc<dyn QuotaOracle>, config: IngestConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let cache = Arc::new(CacheInvalidationTagger::new());
        register_operations(&cache);

        Self {
            store,
            quotas,
            auth: Arc::new(AllowAll),
            cache,
            locks: KeyedLocks::new(),
            events,
            config,
        }
    }

    /// Check permissions with a custom authorizer
    pub fn with_authorizer<A: Authorizer + 'static>(mut self, auth: A) -> Self {
        self.auth = Arc::new(auth);
        self
    }

    /// Share a cache with other components. The blob operations are registered on it.
    pub fn with_cache(mut self, cache: Arc<CacheInvalidationTagger>) -> Self {
        register_operations(&cache);
        self.cache = cache;
        self
    }

    /// Receive an event for every commit, rejection and delete
    pub fn subscribe(&self) -> broadcast::Receiver<IngestEvent> {
        self.events.subscribe()
    }

    pub fn cache(&self) -> &CacheInvalidationTagger {
        &self.cache
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    /// Stream an upload into the store if it fits the tenant's quota.
    ///
    /// The quota is read once. Every chunk is checked against it as soon as it
    /// is appended, and the first violation drops `body` without pulling
    /// another chunk. The store is written once, after the whole payload has
    /// passed.
    #[instrument(skip(self, ctx, name, body), fields(tenant_id = %ctx.tenant_id, blob = %name, request_id = %ctx.request_id))]
    pub async fn ingest(&self, ctx: BlobCtx, name: &str, body: ByteStream) -> IngestResult<IngestReceipt> {
        if name.is_empty() {
            return Err(IngestError::invalid("Blob name must not be empty"));
        }
        self.authorize(&ctx, PermissionLevel::Write).await?;

        let _key_guard = if self.config.serialize_same_key {
            Some(self.locks.acquire(BlobKey::new(&ctx.tenant_id, name)).await)
        } else {
            None
        };

        let snapshot = self.quotas.snapshot(&ctx.tenant_id).await?;
        let mut attempt = IngestionAttempt::new(snapshot);

        let content = match attempt.receive(body).await {
            Ok(()) => attempt.finish(),
            Err(e) => Err(e),
        };
        let content = match content {
            Ok(content) => content,
            Err(e) => {
                if e.is_quota_violation() {
                    warn!(received = attempt.running_size, error = %e, "upload rejected");
                    self.emit(rejected_event(&ctx.tenant_id, name, &e, attempt.running_size));
                }
                return Err(e);
            }
        };

        let size_bytes = content.len() as u64;
        self.store.put(&ctx.tenant_id, name, content).await?;
        self.invalidate(&ctx.tenant_id, SET_BLOB);

        info!(size_bytes, chunks = attempt.chunks, "blob committed");
        let receipt = IngestReceipt::new(&ctx.tenant_id, name, size_bytes)
            .with_chunks(attempt.chunks)
            .with_request_id(&ctx.request_id);
        self.emit(IngestEvent::Committed {
            tenant_id: receipt.tenant_id.clone(),
            name: receipt.name.clone(),
            size_bytes,
            at: receipt.committed_at,
        });

        Ok(receipt)
    }

    /// All blobs of the tenant
    #[instrument(skip(self, ctx), fields(tenant_id = %ctx.tenant_id, request_id = %ctx.request_id))]
    pub async fn list(&self, ctx: BlobCtx) -> IngestResult<Vec<BlobEntry>> {
        self.authorize(&ctx, PermissionLevel::Read).await?;

        let args = workspace_args(&ctx.tenant_id);
        let generation = self.cache.generation(LIST_BLOBS, &args);
        if let Some(entries) = self.cached(LIST_BLOBS, &args) {
            return Ok(entries);
        }

        let entries = self.store.list(&ctx.tenant_id).await?;
        self.remember(LIST_BLOBS, &args, &entries, generation);
        Ok(entries)
    }

    /// Bytes stored by the tenant
    #[instrument(skip(self, ctx), fields(tenant_id = %ctx.tenant_id, request_id = %ctx.request_id))]
    pub async fn total_size(&self, ctx: BlobCtx) -> IngestResult<u64> {
        self.authorize(&ctx, PermissionLevel::Read).await?;

        let args = workspace_args(&ctx.tenant_id);
        let generation = self.cache.generation(BLOBS_SIZE, &args);
        if let Some(size) = self.cached(BLOBS_SIZE, &args) {
            return Ok(size);
        }

        let size = self.store.total_size(&ctx.tenant_id).await?;
        self.remember(BLOBS_SIZE, &args, &size, generation);
        Ok(size)
    }

    /// Content of one blob
    #[instrument(skip(self, ctx), fields(tenant_id = %ctx.tenant_id, request_id = %ctx.request_id))]
    pub async fn get(&self, ctx: BlobCtx, name: &str) -> IngestResult<Option<Bytes>> {
        self.authorize(&ctx, PermissionLevel::Read).await?;
        Ok(self.store.get(&ctx.tenant_id, name).await?)
    }

    /// Delete a blob. Deleting a missing blob succeeds.
    #[instrument(skip(self, ctx), fields(tenant_id = %ctx.tenant_id, request_id = %ctx.request_id))]
    pub async fn delete(&self, ctx: BlobCtx, name: &str) -> IngestResult<()> {
        self.authorize(&ctx, PermissionLevel::Write).await?;

        self.store.delete(&ctx.tenant_id, name).await?;
        self.invalidate(&ctx.tenant_id, DELETE_BLOB);

        info!("blob deleted");
        self.emit(IngestEvent::Deleted {
            tenant_id: ctx.tenant_id.clone(),
            name: name.to_string(),
            at: Utc::now(),
        });
        Ok(())
    }

    async fn authorize(&self, ctx: &BlobCtx, required: PermissionLevel) -> IngestResult<()> {
        self.auth
            .check_permission(&ctx.tenant_id, ctx.user_id(), required)
            .await
    }

    fn cached<T: DeserializeOwned>(&self, operation: &str, args: &ArgValues) -> Option<T> {
        if !self.config.cache_enabled {
            return None;
        }
        match self.cache.lookup_as(operation, args) {
            Ok(Some(value)) => {
                debug!(operation, "cache hit");
                Some(value)
            }
            Ok(None) => None,
            Err(e) => {
                warn!(operation, error = %e, "discarding unreadable cache entry");
                None
            }
        }
    }

    // `generation` was taken before the store read; an ingest or delete that
    // invalidated in between makes the result stale and it is not cached.
    fn remember<T: Serialize>(
        &self,
        operation: &str,
        args: &ArgValues,
        value: &T,
        generation: Option<u64>,
    ) {
        if !self.config.cache_enabled {
            return;
        }
        let Some(generation) = generation else {
            return;
        };
        if let Err(e) = self.cache.store_as_if_current(operation, args, value, generation) {
            warn!(operation, error = %e, "failed to cache read result");
        }
    }

    // Runs after a committed write, so failures are logged and swallowed.
    fn invalidate(&self, tenant_id: &str, mutation: &str) {
        if let Err(e) = self.cache.invalidate_for(mutation, &workspace_args(tenant_id)) {
            warn!(mutation, error = %e, "cache invalidation failed");
        }
    }

    fn emit(&self, event: IngestEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }
}

/// One upload in flight. The buffer never leaves the attempt until `finish`.
struct IngestionAttempt {
    snapshot: QuotaSnapshot,
    buffer: BytesMut,
    running_size: u64,
    chunks: u32,
}

impl IngestionAttempt {
    fn new(snapshot: QuotaSnapshot) -> Self {
        Self {
            snapshot,
            buffer: BytesMut::new(),
            running_size: 0,
            chunks: 0,
        }
    }

    async fn receive(&mut self, mut body: ByteStream) -> IngestResult<()> {
        // already over quota: fail before touching the stream
        ChunkSizeGuard::check(0, &self.snapshot)?;

        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|source| IngestError::Stream { source })?;
            self.append(&chunk)?;
        }
        Ok(())
    }

    fn append(&mut self, chunk: &[u8]) -> IngestResult<()> {
        self.buffer.extend_from_slice(chunk);
        self.running_size = self.running_size.saturating_add(chunk.len() as u64);
        self.chunks = self.chunks.saturating_add(1);
        debug!(chunk = self.chunks, received = self.running_size, "chunk received");
        ChunkSizeGuard::check(self.running_size, &self.snapshot)
    }

    fn finish(&mut self) -> IngestResult<Bytes> {
        ChunkSizeGuard::check(self.running_size, &self.snapshot)?;
        Ok(std::mem::take(&mut self.buffer).freeze())
    }
}

fn register_operations(cache: &CacheInvalidationTagger) {
    let tag = CacheInvalidationTag::new([BLOBS_TAG], [WORKSPACE_ARG]);
    cache.register_read(LIST_BLOBS, tag.clone());
    cache.register_read(BLOBS_SIZE, tag.clone());
    cache.register_mutation(SET_BLOB, tag.clone());
    cache.register_mutation(DELETE_BLOB, tag);
}

fn workspace_args(tenant_id: &str) -> ArgValues {
    ArgValues::from([(WORKSPACE_ARG.to_string(), tenant_id.to_string())])
}

fn rejected_event(tenant_id: &str, name: &str, error: &IngestError, received: u64) -> IngestEvent {
    let (limit, observed_bytes) = match error {
        IngestError::QuotaExceeded { limit, observed_bytes, .. } => (Some(*limit), *observed_bytes),
        _ => (None, received),
    };
    IngestEvent::Rejected {
        tenant_id: tenant_id.to_string(),
        name: name.to_string(),
        limit,
        observed_bytes,
        at: Utc::now(),
    }
}
