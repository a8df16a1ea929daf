//! # blob-ingest: quota-bounded streaming blob ingestion
//!
//! `blob-ingest` accepts uploads of unknown size for a multi-tenant
//! workspace backend and commits them to durable storage only when they fit
//! the tenant's storage quota.
//!
//! ## Key Features
//!
//! - **Checked while streaming**: the running size is compared against the
//!   tenant's quota after every chunk, so an oversized upload is cut off one
//!   chunk past the limit instead of being buffered whole
//! - **Nothing partial is visible**: the payload stays private to the upload
//!   until a single `put` commits it
//! - **Two caps**: an aggregate workspace quota (waivable by the unlimited
//!   feature) and a per-blob cap (never waived)
//! - **Tag-based read caching**: list and size reads are cached until a
//!   tagged mutation for the same workspace commits
//! - **Storage agnostic**: any backend implementing [`BlobStore`]
//!
//! ## Quick Start
//!
//! ```rust
//! use blob_ingest::prelude::*;
//! use blob_ingest::{MemoryBlobStore, MemoryFeatureFlags, QuotaRecord, StoreQuotaOracle};
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> IngestResult<()> {
//! let store = Arc::new(MemoryBlobStore::new());
//! let config = IngestConfig::default().with_default_per_blob_limit(1024);
//! let quotas = StoreQuotaOracle::from_config(store.clone(), Arc::new(MemoryFeatureFlags::new()), &config);
//! quotas.set_quota("ws-1", QuotaRecord::new(10 * 1024));
//!
//! let controller = BlobIngestionController::new(store, Arc::new(quotas), config);
//!
//! let ctx = BlobCtx::new("ws-1".to_string()).with_actor("user-123".to_string());
//! let chunks: Vec<Result<bytes::Bytes, std::io::Error>> =
//!     vec![Ok(bytes::Bytes::from_static(b"Hello, world!"))];
//! let body: ByteStream = Box::pin(futures_util::stream::iter(chunks));
//!
//! let receipt = controller.ingest(ctx.clone(), "hello.txt", body).await?;
//! assert_eq!(receipt.size_bytes, 13);
//! assert_eq!(controller.total_size(ctx).await?, 13);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────┐
//! │ BlobIngestionController  │  ← permission check, streaming, commit
//! ├────────────┬─────────────┤
//! │ QuotaOracle│ChunkSizeGuard│  ← one snapshot, checked per chunk
//! ├────────────┴─────────────┤
//! │        BlobStore         │  ← durable storage primitives
//! └──────────────────────────┘
//! ```

pub mod auth;
pub mod cache;
mod config;
mod controller;
mod error;
mod events;
mod guard;
mod lock;
mod memory_store;
pub mod quota;
mod receipt;
pub mod store;
#[cfg(feature = "tracing-basic")]
pub mod telemetry;
mod types;

// Re-export main types for clean API
pub use auth::{AllowAll, Authorizer, MemoryAuthorizer};
pub use cache::{ArgValues, CacheInvalidationTag, CacheInvalidationTagger};
pub use config::IngestConfig;
pub use controller::{BlobIngestionController, BLOBS_TAG, WORKSPACE_ARG};
pub use error::{IngestError, IngestResult, StoreError, StoreResult};
pub use events::IngestEvent;
pub use guard::{ChunkSizeGuard, QuotaLimit};
pub use lock::{KeyGuard, KeyedLocks};
pub use memory_store::MemoryBlobStore;
pub use quota::{
    FeatureFlags, MemoryFeatureFlags, QuotaOracle, QuotaRecord, QuotaSnapshot, StoreQuotaOracle,
};
pub use receipt::IngestReceipt;
pub use store::BlobStore;
pub use types::{BlobCtx, BlobEntry, BlobKey, ByteStream, PermissionLevel};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        BlobCtx, BlobIngestionController, BlobStore, ByteStream, IngestConfig, IngestError,
        IngestReceipt, IngestResult, QuotaOracle,
    };
}
