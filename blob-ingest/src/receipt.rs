use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Receipt returned after a blob has been committed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReceipt {
    pub tenant_id: String,
    pub name: String,
    pub size_bytes: u64,
    /// Number of chunks pulled from the upload stream
    pub chunks: u32,
    pub request_id: String,
    pub committed_at: DateTime<Utc>,
}

impl IngestReceipt {
    pub fn new<T: Into<String>, N: Into<String>>(tenant_id: T, name: N, size_bytes: u64) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            name: name.into(),
            size_bytes,
            chunks: 0,
            request_id: String::new(),
            committed_at: Utc::now(),
        }
    }

    /// Set chunk count
    pub fn with_chunks(mut self, chunks: u32) -> Self {
        self.chunks = chunks;
        self
    }

    /// Set request id
    pub fn with_request_id<S: Into<String>>(mut self, request_id: S) -> Self {
        self.request_id = request_id.into();
        self
    }
}
