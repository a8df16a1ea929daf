use thiserror::Error;

use crate::{PermissionLevel, QuotaLimit};

/// Result type for ingestion operations
pub type IngestResult<T> = Result<T, IngestError>;

/// Result type for durable store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by a durable blob store
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Blob store unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Storage backend error: {source}")]
    Backend {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl StoreError {
    /// Create an unavailable error
    pub fn unavailable<S: Into<String>>(reason: S) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }

    /// Create a backend error from any error type
    pub fn backend<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Backend {
            source: Box::new(error),
        }
    }
}

/// Errors that can occur while ingesting or managing blobs
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("No storage quota configured for this tenant")]
    QuotaRecordMissing,

    #[error("{limit} quota exceeded: {observed_bytes} bytes observed (limit: {limit_bytes})")]
    QuotaExceeded {
        limit: QuotaLimit,
        observed_bytes: u64,
        limit_bytes: u64,
    },

    #[error("Upstream write failed: {source}")]
    UpstreamWriteFailed {
        #[from]
        source: StoreError,
    },

    #[error("User '{user_id}' lacks {required} permission on tenant {tenant_id}")]
    Forbidden {
        tenant_id: String,
        user_id: String,
        required: PermissionLevel,
    },

    #[error("Invalid request: {message}")]
    Invalid { message: String },

    #[error("Upload stream failed: {source}")]
    Stream {
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {source}")]
    Serialization {
        #[from]
        source: serde_json::Error,
    },
}

impl IngestError {
    /// Create an invalid request error
    pub fn invalid<S: Into<String>>(message: S) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }

    /// Create a forbidden error
    pub fn forbidden<T, U>(tenant_id: T, user_id: U, required: PermissionLevel) -> Self
    where
        T: Into<String>,
        U: Into<String>,
    {
        Self::Forbidden {
            tenant_id: tenant_id.into(),
            user_id: user_id.into(),
            required,
        }
    }

    /// True for either flavor of quota rejection
    pub fn is_quota_violation(&self) -> bool {
        matches!(
            self,
            Self::QuotaExceeded { .. } | Self::QuotaRecordMissing
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_surface_as_upstream_write_failures() {
        let err: IngestError = StoreError::unavailable("connection reset").into();
        assert!(matches!(err, IngestError::UpstreamWriteFailed { .. }));
        assert_eq!(
            err.to_string(),
            "Upstream write failed: Blob store unavailable: connection reset"
        );
    }

    #[test]
    fn quota_exceeded_names_the_limit() {
        let err = IngestError::QuotaExceeded {
            limit: QuotaLimit::PerBlob,
            observed_bytes: 12,
            limit_bytes: 10,
        };
        assert_eq!(
            err.to_string(),
            "per-blob quota exceeded: 12 bytes observed (limit: 10)"
        );
        assert!(err.is_quota_violation());
        assert!(!IngestError::invalid("x").is_quota_violation());
    }
}
