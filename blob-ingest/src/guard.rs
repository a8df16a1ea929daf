//! Size checks run against the running byte count of an upload.

use serde::{Deserialize, Serialize};

use crate::{IngestError, IngestResult, QuotaSnapshot};

/// Which cap an upload ran into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuotaLimit {
    /// Aggregate storage of the tenant
    Workspace,
    /// Size of a single blob
    PerBlob,
}

impl std::fmt::Display for QuotaLimit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QuotaLimit::Workspace => write!(f, "workspace"),
            QuotaLimit::PerBlob => write!(f, "per-blob"),
        }
    }
}

/// Stateless size guard.
///
/// `observed_size` is always the cumulative number of bytes received so far
/// for one upload, never the size of the latest chunk.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChunkSizeGuard;

impl ChunkSizeGuard {
    /// Which limit, if any, `observed_size` violates.
    ///
    /// Fails with [`IngestError::QuotaRecordMissing`] when the snapshot has no
    /// quota limit at all.
    pub fn evaluate(observed_size: u64, snapshot: &QuotaSnapshot) -> IngestResult<Option<QuotaLimit>> {
        let quota_limit = snapshot
            .quota_limit_bytes()
            .ok_or(IngestError::QuotaRecordMissing)?;

        let total = snapshot.used_bytes().saturating_add(observed_size);
        if total > quota_limit && !snapshot.unlimited() {
            return Ok(Some(QuotaLimit::Workspace));
        }
        // unlimited never waives the per-blob cap
        if observed_size > snapshot.per_blob_limit_bytes() {
            return Ok(Some(QuotaLimit::PerBlob));
        }
        Ok(None)
    }

    pub fn exceeds(observed_size: u64, snapshot: &QuotaSnapshot) -> IngestResult<bool> {
        Ok(Self::evaluate(observed_size, snapshot)?.is_some())
    }

    /// Like [`ChunkSizeGuard::evaluate`], turning a violation into
    /// [`IngestError::QuotaExceeded`].
    pub fn check(observed_size: u64, snapshot: &QuotaSnapshot) -> IngestResult<()> {
        match Self::evaluate(observed_size, snapshot)? {
            None => Ok(()),
            Some(QuotaLimit::Workspace) => Err(IngestError::QuotaExceeded {
                limit: QuotaLimit::Workspace,
                observed_bytes: snapshot.used_bytes().saturating_add(observed_size),
                limit_bytes: snapshot.quota_limit_bytes().unwrap_or_default(),
            }),
            Some(QuotaLimit::PerBlob) => Err(IngestError::QuotaExceeded {
                limit: QuotaLimit::PerBlob,
                observed_bytes: observed_size,
                limit_bytes: snapshot.per_blob_limit_bytes(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(limit: Option<u64>, used: u64, per_blob: u64) -> QuotaSnapshot {
        QuotaSnapshot::new(limit, used, per_blob).unwrap()
    }

    #[test]
    fn missing_quota_record_is_a_hard_failure() {
        let s = snapshot(None, 0, 100);
        assert!(matches!(
            ChunkSizeGuard::exceeds(0, &s),
            Err(IngestError::QuotaRecordMissing)
        ));
    }

    #[test]
    fn workspace_cap_counts_existing_usage() {
        let s = snapshot(Some(1000), 900, 2000);
        assert!(!ChunkSizeGuard::exceeds(0, &s).unwrap());
        assert!(!ChunkSizeGuard::exceeds(100, &s).unwrap());
        assert_eq!(
            ChunkSizeGuard::evaluate(101, &s).unwrap(),
            Some(QuotaLimit::Workspace)
        );
    }

    #[test]
    fn tenant_already_over_quota_fails_at_zero_bytes() {
        let s = snapshot(Some(1000), 1001, 2000);
        assert!(ChunkSizeGuard::exceeds(0, &s).unwrap());
    }

    #[test]
    fn unlimited_waives_only_the_workspace_cap() {
        let s = snapshot(Some(1000), 5000, 2000).with_unlimited(true);
        assert!(!ChunkSizeGuard::exceeds(2000, &s).unwrap());
        assert_eq!(
            ChunkSizeGuard::evaluate(2001, &s).unwrap(),
            Some(QuotaLimit::PerBlob)
        );
    }

    #[test]
    fn check_reports_the_tripped_limit() {
        let s = snapshot(Some(1000), 900, 50);
        match ChunkSizeGuard::check(60, &s) {
            Err(IngestError::QuotaExceeded { limit, observed_bytes, limit_bytes }) => {
                assert_eq!(limit, QuotaLimit::PerBlob);
                assert_eq!(observed_bytes, 60);
                assert_eq!(limit_bytes, 50);
            }
            other => panic!("unexpected: {:?}", other),
        }

        let s = snapshot(Some(1000), 900, 5000);
        match ChunkSizeGuard::check(150, &s) {
            Err(IngestError::QuotaExceeded { limit, observed_bytes, limit_bytes }) => {
                assert_eq!(limit, QuotaLimit::Workspace);
                assert_eq!(observed_bytes, 1050);
                assert_eq!(limit_bytes, 1000);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn usage_near_u64_max_does_not_overflow() {
        let s = snapshot(Some(u64::MAX), u64::MAX - 1, u64::MAX);
        assert!(!ChunkSizeGuard::exceeds(1, &s).unwrap());
        assert!(!ChunkSizeGuard::exceeds(2, &s).unwrap());
    }
}
