use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::QuotaLimit;

/// What happened to a tenant's blobs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IngestEvent {
    Committed {
        tenant_id: String,
        name: String,
        size_bytes: u64,
        at: DateTime<Utc>,
    },
    Rejected {
        tenant_id: String,
        name: String,
        /// `None` when the tenant has no quota record
        limit: Option<QuotaLimit>,
        observed_bytes: u64,
        at: DateTime<Utc>,
    },
    Deleted {
        tenant_id: String,
        name: String,
        at: DateTime<Utc>,
    },
}

impl IngestEvent {
    pub fn tenant_id(&self) -> &str {
        match self {
            IngestEvent::Committed { tenant_id, .. }
            | IngestEvent::Rejected { tenant_id, .. }
            | IngestEvent::Deleted { tenant_id, .. } => tenant_id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            IngestEvent::Committed { name, .. }
            | IngestEvent::Rejected { name, .. }
            | IngestEvent::Deleted { name, .. } => name,
        }
    }
}
