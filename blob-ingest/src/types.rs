use bytes::Bytes;
use futures_core::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use uuid::Uuid;

/// Stream of bytes for blob content
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, std::io::Error>> + Send>>;

/// Context for blob operations (tenant, user, request info)
#[derive(Debug, Clone)]
pub struct BlobCtx {
    pub tenant_id: String,
    pub actor_id: Option<String>,
    pub request_id: String,
}

impl BlobCtx {
    pub fn new(tenant_id: String) -> Self {
        Self {
            tenant_id,
            actor_id: None,
            request_id: Uuid::new_v4().to_string(),
        }
    }

    pub fn with_actor(mut self, actor_id: String) -> Self {
        self.actor_id = Some(actor_id);
        self
    }

    pub fn with_request_id(mut self, request_id: String) -> Self {
        self.request_id = request_id;
        self
    }

    /// The user checked against the authorizer; anonymous callers are `""`
    pub fn user_id(&self) -> &str {
        self.actor_id.as_deref().unwrap_or("")
    }
}

/// Identity of a stored blob: one name inside one tenant
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BlobKey {
    pub tenant_id: String,
    pub name: String,
}

impl BlobKey {
    pub fn new<T: Into<String>, N: Into<String>>(tenant_id: T, name: N) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for BlobKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.tenant_id, self.name)
    }
}

/// One item of a tenant listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobEntry {
    pub key: String,
    pub size_bytes: u64,
}

impl BlobEntry {
    pub fn new<S: Into<String>>(key: S, size_bytes: u64) -> Self {
        Self {
            key: key.into(),
            size_bytes,
        }
    }
}

/// Access level required by an operation. `Write` implies `Read`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PermissionLevel {
    Read,
    Write,
}

impl std::fmt::Display for PermissionLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PermissionLevel::Read => write!(f, "read"),
            PermissionLevel::Write => write!(f, "write"),
        }
    }
}
