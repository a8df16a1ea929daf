//! Tag-based invalidation of cached read results.
//!
//! Read and mutate operations are registered once with a
//! [`CacheInvalidationTag`]. A read result is cached under the operation
//! name plus the values of its keyed arguments. Committing a mutation drops
//! every cached read that shares one of its tags and has the same keyed
//! argument values.
//!
//! Every invalidation also bumps a generation counter for the entries it
//! covers. A reader that fetched from the store before a mutation committed
//! uses [`CacheInvalidationTagger::store_if_current`] so it cannot put the
//! pre-mutation result back.
//!
//! ```rust
//! use blob_ingest::{CacheInvalidationTag, CacheInvalidationTagger};
//! use std::collections::BTreeMap;
//!
//! let cache = CacheInvalidationTagger::new();
//! cache.register_read("listBlobs", CacheInvalidationTag::new(["blobs"], ["workspaceId"]));
//! cache.register_mutation("setBlob", CacheInvalidationTag::new(["blobs"], ["workspaceId"]));
//!
//! let args = BTreeMap::from([("workspaceId".to_string(), "ws-1".to_string())]);
//! cache.store("listBlobs", &args, serde_json::json!(["a"]));
//! assert!(cache.lookup("listBlobs", &args).is_some());
//!
//! cache.invalidate_for("setBlob", &args).unwrap();
//! assert!(cache.lookup("listBlobs", &args).is_none());
//! ```

use std::collections::{BTreeMap, BTreeSet, HashMap};

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::{IngestError, IngestResult};

/// Named argument values of one operation call
pub type ArgValues = BTreeMap<String, String>;

/// Tags and keyed argument names attached to an operation at registration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheInvalidationTag {
    pub tags: BTreeSet<String>,
    pub keyed_arg_names: Vec<String>,
}

impl CacheInvalidationTag {
    pub fn new<T, K, S1, S2>(tags: T, keyed_arg_names: K) -> Self
    where
        T: IntoIterator<Item = S1>,
        K: IntoIterator<Item = S2>,
        S1: Into<String>,
        S2: Into<String>,
    {
        Self {
            tags: tags.into_iter().map(Into::into).collect(),
            keyed_arg_names: keyed_arg_names.into_iter().map(Into::into).collect(),
        }
    }

    /// Values of the keyed arguments in registration order, `None` if any is missing
    fn key_values(&self, args: &ArgValues) -> Option<Vec<String>> {
        self.keyed_arg_names
            .iter()
            .map(|name| args.get(name).cloned())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    operation: String,
    values: Vec<String>,
}

#[derive(Debug, Default)]
struct Entries {
    values: HashMap<CacheKey, serde_json::Value>,
    // bumped on every invalidation of the key, never reset
    generations: HashMap<CacheKey, u64>,
}

impl Entries {
    fn generation(&self, key: &CacheKey) -> u64 {
        self.generations.get(key).copied().unwrap_or(0)
    }
}

/// Read-result cache with tag-driven invalidation
#[derive(Debug, Default)]
pub struct CacheInvalidationTagger {
    reads: RwLock<HashMap<String, CacheInvalidationTag>>,
    mutations: RwLock<HashMap<String, CacheInvalidationTag>>,
    entries: RwLock<Entries>,
}

impl CacheInvalidationTagger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_read<S: Into<String>>(&self, operation: S, tag: CacheInvalidationTag) {
        self.reads.write().insert(operation.into(), tag);
    }

    pub fn register_mutation<S: Into<String>>(&self, operation: S, tag: CacheInvalidationTag) {
        self.mutations.write().insert(operation.into(), tag);
    }

    /// Cached result of a registered read
    pub fn lookup(&self, operation: &str, args: &ArgValues) -> Option<serde_json::Value> {
        let key = self.read_key(operation, args)?;
        self.entries.read().values.get(&key).cloned()
    }

    /// Invalidation generation of a read's entry. Take it before reading the
    /// source and hand it to [`CacheInvalidationTagger::store_if_current`].
    pub fn generation(&self, operation: &str, args: &ArgValues) -> Option<u64> {
        let key = self.read_key(operation, args)?;
        Some(self.entries.read().generation(&key))
    }

    /// Cache a read result. Returns false if the read is not registered or
    /// `args` lacks one of its keyed arguments.
    pub fn store(&self, operation: &str, args: &ArgValues, value: serde_json::Value) -> bool {
        match self.read_key(operation, args) {
            Some(key) => {
                self.entries.write().values.insert(key, value);
                true
            }
            None => false,
        }
    }

    /// Cache a read result only if no invalidation covered the entry since
    /// `generation` was taken. Returns whether it was stored.
    pub fn store_if_current(
        &self,
        operation: &str,
        args: &ArgValues,
        value: serde_json::Value,
        generation: u64,
    ) -> bool {
        let Some(key) = self.read_key(operation, args) else {
            return false;
        };
        let mut entries = self.entries.write();
        if entries.generation(&key) != generation {
            debug!(operation, "dropping read result older than last invalidation");
            return false;
        }
        entries.values.insert(key, value);
        true
    }

    pub fn lookup_as<T: DeserializeOwned>(
        &self,
        operation: &str,
        args: &ArgValues,
    ) -> IngestResult<Option<T>> {
        self.lookup(operation, args)
            .map(serde_json::from_value)
            .transpose()
            .map_err(IngestError::from)
    }

    pub fn store_as<T: Serialize>(
        &self,
        operation: &str,
        args: &ArgValues,
        value: &T,
    ) -> IngestResult<bool> {
        Ok(self.store(operation, args, serde_json::to_value(value)?))
    }

    pub fn store_as_if_current<T: Serialize>(
        &self,
        operation: &str,
        args: &ArgValues,
        value: &T,
        generation: u64,
    ) -> IngestResult<bool> {
        Ok(self.store_if_current(operation, args, serde_json::to_value(value)?, generation))
    }

    /// Drop every cached read tagged `tag` whose keyed values match `args`.
    /// Returns how many entries were removed; absent entries are not an error.
    pub fn invalidate(&self, tag: &str, args: &ArgValues) -> usize {
        let keys: Vec<CacheKey> = self
            .reads
            .read()
            .iter()
            .filter(|(_, read)| read.tags.contains(tag))
            .filter_map(|(operation, read)| {
                read.key_values(args).map(|values| CacheKey {
                    operation: operation.clone(),
                    values,
                })
            })
            .collect();

        let mut entries = self.entries.write();
        let mut removed = 0;
        for key in keys {
            if entries.values.remove(&key).is_some() {
                removed += 1;
            }
            *entries.generations.entry(key).or_insert(0) += 1;
        }
        debug!(tag, removed, "cache invalidated");
        removed
    }

    /// Invalidate every tag of a registered mutation
    pub fn invalidate_for(&self, mutation: &str, args: &ArgValues) -> IngestResult<usize> {
        let tag = self
            .mutations
            .read()
            .get(mutation)
            .cloned()
            .ok_or_else(|| IngestError::invalid(format!("Mutation not registered: {}", mutation)))?;

        // only the mutation's keyed arguments take part in matching
        let keyed: ArgValues = args
            .iter()
            .filter(|(name, _)| tag.keyed_arg_names.contains(name))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();

        Ok(tag.tags.iter().map(|t| self.invalidate(t, &keyed)).sum())
    }

    pub fn len(&self) -> usize {
        self.entries.read().values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().values.is_empty()
    }

    pub fn clear(&self) {
        self.entries.write().values.clear();
    }

    fn read_key(&self, operation: &str, args: &ArgValues) -> Option<CacheKey> {
        let reads = self.reads.read();
        let values = reads.get(operation)?.key_values(args)?;
        Some(CacheKey {
            operation: operation.to_string(),
            values,
        })
    }
}
