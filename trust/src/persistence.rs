// Copyright (c) 2023 The MobileCoin Foundation

//! Durable key/value persistence for user preferences

use crate::PersistenceError;
use core::fmt::{Debug, Display, Formatter};
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

/// Optional platform features a persistence backend may lack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Name to certificate preferences
    PreferredCertificates,
    /// Per policy user trust overrides
    TrustSettings,
}

impl Display for Capability {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            Capability::PreferredCertificates => "preferred certificates",
            Capability::TrustSettings => "user trust settings",
        };
        f.write_str(name)
    }
}

/// Durable storage shared by every process using the same preferences.
///
/// Each call must be atomic for its key: a failed `set` or `remove` leaves the
/// previous value readable. Concurrent writers to one key are serialized by
/// the implementation, the last write wins.
pub trait Persistence: Debug + Send + Sync {
    /// Read the value for `key`
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, PersistenceError>;

    /// Replace the value for `key`
    fn set(&self, key: &str, value: &[u8]) -> Result<(), PersistenceError>;

    /// Delete the value for `key`, succeeding if it was not present
    fn remove(&self, key: &str) -> Result<(), PersistenceError>;

    /// Whether this platform supports `capability`.
    fn supports(&self, _capability: Capability) -> bool {
        true
    }
}

/// A process local [`Persistence`]
#[derive(Debug, Default)]
pub struct MemoryPersistence {
    entries: RwLock<HashMap<String, Vec<u8>>>,
    unsupported: HashSet<Capability>,
}

impl MemoryPersistence {
    /// Create an empty instance supporting every capability
    pub fn new() -> Self {
        Self::default()
    }

    /// Report `capability` as unsupported, as a platform without it would.
    pub fn without(mut self, capability: Capability) -> Self {
        self.unsupported.insert(capability);
        self
    }

    fn poisoned() -> PersistenceError {
        PersistenceError::Backend("preference lock poisoned".into())
    }
}

impl Persistence for MemoryPersistence {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, PersistenceError> {
        let entries = self.entries.read().map_err(|_| Self::poisoned())?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), PersistenceError> {
        let mut entries = self.entries.write().map_err(|_| Self::poisoned())?;
        entries.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), PersistenceError> {
        let mut entries = self.entries.write().map_err(|_| Self::poisoned())?;
        entries.remove(key);
        Ok(())
    }

    fn supports(&self, capability: Capability) -> bool {
        !self.unsupported.contains(&capability)
    }
}
