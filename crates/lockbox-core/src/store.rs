use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use thiserror::Error;

/// Errors produced by secret store implementations.
///
/// None of these conditions is transient, so implementations never retry
/// internally. "File not found" is deliberately absent: a missing secret is
/// normal control flow (`Ok(None)` on `get`, success on `delete`).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    /// The caller-supplied secret name cannot be mapped to a safe file name.
    #[error("invalid secret name {name:?}: {reason}")]
    InvalidName { name: String, reason: String },
    /// The storage directory could not be created or locked down.
    #[error("could not provision storage directory: {reason}")]
    DirectoryCreation { reason: String },
    /// The cipher could not be initialized from the available key material.
    #[error("cipher initialization failed: {reason}")]
    CipherInit { reason: String },
    /// A stored record is structurally malformed (bad encoding, unknown
    /// version, or truncated below the minimum layout).
    #[error("malformed record: {reason}")]
    Format { reason: String },
    /// The record failed authentication. Covers tampering, corruption, and
    /// wrong key alike; the causes are intentionally indistinguishable.
    #[error("record failed authentication (tampered, corrupted, or wrong key)")]
    Authentication,
    /// Filesystem failure other than "not found".
    #[error("storage I/O failure: {reason}")]
    Io { reason: String },
}

/// Contract for encrypted-at-rest key/value secret storage.
///
/// All calls are synchronous and block on local disk I/O. Implementations do
/// not serialize concurrent access to the same name: racing writers are
/// last-writer-wins, and a concurrent reader observes either the old or the
/// new complete record, never a torn one. Callers needing ordering supply
/// their own synchronization.
pub trait SecretStore: Send + Sync {
    /// Persist a value under a name, overwriting any existing entry.
    fn set(&self, name: &str, value: &[u8]) -> Result<(), StoreError>;

    /// Retrieve the value for a name. An absent name is `Ok(None)`, distinct
    /// from a stored empty value (`Ok(Some(vec![]))`).
    fn get(&self, name: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Remove a name and its value. Deleting an absent name succeeds.
    fn delete(&self, name: &str) -> Result<(), StoreError>;
}

/// In-memory secret store that simulates encryption for tests and smoke runs.
/// This is not cryptographically secure; production callers use the AES-GCM
/// file store from the storage crate.
#[derive(Debug, Default, Clone)]
pub struct InMemorySecretStore {
    inner: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl InMemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SecretStore for InMemorySecretStore {
    fn set(&self, name: &str, value: &[u8]) -> Result<(), StoreError> {
        let mut map = self.inner.lock().map_err(|err| StoreError::Io {
            reason: format!("lock poisoned: {err}"),
        })?;

        // XOR is a placeholder to avoid holding plaintext in the map.
        map.insert(name.to_string(), mask(value));
        Ok(())
    }

    fn get(&self, name: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let map = self.inner.lock().map_err(|err| StoreError::Io {
            reason: format!("lock poisoned: {err}"),
        })?;

        Ok(map.get(name).map(|masked| unmask(masked)))
    }

    fn delete(&self, name: &str) -> Result<(), StoreError> {
        let mut map = self.inner.lock().map_err(|err| StoreError::Io {
            reason: format!("lock poisoned: {err}"),
        })?;
        map.remove(name);
        Ok(())
    }
}

const MASK_BYTE: u8 = 0x5c;

fn mask(input: &[u8]) -> Vec<u8> {
    input.iter().map(|b| b ^ MASK_BYTE).collect()
}

fn unmask(input: &[u8]) -> Vec<u8> {
    mask(input) // XOR twice restores original.
}
