//! Key-value blob store with compare-and-set, injected into the managers.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use zklogin_types::AuthError;

/// Result of [`BlobStore::compare_and_swap`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CasOutcome {
    Swapped,
    /// Refused; carries the value currently stored.
    Conflict(Option<Vec<u8>>),
}

/// Persistence seam for the two blobs this crate owns (salt, session).
pub trait BlobStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, AuthError>;

    /// Unconditional write, last writer wins.
    fn put(&self, key: &str, value: &[u8]) -> Result<(), AuthError>;

    /// Deleting a missing key is a no-op.
    fn delete(&self, key: &str) -> Result<(), AuthError>;

    /// Write `new` only if the current value equals `expected` (`None` = absent).
    fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&[u8]>,
        new: &[u8],
    ) -> Result<CasOutcome, AuthError>;
}

impl<T: BlobStore + ?Sized> BlobStore for Arc<T> {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, AuthError> {
        (**self).get(key)
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<(), AuthError> {
        (**self).put(key, value)
    }

    fn delete(&self, key: &str) -> Result<(), AuthError> {
        (**self).delete(key)
    }

    fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&[u8]>,
        new: &[u8],
    ) -> Result<CasOutcome, AuthError> {
        (**self).compare_and_swap(key, expected, new)
    }
}

/// Process-local store; the transient (per-context) session slot.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<u8>>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl BlobStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, AuthError> {
        Ok(self.lock().get(key).cloned())
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<(), AuthError> {
        self.lock().insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), AuthError> {
        self.lock().remove(key);
        Ok(())
    }

    fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&[u8]>,
        new: &[u8],
    ) -> Result<CasOutcome, AuthError> {
        let mut entries = self.lock();
        let current = entries.get(key).map(Vec::as_slice);
        if current != expected {
            return Ok(CasOutcome::Conflict(current.map(<[u8]>::to_vec)));
        }
        entries.insert(key.to_string(), new.to_vec());
        Ok(CasOutcome::Swapped)
    }
}
