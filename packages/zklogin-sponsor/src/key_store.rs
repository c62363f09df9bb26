//! Durable blob store backed by one JSON file.
//!
//! With a store key every entry is sealed on its own with AES-256-GCM, bound
//! to its slot through the associated data, and stored under a keyed slot
//! name so the file reveals neither values nor the subjects they belong to.

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};
use zklogin_auth::{BlobStore, CasOutcome};
use zklogin_types::{blake2b256, AuthError};

const FORMAT_VERSION: u32 = 1;
const NONCE_LEN: usize = 12;
const SLOT_DOMAIN: &[u8] = b"zklogin-store-slot";
const CHECK_SLOT: &str = "check";
const CHECK_PLAINTEXT: &[u8] = b"zklogin-store";

#[derive(Serialize, Deserialize)]
struct StoreFile {
    version: u32,
    sealed: bool,
    /// Sealed marker proving the file was written with the same key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    check: Option<String>,
    entries: BTreeMap<String, String>,
}

struct Sealer {
    cipher: Aes256Gcm,
    slot_key: [u8; 32],
}

impl Sealer {
    fn new(key: &[u8; 32]) -> Self {
        Self {
            cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key)),
            slot_key: blake2b256(&[SLOT_DOMAIN, key.as_slice()]),
        }
    }

    fn slot(&self, name: &str) -> String {
        hex::encode(blake2b256(&[self.slot_key.as_slice(), name.as_bytes()]))
    }

    fn seal(&self, slot: &str, value: &[u8]) -> Result<String, AuthError> {
        let nonce: [u8; NONCE_LEN] = rand::random();
        let sealed = self
            .cipher
            .encrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: value,
                    aad: slot.as_bytes(),
                },
            )
            .map_err(|e| AuthError::Storage(format!("Failed to seal store entry: {e}")))?;
        let mut out = nonce.to_vec();
        out.extend_from_slice(&sealed);
        Ok(B64.encode(out))
    }

    fn open(&self, slot: &str, encoded: &str) -> Result<Vec<u8>, AuthError> {
        let data = decode(encoded)?;
        if data.len() < NONCE_LEN {
            return Err(AuthError::Storage(format!("Store entry {slot} is truncated")));
        }
        let (nonce, sealed) = data.split_at(NONCE_LEN);
        self.cipher
            .decrypt(
                Nonce::from_slice(nonce),
                Payload {
                    msg: sealed,
                    aad: slot.as_bytes(),
                },
            )
            .map_err(|_| AuthError::Storage(format!("Store entry {slot} failed authentication")))
    }
}

/// File-backed [`BlobStore`], sealed for production and plaintext for dev.
///
/// Mutations rewrite the file under an in-process lock, so compare-and-swap
/// is atomic only among callers sharing this value. No file lock is taken:
/// two processes must not point at the same file.
pub struct FileStore {
    path: PathBuf,
    sealer: Option<Sealer>,
    lock: Mutex<()>,
}

impl FileStore {
    pub fn new_plaintext(path: PathBuf) -> Self {
        Self {
            path,
            sealer: None,
            lock: Mutex::new(()),
        }
    }

    pub fn new_encrypted(path: PathBuf, key: [u8; 32]) -> Self {
        Self {
            path,
            sealer: Some(Sealer::new(&key)),
            lock: Mutex::new(()),
        }
    }

    pub fn is_encrypted(&self) -> bool {
        self.sealer.is_some()
    }

    fn slot(&self, name: &str) -> String {
        match &self.sealer {
            Some(sealer) => sealer.slot(name),
            None => name.to_string(),
        }
    }

    fn encode_value(&self, slot: &str, value: &[u8]) -> Result<String, AuthError> {
        match &self.sealer {
            Some(sealer) => sealer.seal(slot, value),
            None => Ok(B64.encode(value)),
        }
    }

    fn decode_value(&self, slot: &str, encoded: &str) -> Result<Vec<u8>, AuthError> {
        match &self.sealer {
            Some(sealer) => sealer.open(slot, encoded),
            None => decode(encoded),
        }
    }

    fn value_at(&self, file: &StoreFile, slot: &str) -> Result<Option<Vec<u8>>, AuthError> {
        file.entries
            .get(slot)
            .map(|encoded| self.decode_value(slot, encoded))
            .transpose()
    }

    fn load(&self) -> Result<StoreFile, AuthError> {
        let data = match std::fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return self.empty(),
            Err(e) => return Err(AuthError::Storage(format!("Failed to read store: {e}"))),
        };
        let file: StoreFile = serde_json::from_slice(&data)
            .map_err(|e| AuthError::Storage(format!("Failed to parse store: {e}")))?;

        if file.version != FORMAT_VERSION {
            return Err(AuthError::Storage(format!(
                "Unsupported store version {}",
                file.version
            )));
        }
        match (&self.sealer, file.sealed) {
            (Some(sealer), true) => {
                let check = file.check.as_deref().ok_or_else(|| {
                    AuthError::Storage("Encrypted store has no key check".into())
                })?;
                if sealer.open(CHECK_SLOT, check)? != CHECK_PLAINTEXT {
                    return Err(AuthError::Storage("Store key check mismatch".into()));
                }
            }
            (None, false) => {}
            (Some(_), false) => {
                return Err(AuthError::Storage(format!(
                    "Store {} is plaintext but a store key is set",
                    self.path.display()
                )))
            }
            (None, true) => {
                return Err(AuthError::Storage(format!(
                    "Store {} is encrypted but no store key is set",
                    self.path.display()
                )))
            }
        }
        Ok(file)
    }

    fn empty(&self) -> Result<StoreFile, AuthError> {
        let check = match &self.sealer {
            Some(sealer) => Some(sealer.seal(CHECK_SLOT, CHECK_PLAINTEXT)?),
            None => None,
        };
        Ok(StoreFile {
            version: FORMAT_VERSION,
            sealed: self.sealer.is_some(),
            check,
            entries: BTreeMap::new(),
        })
    }

    /// Replace the file with `file` via a sibling temp file and rename.
    fn save(&self, file: &StoreFile) -> Result<(), AuthError> {
        let json = serde_json::to_vec_pretty(file)
            .map_err(|e| AuthError::Storage(format!("Failed to serialize store: {e}")))?;
        write_replacing(&self.path, &json)
            .map_err(|e| AuthError::Storage(format!("Failed to write store: {e}")))?;
        debug!(path = %self.path.display(), count = file.entries.len(), "Store saved");
        Ok(())
    }

    fn guard(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn decode(encoded: &str) -> Result<Vec<u8>, AuthError> {
    B64.decode(encoded)
        .map_err(|e| AuthError::Storage(format!("Corrupt store value: {e}")))
}

fn write_replacing(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    let mut staged = path.as_os_str().to_owned();
    staged.push(format!(".{}.partial", std::process::id()));
    let staged = PathBuf::from(staged);

    let mut out = std::fs::File::create(&staged)?;
    out.write_all(bytes)?;
    out.sync_all()?;
    drop(out);
    std::fs::rename(&staged, path)
}

impl BlobStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, AuthError> {
        let _guard = self.guard();
        let file = self.load()?;
        self.value_at(&file, &self.slot(key))
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<(), AuthError> {
        let _guard = self.guard();
        let mut file = self.load()?;
        let slot = self.slot(key);
        let encoded = self.encode_value(&slot, value)?;
        file.entries.insert(slot, encoded);
        self.save(&file)
    }

    fn delete(&self, key: &str) -> Result<(), AuthError> {
        let _guard = self.guard();
        let mut file = self.load()?;
        if file.entries.remove(&self.slot(key)).is_some() {
            self.save(&file)?;
        }
        Ok(())
    }

    fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&[u8]>,
        new: &[u8],
    ) -> Result<CasOutcome, AuthError> {
        let _guard = self.guard();
        let mut file = self.load()?;
        let slot = self.slot(key);
        let current = self.value_at(&file, &slot)?;
        if current.as_deref() != expected {
            return Ok(CasOutcome::Conflict(current));
        }
        let encoded = self.encode_value(&slot, new)?;
        file.entries.insert(slot, encoded);
        self.save(&file)?;
        info!(path = %self.path.display(), "Store entry written");
        Ok(CasOutcome::Swapped)
    }
}
