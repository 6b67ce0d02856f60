//! Record Store: string key → JSON value, over a raw byte backend
use super::error::StoreError;
use super::migration::{Envelope, Migrator};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

/// Byte-level key-value operations the store needs from its backend.
pub trait KvBackend {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;
    fn set(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError>;
    fn remove(&self, key: &str) -> Result<(), StoreError>;
    fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, StoreError>;
    /// Writes `new` only if the current bytes equal `old` (`None` = absent).
    /// Returns whether the swap happened.
    fn compare_and_swap(
        &self,
        key: &str,
        old: Option<&[u8]>,
        new: Vec<u8>,
    ) -> Result<bool, StoreError>;
}

impl<B: KvBackend + ?Sized> KvBackend for &B {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        (**self).get(key)
    }
    fn set(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError> {
        (**self).set(key, value)
    }
    fn remove(&self, key: &str) -> Result<(), StoreError> {
        (**self).remove(key)
    }
    fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, StoreError> {
        (**self).scan_prefix(prefix)
    }
    fn compare_and_swap(
        &self,
        key: &str,
        old: Option<&[u8]>,
        new: Vec<u8>,
    ) -> Result<bool, StoreError> {
        (**self).compare_and_swap(key, old, new)
    }
}

/// Digest of the stored bytes a value was read from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Version(String);

impl Version {
    fn of(bytes: &[u8]) -> Self {
        Self(sha256::digest(bytes))
    }
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

pub struct SledBackend {
    instance: Arc<sled::Db>,
}

impl SledBackend {
    pub fn new(instance: Arc<sled::Db>) -> Self {
        Self { instance }
    }
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self, StoreError> {
        Ok(Self::new(Arc::new(sled::open(path)?)))
    }
    pub fn temporary() -> Result<Self, StoreError> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self::new(Arc::new(db)))
    }
    pub fn flush(&self) -> Result<(), StoreError> {
        self.instance.flush()?;
        Ok(())
    }
}

impl KvBackend for SledBackend {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.instance.get(key.as_bytes())?.map(|v| v.to_vec()))
    }
    fn set(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError> {
        self.instance.insert(key.as_bytes(), value)?;
        Ok(())
    }
    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.instance.remove(key.as_bytes())?;
        Ok(())
    }
    fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, StoreError> {
        self.instance
            .scan_prefix(prefix.as_bytes())
            .map(|item| -> Result<(String, Vec<u8>), StoreError> {
                let (k, v) = item?;
                let key = String::from_utf8(k.to_vec()).map_err(|e| StoreError::Decode {
                    key: String::from_utf8_lossy(&k).into_owned(),
                    reason: e.to_string(),
                })?;
                Ok((key, v.to_vec()))
            })
            .collect()
    }
    fn compare_and_swap(
        &self,
        key: &str,
        old: Option<&[u8]>,
        new: Vec<u8>,
    ) -> Result<bool, StoreError> {
        let swapped = self
            .instance
            .compare_and_swap(key.as_bytes(), old, Some(new))?;
        Ok(swapped.is_ok())
    }
}

/// Process-local backend, mainly for tests and previews.
#[derive(Default)]
pub struct MemoryBackend {
    map: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, Vec<u8>>>, StoreError> {
        self.map.lock().map_err(|_| StoreError::Poisoned)
    }
}

impl KvBackend for MemoryBackend {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.lock()?.get(key).cloned())
    }
    fn set(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError> {
        self.lock()?.insert(key.to_owned(), value);
        Ok(())
    }
    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.lock()?.remove(key);
        Ok(())
    }
    fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, StoreError> {
        Ok(self
            .lock()?
            .range(prefix.to_owned()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
    fn compare_and_swap(
        &self,
        key: &str,
        old: Option<&[u8]>,
        new: Vec<u8>,
    ) -> Result<bool, StoreError> {
        let mut map = self.lock()?;
        if map.get(key).map(Vec::as_slice) != old {
            return Ok(false);
        }
        map.insert(key.to_owned(), new);
        Ok(true)
    }
}

/// JSON values over a backend, framed in versioned envelopes.
pub struct RecordStore<B> {
    backend: B,
    migrator: Migrator,
}

impl<B: KvBackend> RecordStore<B> {
    pub fn new(backend: B) -> Self {
        Self::new_with(backend, Migrator::new())
    }
    pub fn new_with(backend: B, migrator: Migrator) -> Self {
        Self { backend, migrator }
    }
    pub fn backend(&self) -> &B {
        &self.backend
    }
    pub fn schema_version(&self) -> u32 {
        self.migrator.current_version()
    }

    pub fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.get_versioned(key)?.map(|(value, _)| value))
    }

    /// The value migrated to the current schema, plus the version token of
    /// the bytes it came from.
    pub fn get_versioned(&self, key: &str) -> Result<Option<(Value, Version)>, StoreError> {
        let Some(bytes) = self.backend.get(key)? else {
            return Ok(None);
        };
        let value = self.decode(key, &bytes)?;
        Ok(Some((value, Version::of(&bytes))))
    }

    pub fn set(&self, key: &str, value: &Value) -> Result<(), StoreError> {
        self.backend.set(key, self.encode(value)?)
    }

    pub fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.backend.remove(key)
    }

    /// Every key under `prefix` in key order, values migrated.
    pub fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Value)>, StoreError> {
        self.backend
            .scan_prefix(prefix)?
            .into_iter()
            .map(|(key, bytes)| -> Result<(String, Value), StoreError> {
                let value = self.decode(&key, &bytes)?;
                Ok((key, value))
            })
            .collect()
    }

    /// Writes `value` only if the key still holds what `expected` was read
    /// from (`None` = the key must be absent). Fails with
    /// [`StoreError::Conflict`] otherwise.
    pub fn update_if_unchanged(
        &self,
        key: &str,
        expected: Option<&Version>,
        value: &Value,
    ) -> Result<Version, StoreError> {
        let conflict = || StoreError::Conflict {
            key: key.to_owned(),
        };
        let current = self.backend.get(key)?;
        if current.as_deref().map(Version::of).as_ref() != expected {
            return Err(conflict());
        }

        let bytes = self.encode(value)?;
        let version = Version::of(&bytes);
        if self
            .backend
            .compare_and_swap(key, current.as_deref(), bytes)?
        {
            Ok(version)
        } else {
            Err(conflict())
        }
    }

    fn encode(&self, value: &Value) -> Result<Vec<u8>, StoreError> {
        Envelope::new(self.migrator.current_version(), value)
            .map_err(|e| StoreError::Encode(e.to_string()))?
            .encode()
            .map_err(|e| StoreError::Encode(e.to_string()))
    }

    fn decode(&self, key: &str, bytes: &[u8]) -> Result<Value, StoreError> {
        let (version, payload) = Envelope::decode(bytes).map_err(|e| StoreError::Decode {
            key: key.to_owned(),
            reason: e.to_string(),
        })?;
        Ok(self.migrator.migrate(version, payload)?)
    }
}
