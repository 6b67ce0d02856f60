//! Configuration loading from config.toml
//!
//! The config names the store location, how many times an optimistic write
//! is retried, which ledgers insist on remarks, and how each collection's
//! upstream JSON maps onto canonical records.

use super::adapter::StageMapping;
use super::error::ConfigError;
use super::ledger::NotePolicy;
use super::store::SledBackend;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default = "default_retries")]
    pub max_update_retries: u32,
    #[serde(default)]
    pub ledgers: BTreeMap<String, LedgerConfig>,
    #[serde(default)]
    pub stages: BTreeMap<String, StageMapping>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StoreConfig {
    pub path: Option<PathBuf>,
    #[serde(default)]
    pub temporary: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LedgerConfig {
    #[serde(default)]
    pub require_note: bool,
}

fn default_retries() -> u32 {
    3
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            max_update_retries: default_retries(),
            ledgers: BTreeMap::new(),
            stages: BTreeMap::new(),
        }
    }
}

impl Config {
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    /// Note policy for a ledger; ledgers not listed are `Optional`.
    pub fn note_policy(&self, ledger: &str) -> NotePolicy {
        match self.ledgers.get(ledger) {
            Some(l) if l.require_note => NotePolicy::Required,
            _ => NotePolicy::Optional,
        }
    }

    pub fn stage(&self, collection: &str) -> Option<&StageMapping> {
        self.stages.get(collection)
    }

    pub fn open_backend(&self) -> Result<SledBackend, anyhow::Error> {
        if self.store.temporary {
            return Ok(SledBackend::temporary()?);
        }
        let path = self.store.path.as_ref().ok_or(ConfigError::MissingStorePath)?;
        Ok(SledBackend::open(path)?)
    }
}

/// Loads configuration from a TOML file.
///
/// # Errors
/// Returns an error if the file cannot be read or the TOML is invalid.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path.as_ref())?;
    Config::from_toml(&contents)
}

/// Loads configuration from the default location (./config.toml)
pub fn load_default_config() -> Result<Config, ConfigError> {
    load_config("config.toml")
}
