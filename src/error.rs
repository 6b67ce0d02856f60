//! Error kinds for every layer of the crate
use chrono::NaiveDate;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Entry of {attempted} exceeds the remaining balance of {remaining}")]
    ExceedsRemaining { attempted: u64, remaining: u64 },
    #[error("'{raw}' is not a valid positive quantity")]
    InvalidAmount { raw: String },
    #[error("A note is required for this ledger")]
    MissingNote,
    #[error("Total of {requested} is below the {consumed} already consumed")]
    TotalBelowConsumed { requested: u64, consumed: u64 },
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum FilterError {
    #[error("Date range starts on {from} which is after its end {to}")]
    InvalidDateRange { from: NaiveDate, to: NaiveDate },
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum StatusError {
    #[error("Status precedence must contain at least one status")]
    Empty,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    #[error("Record is already in its final stage")]
    FinalStage,
    #[error("Record has no line item at index {index} (it has {len})")]
    NoSuchLine { index: usize, len: usize },
}

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("Backend failure: {0}")]
    Backend(#[from] sled::Error),
    #[error("Nothing stored under '{key}'")]
    NotFound { key: String },
    #[error("Value under '{key}' changed since it was read")]
    Conflict { key: String },
    #[error("Value under '{key}' could not be decoded: {reason}")]
    Decode { key: String, reason: String },
    #[error("Failed to encode value: {0}")]
    Encode(String),
    #[error("In-memory backend lock was poisoned")]
    Poisoned,
    #[error(transparent)]
    Migration(#[from] MigrationError),
}

#[derive(thiserror::Error, Debug)]
pub enum MigrationError {
    #[error("Stored schema version {found} is newer than supported version {supported}")]
    FutureVersion { found: u32, supported: u32 },
    #[error("No migration registered from schema version {from}")]
    MissingStep { from: u32 },
    #[error("A migration from schema version {from} is already registered")]
    AlreadyRegistered { from: u32 },
    #[error("Migration from schema version {from} failed: {source}")]
    StepFailed {
        from: u32,
        #[source]
        source: anyhow::Error,
    },
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Read(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Store needs either a path or `temporary = true`")]
    MissingStorePath,
}
