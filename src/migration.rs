//! Schema versioning for stored values
//!
//! Every value is written inside an envelope carrying its schema version.
//! On load, registered steps lift the payload one version at a time up to the
//! migrator's current version. Anything that cannot be lifted is an error;
//! stored data is never dropped to make a version mismatch go away.
use super::error::MigrationError;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::info;

type Step = Box<dyn Fn(Value) -> anyhow::Result<Value> + Send + Sync>;

/// Frame written to the backend for every value.
#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct Envelope {
    #[n(0)]
    pub schema_version: u32,
    #[n(1)]
    pub payload: String, // JSON text
}

pub struct Migrator {
    current: u32,
    steps: BTreeMap<u32, Step>,
}

impl Envelope {
    pub fn new(schema_version: u32, payload: &Value) -> serde_json::Result<Self> {
        Ok(Self {
            schema_version,
            payload: serde_json::to_string(payload)?,
        })
    }
    pub fn encode(&self) -> anyhow::Result<Vec<u8>> {
        Ok(minicbor::to_vec(self)?)
    }
    /// Bytes that are not an envelope but do parse as JSON were written
    /// before versioning existed, and load as version 0.
    pub fn decode(bytes: &[u8]) -> anyhow::Result<(u32, Value)> {
        match minicbor::decode::<Envelope>(bytes) {
            Ok(envelope) => Ok((envelope.schema_version, serde_json::from_str(&envelope.payload)?)),
            Err(cbor) => {
                let legacy: Value = serde_json::from_slice(bytes)
                    .map_err(|_| anyhow::anyhow!("neither an envelope ({cbor}) nor legacy JSON"))?;
                Ok((0, legacy))
            }
        }
    }
}

impl Migrator {
    /// A migrator for data that needs no lifting: current version 0.
    pub fn new() -> Self {
        Self::new_with(0)
    }
    pub fn new_with(current: u32) -> Self {
        Self {
            current,
            steps: BTreeMap::new(),
        }
    }
    pub fn current_version(&self) -> u32 {
        self.current
    }

    /// Registers the step lifting `from` to `from + 1`.
    pub fn register(
        &mut self,
        from: u32,
        step: impl Fn(Value) -> anyhow::Result<Value> + Send + Sync + 'static,
    ) -> Result<(), MigrationError> {
        if self.steps.contains_key(&from) {
            return Err(MigrationError::AlreadyRegistered { from });
        }
        self.steps.insert(from, Box::new(step));
        Ok(())
    }
    /// Builder form of [`Migrator::register`].
    pub fn with_step(
        mut self,
        from: u32,
        step: impl Fn(Value) -> anyhow::Result<Value> + Send + Sync + 'static,
    ) -> Result<Self, MigrationError> {
        self.register(from, step)?;
        Ok(self)
    }

    pub fn migrate(&self, found: u32, mut payload: Value) -> Result<Value, MigrationError> {
        if found > self.current {
            return Err(MigrationError::FutureVersion {
                found,
                supported: self.current,
            });
        }
        for from in found..self.current {
            let step = self
                .steps
                .get(&from)
                .ok_or(MigrationError::MissingStep { from })?;
            payload = step(payload).map_err(|source| MigrationError::StepFailed { from, source })?;
        }
        if found < self.current {
            info!(from = found, to = self.current, "migrated stored value");
        }
        Ok(payload)
    }
}

impl Default for Migrator {
    fn default() -> Self {
        Self::new()
    }
}
