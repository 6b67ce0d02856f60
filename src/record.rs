//! Canonical pipeline record and its timestamps
use super::error::TransitionError;
use super::utils;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct TimeStamp<T: TimeZone>(DateTime<T>);

impl TimeStamp<Utc> {
    pub fn new() -> Self {
        Self(Utc::now())
    }
    pub fn new_with(
        year: i32,
        month: u32,
        day: u32,
        hour: u32,
        min: u32,
        sec: u32,
    ) -> Option<Self> {
        Utc.with_ymd_and_hms(year, month, day, hour, min, sec)
            .single()
            .map(Self)
    }
    pub fn to_datetime_utc(&self) -> DateTime<Utc> {
        self.0
    }
    pub fn day(&self) -> NaiveDate {
        self.0.date_naive()
    }
}

impl Default for TimeStamp<Utc> {
    fn default() -> Self {
        Self::new()
    }
}

// Utc itself has no ordering, so these can't be derived
impl PartialOrd for TimeStamp<Utc> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimeStamp<Utc> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.cmp(&other.0)
    }
}

impl<T: TimeZone> From<DateTime<T>> for TimeStamp<T> {
    fn from(value: DateTime<T>) -> Self {
        TimeStamp(value)
    }
}

impl Serialize for TimeStamp<Utc> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for TimeStamp<Utc> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        DateTime::<Utc>::deserialize(deserializer).map(TimeStamp)
    }
}

/// Pipeline stage a record currently sits in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    #[default]
    Order,
    Purchase,
    Production,
    Dispatch,
    Billing,
}

impl Stage {
    pub fn next(self) -> Option<Stage> {
        match self {
            Stage::Order => Some(Stage::Purchase),
            Stage::Purchase => Some(Stage::Production),
            Stage::Production => Some(Stage::Dispatch),
            Stage::Dispatch => Some(Stage::Billing),
            Stage::Billing => None,
        }
    }
}

// An order, purchase entry, production entry or bill, after stage adaptation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    #[serde(default)]
    pub group_keys: Vec<Option<String>>,
    #[serde(default)]
    pub quantity_total: u64,
    #[serde(default)]
    pub child_statuses: Vec<String>,
    // searchable attributes, multi-valued for nested line items
    #[serde(default)]
    pub fields: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub stage: Stage,
    pub created_at: TimeStamp<Utc>,
    pub updated_at: TimeStamp<Utc>,
}

impl Record {
    /// Creates a record with a fresh id under the given bech32 prefix, e.g. `"order_"`.
    pub fn new(hrp: &str) -> anyhow::Result<Self> {
        Ok(Self::new_with(utils::new_uuid_to_bech32(hrp)?))
    }
    pub fn new_with(id: String) -> Self {
        let now = TimeStamp::new();
        Self {
            id,
            group_keys: vec![],
            quantity_total: 0,
            child_statuses: vec![],
            fields: BTreeMap::new(),
            stage: Stage::Order,
            created_at: now.clone(),
            updated_at: now,
        }
    }
    pub fn set_quantity_total(mut self, total: u64) -> Self {
        self.quantity_total = total;
        self
    }
    pub fn push_group_key(mut self, key: Option<&str>) -> Self {
        self.group_keys.push(key.map(str::to_owned));
        self
    }
    pub fn push_child_status(mut self, status: &str) -> Self {
        self.child_statuses.push(status.to_owned());
        self
    }
    pub fn add_field(mut self, name: &str, value: &str) -> Self {
        self.fields
            .entry(name.to_owned())
            .or_default()
            .push(value.to_owned());
        self
    }
    pub fn set_stage(mut self, stage: Stage) -> Self {
        self.stage = stage;
        self
    }
    pub fn set_created_at(mut self, at: TimeStamp<Utc>) -> Self {
        self.created_at = at.clone();
        self.updated_at = at;
        self
    }

    /// The grouping attribute at `index`, if present and not blank.
    pub fn group_key(&self, index: usize) -> Option<&str> {
        self.group_keys
            .get(index)
            .and_then(Option::as_deref)
            .filter(|k| !k.trim().is_empty())
    }
    pub fn field(&self, name: &str) -> &[String] {
        self.fields.get(name).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn set_child_status(&mut self, index: usize, status: &str) -> Result<(), TransitionError> {
        let len = self.child_statuses.len();
        let slot = self
            .child_statuses
            .get_mut(index)
            .ok_or(TransitionError::NoSuchLine { index, len })?;
        *slot = status.to_owned();
        self.touch();
        Ok(())
    }
    pub fn move_to_next_stage(&mut self) -> Result<Stage, TransitionError> {
        let next = self.stage.next().ok_or(TransitionError::FinalStage)?;
        self.stage = next;
        self.touch();
        Ok(next)
    }
    pub(crate) fn touch(&mut self) {
        self.updated_at = TimeStamp::new();
    }
}
