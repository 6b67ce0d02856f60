//! Service layer API for pipeline records and their ledgers
use super::config::Config;
use super::error::StoreError;
use super::filter::{FacetFilter, FilterSpec};
use super::hierarchy::{GroupLevel, GroupNode, HierarchyBuilder};
use super::ledger::{self, EntryDraft, LedgerEntry};
use super::record::{Record, Stage};
use super::store::{KvBackend, RecordStore};
use anyhow::Context;
use serde_json::Value;
use tracing::{debug, info, warn};

const RECORD_PREFIX: &str = "record";
const LEDGER_PREFIX: &str = "ledger";

pub struct OpsService<B> {
    store: RecordStore<B>,
    config: Config,
}

impl<B: KvBackend> OpsService<B> {
    pub fn new(store: RecordStore<B>, config: Config) -> Self {
        Self { store, config }
    }
    pub fn store(&self) -> &RecordStore<B> {
        &self.store
    }
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Insert or overwrite a record
    pub fn put_record(&self, collection: &str, record: &Record) -> anyhow::Result<()> {
        let key = record_key(collection, &record.id)?;
        self.store.set(&key, &serde_json::to_value(record)?)?;
        Ok(())
    }

    pub fn get_record(&self, collection: &str, id: &str) -> anyhow::Result<Option<Record>> {
        let key = record_key(collection, id)?;
        match self.store.get(&key)? {
            Some(value) => Ok(Some(decode_record(&key, value)?)),
            None => Ok(None),
        }
    }

    /// All records of a collection, oldest first (ties by id)
    pub fn list_records(&self, collection: &str) -> anyhow::Result<Vec<Record>> {
        let prefix = record_prefix(collection)?;
        let mut records = self
            .store
            .scan_prefix(&prefix)?
            .into_iter()
            .map(|(key, value)| decode_record(&key, value))
            .collect::<anyhow::Result<Vec<_>>>()?;
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(records)
    }

    /// Adapt raw upstream JSON through the collection's configured stage
    /// mapping and store the resulting records
    pub fn import(&self, collection: &str, raw: &[Value]) -> anyhow::Result<Vec<Record>> {
        let mapping = self
            .config
            .stage(collection)
            .with_context(|| format!("No stage mapping configured for '{collection}'"))?;
        let records = mapping.to_records(raw)?;
        for record in &records {
            self.put_record(collection, record)?;
        }
        info!(%collection, count = records.len(), "imported records");
        Ok(records)
    }

    /// Remove a record together with every ledger booked against it
    pub fn remove_record(&self, collection: &str, id: &str) -> anyhow::Result<()> {
        let key = record_key(collection, id)?;
        for ledger_key in self.ledger_keys_for(collection, id)? {
            self.store.remove(&ledger_key)?;
        }
        self.store.remove(&key)?;
        info!(%collection, %id, "removed record");
        Ok(())
    }

    pub fn entries(
        &self,
        collection: &str,
        ledger: &str,
        record_id: &str,
    ) -> anyhow::Result<Vec<LedgerEntry>> {
        let key = ledger_key(collection, ledger, record_id)?;
        match self.store.get(&key)? {
            Some(value) => decode_entries(&key, value),
            None => Ok(vec![]),
        }
    }

    pub fn remaining(
        &self,
        collection: &str,
        record_id: &str,
        ledger: &str,
    ) -> anyhow::Result<u64> {
        let record = self.require_record(collection, record_id)?;
        Ok(ledger::remaining(&record, &self.entries(collection, ledger, record_id)?))
    }

    /// Validate and append an entry to a record's ledger.
    /// The ledger's note policy comes from config; concurrent appends are
    /// retried against the fresh balance.
    pub fn append_entry(
        &self,
        collection: &str,
        record_id: &str,
        ledger: &str,
        draft: EntryDraft,
    ) -> anyhow::Result<Vec<LedgerEntry>> {
        let record = self.require_record(collection, record_id)?;
        let policy = self.config.note_policy(ledger);
        let key = ledger_key(collection, ledger, record_id)?;

        for attempt in 1..=self.attempts() {
            let (entries, version) = match self.store.get_versioned(&key)? {
                Some((value, version)) => (decode_entries(&key, value)?, Some(version)),
                None => (vec![], None),
            };

            let updated = ledger::append_entry(&record, &entries, draft.clone(), policy)
                .with_context(|| {
                    format!("Entry rejected for '{record_id}' in ledger '{ledger}'")
                })?;

            match self
                .store
                .update_if_unchanged(&key, version.as_ref(), &serde_json::to_value(&updated)?)
            {
                Ok(_) => {
                    info!(
                        %ledger,
                        %record_id,
                        remaining = ledger::remaining(&record, &updated),
                        "ledger entry appended"
                    );
                    return Ok(updated);
                }
                Err(StoreError::Conflict { .. }) => {
                    warn!(%key, attempt, "ledger changed while appending, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(StoreError::Conflict { key }.into())
    }

    /// Authorized change of a record's total; it must still cover what every
    /// one of its ledgers has consumed
    pub fn revise_total(
        &self,
        collection: &str,
        record_id: &str,
        new_total: u64,
    ) -> anyhow::Result<Record> {
        let booked = self.all_entries_for(collection, record_id)?;
        let heaviest = booked
            .iter()
            .max_by_key(|entries| ledger::consumed(entries))
            .cloned()
            .unwrap_or_default();

        let (record, ()) = self.update_record(collection, record_id, |record| {
            ledger::revise_total(record, &heaviest, new_total)?;
            Ok(())
        })?;
        info!(%collection, %record_id, new_total, "quantity total revised");
        Ok(record)
    }

    pub fn set_child_status(
        &self,
        collection: &str,
        record_id: &str,
        index: usize,
        status: &str,
    ) -> anyhow::Result<Record> {
        let (record, ()) = self.update_record(collection, record_id, |record| {
            record.set_child_status(index, status)?;
            Ok(())
        })?;
        Ok(record)
    }

    /// Move a record on to its next pipeline stage
    pub fn advance_stage(&self, collection: &str, record_id: &str) -> anyhow::Result<Stage> {
        let (_, stage) =
            self.update_record(collection, record_id, |record| Ok(record.move_to_next_stage()?))?;
        info!(%collection, %record_id, ?stage, "record advanced");
        Ok(stage)
    }

    /// Filter a collection, then group what is left
    pub fn query(
        &self,
        collection: &str,
        facets: &FacetFilter,
        spec: &FilterSpec,
        builder: &HierarchyBuilder<'_, Record>,
    ) -> anyhow::Result<GroupNode<Record>> {
        let records = self.list_records(collection)?;
        let filtered = facets.apply(&records, spec)?;
        debug!(%collection, total = records.len(), matched = filtered.len(), "query filtered");
        Ok(builder.group(&filtered))
    }

    /// [`OpsService::query`] with first-seen ordering over `levels`
    pub fn query_grouped(
        &self,
        collection: &str,
        facets: &FacetFilter,
        spec: &FilterSpec,
        levels: Vec<GroupLevel<'_, Record>>,
    ) -> anyhow::Result<GroupNode<Record>> {
        self.query(collection, facets, spec, &HierarchyBuilder::new(levels))
    }

    fn attempts(&self) -> u32 {
        self.config.max_update_retries.saturating_add(1)
    }

    fn require_record(&self, collection: &str, id: &str) -> anyhow::Result<Record> {
        self.get_record(collection, id)?.ok_or_else(|| {
            StoreError::NotFound {
                key: format!("{RECORD_PREFIX}:{collection}:{id}"),
            }
            .into()
        })
    }

    // exact match on the parsed key, ids sharing a suffix stay apart
    fn ledger_keys_for(&self, collection: &str, record_id: &str) -> anyhow::Result<Vec<String>> {
        let prefix = ledger_prefix(collection)?;
        Ok(self
            .store
            .scan_prefix(&prefix)?
            .into_iter()
            .map(|(key, _)| key)
            .filter(|key| {
                key.strip_prefix(&prefix)
                    .and_then(|rest| rest.split_once(':'))
                    .is_some_and(|(_, id)| id == record_id)
            })
            .collect())
    }

    fn all_entries_for(
        &self,
        collection: &str,
        record_id: &str,
    ) -> anyhow::Result<Vec<Vec<LedgerEntry>>> {
        let mut booked = vec![];
        for key in self.ledger_keys_for(collection, record_id)? {
            if let Some(value) = self.store.get(&key)? {
                booked.push(decode_entries(&key, value)?);
            }
        }
        Ok(booked)
    }

    // read-modify-write of one record under compare-and-swap
    fn update_record<R>(
        &self,
        collection: &str,
        record_id: &str,
        mut apply: impl FnMut(&mut Record) -> anyhow::Result<R>,
    ) -> anyhow::Result<(Record, R)> {
        let key = record_key(collection, record_id)?;
        for attempt in 1..=self.attempts() {
            let (value, version) = self
                .store
                .get_versioned(&key)?
                .ok_or_else(|| StoreError::NotFound { key: key.clone() })?;
            let mut record = decode_record(&key, value)?;
            let out = apply(&mut record)?;

            match self
                .store
                .update_if_unchanged(&key, Some(&version), &serde_json::to_value(&record)?)
            {
                Ok(_) => return Ok((record, out)),
                Err(StoreError::Conflict { .. }) => {
                    warn!(%key, attempt, "record changed during update, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(StoreError::Conflict { key }.into())
    }
}

// names and ids become key segments, so none of them may hold the separator
fn check_segment(kind: &str, segment: &str) -> anyhow::Result<()> {
    if segment.is_empty() || segment.contains(':') {
        anyhow::bail!("Invalid {kind} '{segment}'");
    }
    Ok(())
}

fn record_prefix(collection: &str) -> anyhow::Result<String> {
    check_segment("collection name", collection)?;
    Ok(format!("{RECORD_PREFIX}:{collection}:"))
}

fn record_key(collection: &str, id: &str) -> anyhow::Result<String> {
    check_segment("record id", id)?;
    Ok(format!("{}{id}", record_prefix(collection)?))
}

fn ledger_prefix(collection: &str) -> anyhow::Result<String> {
    check_segment("collection name", collection)?;
    Ok(format!("{LEDGER_PREFIX}:{collection}:"))
}

fn ledger_key(collection: &str, ledger: &str, record_id: &str) -> anyhow::Result<String> {
    check_segment("ledger name", ledger)?;
    check_segment("record id", record_id)?;
    Ok(format!("{}{ledger}:{record_id}", ledger_prefix(collection)?))
}

fn decode_record(key: &str, value: Value) -> anyhow::Result<Record> {
    serde_json::from_value(value).with_context(|| format!("Stored record at '{key}' is malformed"))
}

fn decode_entries(key: &str, value: Value) -> anyhow::Result<Vec<LedgerEntry>> {
    serde_json::from_value(value).with_context(|| format!("Stored ledger at '{key}' is malformed"))
}
