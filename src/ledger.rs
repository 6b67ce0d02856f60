//! Remaining-quantity ledgers
//!
//! A ledger is the append-only list of consumption entries booked against a
//! record's `quantity_total`: label follow-ups against an order, material
//! usage against a purchase, production output against a print order. The
//! remaining balance is always derived from the entries, never stored.
use super::error::LedgerError;
use super::record::{Record, TimeStamp};
use super::utils;
use chrono::Utc;
use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    // stored data may carry "" or null here, which sums as zero
    #[serde(default, deserialize_with = "lenient_amount")]
    pub amount: u64,
    #[serde(default)]
    pub note: Option<String>,
    pub occurred_at: TimeStamp<Utc>,
}

/// A new entry exactly as the user typed it, before validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryDraft {
    pub amount: String,
    pub note: Option<String>,
    pub occurred_at: TimeStamp<Utc>,
}

/// Whether a ledger insists on a remark for every entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NotePolicy {
    Required,
    #[default]
    Optional,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ledger {
    pub record_id: String,
    pub quantity_total: u64,
    pub entries: Vec<LedgerEntry>,
}

impl LedgerEntry {
    pub fn new(amount: u64, note: Option<String>, occurred_at: TimeStamp<Utc>) -> Self {
        Self {
            amount,
            note,
            occurred_at,
        }
    }
}

impl EntryDraft {
    pub fn new(amount: &str) -> Self {
        Self {
            amount: amount.to_owned(),
            note: None,
            occurred_at: TimeStamp::new(),
        }
    }
    pub fn with_note(mut self, note: &str) -> Self {
        self.note = Some(note.to_owned());
        self
    }
    pub fn occurred_at(mut self, at: TimeStamp<Utc>) -> Self {
        self.occurred_at = at;
        self
    }
}

pub fn consumed(entries: &[LedgerEntry]) -> u64 {
    entries
        .iter()
        .fold(0u64, |acc, e| acc.saturating_add(e.amount))
}

/// `quantity_total` minus everything consumed, floored at zero.
pub fn remaining(record: &Record, entries: &[LedgerEntry]) -> u64 {
    record.quantity_total.saturating_sub(consumed(entries))
}

/// Validates `draft` against the current balance and returns the entries
/// with it appended. `entries` itself is never touched.
pub fn append_entry(
    record: &Record,
    entries: &[LedgerEntry],
    draft: EntryDraft,
    policy: NotePolicy,
) -> Result<Vec<LedgerEntry>, LedgerError> {
    let entry = validate(record.quantity_total, entries, draft, policy)?;

    let mut updated = Vec::with_capacity(entries.len() + 1);
    updated.extend_from_slice(entries);
    updated.push(entry);
    Ok(updated)
}

/// The authorized edit of an order total. It may not drop below what has
/// already been consumed.
pub fn revise_total(
    record: &mut Record,
    entries: &[LedgerEntry],
    new_total: u64,
) -> Result<(), LedgerError> {
    let consumed = consumed(entries);
    if new_total < consumed {
        return Err(LedgerError::TotalBelowConsumed {
            requested: new_total,
            consumed,
        });
    }
    record.quantity_total = new_total;
    record.touch();
    Ok(())
}

fn validate(
    quantity_total: u64,
    entries: &[LedgerEntry],
    draft: EntryDraft,
    policy: NotePolicy,
) -> Result<LedgerEntry, LedgerError> {
    let amount = match utils::parse_quantity(&draft.amount) {
        Some(n) if n > 0 => n,
        _ => {
            return Err(LedgerError::InvalidAmount {
                raw: draft.amount,
            });
        }
    };

    let remaining = quantity_total.saturating_sub(consumed(entries));
    if amount > remaining {
        return Err(LedgerError::ExceedsRemaining {
            attempted: amount,
            remaining,
        });
    }

    let note = draft.note.filter(|n| !n.trim().is_empty());
    if policy == NotePolicy::Required && note.is_none() {
        return Err(LedgerError::MissingNote);
    }

    Ok(LedgerEntry::new(amount, note, draft.occurred_at))
}

impl Ledger {
    pub fn new(record: &Record) -> Self {
        Self::new_with(record, vec![])
    }
    pub fn new_with(record: &Record, entries: Vec<LedgerEntry>) -> Self {
        Self {
            record_id: record.id.clone(),
            quantity_total: record.quantity_total,
            entries,
        }
    }
    pub fn consumed(&self) -> u64 {
        consumed(&self.entries)
    }
    pub fn remaining(&self) -> u64 {
        self.quantity_total.saturating_sub(self.consumed())
    }
    /// Appends in place; on error the ledger is left as it was.
    pub fn append(&mut self, draft: EntryDraft, policy: NotePolicy) -> Result<u64, LedgerError> {
        let entry = validate(self.quantity_total, &self.entries, draft, policy)?;
        self.entries.push(entry);
        Ok(self.remaining())
    }
}

fn lenient_amount<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(utils::quantity_from_json(&value).unwrap_or(0))
}
