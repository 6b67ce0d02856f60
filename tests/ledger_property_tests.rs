//! Property-based tests for the remaining-quantity ledger
//!
//! The remaining balance is derived, never stored, so every property here is
//! about what `append_entry` lets into a ledger and what `remaining` reports
//! afterwards, across random totals and random sequences of typed amounts.

use proptest::prelude::*;
use iml_ops::{
    error::LedgerError,
    ledger::{self, EntryDraft, LedgerEntry, NotePolicy},
    record::{Record, TimeStamp},
};

fn order(total: u64) -> Record {
    Record::new_with("order_prop".to_string()).set_quantity_total(total)
}

/// Amounts as a user might type them, mostly within a realistic order size
fn draft_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        4 => (1u64..=20_000).prop_map(|n| n.to_string()),
        1 => (1u64..=20_000).prop_map(|n| format!("{},{:03}", n / 1000, n % 1000)),
        1 => Just("0".to_string()),
        1 => Just("-10".to_string()),
        1 => Just("ten".to_string()),
    ]
}

/// Replays drafts, keeping only the accepted ones
fn replay(record: &Record, drafts: &[String]) -> Vec<LedgerEntry> {
    drafts.iter().fold(Vec::<LedgerEntry>::new(), |entries, raw| {
        ledger::append_entry(record, &entries, EntryDraft::new(raw), NotePolicy::Optional)
            .unwrap_or(entries)
    })
}

proptest! {
    /// Property: accepted entries never consume more than the total
    ///
    /// Whatever sequence of amounts is typed, the sum of what got in stays at
    /// or below the order total and remaining is exactly the difference.
    #[test]
    fn prop_consumed_never_exceeds_total(
        total in 0u64..=50_000,
        drafts in prop::collection::vec(draft_strategy(), 0..=20),
    ) {
        let record = order(total);
        let entries = replay(&record, &drafts);

        prop_assert!(ledger::consumed(&entries) <= total);
        prop_assert_eq!(ledger::remaining(&record, &entries), total - ledger::consumed(&entries));
    }

    /// Property: each accepted entry lowers remaining by exactly its amount
    #[test]
    fn prop_remaining_decreases_by_entry_amount(
        total in 1u64..=50_000,
        drafts in prop::collection::vec(draft_strategy(), 1..=20),
    ) {
        let record = order(total);
        let mut entries: Vec<LedgerEntry> = vec![];
        for raw in &drafts {
            let before = ledger::remaining(&record, &entries);
            if let Ok(updated) =
                ledger::append_entry(&record, &entries, EntryDraft::new(raw), NotePolicy::Optional)
            {
                let amount = updated.last().map(|e| e.amount).unwrap_or_default();
                prop_assert!(amount > 0);
                prop_assert_eq!(ledger::remaining(&record, &updated), before - amount);
                entries = updated;
            }
        }
    }

    /// Property: an amount above the balance is rejected with both numbers
    /// and the ledger is left untouched
    #[test]
    fn prop_overdraw_is_rejected_and_reported(
        total in 0u64..=10_000,
        consumed in 0u64..=10_000,
        excess in 1u64..=10_000,
    ) {
        prop_assume!(consumed <= total);
        let record = order(total);
        let entries = if consumed > 0 {
            vec![LedgerEntry::new(consumed, None, TimeStamp::new())]
        } else {
            vec![]
        };
        let remaining = total - consumed;
        let attempted = remaining + excess;

        let result = ledger::append_entry(
            &record,
            &entries,
            EntryDraft::new(&attempted.to_string()),
            NotePolicy::Optional,
        );
        prop_assert_eq!(result, Err(LedgerError::ExceedsRemaining { attempted, remaining }));
        prop_assert_eq!(ledger::remaining(&record, &entries), remaining);
    }

    /// Property: remaining is floored at zero even when stored entries
    /// overshoot the total, e.g. after an older total was revised down
    #[test]
    fn prop_remaining_is_never_negative(
        total in 0u64..=1_000,
        amounts in prop::collection::vec(0u64..=1_000, 0..=10),
    ) {
        let record = order(total);
        let entries: Vec<LedgerEntry> = amounts
            .into_iter()
            .map(|a| LedgerEntry::new(a, None, TimeStamp::new()))
            .collect();

        let remaining = ledger::remaining(&record, &entries);
        prop_assert!(remaining <= total);
        if ledger::consumed(&entries) >= total {
            prop_assert_eq!(remaining, 0);
        }
    }

    /// Property: a blank remark does not satisfy a required note
    #[test]
    fn prop_blank_required_note_is_rejected(amount in 1u64..=100, note in "[ \t]{0,3}") {
        let record = order(100);
        let draft = EntryDraft::new(&amount.to_string()).with_note(&note);

        let result = ledger::append_entry(&record, &[], draft, NotePolicy::Required);
        prop_assert_eq!(result, Err(LedgerError::MissingNote));
    }
}
