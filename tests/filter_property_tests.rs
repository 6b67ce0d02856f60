//! Property-based tests for the facet filter
//!
//! Filtering only ever removes records: it keeps input order, an empty spec
//! is the identity, and applying the same spec twice changes nothing.

use chrono::NaiveDate;
use proptest::prelude::*;
use iml_ops::{
    filter::{FacetFilter, FilterSpec},
    record::{Record, TimeStamp},
};

const COMPANIES: [&str; 4] = ["Acme", "Borealis", "Cygnus Plastics", ""];
const PRODUCTS: [&str; 4] = ["Lid 250", "Tub 500", "LID 1000", "Sleeve"];

fn record_strategy() -> impl Strategy<Value = Record> {
    (0usize..4, prop::collection::vec(0usize..4, 0..=3), 1u32..=28, 1u32..=12).prop_map(
        |(company, products, day, month)| {
            let mut record = Record::new_with(format!("{company}-{day}-{month}"))
                .add_field("companyName", COMPANIES[company])
                .set_created_at(TimeStamp::new_with(2024, month, day, 9, 0, 0).unwrap_or_default());
            for p in products {
                record = record.add_field("imlName", PRODUCTS[p]);
            }
            record
        },
    )
}

fn spec_strategy() -> impl Strategy<Value = FilterSpec> {
    (
        prop::option::of(prop_oneof![Just("lid"), Just("acme"), Just("  "), Just("tub 5")]),
        prop::option::of(0usize..4),
        prop::option::of((1u32..=12, 0u32..=3)),
    )
        .prop_map(|(search, company, range)| {
            let mut spec = FilterSpec::new();
            if let Some(text) = search {
                spec = spec.search(text);
            }
            if let Some(c) = company {
                spec = spec.exact("companyName", COMPANIES[c]);
            }
            if let Some((month, span)) = range {
                let from = NaiveDate::from_ymd_opt(2024, month, 1);
                let to = NaiveDate::from_ymd_opt(2024, (month + span).min(12), 28);
                spec = spec.between(from, to);
            }
            spec
        })
}

fn facets() -> FacetFilter {
    FacetFilter::new(&["companyName", "imlName"]).with_date_field("created_at")
}

proptest! {
    /// Property: an empty spec returns the input unchanged
    #[test]
    fn prop_empty_spec_is_identity(records in prop::collection::vec(record_strategy(), 0..=20)) {
        let kept = facets().apply(&records, &FilterSpec::new()).unwrap();
        prop_assert_eq!(kept, records);
    }

    /// Property: the result is an order-preserving subsequence of the input
    #[test]
    fn prop_result_is_a_subsequence(
        records in prop::collection::vec(record_strategy(), 0..=20),
        spec in spec_strategy(),
    ) {
        let kept = facets().apply(&records, &spec).unwrap();
        let mut remaining = records.iter();
        for record in &kept {
            prop_assert!(remaining.any(|r| r == record));
        }
    }

    /// Property: filtering is idempotent
    #[test]
    fn prop_filter_is_idempotent(
        records in prop::collection::vec(record_strategy(), 0..=20),
        spec in spec_strategy(),
    ) {
        let once = facets().apply(&records, &spec).unwrap();
        let twice = facets().apply(&once, &spec).unwrap();
        prop_assert_eq!(once, twice);
    }

    /// Property: every kept record satisfies the date range it was filtered by
    #[test]
    fn prop_kept_records_are_in_range(
        records in prop::collection::vec(record_strategy(), 0..=20),
        month in 1u32..=12,
    ) {
        let from = NaiveDate::from_ymd_opt(2024, month, 1);
        let to = NaiveDate::from_ymd_opt(2024, month, 28);
        let kept = facets().apply(&records, &FilterSpec::new().between(from, to)).unwrap();

        for record in kept {
            let day = record.created_at.day();
            prop_assert!(Some(day) >= from && Some(day) <= to);
        }
    }
}
