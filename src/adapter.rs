//! Normalizes the per-stage JSON shapes into canonical records and entries
//!
//! Each pipeline stage names the same ideas differently (`lidLabelQty`,
//! `tubLabelQty` and `quantity` all mean "ordered amount"). A [`StageMapping`]
//! states where each canonical field lives so the core never branches on
//! stage-specific field names.
use super::filter::Facets;
use super::ledger::LedgerEntry;
use super::record::{Record, Stage, TimeStamp};
use super::utils;
use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StageMapping {
    pub stage: Stage,
    pub id_field: String,
    pub quantity_field: Option<String>,
    // dotted paths, one per grouping level
    pub group_fields: Vec<String>,
    pub status_path: Option<String>,
    pub search_fields: Vec<String>,
    pub created_field: Option<String>,
    pub updated_field: Option<String>,
    pub entries: EntryMapping,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntryMapping {
    // summed; ["accepted"] or ["accepted", "rejected", "wastage"] per use-site
    pub amount_fields: Vec<String>,
    pub note_field: Option<String>,
    pub date_field: Option<String>,
}

impl Default for EntryMapping {
    fn default() -> Self {
        Self {
            amount_fields: vec!["quantity".into()],
            note_field: Some("remarks".into()),
            date_field: Some("date".into()),
        }
    }
}

impl StageMapping {
    pub fn new(stage: Stage, id_field: &str) -> Self {
        Self {
            stage,
            id_field: id_field.to_owned(),
            ..Self::default()
        }
    }

    pub fn to_record(&self, raw: &Value) -> anyhow::Result<Record> {
        let id = first(raw, &self.id_field)
            .with_context(|| format!("record has no '{}' field", self.id_field))?;

        let mut record = Record::new_with(id).set_stage(self.stage);
        record.quantity_total = self
            .quantity_field
            .as_deref()
            .map_or(0, |field| lenient_quantity(raw, field, &record.id));
        record.group_keys = self.group_fields.iter().map(|f| first(raw, f)).collect();
        if let Some(path) = &self.status_path {
            record.child_statuses = raw.facet_values(path);
        }
        for field in &self.search_fields {
            let values = raw.facet_values(field);
            if !values.is_empty() {
                record.fields.insert(field.clone(), values);
            }
        }
        if let Some(at) = self.created_field.as_deref().and_then(|f| instant(raw, f)) {
            record = record.set_created_at(at);
        }
        if let Some(at) = self.updated_field.as_deref().and_then(|f| instant(raw, f)) {
            record.updated_at = at;
        }
        Ok(record)
    }

    pub fn to_records(&self, raw: &[Value]) -> anyhow::Result<Vec<Record>> {
        raw.iter().map(|r| self.to_record(r)).collect()
    }

    /// Entries never fail to adapt: a missing amount is a zero entry and a
    /// missing date is "now".
    pub fn to_entry(&self, raw: &Value) -> LedgerEntry {
        let mapping = &self.entries;
        let amount = mapping
            .amount_fields
            .iter()
            .map(|f| lenient_quantity(raw, f, "ledger entry"))
            .fold(0u64, u64::saturating_add);
        let note = mapping
            .note_field
            .as_deref()
            .and_then(|f| first(raw, f))
            .filter(|n| !n.trim().is_empty());
        let occurred_at = mapping
            .date_field
            .as_deref()
            .and_then(|f| instant(raw, f))
            .unwrap_or_default();
        LedgerEntry::new(amount, note, occurred_at)
    }

    pub fn to_entries(&self, raw: &[Value]) -> Vec<LedgerEntry> {
        raw.iter().map(|e| self.to_entry(e)).collect()
    }
}

fn first(raw: &Value, path: &str) -> Option<String> {
    raw.facet_values(path)
        .into_iter()
        .find(|v| !v.trim().is_empty())
}

fn lenient_quantity(raw: &Value, path: &str, owner: &str) -> u64 {
    let Some(value) = lookup(raw, path) else {
        return 0;
    };
    match utils::quantity_from_json(value) {
        Some(n) => n,
        None => {
            let blank = value.as_str().is_some_and(|s| s.trim().is_empty());
            if !matches!(value, Value::Null) && !blank {
                warn!(%owner, field = %path, ?value, "unreadable quantity counted as zero");
            }
            0
        }
    }
}

fn lookup<'v>(raw: &'v Value, path: &str) -> Option<&'v Value> {
    path.split('.').try_fold(raw, |v, key| v.get(key))
}

fn instant(raw: &Value, path: &str) -> Option<TimeStamp<Utc>> {
    let text = first(raw, path)?;
    if let Ok(dt) = DateTime::parse_from_rfc3339(&text) {
        return Some(dt.with_timezone(&Utc).into());
    }
    let day = utils::parse_day(&text)?;
    Some(day.and_hms_opt(0, 0, 0)?.and_utc().into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn iml_orders() -> StageMapping {
        StageMapping {
            quantity_field: Some("lidLabelQty".into()),
            group_fields: vec!["companyName".into(), "orderNumber".into()],
            status_path: Some("products.designStatus".into()),
            search_fields: vec!["companyName".into(), "products.imlName".into()],
            created_field: Some("createdAt".into()),
            ..StageMapping::new(Stage::Order, "id")
        }
    }

    #[test]
    fn maps_an_iml_order() {
        let raw = json!({
            "id": 17,
            "companyName": "Acme",
            "orderNumber": "O1",
            "lidLabelQty": "10,000",
            "createdAt": "2024-06-15",
            "products": [
                {"imlName": "Lid 250", "designStatus": "pending"},
                {"imlName": "Tub 250", "designStatus": "approved"}
            ]
        });
        let record = iml_orders().to_record(&raw).unwrap();

        assert_eq!(record.id, "17");
        assert_eq!(record.quantity_total, 10_000);
        assert_eq!(record.group_key(0), Some("Acme"));
        assert_eq!(record.group_key(1), Some("O1"));
        assert_eq!(record.child_statuses, vec!["pending", "approved"]);
        assert_eq!(record.field("products.imlName"), ["Lid 250", "Tub 250"]);
        assert_eq!(record.created_at, TimeStamp::new_with(2024, 6, 15, 0, 0, 0).unwrap());
    }

    #[test]
    fn missing_id_is_an_error() {
        assert!(iml_orders().to_record(&json!({"companyName": "Acme"})).is_err());
    }

    #[test]
    fn missing_quantity_and_keys_are_tolerated() {
        let record = iml_orders().to_record(&json!({"id": "x"})).unwrap();
        assert_eq!(record.quantity_total, 0);
        assert_eq!(record.group_keys, vec![None, None]);
    }

    #[test]
    fn production_entries_sum_every_configured_part() {
        let mut mapping = StageMapping::new(Stage::Production, "id");
        mapping.entries.amount_fields =
            vec!["accepted".into(), "rejected".into(), "wastage".into()];

        let entry = mapping.to_entry(&json!({
            "accepted": "1,000",
            "rejected": 20,
            "wastage": "",
            "remarks": "night shift",
            "date": "2024-06-15"
        }));
        assert_eq!(entry.amount, 1_020);
        assert_eq!(entry.note.as_deref(), Some("night shift"));
        assert_eq!(entry.occurred_at.day(), chrono::NaiveDate::from_ymd_opt(2024, 6, 15).unwrap());

        mapping.entries.amount_fields = vec!["accepted".into()];
        assert_eq!(mapping.to_entry(&json!({"accepted": 1000, "rejected": 20})).amount, 1_000);
    }
}
