//! Multi-facet filtering of record lists before grouping
use super::error::FilterError;
use super::record::Record;
use super::utils;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Named, possibly multi-valued attributes a filter can look at.
pub trait Facets {
    fn facet_values(&self, field: &str) -> Vec<String>;

    fn facet_day(&self, field: &str) -> Option<NaiveDate> {
        self.facet_values(field)
            .iter()
            .find_map(|v| utils::parse_day(v))
    }
}

/// Inclusive calendar-day bounds, either side may be open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DateRange {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FilterSpec {
    #[serde(default)]
    pub search_text: Option<String>,
    #[serde(default)]
    pub exact_match: BTreeMap<String, String>,
    #[serde(default)]
    pub date_range: Option<DateRange>,
}

/// Which fields a page searches and which date it ranges over.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FacetFilter {
    pub search_fields: Vec<String>,
    pub date_field: Option<String>,
}

impl DateRange {
    pub fn new(from: Option<NaiveDate>, to: Option<NaiveDate>) -> Self {
        Self { from, to }
    }
    pub fn validate(&self) -> Result<(), FilterError> {
        match (self.from, self.to) {
            (Some(from), Some(to)) if from > to => Err(FilterError::InvalidDateRange { from, to }),
            _ => Ok(()),
        }
    }
    pub fn contains(&self, day: NaiveDate) -> bool {
        self.from.is_none_or(|from| day >= from) && self.to.is_none_or(|to| day <= to)
    }
    fn is_open(&self) -> bool {
        self.from.is_none() && self.to.is_none()
    }
}

impl FilterSpec {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn search(mut self, text: &str) -> Self {
        self.search_text = Some(text.to_owned());
        self
    }
    pub fn exact(mut self, field: &str, value: &str) -> Self {
        self.exact_match.insert(field.to_owned(), value.to_owned());
        self
    }
    pub fn between(mut self, from: Option<NaiveDate>, to: Option<NaiveDate>) -> Self {
        self.date_range = Some(DateRange::new(from, to));
        self
    }
}

impl FacetFilter {
    pub fn new(search_fields: &[&str]) -> Self {
        Self {
            search_fields: search_fields.iter().map(|f| (*f).to_owned()).collect(),
            date_field: None,
        }
    }
    pub fn with_date_field(mut self, field: &str) -> Self {
        self.date_field = Some(field.to_owned());
        self
    }

    /// Returns the records passing every facet of `spec`, in input order.
    pub fn apply<T: Facets + Clone>(
        &self,
        records: &[T],
        spec: &FilterSpec,
    ) -> Result<Vec<T>, FilterError> {
        if let Some(range) = &spec.date_range {
            range.validate()?;
        }
        let needle = spec
            .search_text
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase);
        let range = spec.date_range.filter(|r| !r.is_open());

        Ok(records
            .iter()
            .filter(|r| {
                self.matches_search(*r, needle.as_deref())
                    && matches_exact(*r, &spec.exact_match)
                    && self.matches_range(*r, range.as_ref())
            })
            .cloned()
            .collect())
    }

    fn matches_search<T: Facets>(&self, record: &T, needle: Option<&str>) -> bool {
        let Some(needle) = needle else {
            return true;
        };
        self.search_fields.iter().any(|field| {
            record
                .facet_values(field)
                .iter()
                .any(|v| v.to_lowercase().contains(needle))
        })
    }

    // fails closed: with a range set, a record without a usable date is out
    fn matches_range<T: Facets>(&self, record: &T, range: Option<&DateRange>) -> bool {
        let Some(range) = range else {
            return true;
        };
        self.date_field
            .as_deref()
            .and_then(|field| record.facet_day(field))
            .is_some_and(|day| range.contains(day))
    }
}

// an empty expected value is an "All" select and constrains nothing
fn matches_exact<T: Facets>(record: &T, exact: &BTreeMap<String, String>) -> bool {
    exact
        .iter()
        .filter(|(_, expected)| !expected.is_empty())
        .all(|(field, expected)| record.facet_values(field).iter().any(|v| v == expected))
}

/// `filter(records, spec)` with searchable fields and date field supplied inline.
pub fn filter<T: Facets + Clone>(
    records: &[T],
    spec: &FilterSpec,
    search_fields: &[&str],
    date_field: Option<&str>,
) -> Result<Vec<T>, FilterError> {
    let mut facets = FacetFilter::new(search_fields);
    facets.date_field = date_field.map(str::to_owned);
    facets.apply(records, spec)
}

impl Facets for Record {
    fn facet_values(&self, field: &str) -> Vec<String> {
        match field {
            "id" => vec![self.id.clone()],
            "stage" => vec![format!("{:?}", self.stage).to_lowercase()],
            "created_at" => vec![self.created_at.to_datetime_utc().to_rfc3339()],
            "updated_at" => vec![self.updated_at.to_datetime_utc().to_rfc3339()],
            _ => self.field(field).to_vec(),
        }
    }
    fn facet_day(&self, field: &str) -> Option<NaiveDate> {
        match field {
            "created_at" => Some(self.created_at.day()),
            "updated_at" => Some(self.updated_at.day()),
            _ => self.field(field).iter().find_map(|v| utils::parse_day(v)),
        }
    }
}

/// Dotted paths into raw JSON; arrays along the way are flattened, so
/// `products.imlName` reaches every product's name.
impl Facets for Value {
    fn facet_values(&self, field: &str) -> Vec<String> {
        let mut out = vec![];
        collect_path(self, &field.split('.').collect::<Vec<_>>(), &mut out);
        out
    }
}

fn collect_path(value: &Value, path: &[&str], out: &mut Vec<String>) {
    if let Value::Array(items) = value {
        items.iter().for_each(|item| collect_path(item, path, out));
        return;
    }
    match path.split_first() {
        Some((head, rest)) => {
            if let Some(next) = value.get(*head) {
                collect_path(next, rest, out);
            }
        }
        None => match value {
            Value::String(s) => out.push(s.clone()),
            Value::Number(n) => out.push(n.to_string()),
            Value::Bool(b) => out.push(b.to_string()),
            _ => {}
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::TimeStamp;
    use serde_json::json;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn company(id: &str, name: &str) -> Record {
        Record::new_with(id.into()).add_field("company", name)
    }

    #[test]
    fn search_is_case_insensitive_substring() {
        let records = vec![company("a", "Globex Inc"), company("b", "Acme")];
        let facets = FacetFilter::new(&["company"]);

        let hits = facets.apply(&records, &FilterSpec::new().search("glo")).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "a");

        let hits = facets.apply(&records, &FilterSpec::new().search("zzz")).unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn search_ors_across_fields_and_values() {
        let records = vec![
            company("a", "Acme").add_field("contact", "Ravi"),
            company("b", "Globex")
                .add_field("iml_name", "Lid 250")
                .add_field("iml_name", "Tub Ravioli"),
            company("c", "Initech"),
        ];
        let facets = FacetFilter::new(&["company", "contact", "iml_name"]);

        let hits = facets.apply(&records, &FilterSpec::new().search(" RAV ")).unwrap();
        let ids: Vec<_> = hits.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn exact_match_ands_all_entries() {
        let records = vec![
            company("a", "Acme").add_field("status", "pending"),
            company("b", "Acme").add_field("status", "approved"),
            company("c", "Globex").add_field("status", "pending"),
        ];
        let facets = FacetFilter::new(&[]);
        let spec = FilterSpec::new()
            .exact("company", "Acme")
            .exact("status", "pending");

        let hits = facets.apply(&records, &spec).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "a");

        let all = facets.apply(&records, &FilterSpec::new().exact("status", "")).unwrap();
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn date_range_is_inclusive_and_fails_closed() {
        let records = vec![
            company("a", "Acme").add_field("po_date", "2024-06-01"),
            company("b", "Acme").add_field("po_date", "2024-06-30T18:45"),
            company("c", "Acme").add_field("po_date", "2024-07-01"),
            company("d", "Acme").add_field("po_date", "soon"),
            company("e", "Acme"),
        ];
        let facets = FacetFilter::new(&[]).with_date_field("po_date");
        let spec = FilterSpec::new().between(Some(day(2024, 6, 1)), Some(day(2024, 6, 30)));

        let hits = facets.apply(&records, &spec).unwrap();
        let ids: Vec<_> = hits.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn open_range_keeps_undated_records() {
        let records = vec![company("a", "Acme")];
        let facets = FacetFilter::new(&[]).with_date_field("po_date");

        let hits = facets.apply(&records, &FilterSpec::new().between(None, None)).unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn inverted_range_is_rejected() {
        let facets = FacetFilter::new(&[]).with_date_field("po_date");
        let spec = FilterSpec::new().between(Some(day(2024, 7, 1)), Some(day(2024, 6, 1)));

        assert_eq!(
            facets.apply::<Record>(&[], &spec),
            Err(FilterError::InvalidDateRange {
                from: day(2024, 7, 1),
                to: day(2024, 6, 1)
            })
        );
    }

    #[test]
    fn created_at_is_a_built_in_date_facet() {
        let created = TimeStamp::new_with(2024, 3, 9, 23, 59, 0).unwrap();
        let records = vec![company("a", "Acme").set_created_at(created)];

        let hits = filter(
            &records,
            &FilterSpec::new().between(Some(day(2024, 3, 9)), None),
            &[],
            Some("created_at"),
        )
        .unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn raw_json_paths_flatten_arrays() {
        let order = json!({
            "companyName": "Globex Inc",
            "orderNumber": 42,
            "products": [
                {"imlName": "Lid 250", "designStatus": "pending"},
                {"imlName": "Tub 500", "designStatus": "approved"}
            ]
        });

        assert_eq!(order.facet_values("products.imlName"), vec!["Lid 250", "Tub 500"]);
        assert_eq!(order.facet_values("orderNumber"), vec!["42"]);
        assert!(order.facet_values("missing.path").is_empty());

        let hits = filter(&[order], &FilterSpec::new().search("tub"), &["products.imlName"], None)
            .unwrap();
        assert_eq!(hits.len(), 1);
    }
}
