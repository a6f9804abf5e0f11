//! In-memory filter expressions over cached resource documents.
//!
//! The query compiler emits a `DocumentFilter` alongside every URL it builds,
//! so a cached scan answers exactly the set of documents the remote would
//! have returned for the same parameters.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::wanikani::types::Resource;

/// The stored field a predicate applies to.
#[derive(Debug, Clone, PartialEq)]
pub enum Field {
  /// The document identifier.
  Id,
  /// The top-level `data_updated_at` timestamp.
  DataUpdatedAt,
  /// A named field inside the `data` map.
  Data(String),
}

/// A single-field condition. Timestamp fields are stored as canonical
/// RFC 3339 strings, so the time predicates parse on evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
  /// Field value is one of the listed values.
  OneOf(Vec<Value>),
  /// Field value equals the given value exactly.
  Eq(Value),
  /// Field is null or absent.
  IsNull,
  /// Field is present and not null.
  NotNull,
  /// Timestamp field is at or before the moment of evaluation.
  InPast,
  /// Inclusive timestamp range; a one-sided bound leaves the other end open.
  TimeRange {
    min: Option<DateTime<Utc>>,
    max: Option<DateTime<Utc>>,
  },
  /// Open numeric range: strictly greater / strictly less.
  NumRange { gt: Option<f64>, lt: Option<f64> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldPredicate {
  pub field: Field,
  pub predicate: Predicate,
}

impl FieldPredicate {
  pub fn new(field: Field, predicate: Predicate) -> Self {
    Self { field, predicate }
  }

  fn matches(&self, doc: &Resource) -> bool {
    match &self.field {
      Field::Id => self.predicate.matches(doc.id.map(Value::from).as_ref()),
      Field::DataUpdatedAt => {
        let value = doc
          .data_updated_at
          .map(|t| Value::String(t.to_rfc3339()));
        self.predicate.matches(value.as_ref())
      }
      Field::Data(name) => self.predicate.matches(doc.data.get(name)),
    }
  }
}

impl Predicate {
  fn matches(&self, value: Option<&Value>) -> bool {
    match self {
      Predicate::OneOf(set) => value.map_or(false, |v| set.contains(v)),
      Predicate::Eq(want) => value == Some(want),
      Predicate::IsNull => value.map_or(true, Value::is_null),
      Predicate::NotNull => value.map_or(false, |v| !v.is_null()),
      Predicate::InPast => as_time(value).map_or(false, |t| t <= Utc::now()),
      Predicate::TimeRange { min, max } => as_time(value).map_or(false, |t| {
        min.map_or(true, |b| t >= b) && max.map_or(true, |b| t <= b)
      }),
      Predicate::NumRange { gt, lt } => {
        value.and_then(Value::as_f64).map_or(false, |n| {
          gt.map_or(true, |b| n > b) && lt.map_or(true, |b| n < b)
        })
      }
    }
  }
}

/// Conjunction of an object-name restriction and field predicates. An empty
/// `objects` list places no restriction on the object name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentFilter {
  pub objects: Vec<String>,
  pub predicates: Vec<FieldPredicate>,
}

impl DocumentFilter {
  pub fn for_objects(objects: &[&str]) -> Self {
    Self {
      objects: objects.iter().map(|o| o.to_string()).collect(),
      predicates: Vec::new(),
    }
  }

  pub fn push(&mut self, field: Field, predicate: Predicate) {
    self.predicates.push(FieldPredicate::new(field, predicate));
  }

  pub fn matches(&self, doc: &Resource) -> bool {
    if !self.objects.is_empty() && !self.objects.iter().any(|o| *o == doc.object) {
      return false;
    }
    self.predicates.iter().all(|p| p.matches(doc))
  }
}

fn as_time(value: Option<&Value>) -> Option<DateTime<Utc>> {
  value?
    .as_str()
    .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
    .map(|t| t.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::TimeZone;
  use serde_json::json;

  fn doc(id: u64, object: &str, data: Value) -> Resource {
    let Value::Object(data) = data else {
      panic!("fixture data must be a map");
    };
    Resource {
      id: Some(id),
      object: object.to_string(),
      url: None,
      data_updated_at: Some(Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap()),
      data,
    }
  }

  #[test]
  fn test_one_of_matches_id_and_data_fields() {
    let mut filter = DocumentFilter::default();
    filter.push(Field::Id, Predicate::OneOf(vec![json!(3), json!(7)]));
    filter.push(
      Field::Data("srs_stage".into()),
      Predicate::OneOf(vec![json!(1), json!(2)]),
    );

    assert!(filter.matches(&doc(3, "assignment", json!({"srs_stage": 2}))));
    assert!(!filter.matches(&doc(4, "assignment", json!({"srs_stage": 2}))));
    assert!(!filter.matches(&doc(7, "assignment", json!({"srs_stage": 5}))));
  }

  #[test]
  fn test_null_predicates_treat_absent_as_null() {
    let mut burned = DocumentFilter::default();
    burned.push(Field::Data("burned_at".into()), Predicate::NotNull);
    let mut unburned = DocumentFilter::default();
    unburned.push(Field::Data("burned_at".into()), Predicate::IsNull);

    let done = doc(1, "assignment", json!({"burned_at": "2024-01-01T00:00:00Z"}));
    let pending = doc(2, "assignment", json!({"burned_at": null}));
    let missing = doc(3, "assignment", json!({}));

    assert!(burned.matches(&done));
    assert!(!burned.matches(&pending));
    assert!(!burned.matches(&missing));
    assert!(unburned.matches(&pending));
    assert!(unburned.matches(&missing));
    assert!(!unburned.matches(&done));
  }

  #[test]
  fn test_time_range_bounds_are_inclusive() {
    let min = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let max = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
    let mut filter = DocumentFilter::default();
    filter.push(
      Field::Data("available_at".into()),
      Predicate::TimeRange {
        min: Some(min),
        max: Some(max),
      },
    );

    assert!(filter.matches(&doc(1, "assignment", json!({"available_at": "2024-01-01T00:00:00.000000Z"}))));
    assert!(filter.matches(&doc(2, "assignment", json!({"available_at": "2024-02-01T00:00:00.000000Z"}))));
    assert!(filter.matches(&doc(3, "assignment", json!({"available_at": "2024-01-15T08:30:00.000000Z"}))));
    assert!(!filter.matches(&doc(4, "assignment", json!({"available_at": "2024-02-01T00:00:01.000000Z"}))));
    assert!(!filter.matches(&doc(5, "assignment", json!({"available_at": null}))));
  }

  #[test]
  fn test_num_range_bounds_are_open() {
    let mut filter = DocumentFilter::default();
    filter.push(
      Field::Data("percentage_correct".into()),
      Predicate::NumRange {
        gt: Some(50.0),
        lt: Some(90.0),
      },
    );

    assert!(filter.matches(&doc(1, "review_statistic", json!({"percentage_correct": 51}))));
    assert!(!filter.matches(&doc(2, "review_statistic", json!({"percentage_correct": 50}))));
    assert!(!filter.matches(&doc(3, "review_statistic", json!({"percentage_correct": 90}))));
  }

  #[test]
  fn test_object_restriction() {
    let filter = DocumentFilter::for_objects(&["kanji", "radical"]);

    assert!(filter.matches(&doc(1, "kanji", json!({}))));
    assert!(filter.matches(&doc(2, "radical", json!({}))));
    assert!(!filter.matches(&doc(3, "vocabulary", json!({}))));
  }

  #[test]
  fn test_updated_after_applies_to_top_level_timestamp() {
    let cutoff = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
    let mut filter = DocumentFilter::default();
    filter.push(
      Field::DataUpdatedAt,
      Predicate::TimeRange {
        min: Some(cutoff),
        max: None,
      },
    );

    // Fixture documents carry data_updated_at of 2024-03-10.
    assert!(filter.matches(&doc(1, "assignment", json!({}))));

    let mut stale = doc(2, "assignment", json!({}));
    stale.data_updated_at = Some(Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap());
    assert!(!filter.matches(&stale));
  }

  #[test]
  fn test_in_past_fails_on_null_or_future() {
    let mut filter = DocumentFilter::default();
    filter.push(Field::Data("available_at".into()), Predicate::InPast);

    assert!(filter.matches(&doc(1, "assignment", json!({"available_at": "2020-01-01T00:00:00Z"}))));
    assert!(!filter.matches(&doc(2, "assignment", json!({"available_at": "2099-01-01T00:00:00Z"}))));
    assert!(!filter.matches(&doc(3, "assignment", json!({"available_at": null}))));
  }
}
