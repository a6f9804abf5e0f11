//! Query compilation: structured filter arguments to URL fragments plus an
//! equivalent local filter.
//!
//! Every list operation takes a per-kind filter struct. Compilation walks
//! the fields in declaration order, so identical arguments always produce
//! identical fragment sequences and therefore identical cache keys.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::cache::{DocumentFilter, Field, Predicate};
use crate::error::{Error, Result};
use crate::wanikani::types::{format_wire_time, ResourceKind};

/// One id or several. List operations accept both through `From`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ids {
  One(u64),
  Many(Vec<u64>),
}

impl Ids {
  fn values(&self) -> Vec<u64> {
    match self {
      Ids::One(id) => vec![*id],
      Ids::Many(ids) => ids.clone(),
    }
  }
}

impl From<u64> for Ids {
  fn from(id: u64) -> Self {
    Ids::One(id)
  }
}

impl From<Vec<u64>> for Ids {
  fn from(ids: Vec<u64>) -> Self {
    Ids::Many(ids)
  }
}

/// A timestamp argument: pre-parsed, or an ISO 8601 string parsed at
/// compile time. Strings without an offset are taken as UTC.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimeArg {
  At(DateTime<Utc>),
  Iso(String),
}

impl TimeArg {
  pub fn resolve(&self) -> Result<DateTime<Utc>> {
    match self {
      TimeArg::At(t) => Ok(*t),
      TimeArg::Iso(raw) => {
        if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
          return Ok(t.with_timezone(&Utc));
        }
        chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
          .map(|t| t.and_utc())
          .map_err(|_| Error::InvalidTimestamp(raw.to_string()))
      }
    }
  }
}

impl From<DateTime<Utc>> for TimeArg {
  fn from(t: DateTime<Utc>) -> Self {
    TimeArg::At(t)
  }
}

impl From<&str> for TimeArg {
  fn from(raw: &str) -> Self {
    TimeArg::Iso(raw.to_string())
  }
}

impl From<String> for TimeArg {
  fn from(raw: String) -> Self {
    TimeArg::Iso(raw)
  }
}

/// The compiled form of one logical query.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
  pub kind: ResourceKind,
  /// URL query fragments in deterministic order, already encoded.
  pub fragments: Vec<String>,
  /// Local-store equivalent of the fragments.
  pub filter: DocumentFilter,
  /// Set when the request is a lookup of exactly one id and nothing else;
  /// such requests go to the per-item endpoint.
  pub singular: Option<u64>,
  /// False when a cache-invalidating parameter is present; those requests
  /// always hit the network and skip validator/watermark handling.
  pub cacheable: bool,
}

/// Filters for the assignments collection.
#[derive(Debug, Clone, Default)]
pub struct AssignmentFilters {
  pub ids: Option<Ids>,
  pub available_after: Option<TimeArg>,
  pub available_before: Option<TimeArg>,
  pub burned: Option<bool>,
  pub hidden: Option<bool>,
  /// Presence-only flag; cache-invalidating.
  pub immediately_available_for_lessons: bool,
  /// Presence-only flag; cache-invalidating.
  pub immediately_available_for_review: bool,
  /// Presence-only flag; cache-invalidating.
  pub in_review: bool,
  /// Joins the query string only; assignment documents carry no level
  /// field, so this is cache-invalidating.
  pub levels: Option<Vec<u32>>,
  pub srs_stages: Option<Vec<u32>>,
  pub started: Option<bool>,
  pub subject_ids: Option<Vec<u64>>,
  pub subject_types: Option<Vec<String>>,
  pub unlocked: Option<bool>,
  pub updated_after: Option<TimeArg>,
}

impl AssignmentFilters {
  pub(crate) fn compile(&self) -> Result<CompiledQuery> {
    let mut q = Builder::new(ResourceKind::Assignment);
    q.ids(&self.ids);

    let after = q.time("available_after", &self.available_after)?;
    let before = q.time("available_before", &self.available_before)?;
    if after.is_some() || before.is_some() {
      q.filter.push(
        Field::Data("available_at".into()),
        Predicate::TimeRange {
          min: after,
          max: before,
        },
      );
    }

    q.boolean("burned", self.burned);
    q.boolean("hidden", self.hidden);

    if self.immediately_available_for_lessons {
      q.flag("immediately_available_for_lessons");
      q.filter.push(Field::Data("unlocked_at".into()), Predicate::InPast);
      q.filter.push(Field::Data("started_at".into()), Predicate::IsNull);
    }
    if self.immediately_available_for_review {
      q.flag("immediately_available_for_review");
      q.filter.push(Field::Data("available_at".into()), Predicate::InPast);
    }
    if self.in_review {
      q.flag("in_review");
      q.filter.push(Field::Data("available_at".into()), Predicate::NotNull);
    }

    if self.levels.is_some() {
      q.invalidating = true;
    }
    q.num_list("levels", self.levels.as_deref(), None);
    q.num_list(
      "srs_stages",
      self.srs_stages.as_deref(),
      Some(Field::Data("srs_stage".into())),
    );
    q.boolean("started", self.started);
    q.num_list(
      "subject_ids",
      self.subject_ids.as_deref(),
      Some(Field::Data("subject_id".into())),
    );
    q.str_list(
      "subject_types",
      self.subject_types.as_deref(),
      Some(Field::Data("subject_type".into())),
    );
    q.boolean("unlocked", self.unlocked);
    q.updated_after(&self.updated_after)?;
    Ok(q.finish())
  }
}

/// Filters for the reviews collection.
#[derive(Debug, Clone, Default)]
pub struct ReviewFilters {
  pub ids: Option<Ids>,
  pub assignment_ids: Option<Vec<u64>>,
  pub subject_ids: Option<Vec<u64>>,
  pub updated_after: Option<TimeArg>,
}

impl ReviewFilters {
  pub(crate) fn compile(&self) -> Result<CompiledQuery> {
    let mut q = Builder::new(ResourceKind::Review);
    q.ids(&self.ids);
    q.num_list(
      "assignment_ids",
      self.assignment_ids.as_deref(),
      Some(Field::Data("assignment_id".into())),
    );
    q.num_list(
      "subject_ids",
      self.subject_ids.as_deref(),
      Some(Field::Data("subject_id".into())),
    );
    q.updated_after(&self.updated_after)?;
    Ok(q.finish())
  }
}

/// Filters for the review statistics collection.
#[derive(Debug, Clone, Default)]
pub struct ReviewStatisticFilters {
  pub ids: Option<Ids>,
  pub hidden: Option<bool>,
  pub percentages_greater_than: Option<u32>,
  pub percentages_less_than: Option<u32>,
  pub subject_ids: Option<Vec<u64>>,
  pub subject_types: Option<Vec<String>>,
  pub updated_after: Option<TimeArg>,
}

impl ReviewStatisticFilters {
  pub(crate) fn compile(&self) -> Result<CompiledQuery> {
    let mut q = Builder::new(ResourceKind::ReviewStatistic);
    q.ids(&self.ids);
    q.boolean("hidden", self.hidden);

    if let Some(v) = self.percentages_greater_than {
      q.fragments.push(format!("percentages_greater_than={v}"));
    }
    if let Some(v) = self.percentages_less_than {
      q.fragments.push(format!("percentages_less_than={v}"));
    }
    if self.percentages_greater_than.is_some() || self.percentages_less_than.is_some() {
      q.filter.push(
        Field::Data("percentage_correct".into()),
        Predicate::NumRange {
          gt: self.percentages_greater_than.map(f64::from),
          lt: self.percentages_less_than.map(f64::from),
        },
      );
    }

    q.num_list(
      "subject_ids",
      self.subject_ids.as_deref(),
      Some(Field::Data("subject_id".into())),
    );
    q.str_list(
      "subject_types",
      self.subject_types.as_deref(),
      Some(Field::Data("subject_type".into())),
    );
    q.updated_after(&self.updated_after)?;
    Ok(q.finish())
  }
}

/// Filters for the study materials collection.
#[derive(Debug, Clone, Default)]
pub struct StudyMaterialFilters {
  pub ids: Option<Ids>,
  pub hidden: Option<bool>,
  pub subject_ids: Option<Vec<u64>>,
  pub subject_types: Option<Vec<String>>,
  pub updated_after: Option<TimeArg>,
}

impl StudyMaterialFilters {
  pub(crate) fn compile(&self) -> Result<CompiledQuery> {
    let mut q = Builder::new(ResourceKind::StudyMaterial);
    q.ids(&self.ids);
    q.boolean("hidden", self.hidden);
    q.num_list(
      "subject_ids",
      self.subject_ids.as_deref(),
      Some(Field::Data("subject_id".into())),
    );
    q.str_list(
      "subject_types",
      self.subject_types.as_deref(),
      Some(Field::Data("subject_type".into())),
    );
    q.updated_after(&self.updated_after)?;
    Ok(q.finish())
  }
}

/// Filters for the subjects collection. Subjects are account independent
/// and carry their level, so every parameter here stays answerable from the
/// local store; subject queries are always cache-eligible.
#[derive(Debug, Clone, Default)]
pub struct SubjectFilters {
  pub types: Option<Vec<String>>,
  pub levels: Option<Vec<u32>>,
  pub ids: Option<Ids>,
  pub slugs: Option<Vec<String>>,
  pub hidden: Option<bool>,
  pub updated_after: Option<TimeArg>,
}

impl SubjectFilters {
  pub(crate) fn compile(&self) -> Result<CompiledQuery> {
    let mut q = Builder::new(ResourceKind::Subject);
    if let Some(types) = &self.types {
      q.fragments.push(format!("types={}", csv(types)));
      q.filter.objects = types.clone();
    }
    q.num_list(
      "levels",
      self.levels.as_deref(),
      Some(Field::Data("level".into())),
    );
    q.ids(&self.ids);
    q.str_list(
      "slugs",
      self.slugs.as_deref(),
      Some(Field::Data("slug".into())),
    );
    if let Some(hidden) = self.hidden {
      q.fragments.push(format!("hidden={hidden}"));
      q.filter.push(
        Field::Data("hidden_at".into()),
        if hidden { Predicate::NotNull } else { Predicate::IsNull },
      );
    }
    q.updated_after(&self.updated_after)?;
    Ok(q.finish())
  }
}

/// Filters for the collections that only support `ids` and `updated_after`
/// (level progressions, resets, SRS systems, voice actors).
#[derive(Debug, Clone, Default)]
pub struct BasicFilters {
  pub ids: Option<Ids>,
  pub updated_after: Option<TimeArg>,
}

impl BasicFilters {
  pub(crate) fn compile(&self, kind: ResourceKind) -> Result<CompiledQuery> {
    let mut q = Builder::new(kind);
    q.ids(&self.ids);
    q.updated_after(&self.updated_after)?;
    Ok(q.finish())
  }
}

struct Builder {
  kind: ResourceKind,
  fragments: Vec<String>,
  filter: DocumentFilter,
  invalidating: bool,
  scalar_id: Option<u64>,
}

impl Builder {
  fn new(kind: ResourceKind) -> Self {
    Self {
      kind,
      fragments: Vec::new(),
      filter: DocumentFilter::for_objects(kind.objects()),
      invalidating: false,
      scalar_id: None,
    }
  }

  fn ids(&mut self, ids: &Option<Ids>) {
    let Some(ids) = ids else { return };
    let values = ids.values();
    self.fragments.push(format!("ids={}", csv(&values)));
    self.filter.push(
      Field::Id,
      Predicate::OneOf(values.iter().map(|&v| Value::from(v)).collect()),
    );
    if let Ids::One(id) = ids {
      self.scalar_id = Some(*id);
    }
  }

  /// Presence-only flag: the bare name joins the query string.
  fn flag(&mut self, name: &str) {
    self.fragments.push(name.to_string());
    self.invalidating = true;
  }

  fn boolean(&mut self, name: &str, value: Option<bool>) {
    let Some(value) = value else { return };
    self.fragments.push(format!("{name}={value}"));
    if self.kind == ResourceKind::Assignment {
      // The remote models assignment booleans as nullable timestamps.
      self.filter.push(
        Field::Data(format!("{name}_at")),
        if value { Predicate::NotNull } else { Predicate::IsNull },
      );
    } else {
      self
        .filter
        .push(Field::Data(name.to_string()), Predicate::Eq(Value::Bool(value)));
    }
  }

  fn num_list<T>(&mut self, name: &str, values: Option<&[T]>, field: Option<Field>)
  where
    T: std::fmt::Display + Copy,
    Value: From<T>,
  {
    let Some(values) = values else { return };
    self.fragments.push(format!("{name}={}", csv(values)));
    if let Some(field) = field {
      self.filter.push(
        field,
        Predicate::OneOf(values.iter().map(|&v| Value::from(v)).collect()),
      );
    }
  }

  fn str_list(&mut self, name: &str, values: Option<&[String]>, field: Option<Field>) {
    let Some(values) = values else { return };
    self.fragments.push(format!("{name}={}", csv(values)));
    if let Some(field) = field {
      self.filter.push(
        field,
        Predicate::OneOf(values.iter().map(|v| Value::from(v.clone())).collect()),
      );
    }
  }

  /// Emit a timestamp fragment and hand back the parsed instant for
  /// predicate assembly.
  fn time(&mut self, param: &str, value: &Option<TimeArg>) -> Result<Option<DateTime<Utc>>> {
    let Some(value) = value else { return Ok(None) };
    let t = value.resolve()?;
    self.fragments.push(format!("{param}={}", encode_time(t)));
    Ok(Some(t))
  }

  fn updated_after(&mut self, value: &Option<TimeArg>) -> Result<()> {
    if let Some(t) = self.time("updated_after", value)? {
      self.filter.push(
        Field::DataUpdatedAt,
        Predicate::TimeRange {
          min: Some(t),
          max: None,
        },
      );
    }
    Ok(())
  }

  fn finish(self) -> CompiledQuery {
    let singular = match self.scalar_id {
      Some(id) if self.fragments.len() == 1 => Some(id),
      _ => None,
    };
    CompiledQuery {
      kind: self.kind,
      fragments: self.fragments,
      filter: self.filter,
      singular,
      cacheable: !self.invalidating,
    }
  }
}

fn csv<T: std::fmt::Display>(values: &[T]) -> String {
  values
    .iter()
    .map(|v| v.to_string())
    .collect::<Vec<_>>()
    .join(",")
}

/// Canonical wire form, percent-encoded for the query string.
pub(crate) fn encode_time(t: DateTime<Utc>) -> String {
  url::form_urlencoded::byte_serialize(format_wire_time(t).as_bytes()).collect()
}
