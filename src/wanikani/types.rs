//! Resource model and wire envelope decoding.
//!
//! Every API payload lands in the generic `Resource` shape: typed envelope
//! fields plus an opaque `data` map. Timestamps are normalized at ingestion
//! so the store and the filter layer never see a raw wire string twice in
//! two different forms.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Store scope for account-independent documents (the subject corpus).
pub const SHARED_SCOPE: &str = "shared";

/// The resource families the remote API serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
  Assignment,
  Review,
  ReviewStatistic,
  StudyMaterial,
  Subject,
  LevelProgression,
  Reset,
  SpacedRepetitionSystem,
  VoiceActor,
  User,
  Summary,
}

impl ResourceKind {
  /// Collection endpoint path under the API base URL.
  pub fn endpoint(self) -> &'static str {
    match self {
      ResourceKind::Assignment => "assignments",
      ResourceKind::Review => "reviews",
      ResourceKind::ReviewStatistic => "review_statistics",
      ResourceKind::StudyMaterial => "study_materials",
      ResourceKind::Subject => "subjects",
      ResourceKind::LevelProgression => "level_progressions",
      ResourceKind::Reset => "resets",
      ResourceKind::SpacedRepetitionSystem => "spaced_repetition_systems",
      ResourceKind::VoiceActor => "voice_actors",
      ResourceKind::User => "user",
      ResourceKind::Summary => "summary",
    }
  }

  /// The `object` names documents of this kind carry.
  pub fn objects(self) -> &'static [&'static str] {
    match self {
      ResourceKind::Assignment => &["assignment"],
      ResourceKind::Review => &["review"],
      ResourceKind::ReviewStatistic => &["review_statistic"],
      ResourceKind::StudyMaterial => &["study_material"],
      ResourceKind::Subject => &["kanji", "vocabulary", "radical"],
      ResourceKind::LevelProgression => &["level_progression"],
      ResourceKind::Reset => &["reset"],
      ResourceKind::SpacedRepetitionSystem => &["spaced_repetition_system"],
      ResourceKind::VoiceActor => &["voice_actor"],
      ResourceKind::User => &["user"],
      ResourceKind::Summary => &["report"],
    }
  }

  /// Store scope documents of this kind live in. Subject documents are the
  /// same for every account and share one scope.
  pub fn scope(self, user_id: &str) -> &str {
    match self {
      ResourceKind::Subject => SHARED_SCOPE,
      _ => user_id,
    }
  }
}

/// One API resource after ingestion. `id` is absent for the `user` and
/// `report` objects, which are keyed by object name alone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
  pub id: Option<u64>,
  pub object: String,
  pub url: Option<String>,
  pub data_updated_at: Option<DateTime<Utc>>,
  pub data: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct WireResource {
  #[serde(default)]
  id: Option<u64>,
  object: String,
  #[serde(default)]
  url: Option<String>,
  #[serde(default)]
  data_updated_at: Option<String>,
  #[serde(default)]
  data: Map<String, Value>,
}

impl Resource {
  /// Ingest one wire envelope. Parses `data_updated_at` and rewrites every
  /// non-null `*_at` field at the top level of `data` into canonical form.
  /// Nested maps are left untouched. A malformed timestamp fails the whole
  /// ingestion.
  pub fn from_wire(value: Value) -> Result<Self> {
    let wire: WireResource = serde_json::from_value(value)?;
    let data_updated_at = wire
      .data_updated_at
      .as_deref()
      .map(parse_wire_time)
      .transpose()?;

    let mut data = wire.data;
    for (key, value) in data.iter_mut() {
      if !key.ends_with("_at") || value.is_null() {
        continue;
      }
      let raw = value
        .as_str()
        .ok_or_else(|| Error::InvalidTimestamp(value.to_string()))?;
      *value = Value::String(format_wire_time(parse_wire_time(raw)?));
    }

    Ok(Resource {
      id: wire.id,
      object: wire.object,
      url: wire.url,
      data_updated_at,
      data,
    })
  }
}

/// Pagination block of a collection envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct PageInfo {
  #[serde(default)]
  pub next_url: Option<String>,
  #[serde(default)]
  pub previous_url: Option<String>,
  #[serde(default)]
  pub per_page: Option<u32>,
}

/// One page of a collection response, items still in wire form.
#[derive(Debug, Deserialize)]
pub struct CollectionPage {
  pub pages: PageInfo,
  #[serde(default)]
  pub total_count: Option<u64>,
  #[serde(default)]
  pub data: Vec<Value>,
}

/// A decoded response body: a collection page or a single resource.
#[derive(Debug)]
pub enum ApiPayload {
  Collection(CollectionPage),
  Single(Resource),
}

impl ApiPayload {
  /// The `pages` key distinguishes the two envelope shapes.
  pub fn decode(value: Value) -> Result<Self> {
    if value.get("pages").is_some() {
      Ok(ApiPayload::Collection(serde_json::from_value(value)?))
    } else {
      Ok(ApiPayload::Single(Resource::from_wire(value)?))
    }
  }
}

/// Parse a wire timestamp. RFC 3339 with either a "Z" suffix or a numeric
/// offset; the result is always UTC.
pub fn parse_wire_time(raw: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(raw)
    .map(|t| t.with_timezone(&Utc))
    .map_err(|_| Error::InvalidTimestamp(raw.to_string()))
}

/// Canonical wire form: microsecond precision, "Z" suffix.
pub fn format_wire_time(t: DateTime<Utc>) -> String {
  t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::TimeZone;
  use serde_json::json;

  #[test]
  fn test_ingestion_normalizes_z_and_offset_forms() {
    let resource = Resource::from_wire(json!({
      "id": 80463006,
      "object": "assignment",
      "url": "https://api.wanikani.com/v2/assignments/80463006",
      "data_updated_at": "2017-10-30T01:51:10.438432Z",
      "data": {
        "available_at": "2018-04-11T00:00:00Z",
        "started_at": "2017-09-05T23:41:28.980679+00:00",
        "burned_at": null,
        "srs_stage": 2
      }
    }))
    .unwrap();

    assert_eq!(
      resource.data_updated_at,
      Some(Utc.with_ymd_and_hms(2017, 10, 30, 1, 51, 10).unwrap() + chrono::Duration::microseconds(438432))
    );
    assert_eq!(
      resource.data["available_at"],
      json!("2018-04-11T00:00:00.000000Z")
    );
    assert_eq!(
      resource.data["started_at"],
      json!("2017-09-05T23:41:28.980679Z")
    );
    assert_eq!(resource.data["burned_at"], json!(null));
    assert_eq!(resource.data["srs_stage"], json!(2));
  }

  #[test]
  fn test_ingestion_rejects_malformed_timestamps() {
    let err = Resource::from_wire(json!({
      "id": 1,
      "object": "assignment",
      "data": { "available_at": "soon" }
    }))
    .unwrap_err();
    assert!(matches!(err, Error::InvalidTimestamp(s) if s == "soon"));

    let err = Resource::from_wire(json!({
      "id": 1,
      "object": "assignment",
      "data_updated_at": "yesterday",
      "data": {}
    }))
    .unwrap_err();
    assert!(matches!(err, Error::InvalidTimestamp(_)));
  }

  #[test]
  fn test_only_top_level_data_fields_are_normalized() {
    let resource = Resource::from_wire(json!({
      "id": 2,
      "object": "review",
      "data": {
        "created_at": "2020-01-01T00:00:00Z",
        "subject": { "hidden_at": "not a timestamp" }
      }
    }))
    .unwrap();

    assert_eq!(resource.data["created_at"], json!("2020-01-01T00:00:00.000000Z"));
    assert_eq!(resource.data["subject"]["hidden_at"], json!("not a timestamp"));
  }

  #[test]
  fn test_payload_shape_detection() {
    let collection = ApiPayload::decode(json!({
      "object": "collection",
      "url": "https://api.wanikani.com/v2/assignments",
      "pages": { "per_page": 500, "next_url": null, "previous_url": null },
      "total_count": 1,
      "data_updated_at": "2017-11-29T19:37:03.571377Z",
      "data": [{ "id": 1, "object": "assignment", "data": {} }]
    }))
    .unwrap();
    assert!(matches!(collection, ApiPayload::Collection(page) if page.data.len() == 1));

    let single = ApiPayload::decode(json!({
      "id": 1,
      "object": "assignment",
      "data_updated_at": "2017-11-29T19:37:03.571377Z",
      "data": {}
    }))
    .unwrap();
    assert!(matches!(single, ApiPayload::Single(r) if r.id == Some(1)));
  }

  #[test]
  fn test_subjects_share_one_scope() {
    assert_eq!(ResourceKind::Subject.scope("user-1"), SHARED_SCOPE);
    assert_eq!(ResourceKind::Subject.scope("user-2"), SHARED_SCOPE);
    assert_eq!(ResourceKind::Assignment.scope("user-1"), "user-1");
    assert_eq!(ResourceKind::Summary.objects(), &["report"]);
  }
}
