//! The caching API client.
//!
//! `Client` owns one account token and routes every operation through the
//! local store. Reads go through the conditional-fetch engine in
//! [`super::fetch`]; writes hit the network first and the returned documents
//! land in the store on the way back. Construction resolves the token to an
//! account id so that all cached state is namespaced per user rather than
//! per token.

use std::sync::{Arc, Mutex};

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::cache::{CacheStore, Identity, Validator};
use crate::error::{Error, Result};
use crate::ratelimit::RateLimiter;

use super::fetch::Fetcher;
use super::query::{
  AssignmentFilters, BasicFilters, CompiledQuery, ReviewFilters, ReviewStatisticFilters,
  StudyMaterialFilters, SubjectFilters, TimeArg,
};
use super::transport::{ApiRequest, HttpTransport, Method, Transport};
use super::types::{format_wire_time, Resource, ResourceKind};

/// Target of a new review. The remote accepts exactly one of the two id
/// spaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewTarget {
  Assignment(u64),
  Subject(u64),
}

/// Arguments for recording one finished review.
#[derive(Debug, Clone)]
pub struct NewReview {
  pub target: ReviewTarget,
  pub incorrect_meaning_answers: u32,
  pub incorrect_reading_answers: u32,
  /// Backdates the review. The remote expects this under `started_at`.
  pub created_at: Option<TimeArg>,
}

/// Everything a recorded review changed server side.
#[derive(Debug, Clone)]
pub struct ReviewOutcome {
  pub review: Resource,
  pub assignment: Resource,
  pub review_statistic: Resource,
}

/// Editable parts of a study material. `None` fields are omitted from the
/// request body and stay untouched remotely.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StudyMaterialUpdate {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub meaning_note: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub reading_note: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub meaning_synonyms: Option<Vec<String>>,
}

/// Preference fields accepted by the user update endpoint. `None` fields
/// are left unchanged.
#[derive(Debug, Clone, Default, Serialize)]
pub struct UserPreferences {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub default_voice_actor_id: Option<u64>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub lessons_autoplay_audio: Option<bool>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub lessons_batch_size: Option<u32>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub lessons_presentation_order: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub reviews_autoplay_audio: Option<bool>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub reviews_display_srs_indicator: Option<bool>,
}

/// A caching client bound to one API token.
pub struct Client<T: Transport = HttpTransport> {
  token: String,
  user_id: String,
  base_url: String,
  store: Arc<CacheStore>,
  limiter: Arc<Mutex<RateLimiter>>,
  transport: T,
}

impl Client<HttpTransport> {
  /// Connect with a token, resolving which account it belongs to. Known
  /// tokens resolve from the identity table without touching the network;
  /// only first contact costs a request.
  pub fn new(
    token: &str,
    api_url: &str,
    store: Arc<CacheStore>,
    limiter: Arc<Mutex<RateLimiter>>,
  ) -> Result<Self> {
    Self::with_transport(token, api_url, store, limiter, HttpTransport::new()?)
  }
}

impl<T: Transport> Client<T> {
  pub fn with_transport(
    token: &str,
    api_url: &str,
    store: Arc<CacheStore>,
    limiter: Arc<Mutex<RateLimiter>>,
    transport: T,
  ) -> Result<Self> {
    let mut client = Self {
      token: token.to_string(),
      user_id: String::new(),
      base_url: api_url.trim_end_matches('/').to_string(),
      store,
      limiter,
      transport,
    };
    client.user_id = match client.store.identity_by_token(token)? {
      Some(identity) => identity.user_id,
      None => client.fetch_user(None)?.user_id,
    };
    Ok(client)
  }

  /// The id of the account this client's token resolved to.
  pub fn user_id(&self) -> &str {
    &self.user_id
  }

  /// Assignments for the current user.
  pub fn assignments(&self, filters: &AssignmentFilters) -> Result<Vec<Resource>> {
    self.run_query(filters.compile()?)
  }

  pub fn reviews(&self, filters: &ReviewFilters) -> Result<Vec<Resource>> {
    self.run_query(filters.compile()?)
  }

  pub fn review_statistics(&self, filters: &ReviewStatisticFilters) -> Result<Vec<Resource>> {
    self.run_query(filters.compile()?)
  }

  pub fn study_materials(&self, filters: &StudyMaterialFilters) -> Result<Vec<Resource>> {
    self.run_query(filters.compile()?)
  }

  /// Subjects are account independent and cached in a scope shared by every
  /// user of the store.
  pub fn subjects(&self, filters: &SubjectFilters) -> Result<Vec<Resource>> {
    self.run_query(filters.compile()?)
  }

  pub fn level_progressions(&self, filters: &BasicFilters) -> Result<Vec<Resource>> {
    self.run_query(filters.compile(ResourceKind::LevelProgression)?)
  }

  pub fn resets(&self, filters: &BasicFilters) -> Result<Vec<Resource>> {
    self.run_query(filters.compile(ResourceKind::Reset)?)
  }

  pub fn spaced_repetition_systems(&self, filters: &BasicFilters) -> Result<Vec<Resource>> {
    self.run_query(filters.compile(ResourceKind::SpacedRepetitionSystem)?)
  }

  pub fn voice_actors(&self, filters: &BasicFilters) -> Result<Vec<Resource>> {
    self.run_query(filters.compile(ResourceKind::VoiceActor)?)
  }

  pub fn assignment(&self, id: u64) -> Result<Resource> {
    self.get_one(ResourceKind::Assignment, id)
  }

  pub fn review(&self, id: u64) -> Result<Resource> {
    self.get_one(ResourceKind::Review, id)
  }

  pub fn review_statistic(&self, id: u64) -> Result<Resource> {
    self.get_one(ResourceKind::ReviewStatistic, id)
  }

  pub fn study_material(&self, id: u64) -> Result<Resource> {
    self.get_one(ResourceKind::StudyMaterial, id)
  }

  pub fn subject(&self, id: u64) -> Result<Resource> {
    self.get_one(ResourceKind::Subject, id)
  }

  pub fn level_progression(&self, id: u64) -> Result<Resource> {
    self.get_one(ResourceKind::LevelProgression, id)
  }

  pub fn reset(&self, id: u64) -> Result<Resource> {
    self.get_one(ResourceKind::Reset, id)
  }

  pub fn spaced_repetition_system(&self, id: u64) -> Result<Resource> {
    self.get_one(ResourceKind::SpacedRepetitionSystem, id)
  }

  pub fn voice_actor(&self, id: u64) -> Result<Resource> {
    self.get_one(ResourceKind::VoiceActor, id)
  }

  /// The current lesson/review summary report.
  pub fn summary(&self) -> Result<Resource> {
    self
      .fetcher()
      .fetch_singleton(ResourceKind::Summary)?
      .ok_or(Error::Request(404))
  }

  /// The user profile, refreshed from the remote when it changed.
  pub fn user(&self) -> Result<Resource> {
    Ok(self.fetch_user(Some(self.user_id.as_str()))?.profile)
  }

  /// Mark an assignment started, moving its subject into the review queue.
  pub fn start_assignment(&self, id: u64, started_at: Option<TimeArg>) -> Result<Resource> {
    let mut body = Map::new();
    if let Some(at) = &started_at {
      body.insert(
        "started_at".to_string(),
        Value::String(format_wire_time(at.resolve()?)),
      );
    }
    let url = format!("{}/assignments/{}/start", self.base_url, id);
    let doc = Resource::from_wire(self.send_write(Method::Put, url, Value::Object(body))?)?;
    self
      .store
      .upsert_document(ResourceKind::Assignment.scope(&self.user_id), &doc)?;
    Ok(doc)
  }

  /// Record a finished review. The response bundles the review with the
  /// updated assignment and review statistic; all three land in the store.
  pub fn create_review(&self, review: &NewReview) -> Result<ReviewOutcome> {
    let mut body = Map::new();
    body.insert(
      "incorrect_meaning_answers".to_string(),
      Value::from(review.incorrect_meaning_answers),
    );
    body.insert(
      "incorrect_reading_answers".to_string(),
      Value::from(review.incorrect_reading_answers),
    );
    match review.target {
      ReviewTarget::Assignment(id) => body.insert("assignment_id".to_string(), Value::from(id)),
      ReviewTarget::Subject(id) => body.insert("subject_id".to_string(), Value::from(id)),
    };
    if let Some(at) = &review.created_at {
      body.insert(
        "started_at".to_string(),
        Value::String(format_wire_time(at.resolve()?)),
      );
    }

    let url = format!("{}/reviews/", self.base_url);
    let envelope = self.send_write(Method::Post, url, Value::Object(body))?;
    let updated = envelope
      .get("resources_updated")
      .cloned()
      .ok_or_else(|| Error::malformed("review response carries no resources_updated"))?;
    let assignment = Resource::from_wire(
      updated
        .get("assignment")
        .cloned()
        .ok_or_else(|| Error::malformed("review response carries no updated assignment"))?,
    )?;
    let review_statistic = Resource::from_wire(
      updated
        .get("review_statistic")
        .cloned()
        .ok_or_else(|| Error::malformed("review response carries no updated review statistic"))?,
    )?;
    let review = Resource::from_wire(envelope)?;

    self
      .store
      .upsert_document(ResourceKind::Review.scope(&self.user_id), &review)?;
    self
      .store
      .upsert_document(ResourceKind::Assignment.scope(&self.user_id), &assignment)?;
    self.store.upsert_document(
      ResourceKind::ReviewStatistic.scope(&self.user_id),
      &review_statistic,
    )?;
    Ok(ReviewOutcome {
      review,
      assignment,
      review_statistic,
    })
  }

  /// Create the study material for a subject.
  pub fn create_study_material(
    &self,
    subject_id: u64,
    material: &StudyMaterialUpdate,
  ) -> Result<Resource> {
    let mut body = object_body(material)?;
    body.insert("subject_id".to_string(), Value::from(subject_id));
    let url = format!("{}/study_materials/", self.base_url);
    let doc = Resource::from_wire(self.send_write(Method::Post, url, Value::Object(body))?)?;
    self
      .store
      .upsert_document(ResourceKind::StudyMaterial.scope(&self.user_id), &doc)?;
    Ok(doc)
  }

  /// Update an existing study material.
  pub fn update_study_material(&self, id: u64, material: &StudyMaterialUpdate) -> Result<Resource> {
    let body = object_body(material)?;
    let url = format!("{}/study_materials/{}", self.base_url, id);
    let doc = Resource::from_wire(self.send_write(Method::Put, url, Value::Object(body))?)?;
    self
      .store
      .upsert_document(ResourceKind::StudyMaterial.scope(&self.user_id), &doc)?;
    Ok(doc)
  }

  /// Update user preferences. The returned profile replaces the stored one;
  /// the account's token list is untouched.
  pub fn update_user(&self, preferences: &UserPreferences) -> Result<Resource> {
    let body = object_body(preferences)?;
    let url = format!("{}/user", self.base_url);
    let profile = Resource::from_wire(self.send_write(Method::Put, url, Value::Object(body))?)?;
    self.store.replace_profile(&self.user_id, &profile)?;
    Ok(profile)
  }

  fn fetcher(&self) -> Fetcher<'_, T> {
    Fetcher {
      store: &self.store,
      limiter: &self.limiter,
      transport: &self.transport,
      token: &self.token,
      user_id: &self.user_id,
      base_url: &self.base_url,
    }
  }

  fn run_query(&self, query: CompiledQuery) -> Result<Vec<Resource>> {
    if let Some(id) = query.singular {
      // A lone scalar id goes to the per-item endpoint instead of a
      // filtered collection walk.
      let doc = self.fetcher().fetch_one(query.kind, id)?;
      return Ok(doc.into_iter().collect());
    }
    self.fetcher().fetch_collection(&query)
  }

  fn get_one(&self, kind: ResourceKind, id: u64) -> Result<Resource> {
    self
      .fetcher()
      .fetch_one(kind, id)?
      .ok_or(Error::Request(404))
  }

  /// GET the user endpoint and reconcile the identity tables. `known_uid`
  /// enables conditional headers; it is `None` during first-contact
  /// bootstrap, when no identity exists to key a validator on.
  fn fetch_user(&self, known_uid: Option<&str>) -> Result<Identity> {
    let url = format!("{}/user", self.base_url);
    let mut request = ApiRequest::get(&url, &self.token);
    if let Some(uid) = known_uid {
      if let Some(validator) = self.store.validator(uid, &url)? {
        request.if_modified_since = Some(validator.last_modified);
        request.if_none_match = Some(validator.etag);
      }
    }

    self.acquire_slot()?;
    let response = match self.transport.execute(&request) {
      Ok(response) => response,
      Err(Error::Connection(e)) => {
        if let Some(identity) = self.store.identity_by_token(&self.token)? {
          warn!(url = %url, error = %e, "connection failed; using stored identity");
          return Ok(identity);
        }
        return Err(Error::Connection(e));
      }
      Err(e) => return Err(e),
    };

    if response.status == 304 {
      debug!(url = %url, "user profile not modified");
      return self
        .store
        .identity_by_token(&self.token)?
        .ok_or(Error::Request(404));
    }
    if response.status >= 400 {
      return Err(Error::from_status(response.status));
    }

    let profile = Resource::from_wire(serde_json::from_str(&response.body)?)?;
    let uid = profile
      .data
      .get("id")
      .and_then(Value::as_str)
      .ok_or_else(|| Error::malformed("user document carries no data.id"))?
      .to_string();

    if let (Some(last_modified), Some(etag)) = (&response.last_modified, &response.etag) {
      self.store.put_validator(
        &uid,
        &url,
        &Validator {
          last_modified: last_modified.clone(),
          etag: etag.clone(),
        },
      )?;
    }

    let identity = match self.store.identity_by_id(&uid)? {
      Some(mut known) => {
        if known.tokens.iter().any(|t| t == &self.token) {
          self.store.replace_profile(&uid, &profile)?;
          known.profile = profile;
        } else {
          // A second token for an account we already know. Both tokens now
          // share one cache namespace.
          self.store.attach_token(&uid, &self.token)?;
          known.tokens.push(self.token.clone());
        }
        known
      }
      None => {
        let identity = Identity {
          user_id: uid,
          tokens: vec![self.token.clone()],
          profile,
        };
        self.store.insert_identity(&identity)?;
        identity
      }
    };
    Ok(identity)
  }

  /// Issue a write. Writes never block on the rate limiter and never carry
  /// conditional headers.
  fn send_write(&self, method: Method, url: String, body: Value) -> Result<Value> {
    {
      let mut limiter = self.limiter.lock().map_err(|_| Error::LockPoisoned)?;
      if !limiter.can_request() {
        return Err(Error::RateLimited);
      }
    }
    debug!(url = %url, method = ?method, "write request");
    let request = ApiRequest {
      method,
      url,
      token: self.token.clone(),
      if_modified_since: None,
      if_none_match: None,
      body: Some(body),
    };
    let response = self.transport.execute(&request)?;
    if response.status >= 400 {
      return Err(Error::from_status(response.status));
    }
    Ok(serde_json::from_str(&response.body)?)
  }

  fn acquire_slot(&self) -> Result<()> {
    let mut limiter = self.limiter.lock().map_err(|_| Error::LockPoisoned)?;
    if !limiter.can_request() {
      limiter.sleep_until_allowed();
    }
    Ok(())
  }
}

fn object_body<T: Serialize>(value: &T) -> Result<Map<String, Value>> {
  match serde_json::to_value(value)? {
    Value::Object(map) => Ok(map),
    _ => Err(Error::malformed("request body must be a JSON object")),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::wanikani::transport::mock::MockTransport;
  use serde_json::json;

  const BASE: &str = "https://api.wanikani.com/v2";
  const UID: &str = "5a6a5234-a392-4a87-8f3f-33342afe8a42";

  fn user_doc(level: u64) -> Value {
    json!({
      "object": "user",
      "url": format!("{BASE}/user"),
      "data_updated_at": "2024-03-10T12:00:00.000000Z",
      "data": {
        "id": UID,
        "username": "crabigator",
        "level": level,
        "current_vacation_started_at": null
      }
    })
  }

  fn assignment_doc(id: u64) -> Value {
    json!({
      "id": id,
      "object": "assignment",
      "url": format!("{BASE}/assignments/{id}"),
      "data_updated_at": "2024-03-10T12:00:00.000000Z",
      "data": { "subject_id": 997, "srs_stage": 2, "started_at": "2024-03-10T12:00:00.000000Z" }
    })
  }

  fn review_response() -> Value {
    json!({
      "id": 72,
      "object": "review",
      "url": format!("{BASE}/reviews/72"),
      "data_updated_at": "2024-03-10T12:00:00.000000Z",
      "data": {
        "assignment_id": 1422,
        "subject_id": 997,
        "starting_srs_stage": 1,
        "ending_srs_stage": 2,
        "created_at": "2024-03-10T12:00:00.000000Z"
      },
      "resources_updated": {
        "assignment": {
          "id": 1422,
          "object": "assignment",
          "url": format!("{BASE}/assignments/1422"),
          "data_updated_at": "2024-03-10T12:00:01.000000Z",
          "data": { "subject_id": 997, "srs_stage": 2 }
        },
        "review_statistic": {
          "id": 342,
          "object": "review_statistic",
          "url": format!("{BASE}/review_statistics/342"),
          "data_updated_at": "2024-03-10T12:00:01.000000Z",
          "data": { "subject_id": 997, "percentage_correct": 90 }
        }
      }
    })
  }

  fn store() -> Arc<CacheStore> {
    Arc::new(CacheStore::open_in_memory().unwrap())
  }

  fn connect(store: &Arc<CacheStore>, token: &str, transport: MockTransport) -> Client<MockTransport> {
    Client::with_transport(
      token,
      BASE,
      store.clone(),
      Arc::new(Mutex::new(RateLimiter::new())),
      transport,
    )
    .unwrap()
  }

  #[test]
  fn test_first_contact_resolves_identity_over_network() {
    let store = store();
    let transport = MockTransport::new();
    transport.push_ok(user_doc(5));

    let client = connect(&store, "token-a", transport);

    assert_eq!(client.user_id(), UID);
    let requests = client.transport.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].url, format!("{BASE}/user"));
    // Bootstrap has no identity yet, so no conditional headers.
    assert!(requests[0].if_none_match.is_none());

    let identity = store.identity_by_token("token-a").unwrap().unwrap();
    assert_eq!(identity.user_id, UID);
    assert_eq!(identity.tokens, vec!["token-a"]);
    assert_eq!(identity.profile.data["level"], json!(5));
  }

  #[test]
  fn test_known_token_connects_without_network() {
    let store = store();
    let transport = MockTransport::new();
    transport.push_ok(user_doc(5));
    connect(&store, "token-a", transport);

    // An empty script would panic on any request.
    let offline = connect(&store, "token-a", MockTransport::new());
    assert_eq!(offline.user_id(), UID);
  }

  #[test]
  fn test_second_token_joins_existing_account() {
    let store = store();
    let transport = MockTransport::new();
    transport.push_ok(user_doc(5));
    let first = connect(&store, "token-a", transport);

    let transport = MockTransport::new();
    transport.push_ok(user_doc(5));
    let second = connect(&store, "token-b", transport);

    assert_eq!(first.user_id(), second.user_id());
    let identity = store.identity_by_token("token-b").unwrap().unwrap();
    assert_eq!(identity.tokens, vec!["token-a", "token-b"]);
  }

  #[test]
  fn test_user_refresh_replaces_profile_and_keeps_tokens() {
    let store = store();
    let transport = MockTransport::new();
    transport.push_ok_with_validators(user_doc(5), "Sun, 10 Mar 2024 12:00:00 GMT", "W/\"u1\"");
    let client = connect(&store, "token-a", transport);

    client
      .transport
      .push_ok_with_validators(user_doc(6), "Mon, 11 Mar 2024 12:00:00 GMT", "W/\"u2\"");
    let profile = client.user().unwrap();

    assert_eq!(profile.data["level"], json!(6));
    let requests = client.transport.requests();
    // The refresh reuses the validator stored at bootstrap.
    assert_eq!(requests[1].if_none_match.as_deref(), Some("W/\"u1\""));

    let identity = store.identity_by_id(UID).unwrap().unwrap();
    assert_eq!(identity.tokens, vec!["token-a"]);
    assert_eq!(identity.profile.data["level"], json!(6));
  }

  #[test]
  fn test_user_not_modified_returns_stored_profile() {
    let store = store();
    let transport = MockTransport::new();
    transport.push_ok_with_validators(user_doc(5), "Sun, 10 Mar 2024 12:00:00 GMT", "W/\"u1\"");
    let client = connect(&store, "token-a", transport);

    client.transport.push_status(304);
    let profile = client.user().unwrap();
    assert_eq!(profile.data["level"], json!(5));
  }

  #[test]
  fn test_lone_scalar_id_routes_to_item_endpoint() {
    let store = store();
    let transport = MockTransport::new();
    transport.push_ok(user_doc(5));
    let client = connect(&store, "token-a", transport);

    client.transport.push_ok(assignment_doc(42));
    let docs = client
      .assignments(&AssignmentFilters {
        ids: Some(42u64.into()),
        ..Default::default()
      })
      .unwrap();

    assert_eq!(docs.len(), 1);
    let requests = client.transport.requests();
    assert_eq!(requests[1].url, format!("{BASE}/assignments/42"));
  }

  #[test]
  fn test_create_review_persists_all_three_documents() {
    let store = store();
    let transport = MockTransport::new();
    transport.push_ok(user_doc(5));
    let client = connect(&store, "token-a", transport);

    client.transport.push_ok(review_response());
    let outcome = client
      .create_review(&NewReview {
        target: ReviewTarget::Assignment(1422),
        incorrect_meaning_answers: 1,
        incorrect_reading_answers: 0,
        created_at: None,
      })
      .unwrap();

    assert_eq!(outcome.review.id, Some(72));
    assert_eq!(outcome.assignment.id, Some(1422));
    assert_eq!(outcome.review_statistic.id, Some(342));

    let requests = client.transport.requests();
    assert_eq!(requests[1].method, Method::Post);
    assert_eq!(requests[1].url, format!("{BASE}/reviews/"));
    let body = requests[1].body.as_ref().unwrap();
    assert_eq!(body["assignment_id"], json!(1422));
    assert!(body.get("subject_id").is_none());

    assert!(store.find_document(UID, &["review"], 72).unwrap().is_some());
    assert!(store
      .find_document(UID, &["assignment"], 1422)
      .unwrap()
      .is_some());
    assert!(store
      .find_document(UID, &["review_statistic"], 342)
      .unwrap()
      .is_some());
  }

  #[test]
  fn test_writes_fail_fast_when_budget_is_spent() {
    let store = store();
    let transport = MockTransport::new();
    transport.push_ok(user_doc(5));
    let limiter = Arc::new(Mutex::new(RateLimiter::new()));
    let client =
      Client::with_transport("token-a", BASE, store.clone(), limiter.clone(), transport).unwrap();

    {
      let mut limiter = limiter.lock().unwrap();
      while limiter.can_request() {}
    }

    let err = client.start_assignment(1422, None).unwrap_err();
    assert!(matches!(err, Error::RateLimited));
    // Nothing beyond the bootstrap request went out.
    assert_eq!(client.transport.requests().len(), 1);
  }

  #[test]
  fn test_start_assignment_formats_timestamp_and_stores_result() {
    let store = store();
    let transport = MockTransport::new();
    transport.push_ok(user_doc(5));
    let client = connect(&store, "token-a", transport);

    client.transport.push_ok(assignment_doc(1422));
    let doc = client
      .start_assignment(1422, Some("2024-03-10T12:00:00Z".into()))
      .unwrap();

    assert_eq!(doc.id, Some(1422));
    let requests = client.transport.requests();
    assert_eq!(requests[1].method, Method::Put);
    assert_eq!(requests[1].url, format!("{BASE}/assignments/1422/start"));
    assert_eq!(
      requests[1].body.as_ref().unwrap(),
      &json!({ "started_at": "2024-03-10T12:00:00.000000Z" })
    );
    assert!(store
      .find_document(UID, &["assignment"], 1422)
      .unwrap()
      .is_some());
  }

  #[test]
  fn test_study_material_writes_hit_create_and_update_endpoints() {
    let store = store();
    let transport = MockTransport::new();
    transport.push_ok(user_doc(5));
    let client = connect(&store, "token-a", transport);

    let material = json!({
      "id": 65231,
      "object": "study_material",
      "url": format!("{BASE}/study_materials/65231"),
      "data_updated_at": "2024-03-10T12:00:00.000000Z",
      "data": { "subject_id": 997, "meaning_note": "note" }
    });
    client.transport.push_ok(material.clone());
    client.transport.push_ok(material);

    client
      .create_study_material(
        997,
        &StudyMaterialUpdate {
          meaning_note: Some("note".to_string()),
          ..Default::default()
        },
      )
      .unwrap();
    client
      .update_study_material(
        65231,
        &StudyMaterialUpdate {
          reading_note: Some("other".to_string()),
          ..Default::default()
        },
      )
      .unwrap();

    let requests = client.transport.requests();
    assert_eq!(requests[1].method, Method::Post);
    assert_eq!(requests[1].url, format!("{BASE}/study_materials/"));
    assert_eq!(
      requests[1].body.as_ref().unwrap(),
      &json!({ "meaning_note": "note", "subject_id": 997 })
    );
    assert_eq!(requests[2].method, Method::Put);
    assert_eq!(requests[2].url, format!("{BASE}/study_materials/65231"));
    assert_eq!(
      requests[2].body.as_ref().unwrap(),
      &json!({ "reading_note": "other" })
    );
  }

  #[test]
  fn test_update_user_sends_only_set_fields() {
    let store = store();
    let transport = MockTransport::new();
    transport.push_ok(user_doc(5));
    let client = connect(&store, "token-a", transport);

    client.transport.push_ok(user_doc(5));
    client
      .update_user(&UserPreferences {
        lessons_batch_size: Some(10),
        ..Default::default()
      })
      .unwrap();

    let requests = client.transport.requests();
    assert_eq!(requests[1].method, Method::Put);
    assert_eq!(requests[1].url, format!("{BASE}/user"));
    assert_eq!(
      requests[1].body.as_ref().unwrap(),
      &json!({ "lessons_batch_size": 10 })
    );

    let identity = store.identity_by_token("token-a").unwrap().unwrap();
    assert_eq!(identity.tokens, vec!["token-a"]);
  }
}
