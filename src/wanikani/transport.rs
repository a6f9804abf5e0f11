//! HTTP transport seam.
//!
//! The fetch engine talks to the network through the `Transport` trait so
//! tests can script exchanges without sockets. The shipped implementation
//! wraps a blocking reqwest client.

use reqwest::header;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
  Get,
  Post,
  Put,
}

/// One outgoing API request, fully assembled by the caller.
#[derive(Debug, Clone)]
pub struct ApiRequest {
  pub method: Method,
  pub url: String,
  pub token: String,
  pub if_modified_since: Option<String>,
  pub if_none_match: Option<String>,
  pub body: Option<serde_json::Value>,
}

impl ApiRequest {
  pub fn get(url: impl Into<String>, token: impl Into<String>) -> Self {
    Self {
      method: Method::Get,
      url: url.into(),
      token: token.into(),
      if_modified_since: None,
      if_none_match: None,
      body: None,
    }
  }
}

/// The parts of a response the engine consumes.
#[derive(Debug, Clone)]
pub struct ApiResponse {
  pub status: u16,
  pub etag: Option<String>,
  pub last_modified: Option<String>,
  pub body: String,
}

/// A synchronous HTTP capability.
pub trait Transport {
  fn execute(&self, request: &ApiRequest) -> Result<ApiResponse>;
}

/// Production transport on `reqwest::blocking`.
pub struct HttpTransport {
  client: reqwest::blocking::Client,
}

impl HttpTransport {
  pub fn new() -> Result<Self> {
    let client = reqwest::blocking::Client::builder()
      .user_agent(concat!("wanicache/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| Error::Connection(Box::new(e)))?;
    Ok(Self { client })
  }
}

impl Transport for HttpTransport {
  fn execute(&self, request: &ApiRequest) -> Result<ApiResponse> {
    let mut builder = match request.method {
      Method::Get => self.client.get(&request.url),
      Method::Post => self.client.post(&request.url),
      Method::Put => self.client.put(&request.url),
    };
    builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", request.token));
    if let Some(since) = &request.if_modified_since {
      builder = builder.header(header::IF_MODIFIED_SINCE, since);
    }
    if let Some(etag) = &request.if_none_match {
      builder = builder.header(header::IF_NONE_MATCH, etag);
    }
    if let Some(body) = &request.body {
      builder = builder
        .header(header::CONTENT_TYPE, "application/json; charset=utf-8")
        .body(serde_json::to_string(body)?);
    }

    let response = builder
      .send()
      .map_err(|e| Error::Connection(Box::new(e)))?;

    let status = response.status().as_u16();
    let etag = response
      .headers()
      .get(header::ETAG)
      .and_then(|v| v.to_str().ok())
      .map(String::from);
    let last_modified = response
      .headers()
      .get(header::LAST_MODIFIED)
      .and_then(|v| v.to_str().ok())
      .map(String::from);
    let body = response
      .text()
      .map_err(|e| Error::Connection(Box::new(e)))?;

    Ok(ApiResponse {
      status,
      etag,
      last_modified,
      body,
    })
  }
}

#[cfg(test)]
pub(crate) mod mock {
  use super::*;
  use std::collections::VecDeque;
  use std::sync::Mutex;

  /// Scripted transport: hands out canned responses in order and records
  /// every request it saw.
  pub struct MockTransport {
    responses: Mutex<VecDeque<Result<ApiResponse>>>,
    requests: Mutex<Vec<ApiRequest>>,
  }

  impl MockTransport {
    pub fn new() -> Self {
      Self {
        responses: Mutex::new(VecDeque::new()),
        requests: Mutex::new(Vec::new()),
      }
    }

    pub fn push_response(&self, response: ApiResponse) {
      self.responses.lock().unwrap().push_back(Ok(response));
    }

    pub fn push_ok(&self, body: serde_json::Value) {
      self.push_response(ApiResponse {
        status: 200,
        etag: None,
        last_modified: None,
        body: body.to_string(),
      });
    }

    pub fn push_ok_with_validators(
      &self,
      body: serde_json::Value,
      last_modified: &str,
      etag: &str,
    ) {
      self.push_response(ApiResponse {
        status: 200,
        etag: Some(etag.to_string()),
        last_modified: Some(last_modified.to_string()),
        body: body.to_string(),
      });
    }

    pub fn push_status(&self, status: u16) {
      self.push_response(ApiResponse {
        status,
        etag: None,
        last_modified: None,
        body: String::new(),
      });
    }

    pub fn push_connection_error(&self) {
      self
        .responses
        .lock()
        .unwrap()
        .push_back(Err(Error::Connection("connection refused".into())));
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
      self.requests.lock().unwrap().clone()
    }
  }

  impl Transport for MockTransport {
    fn execute(&self, request: &ApiRequest) -> Result<ApiResponse> {
      self.requests.lock().unwrap().push(request.clone());
      self
        .responses
        .lock()
        .unwrap()
        .pop_front()
        .expect("no scripted response left for request")
    }
  }
}
