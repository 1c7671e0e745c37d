//! Request and response types for fetch interception.

use serde::{Deserialize, Serialize};

use crate::config::WorkerConfig;

/// HTTP method of an intercepted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
  Get,
  Post,
  Put,
  Delete,
  Head,
  Options,
  Patch,
}

impl std::fmt::Display for Method {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Method::Get => write!(f, "GET"),
      Method::Post => write!(f, "POST"),
      Method::Put => write!(f, "PUT"),
      Method::Delete => write!(f, "DELETE"),
      Method::Head => write!(f, "HEAD"),
      Method::Options => write!(f, "OPTIONS"),
      Method::Patch => write!(f, "PATCH"),
    }
  }
}

/// What kind of resource a request is for. Only `Document` navigations get
/// an offline fallback page; other destinations surface network failures.
///
/// Hosts send destination strings beyond the ones modeled here ("video",
/// "worker", ...); anything unrecognized collapses to `Other`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Destination {
  Document,
  Script,
  Style,
  Image,
  Font,
  #[default]
  #[serde(other)]
  Other,
}

/// An intercepted outgoing request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchRequest {
  pub method: Method,
  pub url: String,
  #[serde(default)]
  pub destination: Destination,
}

impl FetchRequest {
  /// A plain GET for a sub-resource.
  pub fn get(url: impl Into<String>) -> Self {
    Self {
      method: Method::Get,
      url: url.into(),
      destination: Destination::Other,
    }
  }

  /// A full document navigation.
  pub fn navigate(url: impl Into<String>) -> Self {
    Self {
      method: Method::Get,
      url: url.into(),
      destination: Destination::Document,
    }
  }

  /// Normalized request identity used as the cache entry key.
  pub fn cache_key(&self) -> String {
    format!("{} {}", self.method, self.url)
  }
}

/// A stored response snapshot: status, headers, body. Cloning yields an
/// independent copy, so one snapshot can be persisted while the other is
/// returned to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredResponse {
  pub status: u16,
  pub headers: Vec<(String, String)>,
  pub body: Vec<u8>,
}

impl StoredResponse {
  pub fn new(status: u16, body: Vec<u8>) -> Self {
    Self {
      status,
      headers: Vec::new(),
      body,
    }
  }

  pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    self.headers.push((name.into(), value.into()));
    self
  }

  /// Look up a header value, case-insensitively.
  pub fn header(&self, name: &str) -> Option<&str> {
    self
      .headers
      .iter()
      .find(|(n, _)| n.eq_ignore_ascii_case(name))
      .map(|(_, v)| v.as_str())
  }
}

/// Synthesized minimal branded page served when a document navigation fails
/// while the resource is not cached.
pub fn offline_page(config: &WorkerConfig) -> StoredResponse {
  let html = format!(
    "<!DOCTYPE html>\n\
     <html>\n\
     <head>\n\
     <title>{name} - Offline</title>\n\
     <meta charset=\"UTF-8\">\n\
     </head>\n\
     <body style=\"font-family: Arial; text-align: center; padding: 50px;\">\n\
     <h1>{name}</h1>\n\
     <p>You appear to be offline.</p>\n\
     <p>Please check your connection and try again.</p>\n\
     </body>\n\
     </html>\n",
    name = config.app_name
  );

  StoredResponse::new(200, html.into_bytes()).with_header("Content-Type", "text/html")
}
