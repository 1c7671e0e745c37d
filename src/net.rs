//! Network capability used for install seeding and cache misses.

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use url::Url;

use crate::fetch::{FetchRequest, Method, StoredResponse};

/// Performs the actual outgoing request for a fetch the cache cannot serve.
#[async_trait]
pub trait Network: Send + Sync {
  async fn fetch(&self, request: &FetchRequest) -> Result<StoredResponse>;
}

#[async_trait]
impl<T: Network + ?Sized> Network for std::sync::Arc<T> {
  async fn fetch(&self, request: &FetchRequest) -> Result<StoredResponse> {
    (**self).fetch(request).await
  }
}

/// reqwest-backed network that resolves request URLs against the configured
/// application origin.
///
/// No request timeout is configured: a hung fetch stalls only the request
/// that issued it.
pub struct HttpNetwork {
  client: reqwest::Client,
  base: Url,
}

impl HttpNetwork {
  pub fn new(origin: &str) -> Result<Self> {
    let base = Url::parse(origin).map_err(|e| eyre!("Invalid origin {}: {}", origin, e))?;
    let client = reqwest::Client::builder()
      .build()
      .map_err(|e| eyre!("Failed to build HTTP client: {}", e))?;

    Ok(Self { client, base })
  }

  /// Resolve a possibly-relative request URL against the origin.
  fn resolve(&self, url: &str) -> Result<Url> {
    self
      .base
      .join(url)
      .map_err(|e| eyre!("Invalid request URL {}: {}", url, e))
  }
}

impl From<Method> for reqwest::Method {
  fn from(method: Method) -> Self {
    match method {
      Method::Get => reqwest::Method::GET,
      Method::Post => reqwest::Method::POST,
      Method::Put => reqwest::Method::PUT,
      Method::Delete => reqwest::Method::DELETE,
      Method::Head => reqwest::Method::HEAD,
      Method::Options => reqwest::Method::OPTIONS,
      Method::Patch => reqwest::Method::PATCH,
    }
  }
}

#[async_trait]
impl Network for HttpNetwork {
  async fn fetch(&self, request: &FetchRequest) -> Result<StoredResponse> {
    let url = self.resolve(&request.url)?;

    let response = self
      .client
      .request(request.method.into(), url)
      .send()
      .await
      .map_err(|e| eyre!("Fetch failed for {}: {}", request.url, e))?;

    let status = response.status().as_u16();
    let headers = response
      .headers()
      .iter()
      .filter_map(|(name, value)| {
        value
          .to_str()
          .ok()
          .map(|v| (name.to_string(), v.to_string()))
      })
      .collect();
    let body = response
      .bytes()
      .await
      .map_err(|e| eyre!("Failed to read body for {}: {}", request.url, e))?
      .to_vec();

    Ok(StoredResponse {
      status,
      headers,
      body,
    })
  }
}
