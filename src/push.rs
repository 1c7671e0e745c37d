//! Push payload parsing, classification, and resolution against defaults.

use serde::{Deserialize, Serialize};

use crate::config::WorkerConfig;

/// Inbound push payload. Every field is optional at the boundary; defaults
/// are applied deterministically during resolution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PushPayload {
  pub title: Option<String>,
  pub body: Option<String>,
  pub tag: Option<String>,
  #[serde(rename = "type")]
  pub kind: Option<String>,
  pub auto: Option<bool>,
  pub toast: Option<bool>,
  pub url: Option<String>,
  pub timestamp: Option<i64>,
}

impl PushPayload {
  /// Parse raw push data. Absent data yields an empty payload; malformed
  /// data is replaced with a fixed fallback so the delivery never fails.
  pub fn parse(raw: Option<&str>, config: &WorkerConfig) -> Self {
    match raw {
      None => Self::default(),
      Some(data) => serde_json::from_str(data).unwrap_or_else(|e| {
        tracing::warn!("push data parse error: {}", e);
        Self::fallback(config)
      }),
    }
  }

  fn fallback(config: &WorkerConfig) -> Self {
    Self {
      title: Some(config.app_name.clone()),
      body: Some(config.notification_body.clone()),
      ..Self::default()
    }
  }
}

/// Automatic (system-initiated) classification: an explicit `auto` flag, or
/// a tag mentioning "auto" or "welcome". The substring match is literal by
/// design and tolerates false positives.
pub fn is_automatic(payload: &PushPayload) -> bool {
  if payload.auto == Some(true) {
    return true;
  }
  payload
    .tag
    .as_deref()
    .map(|tag| tag.contains("auto") || tag.contains("welcome"))
    .unwrap_or(false)
}

/// Presentation attributes derived purely from the automatic classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Presentation {
  pub require_interaction: bool,
  pub silent: bool,
  pub renotify: bool,
}

impl Presentation {
  pub fn for_class(automatic: bool) -> Self {
    Self {
      require_interaction: !automatic,
      silent: automatic,
      renotify: true,
    }
  }
}

/// A payload resolved against configuration defaults, ready to present.
#[derive(Debug, Clone)]
pub struct ResolvedPush {
  pub title: String,
  pub body: String,
  pub tag: String,
  pub kind: String,
  pub url: String,
  pub automatic: bool,
  pub toast: bool,
  /// The original payload, carried on the notification unmodified.
  pub payload: PushPayload,
}

/// Apply field defaults and classification.
pub fn resolve(payload: PushPayload, config: &WorkerConfig) -> ResolvedPush {
  let automatic = is_automatic(&payload);

  ResolvedPush {
    title: payload
      .title
      .clone()
      .unwrap_or_else(|| config.notification_title.clone()),
    body: payload
      .body
      .clone()
      .unwrap_or_else(|| config.notification_body.clone()),
    tag: payload.tag.clone().unwrap_or_else(|| "default".to_string()),
    kind: payload.kind.clone().unwrap_or_else(|| "info".to_string()),
    url: payload.url.clone().unwrap_or_else(|| "/".to_string()),
    toast: payload.toast == Some(true) || automatic,
    automatic,
    payload,
  }
}
