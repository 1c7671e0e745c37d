//! Notification types and the notification surface capability.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::host::HostCommand;
use crate::push::PushPayload;

/// Fixed inline vector glyph used as icon and badge on every notification.
pub const ICON: &str = "data:image/svg+xml,<svg xmlns=\"http://www.w3.org/2000/svg\" viewBox=\"0 0 100 100\"><rect width=\"100\" height=\"100\" fill=\"%233B82F6\"/><text x=\"50\" y=\"60\" font-size=\"40\" text-anchor=\"middle\" fill=\"white\">\u{1F3AF}</text></svg>";

/// Data record attached to a presented notification, recovered on click.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationData {
  /// The full original payload.
  pub payload: PushPayload,
  /// Delivery timestamp, milliseconds since the epoch.
  pub timestamp: i64,
  /// Resolved target URL for click routing.
  pub url: String,
  pub is_auto: bool,
}

/// A user action exposed on a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationAction {
  pub action: String,
  pub title: String,
}

/// A notification ready for presentation. The tag doubles as a replacement
/// key: presenting another notification with the same tag supersedes this one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
  pub title: String,
  pub body: String,
  pub tag: String,
  pub icon: String,
  pub badge: String,
  pub require_interaction: bool,
  pub silent: bool,
  pub renotify: bool,
  pub actions: Vec<NotificationAction>,
  pub data: NotificationData,
}

/// Platform notification surface: presents, removes, and lists notifications.
#[async_trait]
pub trait NotificationSurface: Send + Sync {
  /// Present a notification, replacing any displayed one with the same tag.
  async fn show(&self, notification: Notification) -> Result<()>;

  /// Remove the notification with the given tag from the surface.
  /// Returns whether one was displayed.
  async fn close(&self, tag: &str) -> Result<bool>;

  /// Currently displayed notifications.
  async fn shown(&self) -> Vec<Notification>;
}

#[async_trait]
impl<T: NotificationSurface + ?Sized> NotificationSurface for std::sync::Arc<T> {
  async fn show(&self, notification: Notification) -> Result<()> {
    (**self).show(notification).await
  }

  async fn close(&self, tag: &str) -> Result<bool> {
    (**self).close(tag).await
  }

  async fn shown(&self) -> Vec<Notification> {
    (**self).shown().await
  }
}

/// Surface that forwards presentations to the host process and mirrors the
/// platform's displayed set, keyed by tag.
pub struct HostSurface {
  commands: mpsc::UnboundedSender<HostCommand>,
  displayed: Mutex<HashMap<String, Notification>>,
}

impl HostSurface {
  pub fn new(commands: mpsc::UnboundedSender<HostCommand>) -> Self {
    Self {
      commands,
      displayed: Mutex::new(HashMap::new()),
    }
  }

  fn send(&self, command: HostCommand) -> Result<()> {
    self
      .commands
      .send(command)
      .map_err(|_| eyre!("host command channel closed"))
  }
}

#[async_trait]
impl NotificationSurface for HostSurface {
  async fn show(&self, notification: Notification) -> Result<()> {
    {
      let mut displayed = self
        .displayed
        .lock()
        .map_err(|e| eyre!("Lock poisoned: {}", e))?;
      displayed.insert(notification.tag.clone(), notification.clone());
    }
    self.send(HostCommand::ShowNotification(notification))
  }

  async fn close(&self, tag: &str) -> Result<bool> {
    let existed = {
      let mut displayed = self
        .displayed
        .lock()
        .map_err(|e| eyre!("Lock poisoned: {}", e))?;
      displayed.remove(tag).is_some()
    };
    self.send(HostCommand::CloseNotification {
      tag: tag.to_string(),
    })?;
    Ok(existed)
  }

  async fn shown(&self) -> Vec<Notification> {
    self
      .displayed
      .lock()
      .map(|displayed| displayed.values().cloned().collect())
      .unwrap_or_default()
  }
}
