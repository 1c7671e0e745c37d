//! Notification click routing: focus an existing view or open a new one.

use color_eyre::Result;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cache::CacheStore;
use crate::clients::ClientDirectory;
use crate::net::Network;
use crate::notify::{NotificationData, NotificationSurface};

use super::Worker;

/// A user interaction with a presented notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationClick {
  pub tag: String,
  /// Selected action; absent for default activation.
  #[serde(default)]
  pub action: Option<String>,
  /// Data attached by the dispatcher at presentation time.
  #[serde(default)]
  pub data: Option<NotificationData>,
}

impl<C, N, S, D> Worker<C, N, S, D>
where
  C: CacheStore,
  N: Network,
  S: NotificationSurface,
  D: ClientDirectory,
{
  /// Always dismisses the notification first, whatever the action. A
  /// "dismiss" action stops there; any other activation resolves the target
  /// URL from the attached data and focuses an exactly-matching open view,
  /// or opens a new one.
  pub async fn handle_notification_click(&self, click: NotificationClick) -> Result<()> {
    debug!(tag = %click.tag, action = ?click.action, "notification clicked");
    self.surface.close(&click.tag).await?;

    if click.action.as_deref() == Some("dismiss") {
      return Ok(());
    }

    let target = click
      .data
      .as_ref()
      .map(|data| data.url.clone())
      .unwrap_or_else(|| "/".to_string());

    // Exact string match only; no path normalization.
    for view in self.clients.enumerate(true).await {
      if view.url == target {
        return self.clients.focus(&view.id).await;
      }
    }

    self.clients.open(&target).await?;
    Ok(())
  }
}
