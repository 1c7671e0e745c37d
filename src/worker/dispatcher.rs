//! Push delivery handling and notification presentation.

use std::time::Duration;

use chrono::Utc;
use color_eyre::Result;
use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::cache::CacheStore;
use crate::clients::{ClientDirectory, PushBroadcast};
use crate::net::Network;
use crate::notify::{
  Notification, NotificationAction, NotificationData, NotificationSurface, ICON,
};
use crate::push::{self, Presentation, PushPayload, ResolvedPush};

use super::Worker;

/// Delay before the post-notification housekeeping pass runs.
const HOUSEKEEPING_DELAY: Duration = Duration::from_secs(5);

impl<C, N, S, D> Worker<C, N, S, D>
where
  C: CacheStore,
  N: Network,
  S: NotificationSurface,
  D: ClientDirectory,
{
  /// Handle an inbound push delivery: resolve the payload, present the
  /// notification, and broadcast the payload to every open client view so
  /// foreground views can render their own toast.
  ///
  /// Malformed payloads are recovered with a fixed fallback; the delivery
  /// itself never fails on decode.
  pub async fn handle_push(&self, raw: Option<String>) -> Result<()> {
    let payload = PushPayload::parse(raw.as_deref(), &self.config);
    let resolved = push::resolve(payload, &self.config);
    info!(tag = %resolved.tag, automatic = resolved.automatic, "push received");

    self.surface.show(self.build_notification(&resolved)).await?;
    self.broadcast(&resolved).await;

    if resolved.automatic && self.config.auto_notifications {
      schedule_housekeeping(resolved.tag.clone());
    }

    Ok(())
  }

  fn build_notification(&self, resolved: &ResolvedPush) -> Notification {
    let presentation = Presentation::for_class(resolved.automatic);

    Notification {
      title: resolved.title.clone(),
      body: resolved.body.clone(),
      tag: resolved.tag.clone(),
      icon: ICON.to_string(),
      badge: ICON.to_string(),
      require_interaction: presentation.require_interaction,
      silent: presentation.silent,
      renotify: presentation.renotify,
      actions: vec![
        NotificationAction {
          action: "open".to_string(),
          title: "Open".to_string(),
        },
        NotificationAction {
          action: "dismiss".to_string(),
          title: "Dismiss".to_string(),
        },
      ],
      data: NotificationData {
        payload: resolved.payload.clone(),
        timestamp: Utc::now().timestamp_millis(),
        url: resolved.url.clone(),
        is_auto: resolved.automatic,
      },
    }
  }

  /// Best-effort delivery to every open view, visible or not.
  async fn broadcast(&self, resolved: &ResolvedPush) {
    let message = PushBroadcast {
      message_type: PushBroadcast::MESSAGE_TYPE.to_string(),
      title: resolved.title.clone(),
      body: resolved.body.clone(),
      tag: resolved.tag.clone(),
      notification_type: resolved.kind.clone(),
      data: resolved.payload.clone(),
      is_auto: resolved.automatic,
    };

    let views = self.clients.enumerate(false).await;
    let deliveries = views
      .iter()
      .map(|view| self.clients.post_message(&view.id, &message));

    for (view, result) in views.iter().zip(join_all(deliveries).await) {
      if let Err(e) = result {
        warn!(client = %view.id, "broadcast failed: {}", e);
      }
    }
  }
}

/// Extension point: a deferred pass after each automatic notification.
/// Currently performs no observable action.
fn schedule_housekeeping(tag: String) {
  tokio::spawn(async move {
    tokio::time::sleep(HOUSEKEEPING_DELAY).await;
    debug!(tag = %tag, "automatic notification housekeeping");
  });
}
