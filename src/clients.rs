//! Client view directory capability.
//!
//! Open application views are not owned by the worker: the directory is a
//! transient mirror maintained by the host bridge, queried whenever a
//! notification must be broadcast or a window focused/opened.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::host::HostCommand;
use crate::push::PushPayload;

/// An open application window/tab.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientView {
  pub id: String,
  pub url: String,
  /// Whether this view is served by the current worker instance.
  #[serde(default)]
  pub controlled: bool,
}

/// Message broadcast to every open view after a push is presented, letting
/// foreground views render an in-app toast independent of the platform
/// notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushBroadcast {
  /// Envelope marker, always "push_notification".
  #[serde(rename = "type")]
  pub message_type: String,
  pub title: String,
  pub body: String,
  pub tag: String,
  pub notification_type: String,
  /// The full original payload.
  pub data: PushPayload,
  pub is_auto: bool,
}

impl PushBroadcast {
  pub const MESSAGE_TYPE: &'static str = "push_notification";
}

/// Client enumeration and control capability.
#[async_trait]
pub trait ClientDirectory: Send + Sync {
  /// Enumerate open views. With `include_uncontrolled`, views not yet
  /// claimed by this worker instance are returned as well.
  async fn enumerate(&self, include_uncontrolled: bool) -> Vec<ClientView>;

  /// Bring an existing view to focus.
  async fn focus(&self, id: &str) -> Result<()>;

  /// Open a new view at the given URL.
  async fn open(&self, url: &str) -> Result<ClientView>;

  /// Claim all open views so they are served by this worker instance.
  async fn claim(&self) -> Result<()>;

  /// Deliver a message to one view.
  async fn post_message(&self, id: &str, message: &PushBroadcast) -> Result<()>;

  /// Ask the host to let this worker version supersede any waiting
  /// predecessor without waiting for existing clients to close.
  async fn request_takeover(&self) -> Result<()>;
}

#[async_trait]
impl<T: ClientDirectory + ?Sized> ClientDirectory for std::sync::Arc<T> {
  async fn enumerate(&self, include_uncontrolled: bool) -> Vec<ClientView> {
    (**self).enumerate(include_uncontrolled).await
  }

  async fn focus(&self, id: &str) -> Result<()> {
    (**self).focus(id).await
  }

  async fn open(&self, url: &str) -> Result<ClientView> {
    (**self).open(url).await
  }

  async fn claim(&self) -> Result<()> {
    (**self).claim().await
  }

  async fn post_message(&self, id: &str, message: &PushBroadcast) -> Result<()> {
    (**self).post_message(id, message).await
  }

  async fn request_takeover(&self) -> Result<()> {
    (**self).request_takeover().await
  }
}

/// Directory backed by the host bridge: the registry is updated from
/// client-opened/closed events, and control actions are emitted as host
/// commands.
pub struct HostClients {
  commands: mpsc::UnboundedSender<HostCommand>,
  views: RwLock<Vec<ClientView>>,
  next_id: AtomicU64,
}

impl HostClients {
  pub fn new(commands: mpsc::UnboundedSender<HostCommand>) -> Self {
    Self {
      commands,
      views: RwLock::new(Vec::new()),
      next_id: AtomicU64::new(1),
    }
  }

  /// Record a view the host reports as opened. Views start uncontrolled
  /// until the worker claims them.
  pub fn register(&self, id: impl Into<String>, url: impl Into<String>) {
    if let Ok(mut views) = self.views.write() {
      let id = id.into();
      views.retain(|view| view.id != id);
      views.push(ClientView {
        id,
        url: url.into(),
        controlled: false,
      });
    }
  }

  /// Drop a view the host reports as closed.
  pub fn unregister(&self, id: &str) {
    if let Ok(mut views) = self.views.write() {
      views.retain(|view| view.id != id);
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
impl ClientDirectory for HostClients {
  async fn enumerate(&self, include_uncontrolled: bool) -> Vec<ClientView> {
    self
      .views
      .read()
      .map(|views| {
        views
          .iter()
          .filter(|view| include_uncontrolled || view.controlled)
          .cloned()
          .collect()
      })
      .unwrap_or_default()
  }

  async fn focus(&self, id: &str) -> Result<()> {
    self.send(HostCommand::FocusClient { id: id.to_string() })
  }

  async fn open(&self, url: &str) -> Result<ClientView> {
    let view = ClientView {
      id: format!("client-{}", self.next_id.fetch_add(1, Ordering::SeqCst)),
      url: url.to_string(),
      controlled: true,
    };
    {
      let mut views = self
        .views
        .write()
        .map_err(|e| eyre!("Lock poisoned: {}", e))?;
      views.push(view.clone());
    }
    self.send(HostCommand::OpenClient {
      id: view.id.clone(),
      url: view.url.clone(),
    })?;
    Ok(view)
  }

  async fn claim(&self) -> Result<()> {
    {
      let mut views = self
        .views
        .write()
        .map_err(|e| eyre!("Lock poisoned: {}", e))?;
      for view in views.iter_mut() {
        view.controlled = true;
      }
    }
    self.send(HostCommand::ClaimClients)
  }

  async fn post_message(&self, id: &str, message: &PushBroadcast) -> Result<()> {
    self.send(HostCommand::PostMessage {
      client: id.to_string(),
      message: message.clone(),
    })
  }

  async fn request_takeover(&self) -> Result<()> {
    self.send(HostCommand::SkipWaiting)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn directory() -> (HostClients, mpsc::UnboundedReceiver<HostCommand>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (HostClients::new(tx), rx)
  }

  #[tokio::test]
  async fn test_enumerate_filters_uncontrolled() {
    let (clients, _rx) = directory();
    clients.register("tab-1", "/");
    clients.register("tab-2", "/dashboard");

    assert!(clients.enumerate(false).await.is_empty());
    assert_eq!(clients.enumerate(true).await.len(), 2);

    clients.claim().await.unwrap();
    assert_eq!(clients.enumerate(false).await.len(), 2);
  }

  #[tokio::test]
  async fn test_open_registers_and_reports() {
    let (clients, mut rx) = directory();
    let view = clients.open("/alerts").await.unwrap();

    assert_eq!(view.url, "/alerts");
    assert!(view.controlled);
    assert_eq!(clients.enumerate(false).await, vec![view.clone()]);
    assert_eq!(
      rx.try_recv().unwrap(),
      HostCommand::OpenClient {
        id: view.id,
        url: "/alerts".to_string()
      }
    );
  }

  #[tokio::test]
  async fn test_reopened_id_replaces_previous_view() {
    let (clients, _rx) = directory();
    clients.register("tab-1", "/");
    clients.register("tab-1", "/settings");

    let views = clients.enumerate(true).await;
    assert_eq!(views.len(), 1);
    assert_eq!(views[0].url, "/settings");

    clients.unregister("tab-1");
    assert!(clients.enumerate(true).await.is_empty());
  }
}
