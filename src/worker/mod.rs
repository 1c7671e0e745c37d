//! The event-driven worker controller.
//!
//! One async handler per external trigger; each handler's returned future
//! represents all of its side effects. The handlers hold no mutable state of
//! their own — everything lives in the injected capabilities and the
//! immutable configuration.

mod dispatcher;
mod interceptor;
mod lifecycle;
mod router;

pub use router::NotificationClick;

use color_eyre::Result;
use serde::{Deserialize, Serialize};

use crate::cache::CacheStore;
use crate::clients::ClientDirectory;
use crate::config::WorkerConfig;
use crate::net::Network;
use crate::notify::NotificationSurface;

/// Command message accepted from client views.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WorkerCommand {
  /// Force this worker version to take over immediately.
  SkipWaiting,
  /// Report the current cache generation tag over the reply channel.
  GetVersion,
}

/// Reply sent back over the message channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WorkerReply {
  Version { version: String },
}

/// The reactive controller mediating between external triggers and the
/// injected platform capabilities.
pub struct Worker<C, N, S, D> {
  config: WorkerConfig,
  cache: C,
  network: N,
  surface: S,
  clients: D,
}

impl<C, N, S, D> Worker<C, N, S, D>
where
  C: CacheStore,
  N: Network,
  S: NotificationSurface,
  D: ClientDirectory,
{
  pub fn new(config: WorkerConfig, cache: C, network: N, surface: S, clients: D) -> Self {
    Self {
      config,
      cache,
      network,
      surface,
      clients,
    }
  }

  /// Current cache generation tag.
  pub fn version(&self) -> &str {
    &self.config.version
  }

  /// Handle a command message from a client view.
  pub async fn handle_message(&self, command: WorkerCommand) -> Result<Option<WorkerReply>> {
    match command {
      WorkerCommand::SkipWaiting => {
        self.clients.request_takeover().await?;
        Ok(None)
      }
      WorkerCommand::GetVersion => Ok(Some(WorkerReply::Version {
        version: self.version().to_string(),
      })),
    }
  }
}


#[cfg(test)]
mod tests {
  use super::testutil::TestWorker;
  use super::{WorkerCommand, WorkerReply};
  use crate::host::HostCommand;

  #[tokio::test]
  async fn test_get_version_reports_generation_tag() {
    let fixture = TestWorker::new();
    let reply = fixture
      .worker
      .handle_message(WorkerCommand::GetVersion)
      .await
      .unwrap();

    assert_eq!(
      reply,
      Some(WorkerReply::Version {
        version: "test-v2".to_string()
      })
    );
  }

  #[tokio::test]
  async fn test_skip_waiting_requests_takeover() {
    let mut fixture = TestWorker::new();
    let reply = fixture
      .worker
      .handle_message(WorkerCommand::SkipWaiting)
      .await
      .unwrap();

    assert_eq!(reply, None);
    assert_eq!(fixture.drain_commands(), vec![HostCommand::SkipWaiting]);
  }

  #[test]
  fn test_command_wire_format() {
    let command: WorkerCommand = serde_json::from_str(r#"{"type":"skipWaiting"}"#).unwrap();
    assert_eq!(command, WorkerCommand::SkipWaiting);

    let command: WorkerCommand = serde_json::from_str(r#"{"type":"getVersion"}"#).unwrap();
    assert_eq!(command, WorkerCommand::GetVersion);

    let reply = WorkerReply::Version {
      version: "standby-v1".to_string(),
    };
    assert_eq!(
      serde_json::to_string(&reply).unwrap(),
      r#"{"type":"version","version":"standby-v1"}"#
    );
  }
}
