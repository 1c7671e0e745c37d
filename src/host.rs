//! Host bridge: a JSON-lines protocol over stdin/stdout.
//!
//! The hosting process delivers triggers as one JSON object per line on
//! stdin and receives the worker's effects (responses, notification
//! presentations, client control) as JSON lines on stdout. Logging goes to
//! stderr so the wire stays clean.

use std::sync::Arc;

use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, oneshot};
use tracing::{error, warn};

use crate::cache::CacheStore;
use crate::clients::{ClientDirectory, HostClients, PushBroadcast};
use crate::event::{self, WorkerEvent};
use crate::fetch::{FetchRequest, StoredResponse};
use crate::net::Network;
use crate::notify::{Notification, NotificationData, NotificationSurface};
use crate::worker::{NotificationClick, Worker, WorkerCommand, WorkerReply};

/// Inbound host event, one per line on stdin.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WireEvent {
  Install,
  Activate,
  Fetch {
    /// Correlates the eventual fetchResult/fetchFailed line.
    id: u64,
    #[serde(flatten)]
    request: FetchRequest,
  },
  Push {
    #[serde(default)]
    data: Option<String>,
  },
  NotificationClick {
    tag: String,
    #[serde(default)]
    action: Option<String>,
    #[serde(default)]
    data: Option<NotificationData>,
  },
  SkipWaiting,
  GetVersion,
  ClientOpened {
    id: String,
    url: String,
  },
  ClientClosed {
    id: String,
  },
  Shutdown,
}

/// Outbound worker effect, one per line on stdout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum HostCommand {
  FetchResult {
    id: u64,
    #[serde(flatten)]
    response: StoredResponse,
  },
  FetchFailed {
    id: u64,
    error: String,
  },
  Version {
    version: String,
  },
  ShowNotification(Notification),
  CloseNotification {
    tag: String,
  },
  FocusClient {
    id: String,
  },
  OpenClient {
    id: String,
    url: String,
  },
  PostMessage {
    client: String,
    message: PushBroadcast,
  },
  SkipWaiting,
  ClaimClients,
}

/// Run the bridge until stdin closes or a shutdown event arrives.
///
/// All in-flight handler work is drained before this returns.
pub async fn run<C, N, S, D>(
  worker: Arc<Worker<C, N, S, D>>,
  clients: Arc<HostClients>,
  commands: mpsc::UnboundedSender<HostCommand>,
  outbound: mpsc::UnboundedReceiver<HostCommand>,
) -> Result<()>
where
  C: CacheStore + 'static,
  N: Network + 'static,
  S: NotificationSurface + 'static,
  D: ClientDirectory + 'static,
{
  let writer = tokio::spawn(write_outbound(outbound));

  let (events_tx, events_rx) = mpsc::unbounded_channel();
  let worker_loop = tokio::spawn(event::run(Arc::clone(&worker), events_rx));

  let mut lines = BufReader::new(tokio::io::stdin()).lines();
  while let Some(line) = lines
    .next_line()
    .await
    .map_err(|e| eyre!("Failed to read host event: {}", e))?
  {
    let line = line.trim();
    if line.is_empty() {
      continue;
    }

    let event: WireEvent = match serde_json::from_str(line) {
      Ok(event) => event,
      Err(e) => {
        warn!("unrecognized host event: {}", e);
        continue;
      }
    };

    match event {
      WireEvent::Install => send_event(&events_tx, WorkerEvent::Install)?,
      WireEvent::Activate => send_event(&events_tx, WorkerEvent::Activate)?,
      WireEvent::Fetch { id, request } => {
        let (respond, result) = oneshot::channel();
        send_event(&events_tx, WorkerEvent::Fetch { request, respond })?;
        forward_fetch_result(id, result, commands.clone());
      }
      WireEvent::Push { data } => send_event(&events_tx, WorkerEvent::Push { data })?,
      WireEvent::NotificationClick { tag, action, data } => send_event(
        &events_tx,
        WorkerEvent::NotificationClick(NotificationClick { tag, action, data }),
      )?,
      WireEvent::SkipWaiting => {
        let (reply, _discard) = oneshot::channel();
        send_event(
          &events_tx,
          WorkerEvent::Message {
            command: WorkerCommand::SkipWaiting,
            reply,
          },
        )?;
      }
      WireEvent::GetVersion => {
        let (reply, result) = oneshot::channel();
        send_event(
          &events_tx,
          WorkerEvent::Message {
            command: WorkerCommand::GetVersion,
            reply,
          },
        )?;
        forward_version_reply(result, commands.clone());
      }
      WireEvent::ClientOpened { id, url } => clients.register(id, url),
      WireEvent::ClientClosed { id } => clients.unregister(&id),
      WireEvent::Shutdown => break,
    }
  }

  // Close the event stream and wait for every pending handler.
  drop(events_tx);
  worker_loop
    .await
    .map_err(|e| eyre!("worker loop task failed: {}", e))??;

  // Release the remaining command senders so the writer can finish.
  drop(worker);
  drop(clients);
  drop(commands);
  writer
    .await
    .map_err(|e| eyre!("writer task failed: {}", e))?;

  Ok(())
}

fn send_event(
  events: &mpsc::UnboundedSender<WorkerEvent>,
  event: WorkerEvent,
) -> Result<()> {
  events
    .send(event)
    .map_err(|_| eyre!("worker event loop stopped"))
}

/// Relay the fetch handler's eventual result back over the wire.
fn forward_fetch_result(
  id: u64,
  result: oneshot::Receiver<Result<StoredResponse>>,
  commands: mpsc::UnboundedSender<HostCommand>,
) {
  tokio::spawn(async move {
    let command = match result.await {
      Ok(Ok(response)) => HostCommand::FetchResult { id, response },
      Ok(Err(e)) => HostCommand::FetchFailed {
        id,
        error: e.to_string(),
      },
      // The loop shut down before responding; nothing left to report.
      Err(_) => return,
    };
    let _ = commands.send(command);
  });
}

fn forward_version_reply(
  result: oneshot::Receiver<Option<WorkerReply>>,
  commands: mpsc::UnboundedSender<HostCommand>,
) {
  tokio::spawn(async move {
    if let Ok(Some(WorkerReply::Version { version })) = result.await {
      let _ = commands.send(HostCommand::Version { version });
    }
  });
}

async fn write_outbound(mut outbound: mpsc::UnboundedReceiver<HostCommand>) {
  let mut stdout = tokio::io::stdout();
  while let Some(command) = outbound.recv().await {
    match serde_json::to_string(&command) {
      Ok(mut line) => {
        line.push('\n');
        if stdout.write_all(line.as_bytes()).await.is_err() {
          break;
        }
        let _ = stdout.flush().await;
      }
      Err(e) => error!("failed to serialize host command: {}", e),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::fetch::{Destination, Method};

  #[test]
  fn test_parses_lifecycle_and_command_events() {
    let event: WireEvent = serde_json::from_str(r#"{"type":"install"}"#).unwrap();
    assert_eq!(event, WireEvent::Install);

    let event: WireEvent = serde_json::from_str(r#"{"type":"activate"}"#).unwrap();
    assert_eq!(event, WireEvent::Activate);

    let event: WireEvent = serde_json::from_str(r#"{"type":"getVersion"}"#).unwrap();
    assert_eq!(event, WireEvent::GetVersion);
  }

  #[test]
  fn test_parses_fetch_event_with_flattened_request() {
    let event: WireEvent = serde_json::from_str(
      r#"{"type":"fetch","id":7,"method":"GET","url":"/manifest.json","destination":"other"}"#,
    )
    .unwrap();

    assert_eq!(
      event,
      WireEvent::Fetch {
        id: 7,
        request: FetchRequest {
          method: Method::Get,
          url: "/manifest.json".to_string(),
          destination: Destination::Other,
        }
      }
    );
  }

  #[test]
  fn test_fetch_event_with_unknown_destination_still_parses() {
    // The fetch line must survive destination strings we do not model;
    // dropping it would leave the host without a fetchResult for that id.
    let event: WireEvent = serde_json::from_str(
      r#"{"type":"fetch","id":9,"method":"GET","url":"/clip.mp4","destination":"video"}"#,
    )
    .unwrap();

    assert_eq!(
      event,
      WireEvent::Fetch {
        id: 9,
        request: FetchRequest {
          method: Method::Get,
          url: "/clip.mp4".to_string(),
          destination: Destination::Other,
        }
      }
    );
  }

  #[test]
  fn test_parses_push_with_optional_data() {
    let event: WireEvent =
      serde_json::from_str(r#"{"type":"push","data":"{\"tag\":\"auto_welcome\"}"}"#).unwrap();
    assert_eq!(
      event,
      WireEvent::Push {
        data: Some(r#"{"tag":"auto_welcome"}"#.to_string())
      }
    );

    let event: WireEvent = serde_json::from_str(r#"{"type":"push"}"#).unwrap();
    assert_eq!(event, WireEvent::Push { data: None });
  }

  #[test]
  fn test_parses_notification_click_without_action() {
    let event: WireEvent =
      serde_json::from_str(r#"{"type":"notificationClick","tag":"exam-2"}"#).unwrap();
    assert_eq!(
      event,
      WireEvent::NotificationClick {
        tag: "exam-2".to_string(),
        action: None,
        data: None,
      }
    );
  }

  #[test]
  fn test_client_registration_events() {
    let event: WireEvent =
      serde_json::from_str(r#"{"type":"clientOpened","id":"tab-1","url":"/"}"#).unwrap();
    assert_eq!(
      event,
      WireEvent::ClientOpened {
        id: "tab-1".to_string(),
        url: "/".to_string()
      }
    );
  }

  #[test]
  fn test_fetch_result_flattens_response() {
    let command = HostCommand::FetchResult {
      id: 7,
      response: StoredResponse::new(200, b"ok".to_vec()),
    };
    let json: serde_json::Value = serde_json::to_value(&command).unwrap();

    assert_eq!(json["type"], "fetchResult");
    assert_eq!(json["id"], 7);
    assert_eq!(json["status"], 200);
  }

  #[test]
  fn test_version_command_wire_format() {
    let command = HostCommand::Version {
      version: "standby-v1".to_string(),
    };
    assert_eq!(
      serde_json::to_string(&command).unwrap(),
      r#"{"type":"version","version":"standby-v1"}"#
    );
  }

  #[test]
  fn test_post_message_keeps_broadcast_envelope() {
    let command = HostCommand::PostMessage {
      client: "tab-1".to_string(),
      message: PushBroadcast {
        message_type: PushBroadcast::MESSAGE_TYPE.to_string(),
        title: "Exam".to_string(),
        body: "Tomorrow".to_string(),
        tag: "exam-2".to_string(),
        notification_type: "reminder".to_string(),
        data: Default::default(),
        is_auto: false,
      },
    };

    let json: serde_json::Value = serde_json::to_value(&command).unwrap();
    assert_eq!(json["type"], "postMessage");
    assert_eq!(json["message"]["type"], "push_notification");
    assert_eq!(json["message"]["notificationType"], "reminder");
    assert_eq!(json["message"]["isAuto"], false);
  }
}
