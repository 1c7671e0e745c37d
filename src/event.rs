//! Worker event types and the dispatch loop binding them to handlers.
//!
//! Each trigger is handled by a single future representing all of its side
//! effects. The loop tracks every spawned handler until it settles and does
//! not return while any is pending — the host must not tear the process down
//! with in-flight work abandoned.

use std::sync::Arc;

use color_eyre::Result;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;
use tracing::error;

use crate::cache::CacheStore;
use crate::clients::ClientDirectory;
use crate::fetch::{FetchRequest, StoredResponse};
use crate::net::Network;
use crate::notify::NotificationSurface;
use crate::worker::{NotificationClick, Worker, WorkerCommand, WorkerReply};

/// An external trigger delivered by the host.
#[derive(Debug)]
pub enum WorkerEvent {
  Install,
  Activate,
  Fetch {
    request: FetchRequest,
    respond: oneshot::Sender<Result<StoredResponse>>,
  },
  Push {
    data: Option<String>,
  },
  NotificationClick(NotificationClick),
  Message {
    command: WorkerCommand,
    reply: oneshot::Sender<Option<WorkerReply>>,
  },
}

/// Drive the worker from a stream of host events.
///
/// Handlers run concurrently and unordered relative to each other; the loop
/// returns only after the event stream closes and every handler has settled.
pub async fn run<C, N, S, D>(
  worker: Arc<Worker<C, N, S, D>>,
  mut events: mpsc::UnboundedReceiver<WorkerEvent>,
) -> Result<()>
where
  C: CacheStore + 'static,
  N: Network + 'static,
  S: NotificationSurface + 'static,
  D: ClientDirectory + 'static,
{
  let mut pending = JoinSet::new();

  loop {
    tokio::select! {
      event = events.recv() => {
        match event {
          Some(event) => {
            let worker = Arc::clone(&worker);
            pending.spawn(dispatch(worker, event));
          }
          None => break,
        }
      }
      Some(result) = pending.join_next(), if !pending.is_empty() => {
        if let Err(e) = result {
          error!("handler task failed: {}", e);
        }
      }
    }
  }

  // Drain remaining work before the host is allowed to tear us down.
  while let Some(result) = pending.join_next().await {
    if let Err(e) = result {
      error!("handler task failed: {}", e);
    }
  }

  Ok(())
}

async fn dispatch<C, N, S, D>(worker: Arc<Worker<C, N, S, D>>, event: WorkerEvent)
where
  C: CacheStore,
  N: Network,
  S: NotificationSurface,
  D: ClientDirectory,
{
  match event {
    WorkerEvent::Install => {
      // A failed install aborts activation of this version; no retry.
      if let Err(e) = worker.handle_install().await {
        error!("install failed: {}", e);
      }
    }
    WorkerEvent::Activate => {
      if let Err(e) = worker.handle_activate().await {
        error!("activate failed: {}", e);
      }
    }
    WorkerEvent::Fetch { request, respond } => {
      let result = worker.handle_fetch(request).await;
      // The requester may have gone away; nothing to do then.
      let _ = respond.send(result);
    }
    WorkerEvent::Push { data } => {
      if let Err(e) = worker.handle_push(data).await {
        error!("push delivery failed: {}", e);
      }
    }
    WorkerEvent::NotificationClick(click) => {
      if let Err(e) = worker.handle_notification_click(click).await {
        error!("notification click failed: {}", e);
      }
    }
    WorkerEvent::Message { command, reply } => match worker.handle_message(command).await {
      Ok(result) => {
        let _ = reply.send(result);
      }
      Err(e) => error!("message handling failed: {}", e),
    },
  }
}
