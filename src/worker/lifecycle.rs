//! Install and activate lifecycle handling.

use color_eyre::{eyre::eyre, Result};
use tracing::info;

use crate::cache::CacheStore;
use crate::clients::ClientDirectory;
use crate::fetch::FetchRequest;
use crate::net::Network;
use crate::notify::NotificationSurface;

use super::Worker;

impl<C, N, S, D> Worker<C, N, S, D>
where
  C: CacheStore,
  N: Network,
  S: NotificationSurface,
  D: ClientDirectory,
{
  /// Install: open the current cache generation and seed it with the
  /// essential shell resources. Seeding is all-or-nothing — any failure
  /// removes the partially seeded generation and fails the install, with no
  /// retry. On success, takeover from any waiting predecessor is requested
  /// immediately rather than waiting for existing clients to close.
  pub async fn handle_install(&self) -> Result<()> {
    let version = &self.config.version;
    info!(version, "installing worker");

    self.cache.open_generation(version)?;

    if let Err(e) = self.seed().await {
      self.cache.delete_generation(version)?;
      return Err(e);
    }

    self.clients.request_takeover().await?;
    Ok(())
  }

  async fn seed(&self) -> Result<()> {
    for path in &self.config.seed_paths {
      let request = FetchRequest::get(path.clone());
      let response = self
        .network
        .fetch(&request)
        .await
        .map_err(|e| eyre!("Failed to fetch seed resource {}: {}", path, e))?;

      if response.status != 200 {
        return Err(eyre!(
          "Seed resource {} returned status {}",
          path,
          response.status
        ));
      }

      self
        .cache
        .put(&self.config.version, &request.cache_key(), &response)?;
    }
    Ok(())
  }

  /// Activate: delete every cache generation whose tag does not match the
  /// current version, then claim all open clients so loaded views are served
  /// by this worker instance at once.
  pub async fn handle_activate(&self) -> Result<()> {
    for tag in self.cache.list_generations()? {
      if tag != self.config.version {
        info!(stale = %tag, "deleting old cache generation");
        self.cache.delete_generation(&tag)?;
      }
    }

    self.clients.claim().await?;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use crate::cache::CacheStore;
  use crate::fetch::{FetchRequest, StoredResponse};
  use crate::host::HostCommand;
  use crate::worker::testutil::TestWorker;

  #[tokio::test]
  async fn test_install_seeds_every_path() {
    let mut fixture = TestWorker::new();
    fixture.stock_seed_responses();

    fixture.worker.handle_install().await.unwrap();

    for path in &fixture.config.seed_paths {
      let key = FetchRequest::get(path.clone()).cache_key();
      let entry = fixture.cache.get("test-v2", &key).unwrap();
      assert!(entry.is_some(), "seed path {} not cached", path);
    }
    assert!(fixture
      .drain_commands()
      .contains(&HostCommand::SkipWaiting));
  }

  #[tokio::test]
  async fn test_install_aborts_when_a_seed_fetch_fails() {
    let fixture = TestWorker::new();
    fixture.network.set_offline(true);

    assert!(fixture.worker.handle_install().await.is_err());
    // All-or-nothing: the partially created generation is gone.
    assert!(fixture.cache.list_generations().unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_install_aborts_on_non_200_seed() {
    let fixture = TestWorker::new();
    fixture.stock_seed_responses();
    fixture
      .network
      .respond("/manifest.json", StoredResponse::new(404, Vec::new()));

    assert!(fixture.worker.handle_install().await.is_err());
    assert!(fixture.cache.list_generations().unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_activate_deletes_stale_generations_and_claims() {
    let mut fixture = TestWorker::new();
    fixture.cache.open_generation("test-v1").unwrap();
    fixture.cache.open_generation("test-v2").unwrap();
    fixture.cache.open_generation("abandoned").unwrap();

    fixture.worker.handle_activate().await.unwrap();

    assert_eq!(fixture.cache.list_generations().unwrap(), vec!["test-v2"]);
    assert!(fixture
      .drain_commands()
      .contains(&HostCommand::ClaimClients));
  }

  #[tokio::test]
  async fn test_seeded_paths_served_without_network_after_install() {
    let fixture = TestWorker::new();
    fixture.stock_seed_responses();

    fixture.worker.handle_install().await.unwrap();
    fixture.worker.handle_activate().await.unwrap();
    let calls_after_install = fixture.network.calls();

    for path in &fixture.config.seed_paths {
      let response = fixture
        .worker
        .handle_fetch(FetchRequest::get(path.clone()))
        .await
        .unwrap();
      assert_eq!(response.status, 200);
    }

    assert_eq!(fixture.network.calls(), calls_after_install);
  }
}
