//! Cache-first fetch interception.

use color_eyre::Result;
use tracing::{debug, warn};

use crate::cache::CacheStore;
use crate::clients::ClientDirectory;
use crate::fetch::{self, Destination, FetchRequest, Method, StoredResponse};
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
  /// Cache-first, network-fallback, write-back-on-miss.
  ///
  /// A cached entry is returned verbatim with no freshness check. On a miss
  /// the network result is persisted only for GET responses with status
  /// exactly 200; the write is best-effort relative to the response already
  /// being returned. A failed network fetch yields the synthesized offline
  /// page for document navigations and propagates for everything else.
  pub async fn handle_fetch(&self, request: FetchRequest) -> Result<StoredResponse> {
    let key = request.cache_key();

    // A cache read failure degrades to a miss.
    let hit = self
      .cache
      .get(&self.config.version, &key)
      .unwrap_or_else(|e| {
        warn!(url = %request.url, "cache lookup failed: {}", e);
        None
      });
    if let Some(response) = hit {
      debug!(url = %request.url, "cache hit");
      return Ok(response);
    }

    match self.network.fetch(&request).await {
      Ok(response) => {
        if request.method == Method::Get && response.status == 200 {
          if let Err(e) = self.cache.put(&self.config.version, &key, &response) {
            warn!(url = %request.url, "cache write failed: {}", e);
          }
        }
        Ok(response)
      }
      Err(e) if request.destination == Destination::Document => {
        debug!(url = %request.url, "network unreachable, serving offline page: {}", e);
        Ok(fetch::offline_page(&self.config))
      }
      Err(e) => Err(e),
    }
  }
}
