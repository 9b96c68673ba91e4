//! Album artwork served to polling clients.
//!
//! Artwork comes from the Core's image service, scaled to fit a square of
//! `image_max_size` pixels. [`ImageCache`] keeps the most recently used
//! images in memory and coalesces concurrent misses for the same key into a
//! single upstream fetch.
//!
//! # Concurrency design
//!
//! - Each miss is fetched by a detached task spawned through the
//!   [`TaskSpawner`], so a client that disconnects mid-request does not cancel
//!   the fetch other waiters are sharing.
//! - The fetch task inserts into the cache *before* leaving the in-flight
//!   table. A request arriving in between therefore always finds either the
//!   cached entry or the shared fetch.
//! - Failures are handed to every waiter but never cached.

use std::num::NonZeroUsize;
use std::sync::Arc;

use bytes::Bytes;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use lru::LruCache;
use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::error::{CoreError, CoreResult};
use crate::roon::CoreImages;
use crate::runtime::{TaskSpawner, TokioSpawner};

/// Image bytes as returned by the Core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    pub content_type: String,
    pub data: Bytes,
}

type SharedFetch = Shared<BoxFuture<'static, CoreResult<ImagePayload>>>;

/// Cached images in least-recently-used order.
#[derive(Debug)]
struct LruTable {
    entries: LruCache<String, ImagePayload>,
}

impl LruTable {
    fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: LruCache::new(capacity),
        }
    }

    fn get(&mut self, key: &str) -> Option<ImagePayload> {
        self.entries.get(key).cloned()
    }

    fn insert(&mut self, key: String, payload: ImagePayload) {
        if let Some((evicted, _)) = self.entries.push(key.clone(), payload) {
            if evicted != key {
                log::debug!("[Images] Evicted {}", evicted);
            }
        }
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Bounded in-memory artwork cache in front of the Core's image service.
pub struct ImageCache {
    source: Arc<dyn CoreImages>,
    max_size: u32,
    spawner: TokioSpawner,
    entries: Mutex<LruTable>,
    in_flight: DashMap<String, SharedFetch>,
}

impl ImageCache {
    /// Creates a cache holding at most `capacity` images (at least one).
    pub fn new(
        source: Arc<dyn CoreImages>,
        capacity: usize,
        max_size: u32,
        spawner: TokioSpawner,
    ) -> Self {
        Self {
            source,
            max_size,
            spawner,
            entries: Mutex::new(LruTable::new(
                NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN),
            )),
            in_flight: DashMap::new(),
        }
    }

    /// Returns the image for `image_key`, fetching it from the Core on a miss.
    pub async fn get(self: &Arc<Self>, image_key: &str) -> CoreResult<ImagePayload> {
        if let Some(hit) = self.entries.lock().get(image_key) {
            return Ok(hit);
        }

        let (fetch, start) = match self.in_flight.entry(image_key.to_string()) {
            Entry::Occupied(entry) => (entry.get().clone(), None),
            Entry::Vacant(entry) => {
                // The previous fetch may have landed since the first check.
                if let Some(hit) = self.entries.lock().get(image_key) {
                    return Ok(hit);
                }
                let (tx, rx) = oneshot::channel();
                let fetch = async move {
                    rx.await.unwrap_or_else(|_| {
                        Err(CoreError::ServiceUnavailable("image fetch aborted".into()))
                    })
                }
                .boxed()
                .shared();
                entry.insert(fetch.clone());
                (fetch, Some(tx))
            }
        };

        if let Some(tx) = start {
            self.spawn_fetch(image_key.to_string(), tx);
        }
        fetch.await
    }

    fn spawn_fetch(self: &Arc<Self>, image_key: String, tx: oneshot::Sender<CoreResult<ImagePayload>>) {
        let cache = Arc::clone(self);
        log::debug!("[Images] Fetching {} from Core", image_key);
        self.spawner.spawn(async move {
            let result = cache.source.fetch_image(&image_key, cache.max_size).await;
            match &result {
                Ok(payload) => cache
                    .entries
                    .lock()
                    .insert(image_key.clone(), payload.clone()),
                Err(e) => log::debug!("[Images] Fetch of {} failed: {}", image_key, e),
            }
            cache.in_flight.remove(&image_key);
            let _ = tx.send(result);
        });
    }

    /// Number of cached images.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
