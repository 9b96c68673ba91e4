//! Task spawning abstraction.
//!
//! The core library never calls `tokio::spawn` directly for long-lived work
//! (the Core session loop, detached image fetches). It goes through a
//! [`TaskSpawner`] so the embedding binary decides which runtime owns those
//! tasks, and tests can run them on the test runtime.

use std::future::Future;

/// Abstraction for spawning background tasks.
///
/// Spawned tasks are detached: the spawner offers no way to join or cancel
/// them. Cooperative shutdown goes through a `CancellationToken` instead.
pub trait TaskSpawner: Send + Sync {
    /// Spawns a future as a background task.
    fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static;
}

/// Tokio-based spawner.
#[derive(Clone)]
pub struct TokioSpawner {
    handle: tokio::runtime::Handle,
}

impl TokioSpawner {
    /// Creates a new `TokioSpawner` with the given runtime handle.
    #[must_use]
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }

    /// Creates a new `TokioSpawner` using the current runtime's handle.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime context.
    #[must_use]
    pub fn current() -> Self {
        Self {
            handle: tokio::runtime::Handle::current(),
        }
    }
}

impl TaskSpawner for TokioSpawner {
    fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.handle.spawn(future);
    }
}
