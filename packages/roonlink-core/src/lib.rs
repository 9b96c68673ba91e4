//! RoonLink Core - shared library for the RoonLink gateway.
//!
//! RoonLink registers with a Roon Core as an extension, keeps a live copy of
//! every zone's playback state and serves it over plain HTTP GET to devices
//! that can only poll (microcontroller displays, remote buttons). Commands
//! from those devices are handed back to the Core without waiting for it.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`roon`]: Core discovery (SOOD), MOO/1 connection and the session state machine
//! - [`zones`]: Zone snapshots and the cache that serves them to pollers
//! - [`artwork`]: Bounded LRU artwork cache with in-flight fetch coalescing
//! - [`presets`]: Preset slot → library item resolution
//! - [`api`]: HTTP routes
//! - [`bootstrap`]: Composition root
//! - [`state`]: Configuration
//! - [`error`]: Centralized error types
//!
//! # Abstraction Traits
//!
//! The gateway talks to the Core through capability traits so every layer
//! can be tested against a fake:
//!
//! - [`CorePlayback`](roon::CorePlayback), [`CoreBrowse`](roon::CoreBrowse),
//!   [`CoreImages`](roon::CoreImages), [`CoreStatus`](roon::CoreStatus)
//! - [`ZoneSink`](zones::ZoneSink) / [`ZoneSource`](zones::ZoneSource): the
//!   write and read sides of the zone cache
//! - [`TaskSpawner`](runtime::TaskSpawner): spawning background tasks

#![warn(clippy::all)]

pub mod api;
pub mod artwork;
pub mod bootstrap;
pub mod error;
pub mod presets;
pub mod protocol_constants;
pub mod roon;
pub mod runtime;
pub mod state;
pub mod utils;
pub mod zones;

// Re-export commonly used types at the crate root
pub use artwork::{ImageCache, ImagePayload};
pub use error::{CoreError, CoreResult, ErrorCode, GatewayError, GatewayResult};
pub use presets::{PresetDefinition, PresetKind, PresetResolver};
pub use runtime::{TaskSpawner, TokioSpawner};
pub use state::{default_presets, Config, SessionConfig};
pub use utils::now_millis;

// Re-export Roon types
pub use roon::{
    CommandReceipt, ControlAction, CoreClient, CoreEndpoint, CoreSession, SessionError,
    SessionState,
};

// Re-export zone types
pub use zones::{PlaybackState, ZoneSnapshot, ZoneStateCache};

// Re-export bootstrap types
pub use bootstrap::{bootstrap_services, BootstrappedServices};

// Re-export API types
pub use api::{start_server, AppState, AppStateBuilder, ServerError};
