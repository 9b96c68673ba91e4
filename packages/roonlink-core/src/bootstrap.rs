//! Application bootstrap and dependency wiring.
//!
//! This module contains the composition root - the single place where the
//! Core session, the zone cache, the image cache and the preset resolver are
//! instantiated and wired together. Nothing in the crate is a process-wide
//! global; everything hangs off [`BootstrappedServices`] and lives until
//! [`BootstrappedServices::shutdown`].

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::api::AppState;
use crate::artwork::ImageCache;
use crate::error::{GatewayError, GatewayResult};
use crate::presets::PresetResolver;
use crate::roon::{CoreBrowse, CoreClient, CoreImages, CoreSession};
use crate::runtime::{TaskSpawner, TokioSpawner};
use crate::state::Config;
use crate::zones::{ZoneSink, ZoneSource, ZoneStateCache};

/// Container for all bootstrapped services.
///
/// This struct holds all the wired services created during bootstrap.
/// It's consumed by `AppState` to build the final application state.
#[derive(Clone)]
pub struct BootstrappedServices {
    /// Owner of the Core connection.
    pub session: Arc<CoreSession>,
    /// Latest zone snapshots, fed by the session.
    pub zones: Arc<ZoneStateCache>,
    /// Artwork cache in front of the session's image service.
    pub images: Arc<ImageCache>,
    /// Preset slot resolution through the session's browse service.
    pub presets: Arc<PresetResolver>,
    /// Validated configuration.
    pub config: Arc<Config>,
    /// Task spawner for background operations.
    pub spawner: TokioSpawner,
    /// Cancellation token for graceful shutdown.
    pub cancel_token: CancellationToken,
}

impl BootstrappedServices {
    /// Starts the Core session loop in the background.
    pub fn start_background_tasks(&self) {
        let session = Arc::clone(&self.session);
        let cancel = self.cancel_token.clone();
        self.spawner.spawn(session.run(cancel));
        log::info!("[Bootstrap] Core session started");
    }

    /// Builds the HTTP layer's view of the services.
    pub fn app_state(&self) -> AppState {
        AppState::builder()
            .zones(Arc::clone(&self.zones) as Arc<dyn ZoneSource>)
            .core(Arc::clone(&self.session) as Arc<dyn CoreClient>)
            .images(Arc::clone(&self.images))
            .presets(Arc::clone(&self.presets))
            .config(Arc::clone(&self.config))
            .build()
    }

    /// Initiates graceful shutdown of all services.
    pub fn shutdown(&self) {
        log::info!("[Bootstrap] Beginning graceful shutdown...");

        // The session loop closes the Core connection when it sees the token.
        self.cancel_token.cancel();

        log::info!(
            "[Bootstrap] Dropping {} cached image(s) and {} zone snapshot(s)",
            self.images.len(),
            self.zones.len()
        );
        log::info!("[Bootstrap] Shutdown complete");
    }
}

/// Bootstraps all application services with their dependencies.
///
/// Services are created in dependency order:
///
/// 1. Zone state cache (no dependencies)
/// 2. Core session, with the zone cache subscribed as its sink
/// 3. Image cache and preset resolver (depend on the session's capabilities)
///
/// Must be called from within a Tokio runtime. Nothing is started until
/// [`BootstrappedServices::start_background_tasks`].
///
/// # Errors
///
/// Returns [`GatewayError::Configuration`] if `config` fails validation.
pub fn bootstrap_services(config: Config) -> GatewayResult<BootstrappedServices> {
    config.validate().map_err(GatewayError::Configuration)?;
    let config = Arc::new(config);

    let spawner = TokioSpawner::current();
    let cancel_token = CancellationToken::new();

    let zones = Arc::new(ZoneStateCache::new(config.default_zone_id.clone()));

    let session = Arc::new(CoreSession::new(config.session.clone()));
    session.subscribe(Arc::clone(&zones) as Arc<dyn ZoneSink>);

    let images = Arc::new(ImageCache::new(
        Arc::clone(&session) as Arc<dyn CoreImages>,
        config.image_cache_capacity,
        config.image_max_size,
        spawner.clone(),
    ));
    let presets = Arc::new(PresetResolver::new(
        config.presets.clone(),
        Arc::clone(&session) as Arc<dyn CoreBrowse>,
    ));

    log::info!(
        "[Bootstrap] Wired services: {} preset(s), image cache capacity {}",
        config.presets.len(),
        config.image_cache_capacity
    );

    Ok(BootstrappedServices {
        session,
        zones,
        images,
        presets,
        config,
        spawner,
        cancel_token,
    })
}
