//! HTTP API layer.
//!
//! This module contains thin handlers that delegate to the zone cache, the
//! image cache, the preset resolver and the Core session. It provides the
//! router construction and server startup functionality.

use std::sync::Arc;

use thiserror::Error;

use crate::artwork::ImageCache;
use crate::presets::PresetResolver;
use crate::roon::CoreClient;
use crate::state::Config;
use crate::zones::ZoneSource;

pub mod http;
pub mod response;

/// Errors that can occur when starting or running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind the listen address.
    #[error("Failed to bind to {addr}: {source}")]
    Bind {
        addr: std::net::SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// The server stopped with an I/O error.
    #[error("Server error: {0}")]
    Serve(#[from] std::io::Error),
}

/// Shared application state for the API layer.
///
/// This is a thin wrapper that holds references to services.
/// All business logic lives in the services themselves.
#[derive(Clone)]
pub struct AppState {
    /// Latest zone snapshots (read side only).
    pub zones: Arc<dyn ZoneSource>,
    /// Core capabilities: commands, status.
    pub core: Arc<dyn CoreClient>,
    /// Artwork cache in front of the Core's image service.
    pub images: Arc<ImageCache>,
    /// Preset slot resolution.
    pub presets: Arc<PresetResolver>,
    /// Application configuration.
    pub config: Arc<Config>,
}

/// Builder for constructing an `AppState`.
#[derive(Default)]
pub struct AppStateBuilder {
    zones: Option<Arc<dyn ZoneSource>>,
    core: Option<Arc<dyn CoreClient>>,
    images: Option<Arc<ImageCache>>,
    presets: Option<Arc<PresetResolver>>,
    config: Option<Arc<Config>>,
}

impl AppStateBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the zone source.
    pub fn zones(mut self, zones: Arc<dyn ZoneSource>) -> Self {
        self.zones = Some(zones);
        self
    }

    /// Sets the Core client.
    pub fn core(mut self, core: Arc<dyn CoreClient>) -> Self {
        self.core = Some(core);
        self
    }

    /// Sets the image cache.
    pub fn images(mut self, images: Arc<ImageCache>) -> Self {
        self.images = Some(images);
        self
    }

    /// Sets the preset resolver.
    pub fn presets(mut self, presets: Arc<PresetResolver>) -> Self {
        self.presets = Some(presets);
        self
    }

    /// Sets the configuration.
    pub fn config(mut self, config: Arc<Config>) -> Self {
        self.config = Some(config);
        self
    }

    /// Builds the `AppState`, panicking if required fields are missing.
    pub fn build(self) -> AppState {
        AppState {
            zones: self.zones.expect("zones is required"),
            core: self.core.expect("core is required"),
            images: self.images.expect("images is required"),
            presets: self.presets.expect("presets is required"),
            config: self.config.expect("config is required"),
        }
    }
}

impl AppState {
    /// Creates a new builder for constructing an `AppState`.
    pub fn builder() -> AppStateBuilder {
        AppStateBuilder::new()
    }
}

/// Starts the HTTP server on the configured address and serves until `shutdown` resolves.
pub async fn start_server<F>(state: AppState, shutdown: F) -> Result<(), ServerError>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let addr = state.config.bind_addr;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind { addr, source })?;

    log::info!("[Server] Listening on http://{}", addr);
    let app = http::create_router(state);

    // Use into_make_service_with_connect_info to enable ConnectInfo<SocketAddr> extraction
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await?;
    Ok(())
}
