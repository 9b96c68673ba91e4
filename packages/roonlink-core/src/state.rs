//! Gateway configuration.
//!
//! [`Config`] is built once by the embedding binary (from YAML, environment and
//! CLI) and validated at bootstrap. It is immutable afterwards.

use std::collections::BTreeMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::presets::{PresetDefinition, PresetKind};
use crate::protocol_constants::DEFAULT_CORE_PORT;

/// Configuration for the Core session.
///
/// Groups the parameters that control how the Core is found, how long we
/// wait on it and how reconnects are paced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Static Core host. When set, SOOD discovery is skipped.
    pub core_host: Option<String>,

    /// Core port used with `core_host`.
    pub core_port: u16,

    /// How long one SOOD discovery attempt listens for replies.
    pub discovery_timeout: Duration,

    /// Upper bound for every awaited Core request (browse, image).
    pub request_timeout: Duration,

    /// First reconnect delay; doubled after every failure.
    pub reconnect_initial_delay: Duration,

    /// Cap for the reconnect delay.
    pub reconnect_max_delay: Duration,

    /// Where the Core's authorization token is kept across restarts.
    pub token_file: Option<PathBuf>,
}

impl SessionConfig {
    /// Validates the configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.core_port == 0 {
            return Err("core_port must be >= 1".to_string());
        }
        if self.request_timeout.is_zero() {
            return Err("request_timeout must be > 0".to_string());
        }
        if self.discovery_timeout.is_zero() {
            return Err("discovery_timeout must be > 0".to_string());
        }
        if self.reconnect_initial_delay.is_zero() {
            return Err("reconnect_initial_delay must be > 0".to_string());
        }
        if self.reconnect_initial_delay > self.reconnect_max_delay {
            return Err("reconnect_initial_delay must not exceed reconnect_max_delay".to_string());
        }
        Ok(())
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            core_host: None,
            core_port: DEFAULT_CORE_PORT,
            discovery_timeout: Duration::from_millis(3000),
            request_timeout: Duration::from_secs(10),
            reconnect_initial_delay: Duration::from_millis(1000),
            reconnect_max_delay: Duration::from_millis(30_000),
            token_file: None,
        }
    }
}

/// Configuration for the RoonLink gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Address the HTTP gateway listens on.
    pub bind_addr: SocketAddr,

    /// Maximum number of artwork images kept in memory.
    pub image_cache_capacity: usize,

    /// Artwork is requested scaled to fit this many pixels on each side.
    pub image_max_size: u32,

    /// Zone used when a request names none. `None` picks the first zone seen.
    pub default_zone_id: Option<String>,

    /// Preset slot → playable item.
    pub presets: BTreeMap<u32, PresetDefinition>,

    /// Core session settings.
    pub session: SessionConfig,
}

impl Config {
    /// Validates the configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.image_cache_capacity == 0 {
            return Err("image_cache_capacity must be >= 1".to_string());
        }
        if self.image_max_size == 0 {
            return Err("image_max_size must be >= 1".to_string());
        }
        for (slot, preset) in &self.presets {
            if *slot == 0 {
                return Err("preset slots start at 1".to_string());
            }
            if preset.name.trim().is_empty() {
                return Err(format!("preset {} has an empty name", slot));
            }
        }
        self.session.validate()
    }
}

/// The four presets a fresh install ships with.
pub fn default_presets() -> BTreeMap<u32, PresetDefinition> {
    BTreeMap::from([
        (1, PresetDefinition::new(PresetKind::Radio, "Jazz Radio")),
        (2, PresetDefinition::new(PresetKind::Radio, "Classical Radio")),
        (3, PresetDefinition::new(PresetKind::Playlist, "Rock Favorites")),
        (4, PresetDefinition::new(PresetKind::Radio, "Chill Radio")),
    ])
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 9876)),
            image_cache_capacity: 20,
            image_max_size: 300,
            default_zone_id: None,
            presets: default_presets(),
            session: SessionConfig::default(),
        }
    }
}
