//! Server configuration.
//!
//! Supports loading from YAML files with environment variable overrides.

use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use roonlink_core::{default_presets, PresetDefinition, SessionConfig};
use serde::Deserialize;

/// Server configuration loaded from YAML with environment overrides.
///
/// ```yaml
/// bind_port: 9876
/// default_zone_id: 1601a0c5f2d5e0d3
/// presets:
///   1: { kind: radio, name: Jazz Radio }
///   5: { kind: tag, name: Jazz }
/// ```
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind the HTTP server to.
    /// Override: `ROONLINK_BIND_ADDRESS`
    pub bind_address: IpAddr,

    /// Port to bind the HTTP server to.
    /// Override: `ROONLINK_BIND_PORT`
    pub bind_port: u16,

    /// Number of artwork images kept in memory.
    /// Override: `ROONLINK_IMAGE_CACHE_CAPACITY`
    pub image_cache_capacity: usize,

    /// Artwork is scaled to fit this many pixels per side.
    pub image_max_size: u32,

    /// Zone used when a request names none. Unset picks the first zone seen.
    /// Override: `ROONLINK_ZONE_ID`
    pub default_zone_id: Option<String>,

    /// Static Core address; skips SOOD discovery.
    /// Override: `ROONLINK_CORE_HOST`
    pub core_host: Option<String>,

    /// Override: `ROONLINK_CORE_PORT`
    pub core_port: u16,

    /// How long each discovery round listens for Cores.
    pub discovery_timeout_ms: u64,

    /// Upper bound for awaited Core requests (browse, artwork).
    pub request_timeout_secs: u64,

    pub reconnect_initial_delay_ms: u64,
    pub reconnect_max_delay_ms: u64,

    /// Where the Core's authorization token is persisted.
    /// Override: `ROONLINK_TOKEN_FILE`
    pub token_file: Option<PathBuf>,

    /// Preset slot → library item. Replaces the built-in table when given.
    pub presets: BTreeMap<u32, PresetDefinition>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let session = SessionConfig::default();
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            bind_port: 9876,
            image_cache_capacity: 20,
            image_max_size: 300,
            default_zone_id: None,
            core_host: None,
            core_port: session.core_port,
            discovery_timeout_ms: session.discovery_timeout.as_millis() as u64,
            request_timeout_secs: session.request_timeout.as_secs(),
            reconnect_initial_delay_ms: session.reconnect_initial_delay.as_millis() as u64,
            reconnect_max_delay_ms: session.reconnect_max_delay.as_millis() as u64,
            token_file: None,
            presets: default_presets(),
        }
    }
}

impl ServerConfig {
    /// Loads configuration from a YAML file, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = if let Some(path) = path {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Applies environment variable overrides to the configuration.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Applies overrides from `lookup`. Unparseable values are ignored with a warning.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        fn parsed<T: std::str::FromStr>(key: &str, val: Option<String>) -> Option<T> {
            let val = val?;
            match val.parse() {
                Ok(parsed) => Some(parsed),
                Err(_) => {
                    log::warn!("Ignoring {}={:?}: not a valid value", key, val);
                    None
                }
            }
        }

        if let Some(ip) = parsed("ROONLINK_BIND_ADDRESS", lookup("ROONLINK_BIND_ADDRESS")) {
            self.bind_address = ip;
        }
        if let Some(port) = parsed("ROONLINK_BIND_PORT", lookup("ROONLINK_BIND_PORT")) {
            self.bind_port = port;
        }
        if let Some(capacity) = parsed(
            "ROONLINK_IMAGE_CACHE_CAPACITY",
            lookup("ROONLINK_IMAGE_CACHE_CAPACITY"),
        ) {
            self.image_cache_capacity = capacity;
        }
        if let Some(zone_id) = lookup("ROONLINK_ZONE_ID").filter(|v| !v.is_empty()) {
            self.default_zone_id = Some(zone_id);
        }
        if let Some(host) = lookup("ROONLINK_CORE_HOST").filter(|v| !v.is_empty()) {
            self.core_host = Some(host);
        }
        if let Some(port) = parsed("ROONLINK_CORE_PORT", lookup("ROONLINK_CORE_PORT")) {
            self.core_port = port;
        }
        if let Some(path) = lookup("ROONLINK_TOKEN_FILE").filter(|v| !v.is_empty()) {
            self.token_file = Some(PathBuf::from(path));
        }
    }

    /// Converts to roonlink-core's Config type.
    pub fn to_core_config(&self) -> roonlink_core::Config {
        roonlink_core::Config {
            bind_addr: SocketAddr::new(self.bind_address, self.bind_port),
            image_cache_capacity: self.image_cache_capacity,
            image_max_size: self.image_max_size,
            default_zone_id: self.default_zone_id.clone(),
            presets: self.presets.clone(),
            session: SessionConfig {
                core_host: self.core_host.clone(),
                core_port: self.core_port,
                discovery_timeout: Duration::from_millis(self.discovery_timeout_ms),
                request_timeout: Duration::from_secs(self.request_timeout_secs),
                reconnect_initial_delay: Duration::from_millis(self.reconnect_initial_delay_ms),
                reconnect_max_delay: Duration::from_millis(self.reconnect_max_delay_ms),
                token_file: self.token_file.clone(),
            },
        }
    }
}
