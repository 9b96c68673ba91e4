//! Fixed protocol constants that should NOT be changed.
//!
//! These values are defined by the Roon extension protocols (SOOD discovery,
//! MOO framing, service names) and changing them would break compatibility
//! with the Core.

// ─────────────────────────────────────────────────────────────────────────────
// SOOD (Roon Core discovery)
// ─────────────────────────────────────────────────────────────────────────────

/// Multicast group the Core listens on for SOOD queries.
pub const SOOD_MULTICAST_ADDR: [u8; 4] = [239, 255, 90, 90];

/// UDP port for SOOD queries.
pub const SOOD_PORT: u16 = 9003;

/// Magic prefix of every SOOD datagram (`SOOD` + protocol version 2).
pub const SOOD_MAGIC: &[u8; 5] = b"SOOD\x02";

/// Service id a Roon Core answers to.
pub const SOOD_SERVICE_ID: &str = "00720724-5143-4a9b-abac-0e50cba674bb";

/// Number of query rounds sent during one discovery attempt.
pub const SOOD_QUERY_ROUNDS: u32 = 3;

/// Delay between query rounds (milliseconds).
pub const SOOD_QUERY_INTERVAL_MS: u64 = 500;

/// Multicast TTL for SOOD queries.
pub const SOOD_MULTICAST_TTL: u32 = 1;

/// Interface name prefixes that are never used for discovery.
pub const VIRTUAL_INTERFACE_PREFIXES: &[&str] = &[
    "lo", "docker", "veth", "br-", "virbr", "vmnet", "vbox", "tun", "tap",
];

// ─────────────────────────────────────────────────────────────────────────────
// MOO (request/response framing over WebSocket)
// ─────────────────────────────────────────────────────────────────────────────

/// Protocol tag on the first line of every MOO message.
pub const MOO_PROTOCOL: &str = "MOO/1";

/// Path of the Core's WebSocket endpoint.
pub const MOO_WS_PATH: &str = "/api";

/// Default Core HTTP/WebSocket port when no discovery reply says otherwise.
pub const DEFAULT_CORE_PORT: u16 = 9330;

/// Content type for JSON bodies.
pub const MOO_JSON: &str = "application/json";

// ─────────────────────────────────────────────────────────────────────────────
// Roon Services
// ─────────────────────────────────────────────────────────────────────────────

pub const SVC_REGISTRY: &str = "com.roonlabs.registry:1";
pub const SVC_TRANSPORT: &str = "com.roonlabs.transport:2";
pub const SVC_BROWSE: &str = "com.roonlabs.browse:1";
pub const SVC_IMAGE: &str = "com.roonlabs.image:1";
pub const SVC_PING: &str = "com.roonlabs.ping:1";
pub const SVC_STATUS: &str = "com.roonlabs.status:1";

/// Page size used when loading browse lists.
pub const BROWSE_PAGE_SIZE: u32 = 100;

/// Maximum number of levels descended from a matched item to its play action.
pub const BROWSE_MAX_DEPTH: usize = 4;

/// Title of the browse action that replaces the queue and starts playback.
pub const BROWSE_PLAY_NOW: &str = "Play Now";

// ─────────────────────────────────────────────────────────────────────────────
// Extension Identity
// ─────────────────────────────────────────────────────────────────────────────

/// Stable extension id. The Core keys its authorization on this value.
pub const EXTENSION_ID: &str = "com.roonlink.gateway";

/// Base display name shown in Roon Settings → Extensions.
pub const EXTENSION_DISPLAY_NAME: &str = "RoonLink Gateway";

pub const EXTENSION_PUBLISHER: &str = "RoonLink";
pub const EXTENSION_EMAIL: &str = "roonlink@users.noreply.github.com";

/// Service identifier reported by the health endpoint.
pub const SERVICE_ID: &str = "roonlink";

// ─────────────────────────────────────────────────────────────────────────────
// Internal Capacities
// ─────────────────────────────────────────────────────────────────────────────

/// Capacity of the outbound frame queue to the connection writer.
///
/// A full queue means the Core is not draining; commands fail fast instead of
/// waiting.
pub const OUTBOUND_CHANNEL_CAPACITY: usize = 64;

/// Maximum SOOD datagram size we accept.
pub const SOOD_MAX_DATAGRAM: usize = 2048;
