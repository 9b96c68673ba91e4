//! General utilities shared across the application.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::protocol_constants::{EXTENSION_DISPLAY_NAME, VIRTUAL_INTERFACE_PREFIXES};

// ─────────────────────────────────────────────────────────────────────────────
// Time Utilities
// ─────────────────────────────────────────────────────────────────────────────

/// Returns the current Unix timestamp in milliseconds.
///
/// Returns 0 if the system clock is before the Unix epoch (shouldn't happen in practice).
#[must_use]
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// ─────────────────────────────────────────────────────────────────────────────
// Network Interfaces
// ─────────────────────────────────────────────────────────────────────────────

/// Checks if an interface name belongs to a virtual/container interface.
pub fn is_virtual_interface(name: &str) -> bool {
    let name_lower = name.to_lowercase();
    VIRTUAL_INTERFACE_PREFIXES
        .iter()
        .any(|prefix| name_lower.starts_with(prefix))
}

// ─────────────────────────────────────────────────────────────────────────────
// Extension Identity
// ─────────────────────────────────────────────────────────────────────────────

/// Name shown in Roon Settings → Extensions.
///
/// Includes the host name so several gateways on one network can be told apart.
pub fn extension_display_name() -> String {
    match hostname::get() {
        Ok(host) => format!("{} ({})", EXTENSION_DISPLAY_NAME, host.to_string_lossy()),
        Err(e) => {
            log::debug!("Could not read host name: {}", e);
            EXTENSION_DISPLAY_NAME.to_string()
        }
    }
}
