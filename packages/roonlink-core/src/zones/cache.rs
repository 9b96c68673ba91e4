//! Process-wide zone state cache.
//!
//! The Core session writes through [`ZoneSink`]; HTTP handlers read through
//! [`ZoneSource`]. Neither side ever waits on the other for longer than a
//! map insert or lookup.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;

use super::snapshot::{PlaybackState, ZoneSnapshot};

/// Write side of the push→pull boundary.
///
/// Implementations must not block: the caller is the Core session's event loop.
pub trait ZoneSink: Send + Sync {
    /// Replaces the stored snapshot for `zone_id` wholesale.
    fn apply_update(&self, zone_id: &str, snapshot: ZoneSnapshot);
}

/// Read side of the push→pull boundary.
pub trait ZoneSource: Send + Sync {
    /// Latest snapshot for the zone, or `None` if the zone was never reported.
    fn read(&self, zone_id: &str) -> Option<Arc<ZoneSnapshot>>;

    /// Every zone seen at least once, in first-seen order.
    fn list_zones(&self) -> Vec<ZoneSummary>;

    /// Configured zone if any, else the first zone ever observed.
    fn default_zone(&self) -> Option<String>;
}

/// Entry of the `/zones` listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ZoneSummary {
    pub zone_id: String,
    pub name: String,
    pub state: PlaybackState,
}

#[derive(Debug, Default)]
struct ZoneTable {
    snapshots: HashMap<String, Arc<ZoneSnapshot>>,
    /// Zone ids in the order they were first observed.
    first_seen: Vec<String>,
}

/// Zone id → latest snapshot.
///
/// # Concurrency design
///
/// A single `RwLock` guards both the map and the first-seen order so a
/// listing never observes one without the other. Snapshots are stored as
/// `Arc`s: readers clone the pointer under the read lock and serialize after
/// releasing it, so a reader holds either the old or the new snapshot, never a
/// mix of both.
#[derive(Debug, Default)]
pub struct ZoneStateCache {
    zones: RwLock<ZoneTable>,
    configured_default: Option<String>,
}

impl ZoneStateCache {
    pub fn new(configured_default: Option<String>) -> Self {
        Self {
            zones: RwLock::new(ZoneTable::default()),
            configured_default,
        }
    }

    /// Number of zones seen since startup.
    pub fn len(&self) -> usize {
        self.zones.read().first_seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ZoneSink for ZoneStateCache {
    fn apply_update(&self, zone_id: &str, snapshot: ZoneSnapshot) {
        let mut zones = self.zones.write();
        let previous = zones
            .snapshots
            .insert(zone_id.to_string(), Arc::new(snapshot));
        if previous.is_none() {
            log::info!("[Zones] First update for zone {}", zone_id);
            zones.first_seen.push(zone_id.to_string());
        }
    }
}

impl ZoneSource for ZoneStateCache {
    fn read(&self, zone_id: &str) -> Option<Arc<ZoneSnapshot>> {
        self.zones.read().snapshots.get(zone_id).cloned()
    }

    fn list_zones(&self) -> Vec<ZoneSummary> {
        let zones = self.zones.read();
        zones
            .first_seen
            .iter()
            .filter_map(|id| zones.snapshots.get(id))
            .map(|snapshot| ZoneSummary {
                zone_id: snapshot.zone_id.clone(),
                name: snapshot.display_name.clone(),
                state: snapshot.state,
            })
            .collect()
    }

    fn default_zone(&self) -> Option<String> {
        self.configured_default
            .clone()
            .or_else(|| self.zones.read().first_seen.first().cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(zone_id: &str, name: &str, state: PlaybackState, seek: f64) -> ZoneSnapshot {
        let mut snapshot = ZoneSnapshot::idle(zone_id, name);
        snapshot.state = state;
        snapshot.seek_position = Some(seek);
        snapshot
    }

    #[test]
    fn nth_update_wins() {
        let cache = ZoneStateCache::new(None);
        for i in 0..10 {
            cache.apply_update("Z1", snapshot("Z1", "Den", PlaybackState::Playing, i as f64));
        }
        assert_eq!(cache.read("Z1").unwrap().seek_position, Some(9.0));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn update_replaces_wholesale() {
        let cache = ZoneStateCache::new(None);
        cache.apply_update("Z1", snapshot("Z1", "Den", PlaybackState::Playing, 10.0));

        let mut paused = ZoneSnapshot::idle("Z1", "Den");
        paused.state = PlaybackState::Paused;
        cache.apply_update("Z1", paused);

        let current = cache.read("Z1").unwrap();
        assert_eq!(current.state, PlaybackState::Paused);
        assert_eq!(current.seek_position, None);
    }

    #[test]
    fn readers_keep_their_snapshot_across_updates() {
        let cache = ZoneStateCache::new(None);
        cache.apply_update("Z1", snapshot("Z1", "Den", PlaybackState::Playing, 1.0));
        let held = cache.read("Z1").unwrap();

        cache.apply_update("Z1", snapshot("Z1", "Den", PlaybackState::Paused, 2.0));

        assert_eq!(held.state, PlaybackState::Playing);
        assert_eq!(cache.read("Z1").unwrap().state, PlaybackState::Paused);
    }

    #[test]
    fn unknown_zone_reads_none() {
        let cache = ZoneStateCache::new(None);
        assert!(cache.read("nope").is_none());
    }

    #[test]
    fn default_zone_is_first_seen() {
        let cache = ZoneStateCache::new(None);
        assert_eq!(cache.default_zone(), None);

        cache.apply_update("Z2", snapshot("Z2", "Kitchen", PlaybackState::Stopped, 0.0));
        cache.apply_update("Z1", snapshot("Z1", "Den", PlaybackState::Playing, 0.0));
        cache.apply_update("Z2", snapshot("Z2", "Kitchen", PlaybackState::Playing, 0.0));

        assert_eq!(cache.default_zone().as_deref(), Some("Z2"));
    }

    #[test]
    fn configured_default_wins_even_before_any_update() {
        let cache = ZoneStateCache::new(Some("Z9".into()));
        assert_eq!(cache.default_zone().as_deref(), Some("Z9"));

        cache.apply_update("Z1", snapshot("Z1", "Den", PlaybackState::Playing, 0.0));
        assert_eq!(cache.default_zone().as_deref(), Some("Z9"));
    }

    #[test]
    fn list_zones_keeps_first_seen_order_and_current_state() {
        let cache = ZoneStateCache::new(None);
        cache.apply_update("B", snapshot("B", "Bedroom", PlaybackState::Stopped, 0.0));
        cache.apply_update("A", snapshot("A", "Attic", PlaybackState::Stopped, 0.0));
        cache.apply_update("B", snapshot("B", "Bedroom", PlaybackState::Playing, 0.0));

        let zones = cache.list_zones();
        let ids: Vec<_> = zones.iter().map(|z| z.zone_id.as_str()).collect();
        assert_eq!(ids, vec!["B", "A"]);
        assert_eq!(zones[0].state, PlaybackState::Playing);
        assert_eq!(zones[1].name, "Attic");
    }
}
