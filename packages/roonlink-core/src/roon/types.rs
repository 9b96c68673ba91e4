//! JSON bodies exchanged with the Core's registry, transport and browse services.
//!
//! These mirror what the Core sends; they are converted to the gateway's own
//! [`ZoneSnapshot`] before anything outside the `roon` module sees them.

use serde::Deserialize;

use crate::zones::{
    LoopMode, NowPlaying, OneLine, PlaybackState, ThreeLine, TransportControls, TwoLine,
    ZoneSettings, ZoneSnapshot,
};

// ─────────────────────────────────────────────────────────────────────────────
// Registry
// ─────────────────────────────────────────────────────────────────────────────

/// Reply to `registry:1/info`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CoreInfo {
    pub core_id: String,
    pub display_name: String,
    pub display_version: String,
}

/// Body of the `Registered` reply to `registry:1/register`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Registration {
    pub core_id: String,
    pub display_name: String,
    pub display_version: String,
    pub token: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Transport
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RoonLines {
    pub line1: String,
    pub line2: String,
    pub line3: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct RoonNowPlaying {
    pub seek_position: Option<f64>,
    pub length: Option<u32>,
    pub image_key: Option<String>,
    pub one_line: RoonLines,
    pub two_line: RoonLines,
    pub three_line: RoonLines,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RoonZoneSettings {
    #[serde(rename = "loop")]
    pub loop_mode: LoopMode,
    pub shuffle: bool,
    pub auto_radio: bool,
}

/// A zone as reported by `transport:2/subscribe_zones`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RoonZone {
    pub zone_id: String,
    pub display_name: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub is_play_allowed: bool,
    #[serde(default)]
    pub is_pause_allowed: bool,
    #[serde(default)]
    pub is_next_allowed: bool,
    #[serde(default)]
    pub is_previous_allowed: bool,
    #[serde(default)]
    pub settings: RoonZoneSettings,
    #[serde(default)]
    pub now_playing: Option<RoonNowPlaying>,
}

impl RoonZone {
    /// Updates the playhead after a seek-only change.
    pub fn apply_seek(&mut self, seek_position: Option<f64>) {
        if let Some(now_playing) = self.now_playing.as_mut() {
            now_playing.seek_position = seek_position;
        }
    }

    /// Builds the complete snapshot handed to zone sinks.
    pub fn to_snapshot(&self, updated_at: u64) -> ZoneSnapshot {
        let now_playing = self.now_playing.as_ref().map(|np| NowPlaying {
            one_line: OneLine {
                line1: np.one_line.line1.clone(),
            },
            two_line: TwoLine {
                line1: np.two_line.line1.clone(),
                line2: np.two_line.line2.clone(),
            },
            three_line: ThreeLine {
                line1: np.three_line.line1.clone(),
                line2: np.three_line.line2.clone(),
                line3: np.three_line.line3.clone(),
            },
            length: np.length,
            image_key: np.image_key.clone(),
        });

        ZoneSnapshot {
            zone_id: self.zone_id.clone(),
            display_name: self.display_name.clone(),
            state: PlaybackState::from_core(&self.state),
            seek_position: self.now_playing.as_ref().and_then(|np| np.seek_position),
            now_playing,
            settings: ZoneSettings {
                shuffle: self.settings.shuffle,
                loop_mode: self.settings.loop_mode,
                auto_radio: self.settings.auto_radio,
            },
            controls: TransportControls {
                is_play_allowed: self.is_play_allowed,
                is_pause_allowed: self.is_pause_allowed,
                is_next_allowed: self.is_next_allowed,
                is_previous_allowed: self.is_previous_allowed,
            },
            updated_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SeekChange {
    pub zone_id: String,
    #[serde(default)]
    pub seek_position: Option<f64>,
}

/// Body of `Subscribed` (only `zones`) and `Changed` (the rest) zone events.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ZonesEvent {
    pub zones: Vec<RoonZone>,
    pub zones_added: Vec<RoonZone>,
    pub zones_changed: Vec<RoonZone>,
    pub zones_removed: Vec<String>,
    pub zones_seek_changed: Vec<SeekChange>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Browse
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BrowseList {
    pub title: String,
    pub count: u32,
    pub level: u32,
}

/// Reply to `browse:1/browse`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BrowseResult {
    /// `list`, `message`, `none` or `replace_item`/`remove_item`.
    pub action: String,
    pub list: Option<BrowseList>,
    pub message: Option<String>,
    pub is_error: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BrowseItem {
    pub title: String,
    pub subtitle: Option<String>,
    pub item_key: Option<String>,
    /// `action`, `action_list`, `list` or `header`.
    pub hint: Option<String>,
}

/// Reply to `browse:1/load`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoadResult {
    pub items: Vec<BrowseItem>,
    pub offset: u32,
    pub list: Option<BrowseList>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn playing_zone() -> serde_json::Value {
        json!({
            "zone_id": "1601a",
            "display_name": "Living Room",
            "outputs": [{"output_id": "1701a"}],
            "state": "playing",
            "is_play_allowed": false,
            "is_pause_allowed": true,
            "is_next_allowed": true,
            "is_previous_allowed": true,
            "settings": {"loop": "loop_one", "shuffle": true, "auto_radio": false},
            "now_playing": {
                "seek_position": 30,
                "length": 240,
                "image_key": "img-42",
                "one_line": {"line1": "Blue in Green - Miles Davis"},
                "two_line": {"line1": "Blue in Green", "line2": "Miles Davis"},
                "three_line": {"line1": "Blue in Green", "line2": "Miles Davis", "line3": "Kind of Blue"}
            }
        })
    }

    #[test]
    fn decodes_zone_into_snapshot() {
        let zone: RoonZone = serde_json::from_value(playing_zone()).unwrap();
        let snapshot = zone.to_snapshot(1_000);

        assert_eq!(snapshot.zone_id, "1601a");
        assert_eq!(snapshot.display_name, "Living Room");
        assert_eq!(snapshot.state, PlaybackState::Playing);
        assert_eq!(snapshot.seek_position, Some(30.0));
        assert_eq!(snapshot.settings.loop_mode, LoopMode::LoopOne);
        assert!(snapshot.settings.shuffle);
        assert!(snapshot.controls.is_pause_allowed);
        assert!(!snapshot.controls.is_play_allowed);
        assert_eq!(snapshot.updated_at, 1_000);

        let now_playing = snapshot.now_playing.unwrap();
        assert_eq!(now_playing.three_line.line3, "Kind of Blue");
        assert_eq!(now_playing.two_line.line2, "Miles Davis");
        assert_eq!(now_playing.length, Some(240));
        assert_eq!(now_playing.image_key.as_deref(), Some("img-42"));
    }

    #[test]
    fn idle_zone_has_no_now_playing() {
        let zone: RoonZone = serde_json::from_value(json!({
            "zone_id": "z2",
            "display_name": "Office",
            "state": "stopped"
        }))
        .unwrap();
        let snapshot = zone.to_snapshot(0);

        assert_eq!(snapshot.state, PlaybackState::Stopped);
        assert!(snapshot.now_playing.is_none());
        assert!(snapshot.seek_position.is_none());
    }

    #[test]
    fn seek_updates_only_the_playhead() {
        let mut zone: RoonZone = serde_json::from_value(playing_zone()).unwrap();
        zone.apply_seek(Some(31.0));
        let snapshot = zone.to_snapshot(0);

        assert_eq!(snapshot.seek_position, Some(31.0));
        assert_eq!(
            snapshot.now_playing.unwrap().three_line.line1,
            "Blue in Green"
        );
    }

    #[test]
    fn decodes_changed_event() {
        let event: ZonesEvent = serde_json::from_value(json!({
            "zones_removed": ["gone"],
            "zones_seek_changed": [{"zone_id": "1601a", "seek_position": 12, "queue_time_remaining": 100}]
        }))
        .unwrap();

        assert!(event.zones.is_empty());
        assert_eq!(event.zones_removed, vec!["gone".to_string()]);
        assert_eq!(event.zones_seek_changed[0].seek_position, Some(12.0));
    }

    #[test]
    fn decodes_load_result() {
        let load: LoadResult = serde_json::from_value(json!({
            "items": [
                {"title": "Jazz Radio", "item_key": "12:0", "hint": "action_list"},
                {"title": "Play Now", "hint": "action"}
            ],
            "offset": 0,
            "list": {"title": "My Live Radio", "count": 2, "level": 1}
        }))
        .unwrap();

        assert_eq!(load.items.len(), 2);
        assert_eq!(load.items[0].item_key.as_deref(), Some("12:0"));
        assert_eq!(load.items[1].item_key, None);
        assert_eq!(load.list.unwrap().count, 2);
    }
}
