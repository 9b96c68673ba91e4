//! Zone snapshot model.
//!
//! A [`ZoneSnapshot`] is the complete state of one zone at one instant. Its
//! serde representation is the `/status` payload, so field names here are a
//! wire contract with deployed display clients.

use serde::{Deserialize, Serialize};

/// Playback state of a zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    Playing,
    Paused,
    Stopped,
    Loading,
}

impl PlaybackState {
    /// Parses the Core's state string. Unrecognised values read as `Stopped`.
    pub fn from_core(state: &str) -> Self {
        match state {
            "playing" => Self::Playing,
            "paused" => Self::Paused,
            "loading" => Self::Loading,
            _ => Self::Stopped,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Playing => "playing",
            Self::Paused => "paused",
            Self::Stopped => "stopped",
            Self::Loading => "loading",
        }
    }
}

impl std::fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OneLine {
    pub line1: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TwoLine {
    pub line1: String,
    pub line2: String,
}

/// Title / artist / album as the Core formats them for three-line displays.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ThreeLine {
    pub line1: String,
    pub line2: String,
    pub line3: String,
}

/// What is currently loaded in a zone.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NowPlaying {
    pub one_line: OneLine,
    pub two_line: TwoLine,
    pub three_line: ThreeLine,
    /// Track length in seconds. `None` for live streams.
    pub length: Option<u32>,
    /// Artwork key for `/image/{key}`.
    pub image_key: Option<String>,
}

/// Repeat mode as reported by the Core.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopMode {
    Loop,
    LoopOne,
    #[default]
    Disabled,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ZoneSettings {
    pub shuffle: bool,
    #[serde(rename = "loop")]
    pub loop_mode: LoopMode,
    pub auto_radio: bool,
}

/// Which transport controls the Core currently allows for the zone.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TransportControls {
    pub is_play_allowed: bool,
    pub is_pause_allowed: bool,
    pub is_next_allowed: bool,
    pub is_previous_allowed: bool,
}

/// Last known playback state of one zone, replaced wholesale on every update.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ZoneSnapshot {
    pub zone_id: String,
    #[serde(rename = "zone_name")]
    pub display_name: String,
    pub state: PlaybackState,
    /// Seconds into the current track.
    pub seek_position: Option<f64>,
    pub now_playing: Option<NowPlaying>,
    pub settings: ZoneSettings,
    #[serde(flatten)]
    pub controls: TransportControls,
    /// Milliseconds since the Unix epoch when the gateway applied this snapshot.
    #[serde(rename = "last_updated")]
    pub updated_at: u64,
}

impl ZoneSnapshot {
    /// Creates an idle snapshot with nothing playing.
    pub fn idle(zone_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            zone_id: zone_id.into(),
            display_name: display_name.into(),
            state: PlaybackState::Stopped,
            seek_position: None,
            now_playing: None,
            settings: ZoneSettings::default(),
            controls: TransportControls::default(),
            updated_at: 0,
        }
    }

    /// Milliseconds elapsed since this snapshot was applied, relative to `now_ms`.
    pub fn age_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.updated_at)
    }
}
