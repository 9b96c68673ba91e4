//! Trait abstractions for Core capabilities.
//!
//! The HTTP gateway, the image cache and the preset resolver depend on these
//! traits rather than on [`CoreSession`](super::CoreSession), so each can be
//! tested against a hand-written fake.

use std::str::FromStr;

use async_trait::async_trait;
use serde::Serialize;

use super::SessionState;
use crate::artwork::ImagePayload;
use crate::error::CoreResult;
use crate::presets::PresetKind;

/// Transport control verbs accepted by the Core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlAction {
    Play,
    Pause,
    PlayPause,
    Stop,
    Next,
    Previous,
}

impl ControlAction {
    /// Value of the `control` field in `transport:2/control`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Play => "play",
            Self::Pause => "pause",
            Self::PlayPause => "playpause",
            Self::Stop => "stop",
            Self::Next => "next",
            Self::Previous => "previous",
        }
    }
}

impl FromStr for ControlAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "play" => Ok(Self::Play),
            "pause" => Ok(Self::Pause),
            "playpause" => Ok(Self::PlayPause),
            "stop" => Ok(Self::Stop),
            "next" => Ok(Self::Next),
            "previous" => Ok(Self::Previous),
            other => Err(other.to_string()),
        }
    }
}

impl std::fmt::Display for ControlAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a fire-and-forget command.
///
/// `Accepted` means the request was queued to the Core connection. Whether the
/// Core acted on it shows up later in the zone state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandReceipt {
    Accepted,
}

/// Transport commands.
pub trait CorePlayback: Send + Sync {
    /// Queues a control command for a zone. Never waits for the Core.
    fn send_command(&self, zone_id: &str, action: ControlAction) -> CoreResult<CommandReceipt>;
}

/// Library browsing.
#[async_trait]
pub trait CoreBrowse: Send + Sync {
    /// Finds the first item titled exactly `name` in the hierarchy for `kind`
    /// and starts it in `zone_id` with "Play Now".
    ///
    /// Fails with `NotFound` when nothing matches.
    async fn resolve_and_play(
        &self,
        zone_id: &str,
        kind: PresetKind,
        name: &str,
    ) -> CoreResult<CommandReceipt>;
}

/// Artwork retrieval.
#[async_trait]
pub trait CoreImages: Send + Sync {
    /// Fetches artwork scaled to fit within `max_size`×`max_size`.
    async fn fetch_image(&self, image_key: &str, max_size: u32) -> CoreResult<ImagePayload>;
}

/// Connection status, for the status page and health endpoint.
pub trait CoreStatus: Send + Sync {
    fn session_state(&self) -> SessionState;

    /// Display name of the connected Core, if any.
    fn core_name(&self) -> Option<String>;
}

/// Combined trait for everything the gateway needs from the Core.
pub trait CoreClient: CorePlayback + CoreBrowse + CoreImages + CoreStatus {}

impl<T: CorePlayback + CoreBrowse + CoreImages + CoreStatus> CoreClient for T {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_actions_parse_from_path_segment() {
        for action in [
            ControlAction::Play,
            ControlAction::Pause,
            ControlAction::PlayPause,
            ControlAction::Stop,
            ControlAction::Next,
            ControlAction::Previous,
        ] {
            assert_eq!(action.as_str().parse::<ControlAction>(), Ok(action));
        }
        assert_eq!("rewind".parse::<ControlAction>(), Err("rewind".to_string()));
        assert!("Play".parse::<ControlAction>().is_err());
    }
}
