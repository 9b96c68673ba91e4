//! Preset slots.
//!
//! A preset maps a small integer slot (what a hardware button or a tap on the
//! device sends) to a named radio station, playlist or genre in the Roon
//! library. Resolution happens at press time through the Core's browse
//! service; nothing is cached between presses.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::roon::{CommandReceipt, CoreBrowse};

/// What kind of library item a preset names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresetKind {
    /// Live radio station ("My Live Radio").
    Radio,
    Playlist,
    /// A genre, played as a whole.
    Tag,
}

impl PresetKind {
    /// Browse hierarchy searched for items of this kind.
    pub fn hierarchy(&self) -> &'static str {
        match self {
            Self::Radio => "internet_radio",
            Self::Playlist => "playlists",
            Self::Tag => "genres",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Radio => "radio",
            Self::Playlist => "playlist",
            Self::Tag => "tag",
        }
    }
}

impl std::fmt::Display for PresetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A playable item named by kind and exact title.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresetDefinition {
    pub kind: PresetKind,
    pub name: String,
}

impl PresetDefinition {
    pub fn new(kind: PresetKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }
}

/// Entry of the `/presets` listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PresetSummary {
    pub slot: u32,
    pub kind: PresetKind,
    pub name: String,
}

/// Resolves preset slots against the Core's library.
pub struct PresetResolver {
    presets: BTreeMap<u32, PresetDefinition>,
    core: Arc<dyn CoreBrowse>,
}

impl PresetResolver {
    pub fn new(presets: BTreeMap<u32, PresetDefinition>, core: Arc<dyn CoreBrowse>) -> Self {
        Self { presets, core }
    }

    pub fn get(&self, slot: u32) -> Option<&PresetDefinition> {
        self.presets.get(&slot)
    }

    /// Declared presets in slot order.
    pub fn list(&self) -> Vec<PresetSummary> {
        self.presets
            .iter()
            .map(|(slot, preset)| PresetSummary {
                slot: *slot,
                kind: preset.kind,
                name: preset.name.clone(),
            })
            .collect()
    }

    /// Starts the preset in `zone_id`.
    ///
    /// Undeclared slots fail with `UnknownPreset` without contacting the Core.
    pub async fn resolve(&self, slot: u32, zone_id: &str) -> CoreResult<CommandReceipt> {
        let preset = self.get(slot).ok_or(CoreError::UnknownPreset(slot))?;
        log::info!(
            "[Presets] Slot {} → {} \"{}\" on zone {}",
            slot,
            preset.kind,
            preset.name,
            zone_id
        );
        self.core
            .resolve_and_play(zone_id, preset.kind, &preset.name)
            .await
    }
}
