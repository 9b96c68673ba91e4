//! Zone state: the snapshot model and the cache that serves it to pollers.

mod cache;
mod snapshot;

pub use cache::{ZoneSink, ZoneSource, ZoneStateCache, ZoneSummary};
pub use snapshot::{
    LoopMode, NowPlaying, OneLine, PlaybackState, ThreeLine, TransportControls, TwoLine,
    ZoneSettings, ZoneSnapshot,
};
