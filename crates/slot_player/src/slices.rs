use core_types::{Epoch, HealthFlags, NetworkParameters, PlaybackMode, Slot};
use serde::{Deserialize, Serialize};
use staleness_monitor::HealthLabel;

/// Changes on every tick while playing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ProgressSlice {
    pub current_slot: Slot,
    pub slot_progress_ms: f64,
    pub progress_fraction: f64,
    pub epoch: Epoch,
    pub slot_in_epoch: u64,
    pub slot_start_unix: i64,
}

/// Discrete playback state; unaffected by sub-slot progress.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct StateSlice {
    pub mode: PlaybackMode,
    pub current_slot: Slot,
    pub current_epoch: Epoch,
    pub is_playing: bool,
    pub is_live_edge: bool,
    pub min_slot: Slot,
    pub max_slot: Slot,
    pub safe_slot: Slot,
    pub head_slot: Slot,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ConfigSlice {
    pub network: NetworkParameters,
    pub head_delay_slots: u64,
    pub backfill_slots: Option<u64>,
    pub playback_speed: f64,
    pub stale_threshold: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthSlice {
    #[serde(flatten)]
    pub flags: HealthFlags,
    pub label: HealthLabel,
}

/// All four slices taken from one consistent state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PlayerSnapshot {
    pub progress: ProgressSlice,
    pub state: StateSlice,
    pub config: ConfigSlice,
    pub health: HealthSlice,
}
