use std::fmt;

use core_types::{HealthFlags, PlayerState, Slot, DEFAULT_STALE_THRESHOLD_SLOTS};
use serde::{Deserialize, Serialize};

/// Derives health flags from a state snapshot. Advisory only: nothing here feeds back
/// into playback.
///
/// `previous_safe_slot` is the safe slot seen on the previous evaluation; a player that
/// is pinned at an unchanged frontier is stalled.
pub fn evaluate(
    state: &PlayerState,
    previous_safe_slot: Option<Slot>,
    stale_threshold: u64,
) -> HealthFlags {
    let advancing = state.is_advancing();
    let stale_behind_slots = state
        .head_slot
        .saturating_sub(state.current_slot)
        .max(0) as u64;
    let pinned = advancing
        && state.current_slot == state.safe_slot
        && previous_safe_slot == Some(state.safe_slot);
    HealthFlags {
        is_stalled: pinned || state.bounds().is_inverted(),
        is_stale: advancing && stale_behind_slots > stale_threshold,
        stale_behind_slots,
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", content = "slots", rename_all = "snake_case")]
pub enum HealthLabel {
    Paused,
    Live,
    Stalled,
    Behind(u64),
}

impl HealthLabel {
    pub fn from_flags(state: &PlayerState, flags: &HealthFlags) -> Self {
        if flags.is_stalled {
            Self::Stalled
        } else if !state.is_advancing() {
            Self::Paused
        } else if flags.is_stale {
            Self::Behind(flags.stale_behind_slots)
        } else {
            Self::Live
        }
    }
}

impl fmt::Display for HealthLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Paused => f.write_str("Paused"),
            Self::Live => f.write_str("Live"),
            Self::Stalled => f.write_str("Stalled"),
            Self::Behind(1) => f.write_str("1 slot behind"),
            Self::Behind(n) => write!(f, "{n} slots behind"),
        }
    }
}

/// Carries the previous safe slot between evaluations.
#[derive(Debug, Clone)]
pub struct StalenessMonitor {
    stale_threshold: u64,
    previous_safe_slot: Option<Slot>,
}

impl Default for StalenessMonitor {
    fn default() -> Self {
        Self::new(DEFAULT_STALE_THRESHOLD_SLOTS)
    }
}

impl StalenessMonitor {
    pub fn new(stale_threshold: u64) -> Self {
        Self {
            stale_threshold,
            previous_safe_slot: None,
        }
    }

    /// Evaluates without recording `state` as the previous tick.
    pub fn peek(&self, state: &PlayerState) -> HealthFlags {
        evaluate(state, self.previous_safe_slot, self.stale_threshold)
    }

    pub fn observe(&mut self, state: &PlayerState) -> HealthFlags {
        let flags = evaluate(state, self.previous_safe_slot, self.stale_threshold);
        self.previous_safe_slot = Some(state.safe_slot);
        flags
    }

    pub fn reset(&mut self) {
        self.previous_safe_slot = None;
    }
}
