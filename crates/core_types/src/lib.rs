use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Slot index on the beacon chain. Signed so that pre-genesis arithmetic stays total.
pub type Slot = i64;
pub type Epoch = i64;

pub const DEFAULT_HEAD_DELAY_SLOTS: u64 = 2;
pub const DEFAULT_STALE_THRESHOLD_SLOTS: u64 = 2;
pub const DEFAULT_PLAYBACK_SPEED: f64 = 1.0;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct NetworkParameters {
    /// Unix seconds of slot 0.
    pub genesis_time: i64,
    pub seconds_per_slot: u64,
    pub slots_per_epoch: u64,
}

impl NetworkParameters {
    pub fn new(
        genesis_time: i64,
        seconds_per_slot: u64,
        slots_per_epoch: u64,
    ) -> Result<Self, NetworkError> {
        if seconds_per_slot == 0 {
            return Err(NetworkError::ZeroSlotDuration);
        }
        if slots_per_epoch == 0 {
            return Err(NetworkError::ZeroSlotsPerEpoch);
        }
        Ok(Self {
            genesis_time,
            seconds_per_slot,
            slots_per_epoch,
        })
    }

    pub fn slot_duration_ms(&self) -> f64 {
        (self.seconds_per_slot.max(1) * 1_000) as f64
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Network {
    Mainnet,
    Sepolia,
    Holesky,
    Hoodi,
}

impl Network {
    pub fn params(self) -> NetworkParameters {
        let genesis_time = match self {
            Self::Mainnet => 1_606_824_023,
            Self::Sepolia => 1_655_733_600,
            Self::Holesky => 1_695_902_400,
            Self::Hoodi => 1_742_213_400,
        };
        NetworkParameters {
            genesis_time,
            seconds_per_slot: 12,
            slots_per_epoch: 32,
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            Self::Mainnet => "mainnet",
            Self::Sepolia => "sepolia",
            Self::Holesky => "holesky",
            Self::Hoodi => "hoodi",
        };
        f.write_str(value)
    }
}

impl FromStr for Network {
    type Err = NetworkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mainnet" => Ok(Self::Mainnet),
            "sepolia" => Ok(Self::Sepolia),
            "holesky" => Ok(Self::Holesky),
            "hoodi" => Ok(Self::Hoodi),
            other => Err(NetworkError::UnknownNetwork(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackMode {
    #[default]
    Live,
    Static,
    Continuous,
}

impl PlaybackMode {
    /// Live and Continuous advance with wall-clock time; Static never does.
    pub fn tracks_head(self) -> bool {
        !matches!(self, Self::Static)
    }
}

impl fmt::Display for PlaybackMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            Self::Live => "live",
            Self::Static => "static",
            Self::Continuous => "continuous",
        };
        f.write_str(value)
    }
}

impl FromStr for PlaybackMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "live" => Ok(Self::Live),
            "static" => Ok(Self::Static),
            "continuous" => Ok(Self::Continuous),
            other => Err(ConfigError::UnknownMode(other.to_string())),
        }
    }
}

/// Caller-supplied construction options for a player instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlayerConfig {
    pub head_delay_slots: u64,
    /// Width of the navigable history window behind the head. `None` defers entirely
    /// to the horizon reported by the bounds source.
    pub backfill_slots: Option<u64>,
    pub initial_mode: PlaybackMode,
    pub initial_slot: Option<Slot>,
    pub initial_playing: bool,
    pub playback_speed: f64,
    pub stale_threshold: u64,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            head_delay_slots: DEFAULT_HEAD_DELAY_SLOTS,
            backfill_slots: None,
            initial_mode: PlaybackMode::Live,
            initial_slot: None,
            initial_playing: true,
            playback_speed: DEFAULT_PLAYBACK_SPEED,
            stale_threshold: DEFAULT_STALE_THRESHOLD_SLOTS,
        }
    }
}

impl PlayerConfig {
    /// Repairs values that would break playback and reports what was repaired.
    pub fn sanitized(mut self) -> (Self, Vec<ConfigError>) {
        let mut issues = Vec::new();
        if !is_valid_speed(self.playback_speed) {
            issues.push(ConfigError::InvalidSpeed(self.playback_speed));
            self.playback_speed = DEFAULT_PLAYBACK_SPEED;
        }
        if self.initial_mode == PlaybackMode::Live && self.initial_slot.is_some() {
            issues.push(ConfigError::IgnoredInitialSlot);
            self.initial_slot = None;
        }
        (self, issues)
    }
}

pub fn is_valid_speed(multiplier: f64) -> bool {
    multiplier.is_finite() && multiplier > 0.0
}

/// The mutable heart of a player, recomputed functionally on each tick.
///
/// Invariants: `min_slot <= current_slot <= max_slot` (except while the bounds are
/// inverted, where `current_slot == max_slot`), `0 <= slot_progress_ms < slot duration`,
/// `safe_slot <= head_slot`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PlayerState {
    pub mode: PlaybackMode,
    pub current_slot: Slot,
    pub slot_progress_ms: f64,
    pub is_playing: bool,
    pub playback_speed: f64,
    pub min_slot: Slot,
    pub max_slot: Slot,
    pub safe_slot: Slot,
    pub head_slot: Slot,
}

impl PlayerState {
    /// Whether time is actually advancing: static playback never moves on its own.
    pub fn is_advancing(&self) -> bool {
        self.is_playing && self.mode.tracks_head()
    }

    pub fn bounds(&self) -> NavigableBounds {
        NavigableBounds {
            min_slot: self.min_slot,
            max_slot: self.max_slot,
            safe_slot: self.safe_slot,
            head_slot: self.head_slot,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct HealthFlags {
    pub is_stalled: bool,
    pub is_stale: bool,
    pub stale_behind_slots: u64,
}

/// One atomic snapshot reported by a bounds source.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SlotBounds {
    pub head_slot: Slot,
    #[serde(default)]
    pub backfill_min_slot: Option<Slot>,
}

/// Navigable window derived from a [`SlotBounds`] snapshot.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct NavigableBounds {
    pub min_slot: Slot,
    pub max_slot: Slot,
    pub safe_slot: Slot,
    pub head_slot: Slot,
}

impl NavigableBounds {
    pub fn pinned(slot: Slot) -> Self {
        Self {
            min_slot: slot,
            max_slot: slot,
            safe_slot: slot,
            head_slot: slot,
        }
    }

    /// `min_slot > max_slot`, e.g. after a network switch with a horizon above the head.
    pub fn is_inverted(&self) -> bool {
        self.min_slot > self.max_slot
    }

    /// Clamps into `[min_slot, max_slot]`; an inverted window resolves to `max_slot`.
    pub fn clamp(&self, slot: Slot) -> Slot {
        if self.is_inverted() {
            return self.max_slot;
        }
        slot.clamp(self.min_slot, self.max_slot)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlayerEvent {
    Played,
    Paused,
    Seeked { slot: Slot },
    Stepped { slot: Slot },
    JumpedToLive { slot: Slot },
    SpeedChanged { speed: f64 },
    SpeedRejected { requested: f64 },
    ModeChanged { mode: PlaybackMode },
    BoundsApplied { head: Slot, min: Slot, safe: Slot },
    BoundsRefreshFailed { reason: String },
    NetworkReset { genesis_time: i64 },
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum NetworkError {
    #[error("seconds_per_slot must be non-zero")]
    ZeroSlotDuration,
    #[error("slots_per_epoch must be non-zero")]
    ZeroSlotsPerEpoch,
    #[error("unknown network: {0}")]
    UnknownNetwork(String),
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("playback speed must be finite and > 0, got {0}")]
    InvalidSpeed(f64),
    #[error("initial_slot is ignored in live mode")]
    IgnoredInitialSlot,
    #[error("unknown playback mode: {0}")]
    UnknownMode(String),
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum BoundsError {
    #[error("bounds source unavailable: {0}")]
    Unavailable(String),
    #[error("bounds refresh timed out after {0} ms")]
    Timeout(u64),
    #[error("bounds response decode failed: {0}")]
    Decode(String),
}

/// Supplies the network head and backfill horizon. Polled by the player runtime.
#[async_trait]
pub trait BoundsSource: Send + Sync {
    async fn fetch_bounds(&self) -> Result<SlotBounds, BoundsError>;
}

/// Wall-clock source in unix milliseconds; replaceable in tests.
pub trait WallClock: fmt::Debug + Send + Sync {
    fn now_ms(&self) -> i64;
}
