use anyhow::{Context, Result};
use chrono::DateTime;
use core_types::{NetworkParameters, PlaybackMode, PlayerConfig, Slot, SlotBounds};
use infra_clock::SlotClock;
use serde::Serialize;
use slot_player::{PlayerSnapshot, SlotPlayer};

#[derive(Debug, Serialize, PartialEq)]
pub(crate) struct SlotInfo {
    pub slot: Slot,
    pub epoch: i64,
    pub slot_in_epoch: u64,
    pub epoch_start_slot: Slot,
    pub start_unix: i64,
    pub start_utc: Option<String>,
}

pub(crate) fn slot_info(params: NetworkParameters, slot: Slot) -> SlotInfo {
    let clock = SlotClock::new(params);
    let start_unix = clock.slot_to_timestamp(slot);
    let epoch = clock.epoch_of(slot);
    SlotInfo {
        slot,
        epoch,
        slot_in_epoch: clock.slot_in_epoch(slot),
        epoch_start_slot: clock.epoch_start_slot(epoch),
        start_unix,
        start_utc: DateTime::from_timestamp(start_unix, 0).map(|t| t.to_rfc3339()),
    }
}

pub(crate) fn slot_at(params: NetworkParameters, timestamp: i64) -> SlotInfo {
    slot_info(params, SlotClock::new(params).timestamp_to_slot(timestamp))
}

#[derive(Debug, Clone)]
pub(crate) struct Simulation {
    pub head_slot: Slot,
    pub backfill_min_slot: Option<Slot>,
    pub mode: PlaybackMode,
    pub from_slot: Option<Slot>,
    pub speed: f64,
    pub duration_ms: f64,
    pub tick_ms: f64,
    /// Advance the head one slot per slot duration of simulated wall time.
    pub follow_head: bool,
}

/// Drives a player without a runtime: fixed-size ticks over simulated time.
pub(crate) fn simulate(params: NetworkParameters, sim: &Simulation) -> PlayerSnapshot {
    let mut bounds = SlotBounds {
        head_slot: sim.head_slot,
        backfill_min_slot: sim.backfill_min_slot,
    };
    let config = PlayerConfig {
        initial_mode: sim.mode,
        initial_slot: sim.from_slot.filter(|_| sim.mode != PlaybackMode::Live),
        playback_speed: sim.speed,
        ..PlayerConfig::default()
    };
    let mut player = SlotPlayer::new(params, config, bounds);
    let tick_ms = sim.tick_ms.max(1.0);
    let slot_ms = params.slot_duration_ms();
    let mut elapsed_ms = 0.0;
    let mut since_head_ms = 0.0;
    while elapsed_ms < sim.duration_ms {
        let step = tick_ms.min(sim.duration_ms - elapsed_ms);
        elapsed_ms += step;
        if sim.follow_head {
            since_head_ms += step;
            if since_head_ms >= slot_ms {
                since_head_ms -= slot_ms;
                bounds.head_slot = bounds.head_slot.saturating_add(1);
                player.apply_bounds(bounds);
            }
        }
        player.tick(step);
    }
    player.snapshot()
}

pub(crate) fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let out = serde_json::to_string_pretty(value).context("encode output")?;
    println!("{out}");
    Ok(())
}
