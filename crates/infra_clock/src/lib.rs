use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Instant;

use chrono::Utc;
use core_types::{Epoch, NetworkParameters, Slot, WallClock};
use serde::{Deserialize, Serialize};

fn saturate(value: i128) -> i64 {
    i64::try_from(value).unwrap_or(if value < 0 { i64::MIN } else { i64::MAX })
}

fn nonzero(value: u64) -> i128 {
    i128::from(value.max(1))
}

pub fn slot_to_timestamp(slot: Slot, genesis_time: i64, seconds_per_slot: u64) -> i64 {
    saturate(i128::from(genesis_time) + i128::from(slot) * nonzero(seconds_per_slot))
}

pub fn timestamp_to_slot(timestamp: i64, genesis_time: i64, seconds_per_slot: u64) -> Slot {
    let since_genesis = i128::from(timestamp) - i128::from(genesis_time);
    saturate(since_genesis.div_euclid(nonzero(seconds_per_slot)))
}

pub fn current_network_slot(now: i64, genesis_time: i64, seconds_per_slot: u64) -> Slot {
    timestamp_to_slot(now, genesis_time, seconds_per_slot)
}

pub fn epoch_of(slot: Slot, slots_per_epoch: u64) -> Epoch {
    saturate(i128::from(slot).div_euclid(nonzero(slots_per_epoch)))
}

pub fn slot_in_epoch(slot: Slot, slots_per_epoch: u64) -> u64 {
    // rem_euclid by a positive divisor is always in [0, divisor).
    i128::from(slot).rem_euclid(nonzero(slots_per_epoch)) as u64
}

pub fn epoch_start_slot(epoch: Epoch, slots_per_epoch: u64) -> Slot {
    saturate(i128::from(epoch) * nonzero(slots_per_epoch))
}

pub fn slot_start_ms(slot: Slot, genesis_time: i64, seconds_per_slot: u64) -> i64 {
    saturate(i128::from(slot_to_timestamp(slot, genesis_time, seconds_per_slot)) * 1_000)
}

pub fn timestamp_ms_to_slot(now_ms: i64, genesis_time: i64, seconds_per_slot: u64) -> Slot {
    let since_genesis_ms = i128::from(now_ms) - i128::from(genesis_time) * 1_000;
    saturate(since_genesis_ms.div_euclid(nonzero(seconds_per_slot) * 1_000))
}

/// Milliseconds elapsed inside the slot containing `now_ms`, in `[0, slot duration)`.
pub fn ms_into_slot(now_ms: i64, genesis_time: i64, seconds_per_slot: u64) -> f64 {
    let since_genesis_ms = i128::from(now_ms) - i128::from(genesis_time) * 1_000;
    since_genesis_ms.rem_euclid(nonzero(seconds_per_slot) * 1_000) as f64
}

/// Slot arithmetic bound to one network.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SlotClock {
    params: NetworkParameters,
}

impl SlotClock {
    pub fn new(params: NetworkParameters) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &NetworkParameters {
        &self.params
    }

    pub fn slot_duration_ms(&self) -> f64 {
        self.params.slot_duration_ms()
    }

    pub fn slot_to_timestamp(&self, slot: Slot) -> i64 {
        slot_to_timestamp(slot, self.params.genesis_time, self.params.seconds_per_slot)
    }

    pub fn timestamp_to_slot(&self, timestamp: i64) -> Slot {
        timestamp_to_slot(timestamp, self.params.genesis_time, self.params.seconds_per_slot)
    }

    pub fn epoch_of(&self, slot: Slot) -> Epoch {
        epoch_of(slot, self.params.slots_per_epoch)
    }

    pub fn slot_in_epoch(&self, slot: Slot) -> u64 {
        slot_in_epoch(slot, self.params.slots_per_epoch)
    }

    pub fn epoch_start_slot(&self, epoch: Epoch) -> Slot {
        epoch_start_slot(epoch, self.params.slots_per_epoch)
    }

    pub fn current_slot(&self, clock: &dyn WallClock) -> Slot {
        timestamp_ms_to_slot(
            clock.now_ms(),
            self.params.genesis_time,
            self.params.seconds_per_slot,
        )
    }

    pub fn ms_into_current_slot(&self, clock: &dyn WallClock) -> f64 {
        ms_into_slot(
            clock.now_ms(),
            self.params.genesis_time,
            self.params.seconds_per_slot,
        )
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl WallClock for SystemClock {
    fn now_ms(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// Settable clock for tests and simulations.
#[derive(Debug, Default)]
pub struct ManualClock {
    now_ms: AtomicI64,
}

impl ManualClock {
    pub fn new(now_ms: i64) -> Self {
        Self {
            now_ms: AtomicI64::new(now_ms),
        }
    }

    pub fn advance_ms(&self, delta_ms: i64) {
        self.now_ms.fetch_add(delta_ms, Ordering::Relaxed);
    }
}

impl WallClock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now_ms.load(Ordering::Relaxed)
    }
}

/// Yields the elapsed milliseconds between successive laps, never negative.
///
/// Driven by explicit instants so callers can feed it from a paused or mocked timer.
#[derive(Debug, Clone, Copy)]
pub struct DeltaTimer {
    last: Instant,
}

impl DeltaTimer {
    pub fn starting_at(now: Instant) -> Self {
        Self { last: now }
    }

    pub fn lap_at(&mut self, now: Instant) -> f64 {
        let delta = now.saturating_duration_since(self.last);
        self.last = self.last.max(now);
        delta.as_nanos() as f64 / 1_000_000.0
    }
}
