use core_types::{NavigableBounds, PlayerConfig, Slot, SlotBounds};
use serde::{Deserialize, Serialize};

/// Slots before genesis never carry data.
pub const GENESIS_SLOT: Slot = 0;

pub fn is_within_backfill_horizon(slot: Slot, min_slot: Slot) -> bool {
    slot >= min_slot
}

pub fn is_safe_to_display(slot: Slot, head_slot: Slot, head_delay_slots: u64) -> bool {
    slot <= head_slot.saturating_sub_unsigned(head_delay_slots)
}

/// Most recent slot with complete data. Never above `head_slot`, even when the
/// backfill horizon is.
pub fn safe_slot(head_slot: Slot, head_delay_slots: u64, min_slot: Slot) -> Slot {
    head_slot
        .saturating_sub_unsigned(head_delay_slots)
        .max(min_slot)
        .min(head_slot)
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReadinessGate {
    head_delay_slots: u64,
    backfill_slots: Option<u64>,
}

impl ReadinessGate {
    pub fn new(head_delay_slots: u64, backfill_slots: Option<u64>) -> Self {
        Self {
            head_delay_slots,
            backfill_slots,
        }
    }

    pub fn from_config(cfg: &PlayerConfig) -> Self {
        Self::new(cfg.head_delay_slots, cfg.backfill_slots)
    }

    pub fn head_delay_slots(&self) -> u64 {
        self.head_delay_slots
    }

    pub fn backfill_slots(&self) -> Option<u64> {
        self.backfill_slots
    }

    /// Oldest navigable slot: the tightest of genesis, the source-reported horizon and
    /// the configured backfill window.
    pub fn min_slot(&self, bounds: &SlotBounds) -> Slot {
        let mut min_slot = GENESIS_SLOT;
        if let Some(horizon) = bounds.backfill_min_slot {
            min_slot = min_slot.max(horizon);
        }
        if let Some(window) = self.backfill_slots {
            min_slot = min_slot.max(bounds.head_slot.saturating_sub_unsigned(window));
        }
        min_slot
    }

    pub fn navigable(&self, bounds: &SlotBounds) -> NavigableBounds {
        let min_slot = self.min_slot(bounds);
        let safe = safe_slot(bounds.head_slot, self.head_delay_slots, min_slot);
        NavigableBounds {
            min_slot,
            max_slot: safe,
            safe_slot: safe,
            head_slot: bounds.head_slot,
        }
    }

    pub fn is_displayable(&self, slot: Slot, bounds: &NavigableBounds) -> bool {
        is_within_backfill_horizon(slot, bounds.min_slot)
            && is_safe_to_display(slot, bounds.head_slot, self.head_delay_slots)
    }
}

impl Default for ReadinessGate {
    fn default() -> Self {
        Self::from_config(&PlayerConfig::default())
    }
}
