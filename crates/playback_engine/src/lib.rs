use core_types::{
    is_valid_speed, NavigableBounds, NetworkParameters, PlaybackMode, PlayerConfig, PlayerState,
    Slot, DEFAULT_PLAYBACK_SPEED,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TickOutcome {
    pub slots_advanced: u64,
    /// Playback hit the safe slot and was held there.
    pub clamped: bool,
}

/// Owns the authoritative slot position and its sub-slot progress.
#[derive(Debug, Clone)]
pub struct PlaybackEngine {
    config: PlayerConfig,
    slot_duration_ms: f64,
    mode: PlaybackMode,
    current_slot: Slot,
    slot_progress_ms: f64,
    is_playing: bool,
    playback_speed: f64,
    bounds: NavigableBounds,
}

impl PlaybackEngine {
    pub fn new(params: &NetworkParameters, config: PlayerConfig, bounds: NavigableBounds) -> Self {
        let playback_speed = if is_valid_speed(config.playback_speed) {
            config.playback_speed
        } else {
            DEFAULT_PLAYBACK_SPEED
        };
        let current_slot = match (config.initial_mode, config.initial_slot) {
            (PlaybackMode::Live, _) | (_, None) => bounds.clamp(bounds.safe_slot),
            (_, Some(slot)) => bounds.clamp(slot),
        };
        Self {
            slot_duration_ms: params.slot_duration_ms(),
            mode: config.initial_mode,
            current_slot,
            slot_progress_ms: 0.0,
            is_playing: config.initial_playing,
            playback_speed,
            bounds,
            config,
        }
    }

    /// Discards all derived state and starts over on another network.
    pub fn reset_network(&mut self, params: &NetworkParameters, bounds: NavigableBounds) {
        *self = Self::new(params, self.config.clone(), bounds);
    }

    pub fn state(&self) -> PlayerState {
        PlayerState {
            mode: self.mode,
            current_slot: self.current_slot,
            slot_progress_ms: self.slot_progress_ms,
            is_playing: self.is_playing,
            playback_speed: self.playback_speed,
            min_slot: self.bounds.min_slot,
            max_slot: self.bounds.max_slot,
            safe_slot: self.bounds.safe_slot,
            head_slot: self.bounds.head_slot,
        }
    }

    pub fn mode(&self) -> PlaybackMode {
        self.mode
    }

    pub fn current_slot(&self) -> Slot {
        self.current_slot
    }

    pub fn slot_progress_ms(&self) -> f64 {
        self.slot_progress_ms
    }

    pub fn slot_duration_ms(&self) -> f64 {
        self.slot_duration_ms
    }

    pub fn progress_fraction(&self) -> f64 {
        (self.slot_progress_ms / self.slot_duration_ms).clamp(0.0, 1.0)
    }

    pub fn is_playing(&self) -> bool {
        self.is_playing
    }

    pub fn playback_speed(&self) -> f64 {
        self.playback_speed
    }

    pub fn bounds(&self) -> NavigableBounds {
        self.bounds
    }

    pub fn config(&self) -> &PlayerConfig {
        &self.config
    }

    pub fn is_at_live_edge(&self) -> bool {
        self.mode.tracks_head() && self.current_slot == self.bounds.safe_slot
    }

    /// Advances by `delta_ms` of wall-clock time scaled by the playback speed.
    ///
    /// Whole slots are consumed one at a time so that fast playback never drops the
    /// remainder, and the position is held at the safe slot once it is reached.
    pub fn tick(&mut self, delta_ms: f64) -> TickOutcome {
        if !self.mode.tracks_head() || !self.is_playing {
            return TickOutcome::default();
        }
        if !delta_ms.is_finite() || delta_ms <= 0.0 {
            return TickOutcome::default();
        }

        let start = self.current_slot;
        let safe = self.bounds.safe_slot;
        self.slot_progress_ms += delta_ms * self.playback_speed;
        while self.slot_progress_ms >= self.slot_duration_ms {
            self.slot_progress_ms -= self.slot_duration_ms;
            self.current_slot = self.current_slot.saturating_add(1);
            if self.current_slot > safe {
                break;
            }
        }

        let mut clamped = false;
        if self.current_slot > safe {
            self.current_slot = safe;
            self.slot_progress_ms = 0.0;
            clamped = true;
        }
        TickOutcome {
            slots_advanced: self.current_slot.saturating_sub(start).max(0) as u64,
            clamped,
        }
    }

    /// Sets the progress of the live-edge slot to the wall clock's position inside its
    /// own slot, so live playback ticks over together with the chain. Ignored away from
    /// the live edge or when the offset is outside `[0, slot duration)`.
    pub fn align_live_progress(&mut self, ms_into_slot: f64) -> bool {
        if !self.is_at_live_edge() || !(0.0..self.slot_duration_ms).contains(&ms_into_slot) {
            return false;
        }
        self.slot_progress_ms = ms_into_slot;
        true
    }

    pub fn play(&mut self) {
        self.is_playing = true;
    }

    pub fn pause(&mut self) {
        self.is_playing = false;
    }

    pub fn seek(&mut self, slot: Slot) -> Slot {
        self.current_slot = self.bounds.clamp(slot);
        self.slot_progress_ms = 0.0;
        self.current_slot
    }

    /// Returns false and keeps the previous speed when `multiplier` is not a finite
    /// positive number.
    pub fn set_speed(&mut self, multiplier: f64) -> bool {
        if !is_valid_speed(multiplier) {
            return false;
        }
        self.playback_speed = multiplier;
        true
    }

    pub fn jump_to_live(&mut self) -> Option<Slot> {
        if !self.mode.tracks_head() {
            return None;
        }
        Some(self.seek(self.bounds.safe_slot))
    }

    pub fn step_forward(&mut self) -> Slot {
        self.seek(self.current_slot.saturating_add(1))
    }

    pub fn step_backward(&mut self) -> Slot {
        self.seek(self.current_slot.saturating_sub(1))
    }

    pub fn set_mode(&mut self, mode: PlaybackMode) {
        if mode == self.mode {
            return;
        }
        self.mode = mode;
        match mode {
            PlaybackMode::Static => self.slot_progress_ms = 0.0,
            PlaybackMode::Live => {
                self.seek(self.bounds.safe_slot);
            }
            PlaybackMode::Continuous => {}
        }
    }

    /// Replaces the navigable window between ticks. A window that no longer contains
    /// the current slot re-clamps it immediately.
    pub fn apply_bounds(&mut self, bounds: NavigableBounds) {
        self.bounds = bounds;
        let clamped = bounds.clamp(self.current_slot);
        if clamped != self.current_slot {
            self.current_slot = clamped;
            self.slot_progress_ms = 0.0;
        }
    }
}

#[cfg(test)]
mod tests {
    use core_types::Network;

    use super::*;

    const SLOT_MS: f64 = 12_000.0;

    fn window(min_slot: Slot, head_slot: Slot, delay: i64) -> NavigableBounds {
        let safe = (head_slot - delay).max(min_slot).min(head_slot);
        NavigableBounds {
            min_slot,
            max_slot: safe,
            safe_slot: safe,
            head_slot,
        }
    }

    fn engine(mode: PlaybackMode, initial_slot: Option<Slot>) -> PlaybackEngine {
        PlaybackEngine::new(
            &Network::Mainnet.params(),
            PlayerConfig {
                initial_mode: mode,
                initial_slot,
                ..PlayerConfig::default()
            },
            window(0, 100, 2),
        )
    }

    fn assert_invariants(e: &PlaybackEngine) {
        let s = e.state();
        assert!(s.min_slot <= s.current_slot, "{s:?}");
        assert!(s.current_slot <= s.max_slot, "{s:?}");
        assert!(s.slot_progress_ms >= 0.0, "{s:?}");
        assert!(s.slot_progress_ms < SLOT_MS, "{s:?}");
        assert!(s.safe_slot <= s.head_slot, "{s:?}");
    }

    #[test]
    fn live_mode_starts_at_safe_slot() {
        let e = engine(PlaybackMode::Live, None);
        assert_eq!(e.current_slot(), 98);
        assert!(e.is_at_live_edge());
    }

    #[test]
    fn continuous_and_static_honour_clamped_initial_slot() {
        assert_eq!(engine(PlaybackMode::Continuous, Some(40)).current_slot(), 40);
        assert_eq!(engine(PlaybackMode::Static, Some(500)).current_slot(), 98);
        assert_eq!(engine(PlaybackMode::Static, Some(-5)).current_slot(), 0);
    }

    #[test]
    fn jump_to_live_lands_on_safe_slot() {
        let mut e = engine(PlaybackMode::Continuous, Some(10));
        e.tick(5_000.0);
        assert_eq!(e.jump_to_live(), Some(98));
        assert_eq!(e.current_slot(), 98);
        assert_eq!(e.slot_progress_ms(), 0.0);
    }

    #[test]
    fn live_progress_aligns_only_at_the_edge() {
        let mut e = engine(PlaybackMode::Live, None);
        assert!(e.align_live_progress(7_500.0));
        assert_eq!(e.slot_progress_ms(), 7_500.0);
        assert!(!e.align_live_progress(SLOT_MS));
        assert!(!e.align_live_progress(-1.0));
        assert_eq!(e.slot_progress_ms(), 7_500.0);

        e.tick(4_500.0);
        assert_eq!(e.current_slot(), 98);
        assert_eq!(e.slot_progress_ms(), 0.0);

        e.seek(50);
        assert!(!e.align_live_progress(3_000.0));
        assert_eq!(e.slot_progress_ms(), 0.0);

        let mut s = engine(PlaybackMode::Static, Some(98));
        assert!(!s.align_live_progress(3_000.0));
    }

    #[test]
    fn eighteen_seconds_advance_one_slot_with_remainder() {
        let mut e = engine(PlaybackMode::Continuous, Some(50));
        let out = e.tick(18_000.0);
        assert_eq!(out.slots_advanced, 1);
        assert!(!out.clamped);
        assert_eq!(e.current_slot(), 51);
        assert_eq!(e.slot_progress_ms(), 6_000.0);
    }

    #[test]
    fn fast_ticks_skip_multiple_slots_without_losing_remainder() {
        let mut e = engine(PlaybackMode::Continuous, Some(10));
        assert!(e.set_speed(4.0));
        let out = e.tick(10_000.0);
        assert_eq!(out.slots_advanced, 3);
        assert_eq!(e.current_slot(), 13);
        assert_eq!(e.slot_progress_ms(), 4_000.0);
    }

    #[test]
    fn seek_below_min_clamps_to_min() {
        let mut e = PlaybackEngine::new(
            &Network::Mainnet.params(),
            PlayerConfig::default(),
            window(20, 100, 2),
        );
        assert_eq!(e.seek(15), 20);
        assert_eq!(e.current_slot(), 20);
    }

    #[test]
    fn seek_is_idempotent() {
        let mut e = engine(PlaybackMode::Continuous, Some(10));
        e.tick(3_000.0);
        e.seek(98);
        let once = e.state();
        e.seek(98);
        assert_eq!(e.state(), once);
    }

    #[test]
    fn invalid_speed_is_rejected_silently() {
        let mut e = engine(PlaybackMode::Live, None);
        assert!(e.set_speed(2.5));
        assert!(!e.set_speed(0.0));
        assert!(!e.set_speed(-1.0));
        assert!(!e.set_speed(f64::INFINITY));
        assert!(!e.set_speed(f64::NAN));
        assert_eq!(e.playback_speed(), 2.5);
    }

    #[test]
    fn paused_engine_freezes_progress() {
        let mut e = engine(PlaybackMode::Continuous, Some(10));
        e.tick(5_000.0);
        e.pause();
        e.pause();
        let out = e.tick(50_000.0);
        assert_eq!(out, TickOutcome::default());
        assert_eq!(e.current_slot(), 10);
        assert_eq!(e.slot_progress_ms(), 5_000.0);
        e.play();
        e.tick(7_000.0);
        assert_eq!(e.current_slot(), 11);
    }

    #[test]
    fn static_mode_never_ticks_but_steps() {
        let mut e = engine(PlaybackMode::Static, Some(50));
        e.play();
        e.tick(100_000.0);
        assert_eq!(e.current_slot(), 50);
        assert_eq!(e.slot_progress_ms(), 0.0);
        assert_eq!(e.step_forward(), 51);
        assert_eq!(e.step_backward(), 50);
        assert_eq!(e.jump_to_live(), None);
        e.seek(98);
        assert_eq!(e.step_forward(), 98);
        e.seek(0);
        assert_eq!(e.step_backward(), 0);
    }

    #[test]
    fn playback_never_outruns_safe_slot() {
        for speed in [0.5, 1.0, 2.0, 7.5, 25.0, 100.0] {
            for tick_ms in [1.0, 16.0, 250.0, 999.0, 12_000.0, 18_000.0, 600_000.0] {
                let mut e = engine(PlaybackMode::Continuous, Some(0));
                assert!(e.set_speed(speed));
                for _ in 0..200 {
                    let before = e.current_slot();
                    e.tick(tick_ms);
                    assert!(e.current_slot() >= before);
                    assert!(e.current_slot() <= e.state().safe_slot);
                    assert_invariants(&e);
                }
            }
        }
    }

    #[test]
    fn speed_scales_linearly() {
        for (delta, speed) in [(1_000.0, 3.0), (250.0, 10.0), (40_000.0, 0.5)] {
            let mut fast = engine(PlaybackMode::Continuous, Some(5));
            assert!(fast.set_speed(speed));
            let mut slow = engine(PlaybackMode::Continuous, Some(5));
            for _ in 0..20 {
                fast.tick(delta);
                slow.tick(delta * speed);
            }
            assert_eq!(fast.current_slot(), slow.current_slot());
            assert!((fast.slot_progress_ms() - slow.slot_progress_ms()).abs() < 1e-6);
        }
    }

    #[test]
    fn advancing_head_keeps_slot_monotonic() {
        let mut e = engine(PlaybackMode::Live, None);
        let mut head = 100;
        let mut last = e.current_slot();
        for i in 0..100 {
            if i % 3 == 0 {
                head += 1;
                e.apply_bounds(window(0, head, 2));
            }
            e.tick(4_000.0);
            assert!(e.current_slot() >= last);
            last = e.current_slot();
            assert_invariants(&e);
        }
    }

    #[test]
    fn shrinking_window_reclamps_immediately() {
        let mut e = engine(PlaybackMode::Live, None);
        e.tick(3_000.0);
        e.apply_bounds(window(0, 90, 2));
        assert_eq!(e.current_slot(), 88);
        assert_eq!(e.slot_progress_ms(), 0.0);
        assert_invariants(&e);
    }

    #[test]
    fn advancing_horizon_pulls_slot_forward() {
        let mut e = engine(PlaybackMode::Continuous, Some(5));
        e.apply_bounds(window(30, 100, 2));
        assert_eq!(e.current_slot(), 30);
    }

    #[test]
    fn inverted_window_pins_to_max() {
        let mut e = engine(PlaybackMode::Live, None);
        e.apply_bounds(NavigableBounds {
            min_slot: 60,
            max_slot: 40,
            safe_slot: 40,
            head_slot: 40,
        });
        assert_eq!(e.current_slot(), 40);
        e.tick(50_000.0);
        assert_eq!(e.current_slot(), 40);
        assert_eq!(e.seek(70), 40);
    }

    #[test]
    fn switching_mode_adjusts_position() {
        let mut e = engine(PlaybackMode::Continuous, Some(10));
        e.tick(3_000.0);
        e.set_mode(PlaybackMode::Static);
        assert_eq!(e.slot_progress_ms(), 0.0);
        assert_eq!(e.current_slot(), 10);
        e.set_mode(PlaybackMode::Live);
        assert_eq!(e.current_slot(), 98);
    }

    #[test]
    fn reset_network_restores_initial_configuration() {
        let mut e = engine(PlaybackMode::Continuous, Some(10));
        e.set_speed(8.0);
        e.tick(30_000.0);
        e.reset_network(&Network::Sepolia.params(), window(0, 500, 2));
        assert_eq!(e.current_slot(), 10);
        assert_eq!(e.playback_speed(), 1.0);
        assert_eq!(e.slot_progress_ms(), 0.0);
    }
}
