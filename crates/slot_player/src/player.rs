use std::sync::Arc;

use core_types::{
    HealthFlags, NavigableBounds, NetworkParameters, PlaybackMode, PlayerConfig, PlayerState,
    Slot, SlotBounds, WallClock,
};
use infra_clock::SlotClock;
use playback_engine::{PlaybackEngine, TickOutcome};
use readiness_gate::ReadinessGate;
use staleness_monitor::{HealthLabel, StalenessMonitor};

use crate::slices::{ConfigSlice, HealthSlice, PlayerSnapshot, ProgressSlice, StateSlice};

/// Single-owner composition of clock, gate, engine and monitor. Every mutating call
/// leaves the engine state and its health flags consistent with each other.
#[derive(Debug, Clone)]
pub struct SlotPlayer {
    clock: SlotClock,
    gate: ReadinessGate,
    engine: PlaybackEngine,
    monitor: StalenessMonitor,
    health: HealthFlags,
    wall: Option<Arc<dyn WallClock>>,
}

impl SlotPlayer {
    pub fn new(params: NetworkParameters, config: PlayerConfig, initial: SlotBounds) -> Self {
        let (config, issues) = config.sanitized();
        for issue in &issues {
            tracing::warn!(%issue, "player config repaired");
        }
        let gate = ReadinessGate::from_config(&config);
        let mut monitor = StalenessMonitor::new(config.stale_threshold);
        let engine = PlaybackEngine::new(&params, config, gate.navigable(&initial));
        let health = monitor.observe(&engine.state());
        Self {
            clock: SlotClock::new(params),
            gate,
            engine,
            monitor,
            health,
            wall: None,
        }
    }

    /// Lands live playback at the wall clock's offset into the current slot instead of at
    /// the slot boundary.
    pub fn with_wall_clock(mut self, wall: Arc<dyn WallClock>) -> Self {
        self.wall = Some(wall);
        self.align_live_progress();
        self
    }

    fn align_live_progress(&mut self) {
        if let Some(wall) = &self.wall {
            let ms = self.clock.ms_into_current_slot(wall.as_ref());
            self.engine.align_live_progress(ms);
        }
    }

    pub fn params(&self) -> &NetworkParameters {
        self.clock.params()
    }

    pub fn state(&self) -> PlayerState {
        self.engine.state()
    }

    pub fn health(&self) -> HealthFlags {
        self.health
    }

    pub fn tick(&mut self, delta_ms: f64) -> TickOutcome {
        let outcome = self.engine.tick(delta_ms);
        self.health = self.monitor.observe(&self.engine.state());
        outcome
    }

    pub fn apply_bounds(&mut self, bounds: SlotBounds) -> NavigableBounds {
        let navigable = self.gate.navigable(&bounds);
        self.engine.apply_bounds(navigable);
        self.health = self.monitor.observe(&self.engine.state());
        navigable
    }

    pub fn switch_network(&mut self, params: NetworkParameters, initial: SlotBounds) {
        self.clock = SlotClock::new(params);
        self.engine.reset_network(&params, self.gate.navigable(&initial));
        self.align_live_progress();
        self.monitor.reset();
        self.health = self.monitor.observe(&self.engine.state());
    }

    pub fn play(&mut self) -> bool {
        let changed = !self.engine.is_playing();
        self.engine.play();
        self.refresh_health();
        changed
    }

    pub fn pause(&mut self) -> bool {
        let changed = self.engine.is_playing();
        self.engine.pause();
        self.refresh_health();
        changed
    }

    pub fn seek(&mut self, slot: Slot) -> Slot {
        let landed = self.engine.seek(slot);
        self.refresh_health();
        landed
    }

    pub fn set_speed(&mut self, multiplier: f64) -> bool {
        self.engine.set_speed(multiplier)
    }

    pub fn step_forward(&mut self) -> Slot {
        let landed = self.engine.step_forward();
        self.refresh_health();
        landed
    }

    pub fn step_backward(&mut self) -> Slot {
        let landed = self.engine.step_backward();
        self.refresh_health();
        landed
    }

    pub fn jump_to_live(&mut self) -> Option<Slot> {
        let landed = self.engine.jump_to_live();
        if landed.is_some() {
            self.align_live_progress();
        }
        self.refresh_health();
        landed
    }

    pub fn set_mode(&mut self, mode: PlaybackMode) -> bool {
        let changed = self.engine.mode() != mode;
        self.engine.set_mode(mode);
        if changed && mode == PlaybackMode::Live {
            self.align_live_progress();
        }
        self.refresh_health();
        changed
    }

    // Actions are not ticks: they must not count towards "pinned for more than one tick".
    fn refresh_health(&mut self) {
        self.health = self.monitor.peek(&self.engine.state());
    }

    pub fn snapshot(&self) -> PlayerSnapshot {
        let state = self.engine.state();
        let cfg = self.engine.config();
        let epoch = self.clock.epoch_of(state.current_slot);
        PlayerSnapshot {
            progress: ProgressSlice {
                current_slot: state.current_slot,
                slot_progress_ms: state.slot_progress_ms,
                progress_fraction: self.engine.progress_fraction(),
                epoch,
                slot_in_epoch: self.clock.slot_in_epoch(state.current_slot),
                slot_start_unix: self.clock.slot_to_timestamp(state.current_slot),
            },
            state: StateSlice {
                mode: state.mode,
                current_slot: state.current_slot,
                current_epoch: epoch,
                is_playing: state.is_playing,
                is_live_edge: self.engine.is_at_live_edge(),
                min_slot: state.min_slot,
                max_slot: state.max_slot,
                safe_slot: state.safe_slot,
                head_slot: state.head_slot,
            },
            config: ConfigSlice {
                network: *self.clock.params(),
                head_delay_slots: self.gate.head_delay_slots(),
                backfill_slots: self.gate.backfill_slots(),
                playback_speed: state.playback_speed,
                stale_threshold: cfg.stale_threshold,
            },
            health: HealthSlice {
                flags: self.health,
                label: HealthLabel::from_flags(&state, &self.health),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use core_types::Network;
    use infra_clock::ManualClock;

    use super::*;

    fn wall_at(slot: Slot, ms_into_slot: i64) -> Arc<ManualClock> {
        let genesis_ms = Network::Mainnet.params().genesis_time * 1_000;
        Arc::new(ManualClock::new(genesis_ms + slot * 12_000 + ms_into_slot))
    }

    fn head(head_slot: Slot) -> SlotBounds {
        SlotBounds {
            head_slot,
            backfill_min_slot: Some(10),
        }
    }

    fn player(mode: PlaybackMode, initial_slot: Option<Slot>) -> SlotPlayer {
        SlotPlayer::new(
            Network::Mainnet.params(),
            PlayerConfig {
                initial_mode: mode,
                initial_slot,
                ..PlayerConfig::default()
            },
            head(100),
        )
    }

    #[test]
    fn live_player_sits_at_safe_slot() {
        let mut p = player(PlaybackMode::Live, None);
        let snap = p.snapshot();
        assert_eq!(snap.state.safe_slot, 98);
        assert_eq!(snap.state.current_slot, 98);
        assert!(snap.state.is_live_edge);
        assert_eq!(p.jump_to_live(), Some(98));
        assert_eq!(p.state().slot_progress_ms, 0.0);
    }

    #[test]
    fn pinned_frontier_stalls_on_first_tick_after_construction() {
        let mut p = player(PlaybackMode::Live, None);
        p.tick(20_000.0);
        assert!(p.health().is_stalled);

        p.apply_bounds(head(101));
        assert!(!p.health().is_stalled);
        p.tick(20_000.0);
        assert_eq!(p.state().current_slot, 99);
        assert!(p.health().is_stalled);
    }

    #[test]
    fn live_progress_follows_wall_clock() {
        let wall = wall_at(1_000, 7_500);
        let mut p = SlotPlayer::new(
            Network::Mainnet.params(),
            PlayerConfig::default(),
            head(1_000),
        )
        .with_wall_clock(wall.clone());
        let s = p.state();
        assert_eq!(s.current_slot, 998);
        assert_eq!(s.slot_progress_ms, 7_500.0);

        p.tick(4_500.0);
        assert_eq!(p.state().current_slot, 998);
        assert_eq!(p.state().slot_progress_ms, 0.0);

        wall.advance_ms(2_000);
        assert_eq!(p.jump_to_live(), Some(998));
        assert_eq!(p.state().slot_progress_ms, 9_500.0);

        p.set_mode(PlaybackMode::Static);
        assert_eq!(p.state().slot_progress_ms, 0.0);
        p.seek(500);
        p.set_mode(PlaybackMode::Live);
        assert_eq!(p.state().current_slot, 998);
        assert_eq!(p.state().slot_progress_ms, 9_500.0);
    }

    #[test]
    fn wall_clock_leaves_non_live_start_untouched() {
        let p = SlotPlayer::new(
            Network::Mainnet.params(),
            PlayerConfig {
                initial_mode: PlaybackMode::Continuous,
                initial_slot: Some(50),
                ..PlayerConfig::default()
            },
            head(1_000),
        )
        .with_wall_clock(wall_at(1_000, 7_500));
        assert_eq!(p.state().current_slot, 50);
        assert_eq!(p.state().slot_progress_ms, 0.0);
    }

    #[test]
    fn live_edge_reads_stalled_while_waiting_for_next_head() {
        let mut p = player(PlaybackMode::Live, None);
        for _ in 0..100 {
            p.tick(50.0);
            assert!(p.health().is_stalled);
        }
        assert_eq!(p.snapshot().health.label, HealthLabel::Stalled);

        p.apply_bounds(head(101));
        assert!(!p.health().is_stalled);
        assert_eq!(p.snapshot().health.label, HealthLabel::Behind(3));

        p.tick(7_000.0);
        assert_eq!(p.state().current_slot, 99);
        assert!(p.health().is_stalled);
    }

    #[test]
    fn regressing_head_reclamps_downward() {
        let mut p = player(PlaybackMode::Live, None);
        p.apply_bounds(head(95));
        let s = p.state();
        assert_eq!(s.current_slot, 93);
        assert_eq!(s.max_slot, 93);
        assert_eq!(s.head_slot, 95);
    }

    #[test]
    fn inverted_bounds_force_max_and_stall() {
        let mut p = player(PlaybackMode::Continuous, Some(50));
        p.apply_bounds(SlotBounds {
            head_slot: 30,
            backfill_min_slot: Some(60),
        });
        let snap = p.snapshot();
        assert_eq!(snap.state.current_slot, snap.state.max_slot);
        assert!(snap.health.flags.is_stalled);
        assert_eq!(snap.health.label, HealthLabel::Stalled);
    }

    #[test]
    fn falling_behind_is_reported_stale() {
        let mut p = player(PlaybackMode::Continuous, Some(50));
        p.tick(1.0);
        let snap = p.snapshot();
        assert!(snap.health.flags.is_stale);
        assert_eq!(snap.health.flags.stale_behind_slots, 50);
        assert_eq!(snap.health.label, HealthLabel::Behind(50));
    }

    #[test]
    fn switch_network_resets_derived_state() {
        let mut p = player(PlaybackMode::Continuous, Some(50));
        p.set_speed(10.0);
        p.tick(60_000.0);
        p.switch_network(Network::Sepolia.params(), head(1_000));
        let snap = p.snapshot();
        assert_eq!(snap.config.network, Network::Sepolia.params());
        assert_eq!(snap.state.current_slot, 50);
        assert_eq!(snap.config.playback_speed, 1.0);
        assert_eq!(snap.progress.slot_progress_ms, 0.0);
    }

    #[test]
    fn snapshot_derives_epoch_geometry() {
        let p = player(PlaybackMode::Static, Some(70));
        let snap = p.snapshot();
        assert_eq!(snap.progress.epoch, 2);
        assert_eq!(snap.progress.slot_in_epoch, 6);
        assert_eq!(
            snap.progress.slot_start_unix,
            Network::Mainnet.params().genesis_time + 70 * 12
        );
        assert_eq!(snap.config.head_delay_slots, 2);
    }

    #[test]
    fn repeated_actions_report_no_change() {
        let mut p = player(PlaybackMode::Live, None);
        assert!(!p.play());
        assert!(p.pause());
        assert!(!p.pause());
        assert!(p.set_mode(PlaybackMode::Static));
        assert!(!p.set_mode(PlaybackMode::Static));
    }
}
