use std::sync::Arc;

use core_types::{
    BoundsError, NetworkParameters, PlaybackMode, PlayerConfig, PlayerEvent, PlayerState, Slot,
    SlotBounds,
};
use infra_bus::{RingBus, Topic};
use parking_lot::Mutex;
use playback_engine::TickOutcome;
use tokio::sync::broadcast;

use crate::player::SlotPlayer;
use crate::slices::{ConfigSlice, HealthSlice, PlayerSnapshot, ProgressSlice, StateSlice};

const EVENT_BUS_CAPACITY: usize = 256;

/// Independently subscribable views over one player state.
pub struct PlayerTopics {
    pub progress: Topic<ProgressSlice>,
    pub state: Topic<StateSlice>,
    pub config: Topic<ConfigSlice>,
    pub health: Topic<HealthSlice>,
}

impl PlayerTopics {
    fn new(snapshot: &PlayerSnapshot) -> Self {
        Self {
            progress: Topic::new(snapshot.progress),
            state: Topic::new(snapshot.state),
            config: Topic::new(snapshot.config),
            health: Topic::new(snapshot.health),
        }
    }

    fn publish(&self, snapshot: &PlayerSnapshot) {
        self.progress.publish(snapshot.progress);
        self.state.publish(snapshot.state);
        self.config.publish(snapshot.config);
        self.health.publish(snapshot.health);
    }
}

struct Guarded {
    player: SlotPlayer,
    generation: u64,
}

struct Shared {
    guarded: Mutex<Guarded>,
    topics: PlayerTopics,
    events: RingBus<PlayerEvent>,
}

/// Cloneable facade shared by the runtime tasks and every consumer.
///
/// Each call is one critical section: mutate, recompute health, publish. Subscribers
/// therefore never see a slice taken from a half-applied transition.
#[derive(Clone)]
pub struct PlayerHandle {
    shared: Arc<Shared>,
}

impl PlayerHandle {
    pub fn new(params: NetworkParameters, config: PlayerConfig, initial: SlotBounds) -> Self {
        Self::from_player(SlotPlayer::new(params, config, initial))
    }

    pub fn from_player(player: SlotPlayer) -> Self {
        let snapshot = player.snapshot();
        record_metrics(&snapshot);
        Self {
            shared: Arc::new(Shared {
                guarded: Mutex::new(Guarded {
                    player,
                    generation: 0,
                }),
                topics: PlayerTopics::new(&snapshot),
                events: RingBus::new(EVENT_BUS_CAPACITY),
            }),
        }
    }

    fn mutate<R>(&self, f: impl FnOnce(&mut SlotPlayer) -> R) -> R {
        let mut guard = self.shared.guarded.lock();
        let out = f(&mut guard.player);
        let snapshot = guard.player.snapshot();
        self.shared.topics.publish(&snapshot);
        record_metrics(&snapshot);
        out
    }

    fn emit(&self, event: PlayerEvent) {
        self.shared.events.publish(event);
    }

    pub fn topics(&self) -> &PlayerTopics {
        &self.shared.topics
    }

    pub fn events(&self) -> broadcast::Receiver<PlayerEvent> {
        self.shared.events.subscribe()
    }

    pub fn snapshot(&self) -> PlayerSnapshot {
        self.shared.guarded.lock().player.snapshot()
    }

    pub fn state(&self) -> PlayerState {
        self.shared.guarded.lock().player.state()
    }

    pub fn params(&self) -> NetworkParameters {
        *self.shared.guarded.lock().player.params()
    }

    /// Incremented on every network switch; work started under an older generation is
    /// discarded.
    pub fn generation(&self) -> u64 {
        self.shared.guarded.lock().generation
    }

    pub fn tick(&self, delta_ms: f64) -> TickOutcome {
        let outcome = self.mutate(|p| p.tick(delta_ms));
        metrics::histogram!("player.tick_delta_ms").record(delta_ms);
        if outcome.slots_advanced > 0 {
            metrics::counter!("player.slots_advanced").increment(outcome.slots_advanced);
        }
        if outcome.clamped {
            metrics::counter!("player.frontier_clamp").increment(1);
        }
        outcome
    }

    /// Applies a refreshed snapshot atomically, unless the player switched networks
    /// after the refresh was started.
    pub fn apply_bounds_for(&self, generation: u64, bounds: SlotBounds) -> bool {
        let applied = {
            let mut guard = self.shared.guarded.lock();
            if guard.generation != generation {
                None
            } else {
                let navigable = guard.player.apply_bounds(bounds);
                let snapshot = guard.player.snapshot();
                self.shared.topics.publish(&snapshot);
                record_metrics(&snapshot);
                Some(navigable)
            }
        };
        let Some(navigable) = applied else {
            tracing::debug!(generation, "dropping bounds from superseded network");
            return false;
        };
        tracing::debug!(
            head = navigable.head_slot,
            min = navigable.min_slot,
            safe = navigable.safe_slot,
            "bounds applied"
        );
        self.emit(PlayerEvent::BoundsApplied {
            head: navigable.head_slot,
            min: navigable.min_slot,
            safe: navigable.safe_slot,
        });
        true
    }

    /// Bounds stay at the last known good snapshot.
    pub fn bounds_refresh_failed(&self, err: &BoundsError) {
        tracing::warn!(?err, "bounds refresh failed; keeping last known bounds");
        metrics::counter!("player.bounds_refresh_error").increment(1);
        self.emit(PlayerEvent::BoundsRefreshFailed {
            reason: err.to_string(),
        });
    }

    pub fn switch_network(&self, params: NetworkParameters, initial: SlotBounds) -> u64 {
        let generation = {
            let mut guard = self.shared.guarded.lock();
            guard.generation = guard.generation.wrapping_add(1);
            guard.player.switch_network(params, initial);
            let snapshot = guard.player.snapshot();
            self.shared.topics.publish(&snapshot);
            record_metrics(&snapshot);
            guard.generation
        };
        tracing::info!(genesis_time = params.genesis_time, generation, "network switched");
        self.emit(PlayerEvent::NetworkReset {
            genesis_time: params.genesis_time,
        });
        generation
    }

    pub fn play(&self) {
        if self.mutate(SlotPlayer::play) {
            tracing::info!("playback resumed");
            self.emit(PlayerEvent::Played);
        }
    }

    pub fn pause(&self) {
        if self.mutate(SlotPlayer::pause) {
            tracing::info!("playback paused");
            self.emit(PlayerEvent::Paused);
        }
    }

    pub fn seek(&self, slot: Slot) -> Slot {
        let landed = self.mutate(|p| p.seek(slot));
        tracing::info!(requested = slot, slot = landed, "seek");
        self.emit(PlayerEvent::Seeked { slot: landed });
        landed
    }

    pub fn set_speed(&self, multiplier: f64) -> bool {
        let accepted = self.mutate(|p| p.set_speed(multiplier));
        if accepted {
            tracing::info!(speed = multiplier, "playback speed changed");
            self.emit(PlayerEvent::SpeedChanged { speed: multiplier });
        } else {
            tracing::warn!(requested = multiplier, "rejected playback speed");
            self.emit(PlayerEvent::SpeedRejected {
                requested: multiplier,
            });
        }
        accepted
    }

    pub fn step_forward(&self) -> Slot {
        let landed = self.mutate(SlotPlayer::step_forward);
        self.emit(PlayerEvent::Stepped { slot: landed });
        landed
    }

    pub fn step_backward(&self) -> Slot {
        let landed = self.mutate(SlotPlayer::step_backward);
        self.emit(PlayerEvent::Stepped { slot: landed });
        landed
    }

    pub fn jump_to_live(&self) -> Option<Slot> {
        let landed = self.mutate(SlotPlayer::jump_to_live);
        if let Some(slot) = landed {
            tracing::info!(slot, "jumped to live");
            self.emit(PlayerEvent::JumpedToLive { slot });
        }
        landed
    }

    pub fn set_mode(&self, mode: PlaybackMode) {
        if self.mutate(|p| p.set_mode(mode)) {
            tracing::info!(%mode, "playback mode changed");
            self.emit(PlayerEvent::ModeChanged { mode });
        }
    }
}

fn record_metrics(snapshot: &PlayerSnapshot) {
    metrics::gauge!("player.current_slot").set(snapshot.state.current_slot as f64);
    metrics::gauge!("player.safe_slot").set(snapshot.state.safe_slot as f64);
    metrics::gauge!("player.head_slot").set(snapshot.state.head_slot as f64);
    metrics::gauge!("player.stale_behind_slots")
        .set(snapshot.health.flags.stale_behind_slots as f64);
    metrics::gauge!("player.playback_speed").set(snapshot.config.playback_speed);
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use core_types::Network;

    use super::*;

    fn handle() -> PlayerHandle {
        PlayerHandle::new(
            Network::Mainnet.params(),
            PlayerConfig {
                initial_mode: PlaybackMode::Continuous,
                initial_slot: Some(40),
                ..PlayerConfig::default()
            },
            SlotBounds {
                head_slot: 100,
                backfill_min_slot: None,
            },
        )
    }

    #[tokio::test]
    async fn progress_ticks_do_not_wake_state_subscribers() {
        let h = handle();
        let mut state_rx = h.topics().state.subscribe();
        let mut progress_rx = h.topics().progress.subscribe();

        h.tick(1_000.0);
        h.tick(1_000.0);
        assert!(progress_rx.has_changed().expect("open"));
        assert!(!state_rx.has_changed().expect("open"));

        h.tick(10_000.0);
        assert!(state_rx.has_changed().expect("open"));
        assert_eq!(state_rx.borrow_and_update().current_slot, 41);
        assert_eq!(progress_rx.borrow_and_update().current_slot, 41);
    }

    #[tokio::test]
    async fn selector_subscribers_see_only_playing_flag() {
        let h = handle();
        let mut playing = h.topics().state.select(|s: &StateSlice| s.is_playing);
        h.tick(12_000.0);
        h.seek(70);
        let idle = tokio::time::timeout(Duration::from_millis(20), playing.changed()).await;
        assert!(idle.is_err());
        h.pause();
        assert_eq!(playing.changed().await, Ok(false));
    }

    #[tokio::test]
    async fn actions_publish_events() {
        let h = handle();
        let mut events = h.events();
        h.pause();
        h.pause();
        h.seek(5);
        assert!(!h.set_speed(0.0));
        assert_eq!(events.recv().await.expect("event"), PlayerEvent::Paused);
        assert_eq!(
            events.recv().await.expect("event"),
            PlayerEvent::Seeked { slot: 5 }
        );
        assert_eq!(
            events.recv().await.expect("event"),
            PlayerEvent::SpeedRejected { requested: 0.0 }
        );
        assert_eq!(h.snapshot().config.playback_speed, 1.0);
    }

    #[test]
    fn stale_generation_bounds_are_dropped() {
        let h = handle();
        let before = h.generation();
        h.switch_network(
            Network::Holesky.params(),
            SlotBounds {
                head_slot: 500,
                backfill_min_slot: None,
            },
        );
        assert!(!h.apply_bounds_for(
            before,
            SlotBounds {
                head_slot: 20,
                backfill_min_slot: None,
            }
        ));
        assert_eq!(h.state().head_slot, 500);
        assert!(h.apply_bounds_for(
            h.generation(),
            SlotBounds {
                head_slot: 510,
                backfill_min_slot: None,
            }
        ));
        assert_eq!(h.state().safe_slot, 508);
    }

    #[test]
    fn failed_refresh_keeps_bounds() {
        let h = handle();
        let before = h.state();
        h.bounds_refresh_failed(&BoundsError::Timeout(500));
        assert_eq!(h.state(), before);
    }

    #[test]
    fn config_slice_tracks_speed() {
        let h = handle();
        let mut cfg_rx = h.topics().config.subscribe();
        assert!(h.set_speed(4.0));
        assert!(cfg_rx.has_changed().expect("open"));
        assert_eq!(cfg_rx.borrow_and_update().playback_speed, 4.0);
        assert!(!h.set_speed(-1.0));
        assert!(!cfg_rx.has_changed().expect("open"));
    }
}
