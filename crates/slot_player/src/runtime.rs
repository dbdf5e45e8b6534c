use std::sync::Arc;
use std::time::Duration;

use core_types::{
    BoundsError, BoundsSource, NetworkParameters, PlayerConfig, SlotBounds, WallClock,
};
use infra_clock::DeltaTimer;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::handle::PlayerHandle;
use crate::player::SlotPlayer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeOptions {
    pub tick_interval: Duration,
    pub refresh_interval: Duration,
    pub refresh_timeout: Duration,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(50),
            refresh_interval: Duration::from_millis(4_000),
            refresh_timeout: Duration::from_millis(2_000),
        }
    }
}

/// Owns the tick and bounds-refresh tasks driving one [`PlayerHandle`].
///
/// Dropping the runtime aborts both tasks; [`PlayerRuntime::shutdown`] stops them
/// cooperatively.
pub struct PlayerRuntime {
    handle: PlayerHandle,
    options: RuntimeOptions,
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl PlayerRuntime {
    /// Fetches the first bounds snapshot, builds the player and starts driving it. `wall`
    /// positions live playback inside the current slot.
    pub async fn start(
        params: NetworkParameters,
        config: PlayerConfig,
        source: Arc<dyn BoundsSource>,
        wall: Arc<dyn WallClock>,
        options: RuntimeOptions,
    ) -> Result<Self, BoundsError> {
        let initial = fetch_with_timeout(source.as_ref(), options.refresh_timeout).await?;
        let player = SlotPlayer::new(params, config, initial).with_wall_clock(wall);
        let handle = PlayerHandle::from_player(player);
        Ok(Self::spawn(handle, source, options))
    }

    pub fn spawn(
        handle: PlayerHandle,
        source: Arc<dyn BoundsSource>,
        options: RuntimeOptions,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        let tasks = spawn_tasks(&handle, source, options, &shutdown);
        tracing::info!(
            tick_ms = options.tick_interval.as_millis() as u64,
            refresh_ms = options.refresh_interval.as_millis() as u64,
            "player runtime started"
        );
        Self {
            handle,
            options,
            shutdown,
            tasks,
        }
    }

    pub fn handle(&self) -> &PlayerHandle {
        &self.handle
    }

    pub fn options(&self) -> RuntimeOptions {
        self.options
    }

    /// Re-targets the player at another network. The new source must produce a first
    /// snapshot; otherwise the current network keeps running untouched.
    pub async fn switch_network(
        &mut self,
        params: NetworkParameters,
        source: Arc<dyn BoundsSource>,
    ) -> Result<u64, BoundsError> {
        let initial = fetch_with_timeout(source.as_ref(), self.options.refresh_timeout).await?;
        self.stop_tasks().await;
        let generation = self.handle.switch_network(params, initial);
        self.shutdown = watch::channel(false).0;
        self.tasks = spawn_tasks(&self.handle, source, self.options, &self.shutdown);
        Ok(generation)
    }

    pub async fn shutdown(mut self) {
        self.stop_tasks().await;
        tracing::info!("player runtime stopped");
    }

    async fn stop_tasks(&mut self) {
        let _ = self.shutdown.send(true);
        for task in self.tasks.drain(..) {
            if let Err(err) = task.await {
                if err.is_panic() {
                    tracing::error!(?err, "player task panicked");
                }
            }
        }
    }
}

impl Drop for PlayerRuntime {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

async fn fetch_with_timeout(
    source: &dyn BoundsSource,
    timeout: Duration,
) -> Result<SlotBounds, BoundsError> {
    match tokio::time::timeout(timeout, source.fetch_bounds()).await {
        Ok(result) => result,
        Err(_) => Err(BoundsError::Timeout(timeout.as_millis() as u64)),
    }
}

fn spawn_tasks(
    handle: &PlayerHandle,
    source: Arc<dyn BoundsSource>,
    options: RuntimeOptions,
    shutdown: &watch::Sender<bool>,
) -> Vec<JoinHandle<()>> {
    vec![
        spawn_tick_loop(handle.clone(), options.tick_interval, shutdown.subscribe()),
        spawn_refresh_loop(handle.clone(), source, options, shutdown.subscribe()),
    ]
}

fn spawn_tick_loop(
    handle: PlayerHandle,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period.max(Duration::from_millis(1)));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut timer = DeltaTimer::starting_at(tokio::time::Instant::now().into_std());
        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                at = interval.tick() => {
                    let delta_ms = timer.lap_at(at.into_std());
                    handle.tick(delta_ms);
                }
            }
        }
    })
}

fn spawn_refresh_loop(
    handle: PlayerHandle,
    source: Arc<dyn BoundsSource>,
    options: RuntimeOptions,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    let generation = handle.generation();
    tokio::spawn(async move {
        let period = options.refresh_interval.max(Duration::from_millis(1));
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; the initial snapshot is already applied.
        interval.tick().await;
        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                _ = interval.tick() => {}
            }
            let fetched = tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                r = fetch_with_timeout(source.as_ref(), options.refresh_timeout) => r,
            };
            match fetched {
                Ok(bounds) => {
                    handle.apply_bounds_for(generation, bounds);
                }
                Err(err) => handle.bounds_refresh_failed(&err),
            }
        }
    })
}
