use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use bounds_feed::{BeaconConfig, BeaconHeadSource, ClockBoundsSource, StaticBoundsSource};
use core_types::{BoundsSource, NetworkParameters, PlayerEvent, SlotBounds};
use infra_clock::SystemClock;
use observability::{init_metrics, init_tracing};
use slot_player::PlayerRuntime;
use tokio::sync::broadcast;

use crate::config_loader::{load_app_config, BoundsSettings, BoundsSourceKind, ConfigOverrides};
use crate::control_api;
use crate::state::AppState;

pub(crate) async fn async_main(overrides: ConfigOverrides) -> Result<()> {
    let _guard = init_tracing("slot_player");
    let prometheus = init_metrics()?;

    let mut cfg = load_app_config();
    cfg.apply_overrides(overrides);
    tracing::info!(
        network = %cfg.network,
        genesis_time = cfg.params.genesis_time,
        source = ?cfg.bounds.source,
        mode = %cfg.player.initial_mode,
        "starting slot player"
    );

    let source = build_bounds_source(&cfg.bounds, cfg.params, cfg.runtime.refresh_timeout)?;
    let runtime = PlayerRuntime::start(
        cfg.params,
        cfg.player.clone(),
        source,
        Arc::new(SystemClock),
        cfg.runtime,
    )
    .await
    .context("initial bounds fetch")?;
    spawn_event_logger(runtime.handle().events());

    let state = AppState::new(runtime, cfg.bounds.clone(), prometheus);
    let runtime = state.runtime.clone();
    let app = control_api::build_router(state);

    let listener = tokio::net::TcpListener::bind(cfg.bind)
        .await
        .with_context(|| format!("bind {}", cfg.bind))?;
    tracing::info!(addr = %cfg.bind, "control api started");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("control api server")?;

    match Arc::try_unwrap(runtime) {
        Ok(runtime) => runtime.into_inner().shutdown().await,
        Err(_) => tracing::warn!("player runtime still shared at exit; aborting tasks"),
    }
    Ok(())
}

pub(crate) fn build_bounds_source(
    settings: &BoundsSettings,
    params: NetworkParameters,
    request_timeout: Duration,
) -> Result<Arc<dyn BoundsSource>> {
    let source: Arc<dyn BoundsSource> = match settings.source {
        BoundsSourceKind::Clock => {
            let mut source = ClockBoundsSource::new(params, Arc::new(SystemClock));
            if let Some(retention) = settings.retention_slots {
                source = source.with_retention(retention);
            }
            Arc::new(source)
        }
        BoundsSourceKind::Beacon => Arc::new(BeaconHeadSource::new(BeaconConfig {
            endpoint: settings.beacon_url.clone(),
            request_timeout,
            backfill_min_slot: settings.backfill_min_slot,
        })?),
        BoundsSourceKind::Static => Arc::new(StaticBoundsSource::new(SlotBounds {
            head_slot: settings.static_head_slot,
            backfill_min_slot: settings.backfill_min_slot,
        })),
    };
    Ok(source)
}

fn spawn_event_logger(mut events: broadcast::Receiver<PlayerEvent>) {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => tracing::debug!(?event, "player event"),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "player event logger lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(?err, "ctrl-c handler failed");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}
