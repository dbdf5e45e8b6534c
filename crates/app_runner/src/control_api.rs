use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use core_types::{Network, PlaybackMode, Slot};
use serde::Deserialize;
use slot_player::{ConfigSlice, HealthSlice, PlayerSnapshot, ProgressSlice, StateSlice};

use crate::bootstrap::build_bounds_source;
use crate::state::AppState;

pub(crate) fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/state/progress", get(progress))
        .route("/state/player", get(player))
        .route("/state/config", get(config))
        .route("/state/health", get(player_health))
        .route("/state/snapshot", get(snapshot))
        .route("/control/play", post(play))
        .route("/control/pause", post(pause))
        .route("/control/step_forward", post(step_forward))
        .route("/control/step_backward", post(step_backward))
        .route("/control/jump_to_live", post(jump_to_live))
        .route("/control/seek", post(seek))
        .route("/control/speed", post(speed))
        .route("/control/mode", post(mode))
        .route("/control/network", post(network))
        .with_state(state)
}

fn rejected(status: StatusCode, error: impl ToString) -> Response {
    (
        status,
        Json(serde_json::json!({"ok": false, "error": error.to_string()})),
    )
        .into_response()
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let health = state.player.topics().health.current();
    Json(serde_json::json!({
        "status": "ok",
        "player": health.label.to_string(),
        "is_stalled": health.flags.is_stalled,
        "is_stale": health.flags.is_stale,
    }))
}

async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        state.prometheus.render(),
    )
}

async fn progress(State(state): State<AppState>) -> Json<ProgressSlice> {
    Json(state.player.topics().progress.current())
}

async fn player(State(state): State<AppState>) -> Json<StateSlice> {
    Json(state.player.topics().state.current())
}

async fn config(State(state): State<AppState>) -> Json<ConfigSlice> {
    Json(state.player.topics().config.current())
}

async fn player_health(State(state): State<AppState>) -> Json<HealthSlice> {
    Json(state.player.topics().health.current())
}

async fn snapshot(State(state): State<AppState>) -> Json<PlayerSnapshot> {
    Json(state.player.snapshot())
}

async fn play(State(state): State<AppState>) -> impl IntoResponse {
    state.player.play();
    Json(serde_json::json!({"ok": true, "is_playing": true}))
}

async fn pause(State(state): State<AppState>) -> impl IntoResponse {
    state.player.pause();
    Json(serde_json::json!({"ok": true, "is_playing": false}))
}

async fn step_forward(State(state): State<AppState>) -> impl IntoResponse {
    let slot = state.player.step_forward();
    Json(serde_json::json!({"ok": true, "slot": slot}))
}

async fn step_backward(State(state): State<AppState>) -> impl IntoResponse {
    let slot = state.player.step_backward();
    Json(serde_json::json!({"ok": true, "slot": slot}))
}

async fn jump_to_live(State(state): State<AppState>) -> Response {
    match state.player.jump_to_live() {
        Some(slot) => Json(serde_json::json!({"ok": true, "slot": slot})).into_response(),
        None => rejected(StatusCode::CONFLICT, "static mode does not track the head"),
    }
}

#[derive(Debug, Deserialize)]
struct SeekReq {
    slot: Slot,
}

async fn seek(State(state): State<AppState>, Json(req): Json<SeekReq>) -> impl IntoResponse {
    let slot = state.player.seek(req.slot);
    Json(serde_json::json!({"ok": true, "requested": req.slot, "slot": slot}))
}

#[derive(Debug, Deserialize)]
struct SpeedReq {
    multiplier: f64,
}

async fn speed(State(state): State<AppState>, Json(req): Json<SpeedReq>) -> Response {
    if state.player.set_speed(req.multiplier) {
        Json(serde_json::json!({"ok": true, "playback_speed": req.multiplier})).into_response()
    } else {
        rejected(
            StatusCode::BAD_REQUEST,
            format!("playback speed must be finite and > 0, got {}", req.multiplier),
        )
    }
}

#[derive(Debug, Deserialize)]
struct ModeReq {
    mode: String,
}

async fn mode(State(state): State<AppState>, Json(req): Json<ModeReq>) -> Response {
    match req.mode.parse::<PlaybackMode>() {
        Ok(mode) => {
            state.player.set_mode(mode);
            let current = state.player.topics().state.current();
            Json(serde_json::json!({
                "ok": true,
                "mode": mode,
                "slot": current.current_slot,
            }))
            .into_response()
        }
        Err(err) => rejected(StatusCode::BAD_REQUEST, err),
    }
}

#[derive(Debug, Deserialize)]
struct NetworkReq {
    network: String,
}

async fn network(State(state): State<AppState>, Json(req): Json<NetworkReq>) -> Response {
    let network = match req.network.parse::<Network>() {
        Ok(v) => v,
        Err(err) => return rejected(StatusCode::BAD_REQUEST, err),
    };
    let params = network.params();
    let mut runtime = state.runtime.lock().await;
    let timeout = runtime.options().refresh_timeout;
    let source = match build_bounds_source(&state.bounds, params, timeout) {
        Ok(v) => v,
        Err(err) => return rejected(StatusCode::INTERNAL_SERVER_ERROR, format!("{err:#}")),
    };
    match runtime.switch_network(params, source).await {
        Ok(generation) => Json(serde_json::json!({
            "ok": true,
            "network": network,
            "genesis_time": params.genesis_time,
            "generation": generation,
        }))
        .into_response(),
        Err(err) => {
            tracing::warn!(%network, ?err, "network switch failed");
            rejected(StatusCode::BAD_GATEWAY, err)
        }
    }
}
