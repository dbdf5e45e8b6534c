use std::fs;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::ValueEnum;
use core_types::{Network, NetworkParameters, PlaybackMode, PlayerConfig, Slot};
use serde::{Deserialize, Serialize};
use slot_player::RuntimeOptions;

fn player_config_path() -> PathBuf {
    std::env::var("SLOT_PLAYER_CONFIG_PATH")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("configs/player.toml"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub(crate) enum BoundsSourceKind {
    /// Head derived from the local wall clock.
    #[default]
    Clock,
    /// Head read from a beacon node.
    Beacon,
    /// Fixed head from config.
    Static,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct BoundsSettings {
    pub source: BoundsSourceKind,
    pub beacon_url: String,
    pub retention_slots: Option<u64>,
    pub backfill_min_slot: Option<Slot>,
    pub static_head_slot: Slot,
}

impl Default for BoundsSettings {
    fn default() -> Self {
        Self {
            source: BoundsSourceKind::Clock,
            beacon_url: "http://127.0.0.1:5052".to_string(),
            retention_slots: None,
            backfill_min_slot: None,
            static_head_slot: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct AppConfig {
    pub network: Network,
    pub params: NetworkParameters,
    pub player: PlayerConfig,
    pub bounds: BoundsSettings,
    pub runtime: RuntimeOptions,
    pub bind: SocketAddr,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            network: Network::Mainnet,
            params: Network::Mainnet.params(),
            player: PlayerConfig::default(),
            bounds: BoundsSettings::default(),
            runtime: RuntimeOptions::default(),
            bind: SocketAddr::from(([0, 0, 0, 0], 8080)),
        }
    }
}

/// Overrides taken from the command line (and its env fallbacks); they win over the file.
#[derive(Debug, Clone, Default)]
pub(crate) struct ConfigOverrides {
    pub network: Option<Network>,
    pub bind: Option<SocketAddr>,
    pub source: Option<BoundsSourceKind>,
    pub beacon_url: Option<String>,
    pub mode: Option<PlaybackMode>,
}

impl AppConfig {
    pub(crate) fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(network) = overrides.network {
            self.network = network;
            self.params = network.params();
        }
        if let Some(bind) = overrides.bind {
            self.bind = bind;
        }
        if let Some(url) = overrides.beacon_url.filter(|v| !v.trim().is_empty()) {
            self.bounds.beacon_url = url;
            self.bounds.source = BoundsSourceKind::Beacon;
        }
        if let Some(source) = overrides.source {
            self.bounds.source = source;
        }
        if let Some(mode) = overrides.mode {
            self.player.initial_mode = mode;
        }
    }
}

pub(crate) fn load_app_config() -> AppConfig {
    let path = player_config_path();
    let Ok(raw) = fs::read_to_string(&path) else {
        tracing::info!(path = %path.display(), "player config not found; using defaults");
        return AppConfig::default();
    };
    parse_app_config(&raw)
}

#[derive(Debug, Deserialize, Default)]
struct PlayerFile {
    network: Option<NetworkSection>,
    player: Option<PlayerSection>,
    bounds: Option<BoundsSection>,
    server: Option<ServerSection>,
}

#[derive(Debug, Deserialize, Default)]
struct NetworkSection {
    name: Option<String>,
    genesis_time: Option<i64>,
    seconds_per_slot: Option<u64>,
    slots_per_epoch: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct PlayerSection {
    mode: Option<String>,
    head_delay_slots: Option<u64>,
    backfill_slots: Option<u64>,
    initial_slot: Option<i64>,
    playing: Option<bool>,
    speed: Option<f64>,
    stale_threshold: Option<u64>,
    tick_interval_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct BoundsSection {
    source: Option<BoundsSourceKind>,
    beacon_url: Option<String>,
    retention_slots: Option<u64>,
    backfill_min_slot: Option<i64>,
    static_head_slot: Option<i64>,
    refresh_interval_ms: Option<u64>,
    refresh_timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct ServerSection {
    bind: Option<String>,
}

pub(crate) fn parse_app_config(raw: &str) -> AppConfig {
    let parsed = match toml::from_str::<PlayerFile>(raw) {
        Ok(v) => v,
        Err(err) => {
            tracing::warn!(%err, "invalid player config; using defaults");
            return AppConfig::default();
        }
    };
    let mut cfg = AppConfig::default();

    if let Some(section) = parsed.network {
        apply_network_section(&mut cfg, section);
    }

    if let Some(section) = parsed.player {
        if let Some(v) = section.mode {
            match v.parse::<PlaybackMode>() {
                Ok(mode) => cfg.player.initial_mode = mode,
                Err(err) => tracing::warn!(%err, "ignoring player.mode"),
            }
        }
        if let Some(v) = section.head_delay_slots {
            cfg.player.head_delay_slots = v.min(1_024);
        }
        if let Some(v) = section.backfill_slots {
            cfg.player.backfill_slots = Some(v);
        }
        if let Some(v) = section.initial_slot {
            cfg.player.initial_slot = Some(v);
        }
        if let Some(v) = section.playing {
            cfg.player.initial_playing = v;
        }
        if let Some(v) = section.speed {
            cfg.player.playback_speed = v;
        }
        if let Some(v) = section.stale_threshold {
            cfg.player.stale_threshold = v.min(1_024);
        }
        if let Some(v) = section.tick_interval_ms {
            cfg.runtime.tick_interval = Duration::from_millis(v.clamp(10, 1_000));
        }
    }

    if let Some(section) = parsed.bounds {
        if let Some(v) = section.source {
            cfg.bounds.source = v;
        }
        if let Some(v) = section.beacon_url.filter(|v| !v.trim().is_empty()) {
            cfg.bounds.beacon_url = v;
        }
        if let Some(v) = section.retention_slots {
            cfg.bounds.retention_slots = Some(v);
        }
        if let Some(v) = section.backfill_min_slot {
            cfg.bounds.backfill_min_slot = Some(v);
        }
        if let Some(v) = section.static_head_slot {
            cfg.bounds.static_head_slot = v;
        }
        if let Some(v) = section.refresh_interval_ms {
            cfg.runtime.refresh_interval = Duration::from_millis(v.clamp(250, 60_000));
        }
        if let Some(v) = section.refresh_timeout_ms {
            cfg.runtime.refresh_timeout = Duration::from_millis(v.clamp(100, 10_000));
        }
    }

    if let Some(bind) = parsed.server.and_then(|s| s.bind) {
        match bind.parse::<SocketAddr>() {
            Ok(addr) => cfg.bind = addr,
            Err(err) => tracing::warn!(%err, %bind, "ignoring server.bind"),
        }
    }

    cfg
}

fn apply_network_section(cfg: &mut AppConfig, section: NetworkSection) {
    if let Some(name) = section.name {
        match name.parse::<Network>() {
            Ok(network) => {
                cfg.network = network;
                cfg.params = network.params();
            }
            Err(err) => tracing::warn!(%err, "ignoring network.name"),
        }
    }
    if section.genesis_time.is_none()
        && section.seconds_per_slot.is_none()
        && section.slots_per_epoch.is_none()
    {
        return;
    }
    let preset = cfg.params;
    match NetworkParameters::new(
        section.genesis_time.unwrap_or(preset.genesis_time),
        section.seconds_per_slot.unwrap_or(preset.seconds_per_slot),
        section.slots_per_epoch.unwrap_or(preset.slots_per_epoch),
    ) {
        Ok(params) => cfg.params = params,
        Err(err) => {
            tracing::warn!(%err, network = %cfg.network, "invalid custom network; using preset")
        }
    }
}
