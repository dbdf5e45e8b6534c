use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use core_types::{BoundsError, BoundsSource, NetworkParameters, Slot, SlotBounds, WallClock};
use infra_clock::SlotClock;
use parking_lot::RwLock;
use reqwest::Client;
use serde::Deserialize;

const HEAD_HEADER_PATH: &str = "/eth/v1/beacon/headers/head";

/// Head estimated from the wall clock: the slot whose start time has most recently
/// passed. Optionally keeps only the last `retention_slots` slots navigable.
pub struct ClockBoundsSource {
    clock: SlotClock,
    wall: Arc<dyn WallClock>,
    retention_slots: Option<u64>,
}

impl ClockBoundsSource {
    pub fn new(params: NetworkParameters, wall: Arc<dyn WallClock>) -> Self {
        Self {
            clock: SlotClock::new(params),
            wall,
            retention_slots: None,
        }
    }

    pub fn with_retention(mut self, retention_slots: u64) -> Self {
        self.retention_slots = Some(retention_slots);
        self
    }

    pub fn snapshot(&self) -> SlotBounds {
        let head_slot = self.clock.current_slot(self.wall.as_ref());
        SlotBounds {
            head_slot,
            backfill_min_slot: self
                .retention_slots
                .map(|r| head_slot.saturating_sub_unsigned(r)),
        }
    }
}

#[async_trait]
impl BoundsSource for ClockBoundsSource {
    async fn fetch_bounds(&self) -> Result<SlotBounds, BoundsError> {
        Ok(self.snapshot())
    }
}

/// Fixed bounds that can be replaced at runtime; used by demos and tests.
#[derive(Debug)]
pub struct StaticBoundsSource {
    bounds: RwLock<SlotBounds>,
}

impl StaticBoundsSource {
    pub fn new(bounds: SlotBounds) -> Self {
        Self {
            bounds: RwLock::new(bounds),
        }
    }

    pub fn set_head(&self, head_slot: Slot) {
        self.bounds.write().head_slot = head_slot;
    }
}

#[async_trait]
impl BoundsSource for StaticBoundsSource {
    async fn fetch_bounds(&self) -> Result<SlotBounds, BoundsError> {
        Ok(*self.bounds.read())
    }
}

#[derive(Debug, Clone)]
pub struct BeaconConfig {
    pub endpoint: String,
    pub request_timeout: Duration,
    /// Beacon headers carry no backfill information; the horizon comes from config.
    pub backfill_min_slot: Option<Slot>,
}

impl Default for BeaconConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:5052".to_string(),
            request_timeout: Duration::from_millis(2_000),
            backfill_min_slot: None,
        }
    }
}

/// Polls a beacon node's standard API for the head block header.
pub struct BeaconHeadSource {
    http: Client,
    url: String,
    backfill_min_slot: Option<Slot>,
}

impl BeaconHeadSource {
    pub fn new(cfg: BeaconConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(cfg.request_timeout)
            .build()
            .context("build beacon http client")?;
        Ok(Self {
            http,
            url: format!("{}{HEAD_HEADER_PATH}", cfg.endpoint.trim_end_matches('/')),
            backfill_min_slot: cfg.backfill_min_slot,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn fetch_body(&self) -> Result<String> {
        self.http
            .get(&self.url)
            .header("accept", "application/json")
            .send()
            .await
            .context("beacon head request")?
            .error_for_status()
            .context("beacon head status")?
            .text()
            .await
            .context("beacon head body")
    }
}

#[async_trait]
impl BoundsSource for BeaconHeadSource {
    async fn fetch_bounds(&self) -> Result<SlotBounds, BoundsError> {
        let body = self
            .fetch_body()
            .await
            .map_err(|err| BoundsError::Unavailable(format!("{err:#}")))?;
        let head_slot = parse_head_slot(&body)?;
        tracing::debug!(head_slot, url = %self.url, "beacon head fetched");
        Ok(SlotBounds {
            head_slot,
            backfill_min_slot: self.backfill_min_slot,
        })
    }
}

#[derive(Debug, Deserialize)]
struct HeaderResponse {
    data: HeaderData,
}

#[derive(Debug, Deserialize)]
struct HeaderData {
    header: SignedHeader,
}

#[derive(Debug, Deserialize)]
struct SignedHeader {
    message: HeaderMessage,
}

#[derive(Debug, Deserialize)]
struct HeaderMessage {
    slot: String,
}

/// Extracts `data.header.message.slot`; the beacon API encodes integers as strings.
pub fn parse_head_slot(body: &str) -> Result<Slot, BoundsError> {
    let resp: HeaderResponse =
        serde_json::from_str(body).map_err(|err| BoundsError::Decode(err.to_string()))?;
    resp.data
        .header
        .message
        .slot
        .parse::<Slot>()
        .map_err(|err| BoundsError::Decode(format!("slot: {err}")))
}
