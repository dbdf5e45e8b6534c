use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;
use slot_player::{PlayerHandle, PlayerRuntime};
use tokio::sync::Mutex;

use crate::config_loader::BoundsSettings;

#[derive(Clone)]
pub(crate) struct AppState {
    pub player: PlayerHandle,
    /// Held only while switching networks; player actions go through `player`.
    pub runtime: Arc<Mutex<PlayerRuntime>>,
    pub bounds: Arc<BoundsSettings>,
    pub prometheus: PrometheusHandle,
}

impl AppState {
    pub(crate) fn new(
        runtime: PlayerRuntime,
        bounds: BoundsSettings,
        prometheus: PrometheusHandle,
    ) -> Self {
        Self {
            player: runtime.handle().clone(),
            runtime: Arc::new(Mutex::new(runtime)),
            bounds: Arc::new(bounds),
            prometheus,
        }
    }
}
