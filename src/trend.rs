//! Occupancy forecast for charting.
//!
//! [`compile_trend`] buckets every slot's prediction into the fixed offsets in
//! [`FORECAST_OFFSETS_MINUTES`]. [`TrendMonitor`] recompiles on its own
//! interval and does not follow the global enabled flag.

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::api::{with_timeout, ParkingApi};
use crate::callback::{on_broadcast, CallbackHandle};
use crate::config::DEFAULT_REQUEST_TIMEOUT;
use crate::data::{
    LotStatus, OccupancyPoint, OccupancyTrend, SlotPrediction, FORECAST_OFFSETS_MINUTES,
};
use crate::error::{Error, Result};
use crate::fanout::fetch_all_slots;

/// Default recompile interval.
pub const DEFAULT_TREND_INTERVAL: Duration = Duration::from_secs(60);

/// Message shown when the backend gives no usable reason.
pub const TREND_FAILED_MESSAGE: &str = "Failed to fetch predictions";

/// Run one trend cycle.
///
/// Only a lot status failure is fatal. Slots whose prediction fails are left
/// out of every point.
pub async fn compile_trend(api: &dyn ParkingApi, timeout: Duration) -> Result<OccupancyTrend> {
    let lot = with_timeout(timeout, api.lot_status()).await?;
    let predictions = fetch_all_slots(api, lot.total_slots, timeout).await;
    Ok(build_trend(&lot, &predictions))
}

/// Bucket predictions into one point per forecast offset.
pub fn build_trend(lot: &LotStatus, predictions: &[SlotPrediction]) -> OccupancyTrend {
    let points = FORECAST_OFFSETS_MINUTES
        .iter()
        .map(|&offset| {
            let occupied = predictions.iter().filter(|p| p.occupied_at(offset)).count() as u32;
            OccupancyPoint::new(offset, occupied, lot.total_slots)
        })
        .collect();

    OccupancyTrend {
        current_occupancy_pct: lot.occupancy_pct(),
        total_slots: lot.total_slots,
        points,
        generated_at: Utc::now(),
    }
}

fn trend_error_message(err: &Error) -> String {
    match err {
        Error::Server {
            message: Some(message),
            ..
        } => message.clone(),
        Error::Server { message: None, .. } | Error::MalformedResponse { .. } => {
            TREND_FAILED_MESSAGE.to_string()
        }
        _ => err.to_string(),
    }
}

#[derive(Debug, Default)]
struct TrendState {
    trend: Option<OccupancyTrend>,
    in_flight: usize,
    error: Option<String>,
    live: bool,
}

struct TrendShared {
    api: Arc<dyn ParkingApi>,
    timeout: Duration,
    state: RwLock<TrendState>,
    trend_tx: broadcast::Sender<OccupancyTrend>,
}

impl TrendShared {
    async fn run_cycle(&self) {
        {
            let mut state = self.state.write();
            if !state.live {
                return;
            }
            state.in_flight += 1;
        }

        let result = compile_trend(self.api.as_ref(), self.timeout).await;

        let mut state = self.state.write();
        if !state.live {
            debug!("Discarding trend cycle after shutdown");
            return;
        }
        state.in_flight = state.in_flight.saturating_sub(1);

        match result {
            Ok(trend) => {
                debug!(
                    "Compiled occupancy trend for {} slots",
                    trend.total_slots
                );
                state.trend = Some(trend.clone());
                state.error = None;
                drop(state);
                let _ = self.trend_tx.send(trend);
            }
            Err(e) => {
                warn!("Trend cycle failed: {}", e);
                state.error = Some(trend_error_message(&e));
            }
        }
    }
}

/// Keeps the occupancy forecast fresh.
pub struct TrendMonitor {
    shared: Arc<TrendShared>,
    interval: Duration,
    auto_refresh: bool,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl TrendMonitor {
    /// Start the monitor. Must be called within a tokio runtime.
    ///
    /// Compiles once immediately, then every `interval` when `auto_refresh`
    /// is set.
    pub fn spawn(api: Arc<dyn ParkingApi>, interval: Duration, auto_refresh: bool) -> Self {
        Self::spawn_with_timeout(api, interval, auto_refresh, DEFAULT_REQUEST_TIMEOUT)
    }

    /// Start the monitor with a custom per-request timeout.
    pub fn spawn_with_timeout(
        api: Arc<dyn ParkingApi>,
        interval: Duration,
        auto_refresh: bool,
        timeout: Duration,
    ) -> Self {
        let (trend_tx, _) = broadcast::channel(16);
        let shared = Arc::new(TrendShared {
            api,
            timeout,
            state: RwLock::new(TrendState {
                live: true,
                ..Default::default()
            }),
            trend_tx,
        });

        info!(
            "Starting trend monitor (interval={} ms, auto_refresh={})",
            interval.as_millis(),
            auto_refresh
        );

        let driver_shared = Arc::clone(&shared);
        let driver = tokio::spawn(async move {
            if !auto_refresh {
                driver_shared.run_cycle().await;
                return;
            }
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                driver_shared.run_cycle().await;
            }
        });

        Self {
            shared,
            interval,
            auto_refresh,
            driver: Mutex::new(Some(driver)),
        }
    }

    /// Get the recompile interval.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Check if the monitor recompiles on its own.
    pub fn auto_refresh(&self) -> bool {
        self.auto_refresh
    }

    /// Get the latest successful trend.
    pub fn trend(&self) -> Option<OccupancyTrend> {
        self.shared.state.read().trend.clone()
    }

    /// Get the latest series, empty before the first success.
    pub fn points(&self) -> Vec<OccupancyPoint> {
        self.shared
            .state
            .read()
            .trend
            .as_ref()
            .map(|t| t.points.clone())
            .unwrap_or_default()
    }

    /// Get the latest error message.
    pub fn error(&self) -> Option<String> {
        self.shared.state.read().error.clone()
    }

    /// Check if a cycle is in flight.
    pub fn is_loading(&self) -> bool {
        self.shared.state.read().in_flight > 0
    }

    /// Recompile now, outside the interval.
    ///
    /// The cycle runs as its own task, so dropping the returned future leaves
    /// it to finish in the background.
    pub async fn refresh(&self) {
        let shared = Arc::clone(&self.shared);
        let cycle = tokio::spawn(async move { shared.run_cycle().await });
        if let Err(e) = cycle.await {
            warn!("Trend refresh task failed: {}", e);
        }
    }

    /// Subscribe to trend replacements.
    pub fn subscribe(&self) -> broadcast::Receiver<OccupancyTrend> {
        self.shared.trend_tx.subscribe()
    }

    /// Register a callback for trend replacements.
    pub fn on_trend_updated<F>(&self, callback: F) -> CallbackHandle
    where
        F: Fn(&OccupancyTrend) + Send + Sync + 'static,
    {
        on_broadcast(self.subscribe(), callback)
    }

    /// Stop the monitor. Idempotent.
    pub fn shutdown(&self) {
        {
            let mut state = self.shared.state.write();
            state.live = false;
            state.in_flight = 0;
        }
        if let Some(driver) = self.driver.lock().take() {
            driver.abort();
            debug!("Trend monitor shut down");
        }
    }
}

impl Drop for TrendMonitor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for TrendMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrendMonitor")
            .field("interval", &self.interval)
            .field("auto_refresh", &self.auto_refresh)
            .field("loading", &self.is_loading())
            .finish()
    }
}
