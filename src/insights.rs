//! Aggregate insights across the whole lot.
//!
//! [`compile_insights`] runs one cycle: lot status, the overall 30-minute
//! forecast, then a fan-out over every slot. The occupied slots expected to
//! free up soonest are ranked, and one occupancy-trend entry closes the list.
//!
//! [`InsightMonitor`] repeats the cycle every two minutes while predictions
//! are enabled. Disabling clears the list and stops all requests.

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::api::{with_timeout, ParkingApi};
use crate::callback::{on_broadcast, CallbackHandle};
use crate::config::DEFAULT_REQUEST_TIMEOUT;
use crate::data::{Insight, InsightReport, LotStatus, OverallPrediction, SlotPrediction};
use crate::error::Result;
use crate::fanout::fetch_all_slots;
use crate::settings::{PredictionSettings, SettingsStore};

/// Most slot-availability insights kept per cycle.
pub const MAX_SLOT_INSIGHTS: usize = 3;

/// Fixed cadence of the insight monitor.
pub const INSIGHT_REFRESH_INTERVAL: Duration = Duration::from_secs(120);

/// Message shown when a cycle fails.
pub const INSIGHTS_FAILED_MESSAGE: &str = "Failed to load AI insights";

/// Run one insight cycle.
///
/// A failure of the lot status or the overall forecast aborts the cycle.
/// Individual slot failures only drop that slot.
pub async fn compile_insights(api: &dyn ParkingApi, timeout: Duration) -> Result<InsightReport> {
    let lot = with_timeout(timeout, api.lot_status()).await?;
    let overall = with_timeout(timeout, api.overall_prediction()).await?;
    let predictions = fetch_all_slots(api, overall.total_slots, timeout).await;

    Ok(InsightReport {
        insights: rank_insights(&lot, &overall, &predictions),
        generated_at: Utc::now(),
    })
}

/// Build the insight list from one cycle's data.
///
/// Occupied slots with a positive estimate are sorted by minutes (ties keep
/// slot order), the first [`MAX_SLOT_INSIGHTS`] get 1-based priorities, and one
/// occupancy-trend insight is appended.
pub fn rank_insights(
    lot: &LotStatus,
    overall: &OverallPrediction,
    predictions: &[SlotPrediction],
) -> Vec<Insight> {
    let mut freeing: Vec<(u32, u32)> = predictions
        .iter()
        .filter_map(|p| p.frees_up_in().map(|minutes| (p.slot_id, minutes)))
        .collect();
    freeing.sort_by_key(|&(_, minutes)| minutes);

    let mut insights: Vec<Insight> = freeing
        .into_iter()
        .take(MAX_SLOT_INSIGHTS)
        .zip(1..)
        .map(|((slot_id, minutes), priority)| Insight::SlotAvailability {
            slot_id,
            minutes,
            priority,
        })
        .collect();

    insights.push(Insight::OccupancyTrend {
        current_pct: lot.occupancy_pct(),
        expected_pct: overall.expected_occupancy_pct(),
    });
    insights
}

#[derive(Debug, Default)]
struct InsightState {
    report: Option<InsightReport>,
    loading: bool,
    error: Option<String>,
    /// Bumped whenever the monitor is disabled; older cycles are discarded.
    generation: u64,
    live: bool,
}

struct MonitorShared {
    api: Arc<dyn ParkingApi>,
    timeout: Duration,
    state: RwLock<InsightState>,
    insights_tx: broadcast::Sender<Vec<Insight>>,
}

impl MonitorShared {
    fn begin_cycle(&self) -> Option<u64> {
        let mut state = self.state.write();
        if !state.live {
            return None;
        }
        state.loading = true;
        Some(state.generation)
    }

    fn finish_cycle(&self, generation: u64, result: Result<InsightReport>) {
        let mut state = self.state.write();
        if !state.live || state.generation != generation {
            debug!("Discarding stale insight cycle");
            return;
        }
        state.loading = false;

        match result {
            Ok(report) => {
                debug!("Compiled {} insights", report.insights.len());
                let insights = report.insights.clone();
                state.report = Some(report);
                state.error = None;
                drop(state);
                let _ = self.insights_tx.send(insights);
            }
            Err(e) => {
                warn!("Insight cycle failed: {}", e);
                state.error = Some(INSIGHTS_FAILED_MESSAGE.to_string());
            }
        }
    }

    /// Drop the current list and invalidate running cycles.
    fn clear(&self) {
        {
            let mut state = self.state.write();
            state.generation += 1;
            state.report = None;
            state.loading = false;
            state.error = None;
        }
        let _ = self.insights_tx.send(Vec::new());
    }

    fn spawn_cycle(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let generation = self.begin_cycle()?;
        let shared = Arc::clone(self);
        Some(tokio::spawn(async move {
            let result = compile_insights(shared.api.as_ref(), shared.timeout).await;
            shared.finish_cycle(generation, result);
        }))
    }
}

/// Keeps the lot-wide insight list fresh while predictions are enabled.
pub struct InsightMonitor {
    shared: Arc<MonitorShared>,
    _settings: Arc<SettingsStore>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl InsightMonitor {
    /// Start the monitor. Must be called within a tokio runtime.
    pub fn spawn(api: Arc<dyn ParkingApi>, settings: Arc<SettingsStore>) -> Self {
        Self::spawn_with_timeout(api, settings, DEFAULT_REQUEST_TIMEOUT)
    }

    /// Start the monitor with a custom per-request timeout.
    pub fn spawn_with_timeout(
        api: Arc<dyn ParkingApi>,
        settings: Arc<SettingsStore>,
        timeout: Duration,
    ) -> Self {
        let (insights_tx, _) = broadcast::channel(16);
        let shared = Arc::new(MonitorShared {
            api,
            timeout,
            state: RwLock::new(InsightState {
                live: true,
                ..Default::default()
            }),
            insights_tx,
        });

        info!("Starting insight monitor");
        let driver = tokio::spawn(drive(Arc::clone(&shared), settings.subscribe()));

        Self {
            shared,
            _settings: settings,
            driver: Mutex::new(Some(driver)),
        }
    }

    /// Get the latest successful report.
    pub fn report(&self) -> Option<InsightReport> {
        self.shared.state.read().report.clone()
    }

    /// Get the latest insight list, empty before the first success.
    pub fn insights(&self) -> Vec<Insight> {
        self.shared
            .state
            .read()
            .report
            .as_ref()
            .map(|r| r.insights.clone())
            .unwrap_or_default()
    }

    /// Get the latest error message.
    pub fn error(&self) -> Option<String> {
        self.shared.state.read().error.clone()
    }

    /// Check if a cycle is in flight.
    pub fn is_loading(&self) -> bool {
        self.shared.state.read().loading
    }

    /// Subscribe to insight list replacements.
    pub fn subscribe(&self) -> broadcast::Receiver<Vec<Insight>> {
        self.shared.insights_tx.subscribe()
    }

    /// Register a callback for insight list replacements.
    pub fn on_insights_updated<F>(&self, callback: F) -> CallbackHandle
    where
        F: Fn(&[Insight]) + Send + Sync + 'static,
    {
        on_broadcast(self.subscribe(), move |insights: &Vec<Insight>| {
            callback(insights)
        })
    }

    /// Stop the monitor. Idempotent.
    pub fn shutdown(&self) {
        {
            let mut state = self.shared.state.write();
            state.live = false;
            state.loading = false;
        }
        if let Some(driver) = self.driver.lock().take() {
            driver.abort();
            debug!("Insight monitor shut down");
        }
    }
}

impl Drop for InsightMonitor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for InsightMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state.read();
        f.debug_struct("InsightMonitor")
            .field("insights", &state.report.as_ref().map_or(0, |r| r.insights.len()))
            .field("loading", &state.loading)
            .field("error", &state.error)
            .finish()
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn drive(shared: Arc<MonitorShared>, mut settings_rx: watch::Receiver<PredictionSettings>) {
    let mut active = false;
    let mut deadline: Option<Instant> = None;
    let mut cycle: Option<JoinHandle<()>> = None;

    loop {
        let enabled = settings_rx.borrow_and_update().enabled;
        if enabled != active {
            active = enabled;
            if enabled {
                debug!("Insights enabled");
                deadline = Some(Instant::now());
            } else {
                debug!("Insights disabled, clearing");
                deadline = None;
                if let Some(cycle) = cycle.take() {
                    cycle.abort();
                }
                shared.clear();
            }
        }

        tokio::select! {
            _ = sleep_until_deadline(deadline) => {
                cycle = shared.spawn_cycle();
                deadline = Some(Instant::now() + INSIGHT_REFRESH_INTERVAL);
            }
            changed = settings_rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }
}
