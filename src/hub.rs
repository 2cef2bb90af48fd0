//! Prediction hub owning the client, settings and every polling unit.
//!
//! The hub keeps one [`PredictionFetcher`] per watched slot, so any number of
//! views interested in the same slot share one request stream. It also owns
//! the lot-wide [`InsightMonitor`] and [`TrendMonitor`] once started.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::api::{with_timeout, HttpClient, ParkingApi};
use crate::config::ClientConfig;
use crate::data::LotStatus;
use crate::error::Result;
use crate::fetcher::PredictionFetcher;
use crate::insights::InsightMonitor;
use crate::settings::{FileStorage, SettingsStore};
use crate::trend::TrendMonitor;

/// Central owner of the prediction polling layer.
pub struct PredictionHub {
    /// Backend access shared by every unit.
    api: Arc<dyn ParkingApi>,
    /// Global prediction settings.
    settings: Arc<SettingsStore>,
    config: ClientConfig,
    /// Fetchers by slot id.
    fetchers: RwLock<HashMap<u32, Arc<PredictionFetcher>>>,
    insights: RwLock<Option<Arc<InsightMonitor>>>,
    trend: RwLock<Option<Arc<TrendMonitor>>>,
}

impl PredictionHub {
    /// Create a hub talking HTTP to `config.base_url`.
    ///
    /// Settings persist under `config.settings_dir` when set, and live in
    /// memory otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let api = Arc::new(HttpClient::new(config.clone())?);
        let settings = match &config.settings_dir {
            Some(dir) => SettingsStore::load(Arc::new(FileStorage::new(dir))),
            None => SettingsStore::in_memory(),
        };
        Ok(Self::with_api(api, Arc::new(settings), config))
    }

    /// Create a hub over an existing backend and settings store.
    pub fn with_api(
        api: Arc<dyn ParkingApi>,
        settings: Arc<SettingsStore>,
        config: ClientConfig,
    ) -> Self {
        info!("Prediction hub using {}", config.base_url);
        Self {
            api,
            settings,
            config,
            fetchers: RwLock::new(HashMap::new()),
            insights: RwLock::new(None),
            trend: RwLock::new(None),
        }
    }

    /// Get the shared settings store.
    pub fn settings(&self) -> Arc<SettingsStore> {
        Arc::clone(&self.settings)
    }

    /// Get the client configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Get the backend handle.
    pub fn api(&self) -> Arc<dyn ParkingApi> {
        Arc::clone(&self.api)
    }

    /// Start (or join) polling for `slot_id`.
    ///
    /// Returns the existing fetcher when the slot is already watched. A
    /// request for auto-refresh turns it on for the shared fetcher; it is
    /// never turned off from here.
    ///
    /// A watched fetcher that has since been retargeted with
    /// [`PredictionFetcher::set_slot`] no longer counts as watching
    /// `slot_id`: the hub drops it and starts a fresh one. The retargeted
    /// fetcher keeps running for whoever still holds it.
    pub fn watch_slot(&self, slot_id: u32, auto_refresh: bool) -> Arc<PredictionFetcher> {
        let existing = Self::reuse(self.fetchers.read().get(&slot_id), slot_id, auto_refresh);
        if let Some(existing) = existing {
            return existing;
        }

        let mut fetchers = self.fetchers.write();
        // Another caller may have raced us between the read and write locks.
        if let Some(existing) = Self::reuse(fetchers.get(&slot_id), slot_id, auto_refresh) {
            return existing;
        }

        if fetchers.remove(&slot_id).is_some() {
            debug!("Fetcher for slot {} was retargeted, replacing it", slot_id);
        }
        info!("Watching slot {}", slot_id);
        let fetcher = Arc::new(PredictionFetcher::spawn_with_timeout(
            Arc::clone(&self.api),
            Arc::clone(&self.settings),
            slot_id,
            auto_refresh,
            self.config.request_timeout,
        ));
        fetchers.insert(slot_id, Arc::clone(&fetcher));
        fetcher
    }

    fn reuse(
        existing: Option<&Arc<PredictionFetcher>>,
        slot_id: u32,
        auto_refresh: bool,
    ) -> Option<Arc<PredictionFetcher>> {
        let existing = existing.filter(|f| f.slot_id() == slot_id && f.is_live())?;
        if auto_refresh && !existing.auto_refresh() {
            existing.set_auto_refresh(true);
        }
        Some(Arc::clone(existing))
    }

    /// Stop polling `slot_id`. Returns whether it was watched.
    pub fn unwatch_slot(&self, slot_id: u32) -> bool {
        match self.fetchers.write().remove(&slot_id) {
            // Retargeted fetchers belong to whoever moved them.
            Some(fetcher) if fetcher.slot_id() == slot_id => {
                fetcher.shutdown();
                debug!("Stopped watching slot {}", slot_id);
                true
            }
            _ => false,
        }
    }

    /// Get a watched slot's fetcher, if it still polls that slot.
    pub fn fetcher(&self, slot_id: u32) -> Option<Arc<PredictionFetcher>> {
        self.fetchers
            .read()
            .get(&slot_id)
            .filter(|f| f.slot_id() == slot_id)
            .cloned()
    }

    /// Get watched slot ids in ascending order.
    pub fn watched_slots(&self) -> Vec<u32> {
        let mut slots: Vec<u32> = self
            .fetchers
            .read()
            .iter()
            .filter(|(slot_id, f)| f.slot_id() == **slot_id)
            .map(|(slot_id, _)| *slot_id)
            .collect();
        slots.sort_unstable();
        slots
    }

    /// Start the insight monitor, or return the running one.
    pub fn start_insights(&self) -> Arc<InsightMonitor> {
        let mut insights = self.insights.write();
        if let Some(monitor) = insights.as_ref() {
            return Arc::clone(monitor);
        }
        let monitor = Arc::new(InsightMonitor::spawn_with_timeout(
            Arc::clone(&self.api),
            Arc::clone(&self.settings),
            self.config.request_timeout,
        ));
        *insights = Some(Arc::clone(&monitor));
        monitor
    }

    /// Get the insight monitor if started.
    pub fn insights(&self) -> Option<Arc<InsightMonitor>> {
        self.insights.read().clone()
    }

    /// Start the trend monitor, replacing any running one.
    pub fn start_trend(&self, interval: Duration, auto_refresh: bool) -> Arc<TrendMonitor> {
        let monitor = Arc::new(TrendMonitor::spawn_with_timeout(
            Arc::clone(&self.api),
            interval,
            auto_refresh,
            self.config.request_timeout,
        ));
        if let Some(previous) = self.trend.write().replace(Arc::clone(&monitor)) {
            previous.shutdown();
        }
        monitor
    }

    /// Get the trend monitor if started.
    pub fn trend(&self) -> Option<Arc<TrendMonitor>> {
        self.trend.read().clone()
    }

    /// Fetch the current lot status directly.
    pub async fn lot_status(&self) -> Result<LotStatus> {
        with_timeout(self.config.request_timeout, self.api.lot_status()).await
    }

    /// Stop every fetcher and monitor.
    pub fn shutdown(&self) {
        info!("Shutting down prediction hub");

        let fetchers: Vec<_> = self.fetchers.write().drain().map(|(_, f)| f).collect();
        for fetcher in fetchers {
            fetcher.shutdown();
        }
        if let Some(monitor) = self.insights.write().take() {
            monitor.shutdown();
        }
        if let Some(monitor) = self.trend.write().take() {
            monitor.shutdown();
        }
    }
}

impl Drop for PredictionHub {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for PredictionHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PredictionHub")
            .field("base_url", &self.config.base_url)
            .field("watched_slots", &self.watched_slots())
            .finish()
    }
}
