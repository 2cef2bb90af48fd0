//! Per-slot prediction polling.
//!
//! A [`PredictionFetcher`] keeps one slot's prediction fresh. It fetches once
//! when started (and whenever it is retargeted to another slot) and then polls
//! on the global refresh interval while both the caller's `auto_refresh` intent
//! and the global `enabled` flag are set.
//!
//! Each fetcher runs a single driver task holding at most one deadline, so a
//! settings change replaces the timer instead of adding a second one. Fetches
//! run as their own tasks. A result is applied only if the fetcher is still
//! alive and still pointed at the slot the fetch was issued for; among
//! overlapping fetches for the same target, the one that completes last wins.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::api::{with_timeout, ParkingApi};
use crate::callback::{on_watch_change, CallbackHandle};
use crate::config::DEFAULT_REQUEST_TIMEOUT;
use crate::data::SlotPrediction;
use crate::error::{Error, Result};
use crate::settings::{PredictionSettings, SettingsStore};

/// Generic message for failed prediction fetches.
pub const FETCH_FAILED_MESSAGE: &str = "Failed to fetch prediction";

/// What a fetcher currently exposes.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PredictionSnapshot {
    /// Latest successful prediction, `None` before the first success or after a failure.
    pub prediction: Option<SlotPrediction>,
    /// Whether a fetch for the current slot is in flight.
    pub loading: bool,
    /// User-facing message for the latest failure.
    pub error: Option<String>,
}

/// Scheduling state of a fetcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PollState {
    /// No timer and nothing in flight.
    #[default]
    Idle,
    /// A timer is armed for the next poll.
    Scheduled,
    /// A fetch is in flight.
    Fetching,
}

impl std::fmt::Display for PollState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Scheduled => write!(f, "Scheduled"),
            Self::Fetching => write!(f, "Fetching"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Target {
    slot_id: u32,
    auto_refresh: bool,
}

/// Identifies one fetch so its result can be checked against the current target.
#[derive(Debug, Clone, Copy)]
struct FetchTicket {
    epoch: u64,
    slot_id: u32,
}

#[derive(Debug)]
struct FetchState {
    /// Bumped on every retarget; fetches from older epochs are discarded.
    epoch: u64,
    /// Slot the current epoch belongs to. Changes together with `epoch`.
    slot_id: u32,
    in_flight: usize,
    scheduled: bool,
    live: bool,
}

struct FetcherShared {
    api: Arc<dyn ParkingApi>,
    timeout: Duration,
    state: Mutex<FetchState>,
    target_tx: watch::Sender<Target>,
    snapshot_tx: watch::Sender<PredictionSnapshot>,
}

impl FetcherShared {
    fn target(&self) -> Target {
        *self.target_tx.borrow()
    }

    /// Register a fetch for the current target.
    ///
    /// Invalid slot ids are rejected here, synchronously, without a ticket.
    fn begin_fetch(&self) -> Option<FetchTicket> {
        let mut state = self.state.lock();
        if !state.live {
            return None;
        }
        let slot_id = state.slot_id;

        if slot_id < 1 {
            self.snapshot_tx.send_modify(|s| {
                s.prediction = None;
                s.loading = state.in_flight > 0;
                s.error = Some(Error::InvalidSlotId { slot_id }.user_message(FETCH_FAILED_MESSAGE));
            });
            return None;
        }

        state.in_flight += 1;
        self.snapshot_tx.send_modify(|s| {
            s.loading = true;
            s.error = None;
        });
        Some(FetchTicket {
            epoch: state.epoch,
            slot_id,
        })
    }

    async fn run_fetch(&self, ticket: FetchTicket) {
        let result = with_timeout(self.timeout, self.api.slot_prediction(ticket.slot_id)).await;
        self.finish_fetch(ticket, result);
    }

    fn finish_fetch(&self, ticket: FetchTicket, result: Result<SlotPrediction>) {
        let mut state = self.state.lock();
        if !state.live || state.epoch != ticket.epoch {
            debug!(
                "Discarding stale prediction result for slot {}",
                ticket.slot_id
            );
            return;
        }

        state.in_flight = state.in_flight.saturating_sub(1);
        let loading = state.in_flight > 0;

        match result {
            Ok(prediction) => {
                debug!(
                    "Slot {} prediction: {:?} min ({})",
                    ticket.slot_id, prediction.predicted_free_in_minutes, prediction.current_status
                );
                self.snapshot_tx.send_modify(|s| {
                    s.prediction = Some(prediction);
                    s.loading = loading;
                    s.error = None;
                });
            }
            Err(e) => {
                warn!("Prediction fetch for slot {} failed: {}", ticket.slot_id, e);
                self.snapshot_tx.send_modify(|s| {
                    s.prediction = None;
                    s.loading = loading;
                    s.error = Some(e.user_message(FETCH_FAILED_MESSAGE));
                });
            }
        }
    }

    /// Start a fetch in its own task.
    ///
    /// Once a ticket is issued the task always reaches `finish_fetch`, even if
    /// whoever awaits the handle goes away.
    fn spawn_fetch(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let ticket = self.begin_fetch()?;
        let shared = Arc::clone(self);
        Some(tokio::spawn(async move {
            shared.run_fetch(ticket).await;
        }))
    }

    fn set_scheduled(&self, scheduled: bool) {
        self.state.lock().scheduled = scheduled;
    }

    fn poll_state(&self) -> PollState {
        let state = self.state.lock();
        if state.in_flight > 0 {
            PollState::Fetching
        } else if state.scheduled {
            PollState::Scheduled
        } else {
            PollState::Idle
        }
    }
}

/// Keeps one slot's prediction fresh.
pub struct PredictionFetcher {
    shared: Arc<FetcherShared>,
    _settings: Arc<SettingsStore>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl PredictionFetcher {
    /// Start polling `slot_id` with the default 10 second request timeout.
    ///
    /// Must be called within a tokio runtime. An invalid `slot_id` sets the
    /// error before this returns and issues no request.
    pub fn spawn(
        api: Arc<dyn ParkingApi>,
        settings: Arc<SettingsStore>,
        slot_id: u32,
        auto_refresh: bool,
    ) -> Self {
        Self::spawn_with_timeout(api, settings, slot_id, auto_refresh, DEFAULT_REQUEST_TIMEOUT)
    }

    /// Start polling `slot_id` with a custom request timeout.
    pub fn spawn_with_timeout(
        api: Arc<dyn ParkingApi>,
        settings: Arc<SettingsStore>,
        slot_id: u32,
        auto_refresh: bool,
        timeout: Duration,
    ) -> Self {
        let target = Target {
            slot_id,
            auto_refresh,
        };
        let (target_tx, target_rx) = watch::channel(target);
        let (snapshot_tx, _) = watch::channel(PredictionSnapshot::default());

        let shared = Arc::new(FetcherShared {
            api,
            timeout,
            state: Mutex::new(FetchState {
                epoch: 0,
                slot_id,
                in_flight: 0,
                scheduled: false,
                live: true,
            }),
            target_tx,
            snapshot_tx,
        });

        info!(
            "Starting prediction fetcher for slot {} (auto_refresh={})",
            slot_id, auto_refresh
        );
        shared.spawn_fetch();

        let driver = tokio::spawn(drive(
            Arc::clone(&shared),
            settings.subscribe(),
            target_rx,
        ));

        Self {
            shared,
            _settings: settings,
            driver: Mutex::new(Some(driver)),
        }
    }

    /// Get the slot this fetcher polls.
    pub fn slot_id(&self) -> u32 {
        self.shared.target().slot_id
    }

    /// Get the caller's auto-refresh intent.
    pub fn auto_refresh(&self) -> bool {
        self.shared.target().auto_refresh
    }

    /// Get everything the fetcher exposes in one read.
    pub fn snapshot(&self) -> PredictionSnapshot {
        self.shared.snapshot_tx.borrow().clone()
    }

    /// Get the latest prediction.
    pub fn prediction(&self) -> Option<SlotPrediction> {
        self.shared.snapshot_tx.borrow().prediction.clone()
    }

    /// Check if a fetch is in flight.
    pub fn is_loading(&self) -> bool {
        self.shared.snapshot_tx.borrow().loading
    }

    /// Get the latest error message.
    pub fn error(&self) -> Option<String> {
        self.shared.snapshot_tx.borrow().error.clone()
    }

    /// Get the current scheduling state.
    pub fn poll_state(&self) -> PollState {
        self.shared.poll_state()
    }

    /// Check if the fetcher has not been shut down.
    pub fn is_live(&self) -> bool {
        self.shared.state.lock().live
    }

    /// Subscribe to snapshot updates.
    pub fn subscribe(&self) -> watch::Receiver<PredictionSnapshot> {
        self.shared.snapshot_tx.subscribe()
    }

    /// Register a callback for snapshot updates.
    pub fn on_prediction_updated<F>(&self, callback: F) -> CallbackHandle
    where
        F: Fn(&PredictionSnapshot) + Send + Sync + 'static,
    {
        on_watch_change(self.subscribe(), callback)
    }

    /// Fetch immediately, outside the schedule.
    ///
    /// Completes once the result has been applied (or discarded because the
    /// fetcher was retargeted or shut down meanwhile). The timer is untouched.
    /// Dropping the returned future does not cancel the fetch.
    pub async fn refetch(&self) {
        if let Some(fetch) = self.shared.spawn_fetch() {
            if let Err(e) = fetch.await {
                warn!("Prediction refetch task failed: {}", e);
            }
        }
    }

    /// Point the fetcher at another slot.
    ///
    /// Results still in flight for the previous slot are discarded, the timer
    /// is re-established, and a fetch for the new slot starts immediately.
    pub fn set_slot(&self, slot_id: u32) {
        {
            let mut state = self.shared.state.lock();
            if !state.live || state.slot_id == slot_id {
                return;
            }
            state.epoch += 1;
            state.slot_id = slot_id;
            state.in_flight = 0;
            self.shared.target_tx.send_modify(|t| t.slot_id = slot_id);
        }
        debug!("Retargeting prediction fetcher to slot {}", slot_id);
        self.shared.snapshot_tx.send_modify(|s| {
            s.prediction = None;
            s.loading = false;
        });
        self.shared.spawn_fetch();
    }

    /// Change the caller's auto-refresh intent.
    pub fn set_auto_refresh(&self, auto_refresh: bool) {
        self.shared.target_tx.send_if_modified(|t| {
            let changed = t.auto_refresh != auto_refresh;
            t.auto_refresh = auto_refresh;
            changed
        });
    }

    /// Stop polling. In-flight results are discarded. Idempotent.
    pub fn shutdown(&self) {
        let was_live = {
            let mut state = self.shared.state.lock();
            let was_live = state.live;
            state.live = false;
            state.scheduled = false;
            state.in_flight = 0;
            was_live
        };
        if let Some(driver) = self.driver.lock().take() {
            driver.abort();
        }
        if was_live {
            self.shared.snapshot_tx.send_modify(|s| s.loading = false);
            debug!("Prediction fetcher for slot {} shut down", self.slot_id());
        }
    }
}

impl Drop for PredictionFetcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for PredictionFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PredictionFetcher")
            .field("slot_id", &self.slot_id())
            .field("auto_refresh", &self.auto_refresh())
            .field("poll_state", &self.poll_state())
            .finish()
    }
}

fn schedule_for(target: Target, settings: PredictionSettings) -> Option<Duration> {
    (target.auto_refresh && settings.enabled).then(|| settings.refresh_interval())
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Driver loop: owns the unit's only timer.
async fn drive(
    shared: Arc<FetcherShared>,
    mut settings_rx: watch::Receiver<PredictionSettings>,
    mut target_rx: watch::Receiver<Target>,
) {
    let mut target = *target_rx.borrow_and_update();
    let mut schedule: Option<Duration> = None;
    let mut deadline: Option<Instant> = None;

    loop {
        let settings = *settings_rx.borrow_and_update();
        let next = schedule_for(target, settings);
        if next != schedule {
            schedule = next;
            deadline = schedule.map(|period| Instant::now() + period);
            shared.set_scheduled(schedule.is_some());
            match schedule {
                Some(period) => debug!(
                    "Slot {} polling every {} ms",
                    target.slot_id,
                    period.as_millis()
                ),
                None => debug!("Slot {} polling paused", target.slot_id),
            }
        }

        tokio::select! {
            _ = sleep_until_deadline(deadline) => {
                shared.spawn_fetch();
                deadline = schedule.map(|period| Instant::now() + period);
            }
            changed = settings_rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            changed = target_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let new_target = *target_rx.borrow_and_update();
                if new_target.slot_id != target.slot_id {
                    // Force the timer to be re-established for the new slot.
                    schedule = None;
                    deadline = None;
                }
                target = new_target;
            }
        }
    }

    shared.set_scheduled(false);
    debug!("Prediction fetcher driver for slot {} ended", target.slot_id);
}
