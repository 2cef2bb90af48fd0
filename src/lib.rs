//! # parking-prediction-sync
//!
//! Client-side polling and aggregation of parking slot availability
//! predictions served by a remote HTTP backend.
//!
//! ## Features
//!
//! - **Settings**: A persisted, process-wide `enabled`/refresh-interval pair
//!   that every polling unit observes
//! - **Per-slot Polling**: Keep one slot's prediction fresh with a single
//!   timer per slot, manual refetch and clean teardown
//! - **Insights**: Rank the slots expected to free up soonest and compare
//!   current occupancy with the 30-minute forecast
//! - **Occupancy Trend**: Bucket every slot's prediction into a 13-point
//!   forecast series for charting
//! - **Partial Tolerance**: Lot-wide fan-outs keep going when individual
//!   slot requests fail or time out
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use parking_prediction_sync::{ClientConfig, PredictionHub, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let hub = PredictionHub::new(ClientConfig::from_env())?;
//!
//!     // Poll slot 3 on the global refresh interval
//!     let fetcher = hub.watch_slot(3, true);
//!     let insights = hub.start_insights();
//!
//!     tokio::time::sleep(std::time::Duration::from_secs(5)).await;
//!
//!     if let Some(prediction) = fetcher.prediction() {
//!         println!(
//!             "Slot {} is {} ({}% confidence)",
//!             prediction.slot_id,
//!             prediction.current_status,
//!             prediction.confidence_percent()
//!         );
//!     }
//!     for insight in insights.insights() {
//!         println!("{}", insight.message());
//!     }
//!
//!     hub.shutdown();
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//!
//! - `PARKING_API_URL`: backend base URL (default `http://localhost:5000/api`)
//! - `PARKING_SETTINGS_DIR`: directory for persisted settings (in memory when unset)

// Public modules
pub mod api;
pub mod callback;
pub mod config;
pub mod data;
pub mod error;
pub mod fanout;
pub mod fetcher;
pub mod hub;
pub mod insights;
pub mod settings;
pub mod trend;
pub mod utils;

#[cfg(test)]
mod test_support;

// Re-exports for convenience
pub use api::{HttpClient, ParkingApi};
pub use callback::CallbackHandle;
pub use config::ClientConfig;
pub use error::{Error, Result};
pub use fetcher::{PollState, PredictionFetcher, PredictionSnapshot};
pub use hub::PredictionHub;
pub use insights::{compile_insights, InsightMonitor};
pub use settings::{
    FileStorage, MemoryStorage, PredictionSettings, RefreshCadence, SettingsStorage,
    SettingsStore,
};
pub use trend::{compile_trend, TrendMonitor};
pub use utils::{occupancy_percent, offset_label};

// Re-export commonly used types from submodules
pub use data::{
    Insight, InsightReport, LotStatus, OccupancyPoint, OccupancyTrend, OverallPrediction,
    SlotForecast, SlotPrediction, SlotStatus, FORECAST_OFFSETS_MINUTES,
};
