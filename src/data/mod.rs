//! Data structures for parking predictions.
//!
//! This module contains the core data types used to represent slot
//! predictions, lot status, compiled insights, and occupancy forecasts.

pub mod insight;
pub mod lot;
pub mod occupancy;
pub mod prediction;

pub use insight::{Insight, InsightReport};
pub use lot::{LotStatus, OverallPrediction, SlotForecast};
pub use occupancy::{OccupancyPoint, OccupancyTrend, FORECAST_OFFSETS_MINUTES};
pub use prediction::{SlotPrediction, SlotStatus};
