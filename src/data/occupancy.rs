//! Occupancy forecast time series.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::{occupancy_percent, offset_label};

/// Fixed forecast offsets in minutes, in chart order.
pub const FORECAST_OFFSETS_MINUTES: [u32; 13] = [0, 5, 10, 15, 20, 25, 30, 35, 40, 45, 50, 55, 60];

/// Predicted occupancy at one future offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OccupancyPoint {
    /// Minutes from now.
    pub offset_minutes: u32,
    /// Slots expected to still be occupied.
    pub occupied_count: u32,
    /// Number of slots in the lot.
    pub total_slots: u32,
    /// `round(occupied_count / total_slots * 100)`, 0 for an empty lot.
    pub occupancy_pct: u8,
}

impl OccupancyPoint {
    /// Create a point, deriving the percentage.
    pub fn new(offset_minutes: u32, occupied_count: u32, total_slots: u32) -> Self {
        Self {
            offset_minutes,
            occupied_count,
            total_slots,
            occupancy_pct: occupancy_percent(occupied_count, total_slots),
        }
    }

    /// Chart label: `"Now"` or `"+{n}m"`.
    pub fn label(&self) -> String {
        offset_label(self.offset_minutes)
    }
}

/// A compiled forecast series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OccupancyTrend {
    /// Occupancy right now, from the lot status.
    pub current_occupancy_pct: u8,
    /// Number of slots in the lot.
    pub total_slots: u32,
    /// One point per entry of [`FORECAST_OFFSETS_MINUTES`].
    pub points: Vec<OccupancyPoint>,
    /// When the series was compiled.
    pub generated_at: DateTime<Utc>,
}

impl OccupancyTrend {
    /// Highest predicted occupancy in the series.
    pub fn peak(&self) -> Option<&OccupancyPoint> {
        self.points.iter().max_by_key(|p| p.occupancy_pct)
    }
}
