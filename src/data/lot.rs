//! Lot-wide status and forecast data structures.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::prediction::SlotStatus;
use crate::utils::occupancy_percent;

/// Current status of the whole lot, as reported by `/free-slot`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LotStatus {
    /// Next free slot the backend would assign, if any.
    pub slot_number: Option<u32>,
    /// Number of slots in the lot.
    pub total_slots: u32,
    /// Number of slots currently free. Never exceeds `total_slots`.
    pub available_slots: u32,
}

impl LotStatus {
    /// Create a new lot status, capping `available_slots` at `total_slots`.
    pub fn new(slot_number: Option<u32>, total_slots: u32, available_slots: u32) -> Self {
        Self {
            slot_number,
            total_slots,
            available_slots: available_slots.min(total_slots),
        }
    }

    /// Number of occupied slots.
    pub fn occupied_slots(&self) -> u32 {
        self.total_slots - self.available_slots
    }

    /// Current occupancy as a rounded percentage.
    pub fn occupancy_pct(&self) -> u8 {
        occupancy_percent(self.occupied_slots(), self.total_slots)
    }

    /// Check if every slot is taken.
    pub fn is_full(&self) -> bool {
        self.available_slots == 0
    }
}

/// Backend forecast for one slot inside the overall prediction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotForecast {
    /// Slot id (1-based).
    pub slot_id: u32,
    /// Probability that the slot will be free.
    pub availability_probability: f64,
    /// Predicted status.
    pub predicted_status: SlotStatus,
    /// Current status.
    pub current_status: SlotStatus,
}

/// Lot-wide forecast for the next 30 minutes.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OverallPrediction {
    /// Expected occupancy percentage.
    pub occupancy_percentage: f64,
    /// Number of slots the forecast covers.
    pub total_slots: u32,
    /// Expected number of free slots.
    pub predicted_available: u32,
    /// Expected number of occupied slots.
    pub predicted_occupied: u32,
    /// Per-slot forecasts.
    pub slots: Vec<SlotForecast>,
    /// When the backend produced the forecast.
    pub timestamp: Option<DateTime<Utc>>,
}

impl OverallPrediction {
    /// Expected occupancy rounded and clamped to `0..=100`.
    pub fn expected_occupancy_pct(&self) -> u8 {
        if !self.occupancy_percentage.is_finite() {
            return 0;
        }
        self.occupancy_percentage.round().clamp(0.0, 100.0) as u8
    }
}
