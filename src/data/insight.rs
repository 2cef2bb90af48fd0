//! Insight data structures.
//!
//! Insights are derived view entries; a new list replaces the old one on every
//! successful compile.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single entry in the "what should the user know right now" list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Insight {
    /// An occupied slot that is expected to free up soon.
    SlotAvailability {
        /// Slot id.
        slot_id: u32,
        /// Minutes until the slot frees up.
        minutes: u32,
        /// Dense 1-based rank by ascending `minutes`.
        priority: u32,
    },
    /// Current occupancy against the 30-minute forecast.
    OccupancyTrend {
        /// Current occupancy percentage.
        current_pct: u8,
        /// Expected occupancy percentage in 30 minutes.
        expected_pct: u8,
    },
}

impl Insight {
    /// Human-readable text for the insight.
    pub fn message(&self) -> String {
        match self {
            Self::SlotAvailability {
                slot_id, minutes, ..
            } => format!("Slot {slot_id} will free up in ~{minutes} min"),
            Self::OccupancyTrend {
                current_pct,
                expected_pct,
            } => format!(
                "Expected occupancy: {expected_pct}% in next 30 min (currently {current_pct}%)"
            ),
        }
    }

    /// Check if this is a slot-availability insight.
    pub fn is_slot_availability(&self) -> bool {
        matches!(self, Self::SlotAvailability { .. })
    }
}

/// One compiled insight list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsightReport {
    /// Ranked slot insights followed by one occupancy-trend insight.
    pub insights: Vec<Insight>,
    /// When the list was compiled.
    pub generated_at: DateTime<Utc>,
}
