//! Slot prediction data structures.
//!
//! Contains the per-slot estimate of when an occupied parking space will
//! become free.

use serde::{Deserialize, Serialize};

/// Whether a slot currently holds a vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotStatus {
    /// A vehicle is parked in the slot.
    Occupied,
    /// The slot is empty.
    #[default]
    Free,
}

impl SlotStatus {
    /// Check if the slot is occupied.
    pub fn is_occupied(&self) -> bool {
        matches!(self, Self::Occupied)
    }
}

impl std::fmt::Display for SlotStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Occupied => write!(f, "occupied"),
            Self::Free => write!(f, "free"),
        }
    }
}

/// Backend prediction for a single slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotPrediction {
    /// Slot id (1-based).
    pub slot_id: u32,

    /// Minutes until the slot is expected to be free.
    ///
    /// `None` means the backend has no estimate, which for an occupied slot
    /// reads as "occupied indefinitely".
    pub predicted_free_in_minutes: Option<u32>,

    /// Confidence of the estimate in `[0, 1]`.
    pub confidence: f64,

    /// Current status of the slot.
    pub current_status: SlotStatus,
}

impl SlotPrediction {
    /// Create a new prediction, clamping `confidence` into `[0, 1]`.
    pub fn new(
        slot_id: u32,
        predicted_free_in_minutes: Option<u32>,
        confidence: f64,
        current_status: SlotStatus,
    ) -> Self {
        let confidence = if confidence.is_finite() {
            confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self {
            slot_id,
            predicted_free_in_minutes,
            confidence,
            current_status,
        }
    }

    /// Check if the slot is occupied.
    pub fn is_occupied(&self) -> bool {
        self.current_status.is_occupied()
    }

    /// Minutes until free, only for occupied slots with a positive estimate.
    ///
    /// These are the slots worth surfacing as "freeing up soon".
    pub fn frees_up_in(&self) -> Option<u32> {
        if !self.is_occupied() {
            return None;
        }
        self.predicted_free_in_minutes.filter(|&m| m > 0)
    }

    /// Check if the slot is still expected to be occupied `offset_minutes` from now.
    ///
    /// Occupied slots with no estimate stay occupied at every offset.
    pub fn occupied_at(&self, offset_minutes: u32) -> bool {
        self.is_occupied()
            && self
                .predicted_free_in_minutes
                .map_or(true, |m| m > offset_minutes)
    }

    /// Confidence as a whole percentage.
    pub fn confidence_percent(&self) -> u8 {
        (self.confidence * 100.0).round() as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confidence_is_clamped() {
        let p = SlotPrediction::new(1, Some(5), 1.7, SlotStatus::Occupied);
        assert_eq!(p.confidence, 1.0);

        let p = SlotPrediction::new(1, Some(5), -0.2, SlotStatus::Occupied);
        assert_eq!(p.confidence, 0.0);

        let p = SlotPrediction::new(1, Some(5), f64::NAN, SlotStatus::Occupied);
        assert_eq!(p.confidence, 0.0);
    }

    #[test]
    fn test_frees_up_in() {
        let occupied = SlotPrediction::new(2, Some(7), 0.8, SlotStatus::Occupied);
        assert_eq!(occupied.frees_up_in(), Some(7));

        let zero = SlotPrediction::new(2, Some(0), 0.8, SlotStatus::Occupied);
        assert_eq!(zero.frees_up_in(), None);

        let indefinite = SlotPrediction::new(2, None, 0.8, SlotStatus::Occupied);
        assert_eq!(indefinite.frees_up_in(), None);

        let free = SlotPrediction::new(2, Some(7), 0.8, SlotStatus::Free);
        assert_eq!(free.frees_up_in(), None);
    }

    #[test]
    fn test_occupied_at() {
        let p = SlotPrediction::new(3, Some(10), 0.5, SlotStatus::Occupied);
        assert!(p.occupied_at(0));
        assert!(p.occupied_at(5));
        assert!(!p.occupied_at(10));
        assert!(!p.occupied_at(15));

        let indefinite = SlotPrediction::new(3, None, 0.5, SlotStatus::Occupied);
        assert!(indefinite.occupied_at(60));

        let free = SlotPrediction::new(3, None, 0.5, SlotStatus::Free);
        assert!(!free.occupied_at(0));
    }

    #[test]
    fn test_slot_status_serde() {
        let status: SlotStatus = serde_json::from_str("\"occupied\"").unwrap();
        assert_eq!(status, SlotStatus::Occupied);
        assert_eq!(serde_json::to_string(&SlotStatus::Free).unwrap(), "\"free\"");
        assert_eq!(SlotStatus::default(), SlotStatus::Free);
    }

    #[test]
    fn test_confidence_percent() {
        let p = SlotPrediction::new(1, None, 0.856, SlotStatus::Free);
        assert_eq!(p.confidence_percent(), 86);
    }
}
