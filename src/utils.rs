//! Utility functions for the parking-prediction-sync crate.

/// Compute an occupancy percentage rounded to the nearest integer.
///
/// # Arguments
///
/// * `occupied` - Number of occupied slots
/// * `total` - Total number of slots in the lot
///
/// # Returns
///
/// A percentage in `0..=100`. An empty lot is 0% occupied, and an `occupied`
/// count above `total` is capped at 100%.
///
/// # Example
///
/// ```
/// use parking_prediction_sync::occupancy_percent;
///
/// assert_eq!(occupancy_percent(6, 10), 60);
/// assert_eq!(occupancy_percent(1, 3), 33);
/// assert_eq!(occupancy_percent(0, 0), 0);
/// ```
#[inline]
pub fn occupancy_percent(occupied: u32, total: u32) -> u8 {
    if total == 0 {
        return 0;
    }
    let occupied = occupied.min(total);
    (occupied as f64 / total as f64 * 100.0).round() as u8
}

/// Format a forecast offset as a chart label.
///
/// # Example
///
/// ```
/// use parking_prediction_sync::offset_label;
///
/// assert_eq!(offset_label(0), "Now");
/// assert_eq!(offset_label(15), "+15m");
/// ```
pub fn offset_label(offset_minutes: u32) -> String {
    if offset_minutes == 0 {
        "Now".to_string()
    } else {
        format!("+{offset_minutes}m")
    }
}
