//! Concurrent per-slot prediction fan-out.

use futures::stream::{self, StreamExt};
use std::time::Duration;
use tracing::{debug, warn};

use crate::api::{with_timeout, ParkingApi};
use crate::data::SlotPrediction;

/// Largest lot a single fan-out will query. Slots above it are ignored.
pub const MAX_FANOUT_SLOTS: u32 = 1000;

/// Most slot requests in flight at once during a fan-out.
pub const MAX_CONCURRENT_REQUESTS: usize = 32;

/// Fetch predictions for slots `1..=total_slots` concurrently.
///
/// Each request is bounded by `timeout`, and at most
/// [`MAX_CONCURRENT_REQUESTS`] run at once. Slots whose request fails are
/// logged and left out; the rest come back in slot order.
pub async fn fetch_all_slots(
    api: &dyn ParkingApi,
    total_slots: u32,
    timeout: Duration,
) -> Vec<SlotPrediction> {
    let slot_count = if total_slots > MAX_FANOUT_SLOTS {
        warn!(
            "Lot reports {} slots, only querying the first {}",
            total_slots, MAX_FANOUT_SLOTS
        );
        MAX_FANOUT_SLOTS
    } else {
        total_slots
    };

    let results: Vec<_> = stream::iter(1..=slot_count)
        .map(|slot_id| async move {
            (slot_id, with_timeout(timeout, api.slot_prediction(slot_id)).await)
        })
        .buffered(MAX_CONCURRENT_REQUESTS)
        .collect()
        .await;

    let mut predictions = Vec::with_capacity(results.len());
    for (slot_id, result) in results {
        match result {
            Ok(prediction) => predictions.push(prediction),
            Err(e) => warn!("Skipping slot {}: {}", slot_id, e),
        }
    }

    debug!(
        "Fetched {}/{} slot predictions",
        predictions.len(),
        slot_count
    );
    predictions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::SlotStatus;
    use crate::test_support::{ScriptedApi, SlotReply};

    #[tokio::test(start_paused = true)]
    async fn test_failures_are_skipped() {
        let api = ScriptedApi::new()
            .with_slot(1, Some(4), SlotStatus::Occupied)
            .with_reply(
                2,
                SlotReply::Fail {
                    status: 500,
                    message: None,
                },
            )
            .with_slot(3, None, SlotStatus::Free);

        let predictions = fetch_all_slots(&api, 3, Duration::from_secs(10)).await;

        let ids: Vec<u32> = predictions.iter().map(|p| p.slot_id).collect();
        assert_eq!(ids, vec![1, 3]);
        assert_eq!(api.slot_calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_requests_run_concurrently() {
        let mut api = ScriptedApi::new();
        for slot_id in 1..=5 {
            api = api
                .with_slot(slot_id, Some(slot_id), SlotStatus::Occupied)
                .with_delay(slot_id, Duration::from_secs(3));
        }

        let started = tokio::time::Instant::now();
        let predictions = fetch_all_slots(&api, 5, Duration::from_secs(10)).await;

        assert_eq!(predictions.len(), 5);
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_slot_times_out() {
        let api = ScriptedApi::new()
            .with_slot(1, Some(2), SlotStatus::Occupied)
            .with_reply(2, SlotReply::Hang);

        let predictions = fetch_all_slots(&api, 2, Duration::from_secs(10)).await;
        assert_eq!(predictions.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_oversized_lot_is_capped() {
        let api = ScriptedApi::new().with_slot(1, Some(2), SlotStatus::Occupied);

        let predictions = fetch_all_slots(&api, 1_000_000, Duration::from_secs(10)).await;

        assert_eq!(predictions.len(), 1);
        assert_eq!(api.slot_calls(), MAX_FANOUT_SLOTS as usize);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_is_bounded() {
        let total = MAX_CONCURRENT_REQUESTS as u32 * 2;
        let mut api = ScriptedApi::new();
        for slot_id in 1..=total {
            api = api
                .with_slot(slot_id, Some(slot_id), SlotStatus::Occupied)
                .with_delay(slot_id, Duration::from_secs(3));
        }

        let started = tokio::time::Instant::now();
        let predictions = fetch_all_slots(&api, total, Duration::from_secs(10)).await;

        let ids: Vec<u32> = predictions.iter().map(|p| p.slot_id).collect();
        assert_eq!(ids, (1..=total).collect::<Vec<_>>());
        assert!(started.elapsed() >= Duration::from_secs(6));
        assert!(started.elapsed() < Duration::from_secs(7));
    }

    #[tokio::test]
    async fn test_zero_slots_makes_no_requests() {
        let api = ScriptedApi::new();
        assert!(fetch_all_slots(&api, 0, Duration::from_secs(1))
            .await
            .is_empty());
        assert_eq!(api.slot_calls(), 0);
    }
}
