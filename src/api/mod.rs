//! Backend API access.
//!
//! [`ParkingApi`] is the seam between the polling layer and the transport.
//! [`HttpClient`] talks to the real backend; tests substitute mocks.

pub mod client;
pub mod envelope;

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;

use crate::data::{LotStatus, OverallPrediction, SlotPrediction};
use crate::error::{Error, Result};

pub use client::HttpClient;

/// Operations the polling layer needs from the backend.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ParkingApi: Send + Sync {
    /// Get lot status (`GET /free-slot`).
    async fn lot_status(&self) -> Result<LotStatus>;

    /// Get the prediction for one slot (`GET /predict-availability?slot_id=`).
    async fn slot_prediction(&self, slot_id: u32) -> Result<SlotPrediction>;

    /// Get the lot-wide 30-minute forecast (`GET /predict-availability`).
    async fn overall_prediction(&self) -> Result<OverallPrediction>;
}

/// Bound a backend call by `limit`; exceeding it is a [`Error::NoResponse`].
pub async fn with_timeout<T, F>(limit: Duration, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(Error::NoResponse {
            reason: format!("timed out after {} ms", limit.as_millis()),
        }),
    }
}
