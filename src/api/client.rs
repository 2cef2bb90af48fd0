//! HTTP transport for the parking backend.

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde_json::Value;
use tracing::{debug, trace};

use super::envelope::{
    decode_response, parse_lot_status, parse_overall_prediction, parse_slot_prediction,
};
use super::ParkingApi;
use crate::config::ClientConfig;
use crate::data::{LotStatus, OverallPrediction, SlotPrediction};
use crate::error::{Error, Result};

/// Path of the lot status endpoint.
pub const FREE_SLOT_PATH: &str = "free-slot";

/// Path of the prediction endpoint (per-slot with `slot_id`, overall without).
pub const PREDICT_AVAILABILITY_PATH: &str = "predict-availability";

/// `reqwest`-backed implementation of [`ParkingApi`].
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    config: ClientConfig,
}

impl HttpClient {
    /// Create a new client.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self { client, config })
    }

    /// Get the configuration this client was built with.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    async fn get_json(&self, path: &str, query: &[(&str, String)]) -> Result<Value> {
        let url = self.config.endpoint(path);
        trace!("GET {} {:?}", url, query);

        let response = self
            .client
            .get(&url)
            .query(query)
            .header(ACCEPT, "application/json")
            .send()
            .await?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.text().await?;

        debug!("GET {} -> {} ({} bytes)", url, status, body.len());
        decode_response(status, content_type.as_deref(), &body)
    }
}

#[async_trait]
impl ParkingApi for HttpClient {
    async fn lot_status(&self) -> Result<LotStatus> {
        let body = self.get_json(FREE_SLOT_PATH, &[]).await?;
        parse_lot_status(body)
    }

    async fn slot_prediction(&self, slot_id: u32) -> Result<SlotPrediction> {
        if slot_id < 1 {
            return Err(Error::InvalidSlotId { slot_id });
        }
        let body = self
            .get_json(PREDICT_AVAILABILITY_PATH, &[("slot_id", slot_id.to_string())])
            .await?;
        parse_slot_prediction(body, slot_id)
    }

    async fn overall_prediction(&self) -> Result<OverallPrediction> {
        let body = self.get_json(PREDICT_AVAILABILITY_PATH, &[]).await?;
        parse_overall_prediction(body)
    }
}
