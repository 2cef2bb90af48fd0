//! Scripted backend used by the timing-sensitive tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::api::ParkingApi;
use crate::data::{LotStatus, OverallPrediction, SlotPrediction, SlotStatus};
use crate::error::{Error, Result};

/// How a scripted slot answers.
#[derive(Debug, Clone)]
pub(crate) enum SlotReply {
    Ok(SlotPrediction),
    Fail { status: u16, message: Option<String> },
    Hang,
}

#[derive(Default)]
pub(crate) struct ScriptedApi {
    lot: Mutex<Option<LotStatus>>,
    overall: Mutex<Option<OverallPrediction>>,
    slots: Mutex<HashMap<u32, SlotReply>>,
    delays: Mutex<HashMap<u32, Duration>>,
    sequence: Mutex<VecDeque<(Duration, SlotPrediction)>>,
    slot_calls: AtomicUsize,
    lot_calls: AtomicUsize,
}

impl ScriptedApi {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_lot(self, total: u32, available: u32) -> Self {
        *self.lot.lock() = Some(LotStatus::new(None, total, available));
        self
    }

    pub(crate) fn with_overall(self, occupancy_percentage: f64, total_slots: u32) -> Self {
        *self.overall.lock() = Some(OverallPrediction {
            occupancy_percentage,
            total_slots,
            ..Default::default()
        });
        self
    }

    pub(crate) fn with_slot(self, slot_id: u32, minutes: Option<u32>, status: SlotStatus) -> Self {
        self.set_slot(slot_id, SlotReply::Ok(prediction(slot_id, minutes, status)));
        self
    }

    pub(crate) fn with_reply(self, slot_id: u32, reply: SlotReply) -> Self {
        self.set_slot(slot_id, reply);
        self
    }

    pub(crate) fn with_delay(self, slot_id: u32, delay: Duration) -> Self {
        self.delays.lock().insert(slot_id, delay);
        self
    }

    /// Queue replies consumed in call order, ahead of the per-slot script.
    pub(crate) fn with_sequence(self, replies: Vec<(Duration, SlotPrediction)>) -> Self {
        self.sequence.lock().extend(replies);
        self
    }

    pub(crate) fn clear_lot(&self) {
        *self.lot.lock() = None;
    }

    pub(crate) fn set_slot(&self, slot_id: u32, reply: SlotReply) {
        self.slots.lock().insert(slot_id, reply);
    }

    pub(crate) fn slot_calls(&self) -> usize {
        self.slot_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn lot_calls(&self) -> usize {
        self.lot_calls.load(Ordering::SeqCst)
    }
}

pub(crate) fn prediction(slot_id: u32, minutes: Option<u32>, status: SlotStatus) -> SlotPrediction {
    SlotPrediction::new(slot_id, minutes, 0.8, status)
}

#[async_trait]
impl ParkingApi for ScriptedApi {
    async fn lot_status(&self) -> Result<LotStatus> {
        self.lot_calls.fetch_add(1, Ordering::SeqCst);
        let lot = *self.lot.lock();
        lot.ok_or(Error::Server {
            status: 500,
            message: Some("lot status unavailable".to_string()),
        })
    }

    async fn slot_prediction(&self, slot_id: u32) -> Result<SlotPrediction> {
        self.slot_calls.fetch_add(1, Ordering::SeqCst);

        let queued = self.sequence.lock().pop_front();
        if let Some((delay, reply)) = queued {
            tokio::time::sleep(delay).await;
            return Ok(reply);
        }

        let delay = self.delays.lock().get(&slot_id).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let reply = self.slots.lock().get(&slot_id).cloned();
        match reply {
            Some(SlotReply::Ok(p)) => Ok(p),
            Some(SlotReply::Fail { status, message }) => Err(Error::Server { status, message }),
            Some(SlotReply::Hang) => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(Error::NoResponse {
                    reason: "hung".to_string(),
                })
            }
            None => Err(Error::Server {
                status: 404,
                message: None,
            }),
        }
    }

    async fn overall_prediction(&self) -> Result<OverallPrediction> {
        let overall = self.overall.lock().clone();
        overall.ok_or(Error::PredictionUnavailable)
    }
}
