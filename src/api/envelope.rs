//! Response decoding and envelope normalization.
//!
//! Endpoints may return their payload directly or nested under a `data` key.
//! Each endpoint is unwrapped exactly once here, right after the transport
//! call, into one canonical shape.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::data::{LotStatus, OverallPrediction, SlotForecast, SlotPrediction, SlotStatus};
use crate::error::{Error, Result};

/// Decode a raw HTTP response into JSON.
///
/// Non-2xx statuses become [`Error::Server`] carrying the body's `message` or
/// `error` field when present. A 2xx body that is not JSON is a
/// [`Error::MalformedResponse`].
pub fn decode_response(status: u16, content_type: Option<&str>, body: &str) -> Result<Value> {
    let success = (200..300).contains(&status);
    let parsed = serde_json::from_str::<Value>(body);

    if !success {
        let message = parsed.ok().as_ref().and_then(body_message);
        return Err(Error::Server { status, message });
    }

    if let Some(content_type) = content_type {
        if !content_type.contains("json") {
            return Err(Error::MalformedResponse {
                context: format!("unexpected content type {content_type}"),
            });
        }
    }

    parsed.map_err(|e| Error::MalformedResponse {
        context: format!("invalid JSON body: {e}"),
    })
}

fn body_message(body: &Value) -> Option<String> {
    ["message", "error"]
        .iter()
        .find_map(|key| body.get(*key).and_then(Value::as_str))
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Take the payload out of a `{ "data": ... }` envelope, or return the body as is.
fn unwrap_data(body: Value) -> Value {
    match body {
        Value::Object(mut map) if map.get("data").is_some_and(Value::is_object) => {
            map.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    }
}

#[derive(Debug, Deserialize)]
struct SlotPredictionWire {
    #[serde(default)]
    predicted_free_in_minutes: Option<f64>,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    slot_id: Option<u32>,
    #[serde(default)]
    current_status: Option<SlotStatus>,
}

/// Normalize a `/predict-availability?slot_id=` response.
///
/// `requested_slot` is used when the backend omits `slot_id`.
pub fn parse_slot_prediction(body: Value, requested_slot: u32) -> Result<SlotPrediction> {
    let payload = unwrap_data(body);

    let has_prediction_fields = payload
        .as_object()
        .map(|m| m.contains_key("predicted_free_in_minutes") || m.contains_key("current_status"))
        .unwrap_or(false);
    if !has_prediction_fields {
        return Err(Error::MalformedResponse {
            context: "slot prediction missing predicted_free_in_minutes and current_status"
                .to_string(),
        });
    }

    let wire: SlotPredictionWire =
        serde_json::from_value(payload).map_err(|e| Error::MalformedResponse {
            context: format!("slot prediction: {e}"),
        })?;

    // Overdue estimates clamp to zero: the slot is expected to be free now.
    let minutes = wire
        .predicted_free_in_minutes
        .filter(|m| m.is_finite())
        .map(|m| m.max(0.0).round() as u32);

    Ok(SlotPrediction::new(
        wire.slot_id.filter(|&id| id >= 1).unwrap_or(requested_slot),
        minutes,
        wire.confidence.unwrap_or(0.0),
        wire.current_status.unwrap_or_default(),
    ))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LotStatusWire {
    #[serde(default)]
    slot_number: Option<u32>,
    total_slots: u32,
    available_slots: u32,
}

/// Normalize a `/free-slot` response.
pub fn parse_lot_status(body: Value) -> Result<LotStatus> {
    let wire: LotStatusWire =
        serde_json::from_value(unwrap_data(body)).map_err(|e| Error::MalformedResponse {
            context: format!("lot status: {e}"),
        })?;
    Ok(LotStatus::new(
        wire.slot_number,
        wire.total_slots,
        wire.available_slots,
    ))
}

#[derive(Debug, Deserialize)]
struct OverallEnvelopeWire {
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    prediction: Option<OverallPredictionWire>,
    #[serde(default)]
    timestamp: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OverallPredictionWire {
    occupancy_percentage: f64,
    total_slots: u32,
    #[serde(default)]
    predicted_available: u32,
    #[serde(default)]
    predicted_occupied: u32,
    #[serde(default)]
    slots: Vec<SlotForecast>,
}

/// Normalize a `/predict-availability` response without `slot_id`.
///
/// Anything but `success: true` with a `prediction` object is
/// [`Error::PredictionUnavailable`].
pub fn parse_overall_prediction(body: Value) -> Result<OverallPrediction> {
    let body = if body.get("prediction").is_some() {
        body
    } else {
        unwrap_data(body)
    };

    let wire: OverallEnvelopeWire =
        serde_json::from_value(body).map_err(|e| Error::MalformedResponse {
            context: format!("overall prediction: {e}"),
        })?;

    if wire.success != Some(true) {
        return Err(Error::PredictionUnavailable);
    }
    let prediction = wire.prediction.ok_or(Error::PredictionUnavailable)?;

    Ok(OverallPrediction {
        occupancy_percentage: prediction.occupancy_percentage,
        total_slots: prediction.total_slots,
        predicted_available: prediction.predicted_available,
        predicted_occupied: prediction.predicted_occupied,
        slots: prediction.slots,
        timestamp: wire.timestamp.as_deref().and_then(parse_timestamp),
    })
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    // Backends often emit naive ISO timestamps; those are UTC.
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_decode_server_error_message() {
        let err = decode_response(404, Some("application/json"), r#"{"message":"Slot not found"}"#)
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Server { status: 404, message: Some(ref m) } if m == "Slot not found"
        ));

        let err = decode_response(500, None, r#"{"error":"boom"}"#).unwrap_err();
        assert!(matches!(err, Error::Server { message: Some(ref m), .. } if m == "boom"));

        let err = decode_response(502, Some("text/html"), "<html>bad gateway</html>").unwrap_err();
        assert!(matches!(err, Error::Server { status: 502, message: None }));
    }

    #[test]
    fn test_decode_malformed_success() {
        let err = decode_response(200, Some("application/json"), "not json").unwrap_err();
        assert!(matches!(err, Error::MalformedResponse { .. }));

        let err = decode_response(200, Some("text/plain"), "{}").unwrap_err();
        assert!(matches!(err, Error::MalformedResponse { .. }));

        let value = decode_response(200, None, r#"{"ok":true}"#).unwrap();
        assert_eq!(value["ok"], true);
    }

    #[test]
    fn test_slot_prediction_direct_and_nested() {
        let direct = json!({
            "predicted_free_in_minutes": 12,
            "confidence": 0.8,
            "slot_id": 4,
            "current_status": "occupied"
        });
        let nested = json!({ "success": true, "data": direct.clone() });

        let a = parse_slot_prediction(direct, 4).unwrap();
        let b = parse_slot_prediction(nested, 4).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.predicted_free_in_minutes, Some(12));
        assert_eq!(a.current_status, SlotStatus::Occupied);
    }

    #[test]
    fn test_slot_prediction_defaults() {
        let body = json!({ "predicted_free_in_minutes": null, "current_status": "occupied" });
        let p = parse_slot_prediction(body, 7).unwrap();
        assert_eq!(p.slot_id, 7);
        assert_eq!(p.predicted_free_in_minutes, None);
        assert_eq!(p.confidence, 0.0);

        let body = json!({ "predicted_free_in_minutes": 4.6 });
        let p = parse_slot_prediction(body, 2).unwrap();
        assert_eq!(p.predicted_free_in_minutes, Some(5));
        assert_eq!(p.current_status, SlotStatus::Free);

    }

    #[test]
    fn test_overdue_minutes_clamp_to_zero() {
        let body = json!({ "predicted_free_in_minutes": -3, "current_status": "occupied" });
        let p = parse_slot_prediction(body, 2).unwrap();
        assert_eq!(p.predicted_free_in_minutes, Some(0));
        assert_eq!(p.frees_up_in(), None);
        assert!(!p.occupied_at(0));

        let body = json!({ "predicted_free_in_minutes": -0.4 });
        let p = parse_slot_prediction(body, 2).unwrap();
        assert_eq!(p.predicted_free_in_minutes, Some(0));
    }

    #[test]
    fn test_slot_prediction_malformed() {
        assert!(matches!(
            parse_slot_prediction(json!({ "unrelated": 1 }), 1),
            Err(Error::MalformedResponse { .. })
        ));
        assert!(matches!(
            parse_slot_prediction(json!("text"), 1),
            Err(Error::MalformedResponse { .. })
        ));
        assert!(matches!(
            parse_slot_prediction(json!({ "current_status": "reserved" }), 1),
            Err(Error::MalformedResponse { .. })
        ));
    }

    #[test]
    fn test_lot_status() {
        let body = json!({ "data": { "slotNumber": 3, "totalSlots": 10, "availableSlots": 4 } });
        assert_eq!(
            parse_lot_status(body).unwrap(),
            LotStatus::new(Some(3), 10, 4)
        );

        let body = json!({ "slotNumber": null, "totalSlots": 10, "availableSlots": 0 });
        assert_eq!(parse_lot_status(body).unwrap(), LotStatus::new(None, 10, 0));

        assert!(matches!(
            parse_lot_status(json!({ "totalSlots": 10 })),
            Err(Error::MalformedResponse { .. })
        ));
    }

    #[test]
    fn test_overall_prediction() {
        let body = json!({
            "success": true,
            "prediction": {
                "occupancy_percentage": 75.0,
                "total_slots": 10,
                "predicted_available": 3,
                "predicted_occupied": 7,
                "slots": [
                    {
                        "slot_id": 1,
                        "availability_probability": 0.2,
                        "predicted_status": "occupied",
                        "current_status": "occupied"
                    }
                ]
            },
            "timestamp": "2026-10-16T08:30:00"
        });

        let overall = parse_overall_prediction(body).unwrap();
        assert_eq!(overall.total_slots, 10);
        assert_eq!(overall.expected_occupancy_pct(), 75);
        assert_eq!(overall.slots.len(), 1);
        assert!(overall.timestamp.is_some());
    }

    #[test]
    fn test_overall_prediction_unsuccessful() {
        let body = json!({ "success": false, "prediction": null });
        assert!(matches!(
            parse_overall_prediction(body),
            Err(Error::PredictionUnavailable)
        ));

        let body = json!({ "prediction": { "occupancy_percentage": 10.0, "total_slots": 2 } });
        assert!(matches!(
            parse_overall_prediction(body),
            Err(Error::PredictionUnavailable)
        ));
    }

    #[test]
    fn test_overall_prediction_nested_under_data() {
        let body = json!({
            "data": {
                "success": true,
                "prediction": { "occupancy_percentage": 40.0, "total_slots": 5 }
            }
        });
        let overall = parse_overall_prediction(body).unwrap();
        assert_eq!(overall.total_slots, 5);
        assert!(overall.slots.is_empty());
    }
}
