//! Error types for the parking-prediction-sync crate.

use thiserror::Error;

/// Message shown when the backend could not be reached or did not answer in time.
pub const NO_RESPONSE_MESSAGE: &str =
    "No response from server. Please check if the backend is running.";

/// Message shown for a slot id that fails local validation.
pub const INVALID_SLOT_MESSAGE: &str = "Invalid slot ID";

/// The main error type for this crate.
#[derive(Error, Debug)]
pub enum Error {
    /// A slot id below 1 was supplied. Never reaches the network.
    #[error("Invalid slot id: {slot_id}")]
    InvalidSlotId {
        /// The rejected slot id.
        slot_id: u32,
    },

    /// An invalid parameter was provided.
    #[error("Invalid parameter: {name} = {value}")]
    InvalidParameter {
        /// The name of the parameter.
        name: String,
        /// The invalid value that was provided.
        value: String,
    },

    /// No response arrived, either because the connection failed or the
    /// request timed out.
    #[error("No response from server: {reason}")]
    NoResponse {
        /// Description of the transport failure.
        reason: String,
    },

    /// The server answered with a non-2xx status.
    #[error("Server error {status}: {}", message.as_deref().unwrap_or("no message"))]
    Server {
        /// HTTP status code.
        status: u16,
        /// The `message` or `error` field of the JSON body, if present.
        message: Option<String>,
    },

    /// The response body was not JSON or lacked the expected fields.
    #[error("Malformed response: {context}")]
    MalformedResponse {
        /// Description of what was wrong with the body.
        context: String,
    },

    /// The overall prediction endpoint answered with `success: false`.
    #[error("Prediction API returned unsuccessful response")]
    PredictionUnavailable,

    /// The request could not be built or sent for a reason other than
    /// connectivity.
    #[error("Request error: {reason}")]
    Request {
        /// Description of the failure.
        reason: String,
    },

    /// Reading or writing persisted settings failed.
    #[error("Storage error: {0}")]
    Storage(#[from] std::io::Error),

    /// JSON encoding or decoding failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Check if this error means the backend never answered.
    pub fn is_no_response(&self) -> bool {
        matches!(self, Self::NoResponse { .. })
    }

    /// Get the text shown to a user for this error.
    ///
    /// `fallback` is the per-operation generic message used when the error
    /// carries nothing more specific (server errors without a body message and
    /// malformed responses).
    pub fn user_message(&self, fallback: &str) -> String {
        match self {
            Self::InvalidSlotId { .. } => INVALID_SLOT_MESSAGE.to_string(),
            Self::NoResponse { .. } => NO_RESPONSE_MESSAGE.to_string(),
            Self::Server {
                message: Some(message),
                ..
            } => message.clone(),
            Self::Request { reason } => format!("Request error: {reason}"),
            _ => fallback.to_string(),
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            Self::NoResponse {
                reason: err.to_string(),
            }
        } else if err.is_decode() {
            Self::MalformedResponse {
                context: err.to_string(),
            }
        } else if err.is_builder() {
            Self::Request {
                reason: err.to_string(),
            }
        } else {
            // Anything else failed while the request was on the wire.
            Self::NoResponse {
                reason: err.to_string(),
            }
        }
    }
}

/// A specialized Result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;
