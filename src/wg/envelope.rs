//! The `{status, error, data}` envelope every API response is wrapped in.
//!
//! The API reports its own failures with HTTP 200, so a 2xx body still has
//! to be opened before it counts as a success.

use serde::Deserialize;

use crate::error::FetchError;
use crate::resilience::{Inspection, PayloadInspector};

/// Error codes that mean "come back later".
const REQUEST_LIMIT_EXCEEDED: &str = "REQUEST_LIMIT_EXCEEDED";
const SOURCE_NOT_AVAILABLE: &str = "SOURCE_NOT_AVAILABLE";

#[derive(Debug, Clone, Deserialize)]
pub struct Envelope {
    pub status: String,
    #[serde(default)]
    pub error: Option<ApiError>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiError {
    pub code: Option<u16>,
    pub message: Option<String>,
    pub field: Option<String>,
    /// The offending input, echoed back as a string, number or list.
    pub value: Option<serde_json::Value>,
}

impl ApiError {
    fn is_transient(&self) -> bool {
        matches!(
            self.message.as_deref(),
            Some(REQUEST_LIMIT_EXCEEDED) | Some(SOURCE_NOT_AVAILABLE)
        ) || matches!(self.code, Some(407) | Some(504))
    }

    fn describe(&self) -> String {
        let mut text = self.message.clone().unwrap_or_else(|| "unknown error".into());
        if let Some(field) = &self.field {
            text.push_str(&format!(" (field {}", field));
            match &self.value {
                Some(serde_json::Value::String(value)) => text.push_str(&format!(" = {}", value)),
                Some(value) => text.push_str(&format!(" = {}", value)),
                None => {}
            }
            text.push(')');
        }
        text
    }
}

/// Opens the envelope of 2xx bodies.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvelopeInspector;

impl PayloadInspector for EnvelopeInspector {
    fn inspect(&self, body: &[u8]) -> Inspection {
        let envelope: Envelope = match serde_json::from_slice(body) {
            Ok(envelope) => envelope,
            Err(e) => return Inspection::Reject(FetchError::MalformedResponse(e.to_string())),
        };

        if envelope.status == "ok" {
            return Inspection::Accept;
        }

        let error = envelope.error.unwrap_or_default();
        if error.is_transient() {
            tracing::debug!(code = ?error.code, message = ?error.message, "API asked to slow down");
            return Inspection::Throttled(format!("API error {}", error.describe()));
        }

        Inspection::Reject(FetchError::Api {
            code: error.code.unwrap_or(0),
            message: error.describe(),
        })
    }
}
