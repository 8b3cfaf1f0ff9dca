//! Call control abstraction.
//!
//! Answering a call and asking the carrier to open its media stream are side
//! effects a session issues exactly once, right after registration. Twilio
//! does both through the TwiML returned by the voice webhook, so its calls use
//! [`NoopCallControl`]; Telnyx calls go through the Call Control REST API.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use crate::core::CallId;

/// Errors raised by telephony integrations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TelephonyError {
    /// HTTP request could not be sent
    #[error("Request failed: {0}")]
    RequestFailed(String),

    /// The carrier API rejected the action
    #[error("Carrier API returned {status}: {body}")]
    Api { status: u16, body: String },

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

/// Result type for telephony operations.
pub type TelephonyResult<T> = Result<T, TelephonyError>;

/// Carrier-side actions on a live call.
#[async_trait]
pub trait CallControl: Send + Sync {
    /// Carrier name for logs.
    fn name(&self) -> &'static str;

    /// Answer the call.
    async fn answer(&self, call_id: &CallId) -> TelephonyResult<()>;

    /// Ask the carrier to open the media stream for the call.
    async fn start_stream(&self, call_id: &CallId) -> TelephonyResult<()>;
}

/// Shared call control handle.
pub type SharedCallControl = Arc<dyn CallControl>;

/// Call control for carriers that answer and stream without API calls.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCallControl;

#[async_trait]
impl CallControl for NoopCallControl {
    fn name(&self) -> &'static str {
        "noop"
    }

    async fn answer(&self, _call_id: &CallId) -> TelephonyResult<()> {
        Ok(())
    }

    async fn start_stream(&self, _call_id: &CallId) -> TelephonyResult<()> {
        Ok(())
    }
}
