//! Telnyx Call Control client.
//!
//! # API Reference
//!
//! - Answer: `POST {base}/calls/{call_control_id}/actions/answer`
//! - Start streaming: `POST {base}/calls/{call_control_id}/actions/streaming_start`
//! - Auth: `Authorization: Bearer {api_key}`

use async_trait::async_trait;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{debug, info};

use super::control::{CallControl, TelephonyError, TelephonyResult};
use crate::core::CallId;

/// Default Telnyx API base URL
pub const TELNYX_API_BASE: &str = "https://api.telnyx.com/v2";

/// Upper bound for one Call Control request
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Thin client for the Call Control actions the relay uses.
#[derive(Clone)]
pub struct TelnyxClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl std::fmt::Debug for TelnyxClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelnyxClient")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

impl TelnyxClient {
    pub fn new(api_key: impl Into<String>) -> TelephonyResult<Self> {
        Self::with_base_url(api_key, TELNYX_API_BASE)
    }

    pub fn with_base_url(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
    ) -> TelephonyResult<Self> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(TelephonyError::InvalidConfiguration(
                "Telnyx API key is required".to_string(),
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| TelephonyError::InvalidConfiguration(format!("HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Answer an inbound call.
    pub async fn answer(&self, call_id: &CallId) -> TelephonyResult<()> {
        self.action(call_id, "answer", json!({})).await
    }

    /// Start a bidirectional PCMU media stream to `stream_url`.
    pub async fn streaming_start(&self, call_id: &CallId, stream_url: &str) -> TelephonyResult<()> {
        self.action(call_id, "streaming_start", streaming_start_body(stream_url))
            .await
    }

    async fn action(&self, call_id: &CallId, action: &str, body: Value) -> TelephonyResult<()> {
        let url = format!("{}/calls/{}/actions/{}", self.base_url, call_id, action);
        debug!(call_id = %call_id, action, "Telnyx call action");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| TelephonyError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TelephonyError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

fn streaming_start_body(stream_url: &str) -> Value {
    json!({
        "stream_url": stream_url,
        "stream_track": "inbound_track",
        "stream_bidirectional_mode": "rtp",
        "stream_bidirectional_codec": "PCMU",
    })
}

/// [`CallControl`] for calls delivered through Telnyx webhooks.
#[derive(Debug, Clone)]
pub struct TelnyxCallControl {
    client: TelnyxClient,
    stream_url: String,
}

impl TelnyxCallControl {
    pub fn new(client: TelnyxClient, stream_url: impl Into<String>) -> Self {
        Self {
            client,
            stream_url: stream_url.into(),
        }
    }

    pub fn stream_url(&self) -> &str {
        &self.stream_url
    }
}

#[async_trait]
impl CallControl for TelnyxCallControl {
    fn name(&self) -> &'static str {
        "telnyx"
    }

    async fn answer(&self, call_id: &CallId) -> TelephonyResult<()> {
        self.client.answer(call_id).await?;
        info!(call_id = %call_id, "Call answered");
        Ok(())
    }

    async fn start_stream(&self, call_id: &CallId) -> TelephonyResult<()> {
        self.client.streaming_start(call_id, &self.stream_url).await?;
        info!(call_id = %call_id, stream_url = %self.stream_url, "Media streaming requested");
        Ok(())
    }
}
