//! Carrier webhook payloads.

use serde::Deserialize;

// =============================================================================
// Telnyx
// =============================================================================

/// Telnyx Call Control webhook body.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TelnyxWebhook {
    #[serde(default)]
    pub data: Option<TelnyxEventData>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TelnyxEventData {
    #[serde(default)]
    pub event_type: Option<String>,
    #[serde(default)]
    pub call_control_id: Option<String>,
    #[serde(default)]
    pub payload: Option<TelnyxEventPayload>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TelnyxEventPayload {
    #[serde(default)]
    pub call_control_id: Option<String>,
    #[serde(default)]
    pub hangup_cause: Option<String>,
}

impl TelnyxWebhook {
    pub fn event_type(&self) -> TelnyxEventType {
        self.data
            .as_ref()
            .and_then(|d| d.event_type.as_deref())
            .map(TelnyxEventType::parse)
            .unwrap_or(TelnyxEventType::Other)
    }

    /// Raw event name, `UNKNOWN` when absent.
    pub fn event_name(&self) -> &str {
        self.data
            .as_ref()
            .and_then(|d| d.event_type.as_deref())
            .unwrap_or("UNKNOWN")
    }

    /// Call control id from `data`, falling back to `data.payload`.
    pub fn call_control_id(&self) -> Option<&str> {
        let data = self.data.as_ref()?;
        data.call_control_id
            .as_deref()
            .filter(|id| !id.trim().is_empty())
            .or_else(|| {
                data.payload
                    .as_ref()
                    .and_then(|p| p.call_control_id.as_deref())
                    .filter(|id| !id.trim().is_empty())
            })
    }

    pub fn hangup_cause(&self) -> Option<&str> {
        self.data
            .as_ref()?
            .payload
            .as_ref()?
            .hangup_cause
            .as_deref()
    }
}

/// Telnyx call events the relay acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TelnyxEventType {
    /// `call.initiated`
    Initiated,
    /// `call.answered`
    Answered,
    /// `call.hangup`
    Hangup,
    /// `streaming.started`
    StreamingStarted,
    /// `streaming.stopped`
    StreamingStopped,
    /// Anything else; acknowledged and ignored
    Other,
}

impl TelnyxEventType {
    pub fn parse(s: &str) -> Self {
        match s {
            "call.initiated" => Self::Initiated,
            "call.answered" => Self::Answered,
            "call.hangup" => Self::Hangup,
            "streaming.started" => Self::StreamingStarted,
            "streaming.stopped" => Self::StreamingStopped,
            _ => Self::Other,
        }
    }
}

// =============================================================================
// Twilio
// =============================================================================

/// Form fields of Twilio's voice webhook.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TwilioVoiceRequest {
    #[serde(rename = "CallSid", default)]
    pub call_sid: Option<String>,
    #[serde(rename = "From", default)]
    pub from: Option<String>,
    #[serde(rename = "To", default)]
    pub to: Option<String>,
}

/// Form fields of Twilio's status callback.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TwilioStatusRequest {
    #[serde(rename = "CallSid", default)]
    pub call_sid: Option<String>,
    #[serde(rename = "CallStatus", default)]
    pub call_status: Option<String>,
}

impl TwilioStatusRequest {
    /// The call has ended and its session should stop.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.call_status.as_deref(),
            Some("completed" | "busy" | "failed" | "no-answer" | "canceled")
        )
    }
}
