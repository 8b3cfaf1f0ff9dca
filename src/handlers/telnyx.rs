//! Telnyx Call Control webhook.

use axum::{
    Json,
    extract::State,
    http::{HeaderMap, header::HOST},
};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::core::StopReason;
use crate::errors::{AppError, AppResult};
use crate::state::AppState;
use crate::telephony::{TelnyxEventType, TelnyxWebhook};

/// `POST /telnyx/webhook` (also served at `/telnyx-stream`)
///
/// `call.initiated` registers the call; the first registration answers it and
/// starts media streaming through the Call Control API. `call.hangup` stops
/// the session. Anything else is acknowledged.
pub async fn telnyx_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(webhook): Json<TelnyxWebhook>,
) -> AppResult<&'static str> {
    let event = webhook.event_name();
    let Some(call_id) = webhook.call_control_id() else {
        warn!(event, "Telnyx webhook without call_control_id");
        return Err(AppError::BadRequest(
            "Missing call_control_id".to_string(),
        ));
    };

    match webhook.event_type() {
        TelnyxEventType::Initiated => {
            let host = headers.get(HOST).and_then(|v| v.to_str().ok());
            let stream_url = state.stream_url(host).ok_or_else(|| {
                AppError::BadRequest("Cannot determine public host for media stream".to_string())
            })?;
            let control = state.telnyx_control(stream_url).ok_or_else(|| {
                AppError::ServiceUnavailable("Telnyx API key not configured".to_string())
            })?;

            let initiation = state.relay.initiate(call_id, Arc::new(control))?;
            info!(
                call_id = %initiation.call_id,
                created = initiation.created,
                "Telnyx call initiated"
            );
        }
        TelnyxEventType::Hangup => {
            let stopped = state.relay.stop(call_id, StopReason::Hangup).await?;
            info!(
                call_id,
                cause = webhook.hangup_cause().unwrap_or("unknown"),
                stopped,
                "Telnyx call hangup"
            );
        }
        _ => {
            debug!(call_id, event, "Telnyx event acknowledged");
        }
    }

    Ok("ok")
}
