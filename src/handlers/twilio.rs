//! Twilio voice and status webhooks.

use axum::{
    Form,
    extract::State,
    http::{HeaderMap, header::CONTENT_TYPE, header::HOST},
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::{debug, info};

use crate::core::StopReason;
use crate::errors::{AppError, AppResult};
use crate::state::AppState;
use crate::telephony::{NoopCallControl, TwilioStatusRequest, TwilioVoiceRequest, connect_stream};

/// `POST /twilio/voice`
///
/// Registers the call and replies with TwiML connecting it to the media
/// stream. Twilio answers and streams on its own, so the session gets a
/// no-op call control.
pub async fn twilio_voice(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Form(request): Form<TwilioVoiceRequest>,
) -> AppResult<Response> {
    let call_sid = request
        .call_sid
        .as_deref()
        .filter(|sid| !sid.trim().is_empty())
        .ok_or_else(|| AppError::BadRequest("Missing CallSid".to_string()))?;

    let host = headers.get(HOST).and_then(|v| v.to_str().ok());
    let stream_url = state.stream_url(host).ok_or_else(|| {
        AppError::BadRequest("Cannot determine public host for media stream".to_string())
    })?;

    let initiation = state
        .relay
        .initiate(call_sid, Arc::new(NoopCallControl))?;
    info!(
        call_id = %initiation.call_id,
        created = initiation.created,
        from = request.from.as_deref().unwrap_or("unknown"),
        "Twilio call received"
    );

    Ok((
        [(CONTENT_TYPE, "text/xml")],
        connect_stream(&stream_url),
    )
        .into_response())
}

/// `POST /twilio/status`
///
/// Terminal call statuses stop the session.
pub async fn twilio_status(
    State(state): State<Arc<AppState>>,
    Form(request): Form<TwilioStatusRequest>,
) -> AppResult<&'static str> {
    let Some(call_sid) = request.call_sid.as_deref() else {
        return Err(AppError::BadRequest("Missing CallSid".to_string()));
    };
    let status = request.call_status.as_deref().unwrap_or("unknown");

    if request.is_terminal() {
        let stopped = state.relay.stop(call_sid, StopReason::Hangup).await?;
        info!(call_id = call_sid, status, stopped, "Twilio call ended");
    } else {
        debug!(call_id = call_sid, status, "Twilio status acknowledged");
    }

    Ok("ok")
}
