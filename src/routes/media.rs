//! Media stream WebSocket route.

use axum::{Router, routing::get};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::handlers::media_stream_handler;
use crate::state::AppState;
use crate::telephony::MEDIA_STREAM_PATH;

/// Create the media stream router
///
/// # Endpoint
///
/// `GET /media-stream` - WebSocket upgrade for carrier media streams
///
/// Connection limits are applied in `main` with
/// [`connection_limit_middleware`](crate::middleware::connection_limit_middleware).
///
/// # Example
///
/// ```json
/// // Carrier sends
/// {"event": "start", "streamSid": "MZ...", "start": {"callSid": "CA...", "mediaFormat": {"encoding": "audio/x-mulaw", "sampleRate": 8000, "channels": 1}}}
/// {"event": "media", "streamSid": "MZ...", "media": {"track": "inbound", "payload": "/w=="}}
///
/// // Server sends
/// {"event": "media", "streamSid": "MZ...", "media": {"payload": "/w=="}}
/// {"event": "clear", "streamSid": "MZ..."}
/// ```
pub fn create_media_router() -> Router<Arc<AppState>> {
    Router::new()
        .route(MEDIA_STREAM_PATH, get(media_stream_handler))
        .layer(TraceLayer::new_for_http())
}
