//! Carrier webhook routes.

use axum::{Router, routing::post};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::handlers::{telnyx, twilio};
use crate::state::AppState;

/// Create the webhook router
///
/// # Endpoints
///
/// - `POST /telnyx/webhook` - Telnyx Call Control events (JSON)
/// - `POST /telnyx-stream` - alias of `/telnyx/webhook`
/// - `POST /twilio/voice` - Twilio voice webhook (form), returns TwiML
/// - `POST /twilio/status` - Twilio status callback (form)
pub fn create_webhook_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/telnyx/webhook", post(telnyx::telnyx_webhook))
        .route("/telnyx-stream", post(telnyx::telnyx_webhook))
        .route("/twilio/voice", post(twilio::twilio_voice))
        .route("/twilio/status", post(twilio::twilio_status))
        .layer(TraceLayer::new_for_http())
}
