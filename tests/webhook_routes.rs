//! Webhook and health route tests
//!
//! Exercise the HTTP surface through `tower::ServiceExt::oneshot` with a
//! scripted session factory, and the Telnyx Call Control API through a
//! wiremock server.

mod mock_providers;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::util::ServiceExt;
use wiremock::matchers::{body_partial_json, header as header_is, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use call_relay::{ServerConfig, routes, state::AppState};

use mock_providers::{MockFactory, UpstreamRemote, wait_for};

fn test_config() -> ServerConfig {
    let mut config = ServerConfig::default();
    config.openai_api_key = Some("sk-test".to_string());
    config.public_host = Some("relay.example.com".to_string());
    config
}

fn state_with(config: ServerConfig) -> Arc<AppState> {
    AppState::with_factory(config, Arc::new(MockFactory::new(UpstreamRemote::manual))).unwrap()
}

fn app(state: Arc<AppState>) -> Router {
    routes::api::create_api_router()
        .merge(routes::webhooks::create_webhook_router())
        .with_state(state)
}

fn telnyx_event(event_type: &str, call_control_id: &str) -> Value {
    json!({
        "data": {
            "event_type": event_type,
            "id": "evt-1",
            "payload": {
                "call_control_id": call_control_id,
                "connection_id": "conn-1",
                "from": "+15550001111",
                "to": "+15550002222"
            }
        }
    })
}

fn json_post(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn form_post(uri: &str, body: &str, host: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
    if let Some(host) = host {
        builder = builder.header(header::HOST, host);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

// =============================================================================
// Health
// =============================================================================

#[tokio::test]
async fn test_health_check() {
    let state = state_with(test_config());
    let response = app(state)
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json: Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(json["status"], "OK");
    assert_eq!(json["active_calls"], 0);
    assert_eq!(json["media_connections"], 0);
}

// =============================================================================
// Telnyx
// =============================================================================

#[tokio::test]
async fn test_telnyx_initiated_answers_and_starts_stream() {
    let telnyx = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/calls/abc-123/actions/answer"))
        .and(header_is("authorization", "Bearer KEY-test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {}})))
        .expect(1)
        .mount(&telnyx)
        .await;
    Mock::given(method("POST"))
        .and(path("/calls/abc-123/actions/streaming_start"))
        .and(body_partial_json(json!({
            "stream_url": "wss://relay.example.com/media-stream",
            "stream_track": "inbound_track",
            "stream_bidirectional_mode": "rtp",
            "stream_bidirectional_codec": "PCMU"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {}})))
        .expect(1)
        .mount(&telnyx)
        .await;

    let mut config = test_config();
    config.telnyx_api_key = Some("KEY-test".to_string());
    config.telnyx_api_url = telnyx.uri();
    let state = state_with(config);

    // Duplicate delivery with and without the version prefix
    for id in ["v3:abc-123", "abc-123"] {
        let response = app(state.clone())
            .oneshot(json_post(
                "/telnyx/webhook",
                &telnyx_event("call.initiated", id),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "ok");
    }

    assert_eq!(state.relay.active_calls(), 1);
    let mut requests = Vec::new();
    for _ in 0..500 {
        requests = telnyx.received_requests().await.unwrap_or_default();
        if requests.len() >= 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(requests.len(), 2, "Telnyx actions were never called");
    assert!(requests[0].url.path().ends_with("/answer"));
    assert!(requests[1].url.path().ends_with("/streaming_start"));
}

#[tokio::test]
async fn test_telnyx_stream_alias_route() {
    let state = state_with(test_config());
    let response = app(state)
        .oneshot(json_post(
            "/telnyx-stream",
            &telnyx_event("call.answered", "abc-123"),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_telnyx_initiated_without_api_key_is_unavailable() {
    let state = state_with(test_config());
    let response = app(state.clone())
        .oneshot(json_post(
            "/telnyx/webhook",
            &telnyx_event("call.initiated", "abc-123"),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(state.relay.active_calls(), 0);
}

#[tokio::test]
async fn test_telnyx_missing_call_control_id() {
    let state = state_with(test_config());
    let response = app(state)
        .oneshot(json_post(
            "/telnyx/webhook",
            &json!({"data": {"event_type": "call.initiated", "payload": {}}}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json: Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert!(json["error"].as_str().unwrap().contains("call_control_id"));
}

#[tokio::test]
async fn test_telnyx_hangup_stops_session() {
    let state = state_with(test_config());
    let initiation = state
        .relay
        .initiate("abc-123", Arc::new(call_relay::telephony::NoopCallControl))
        .unwrap();

    let response = app(state.clone())
        .oneshot(json_post(
            "/telnyx/webhook",
            &telnyx_event("call.hangup", "v3:abc-123"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    tokio::time::timeout(mock_providers::WAIT, initiation.handle.closed())
        .await
        .unwrap();
    assert!(
        wait_for(|| (state.relay.active_calls() == 0).then_some(()))
            .await
            .is_some()
    );
}

#[tokio::test]
async fn test_telnyx_hangup_for_unknown_call_is_ok() {
    let state = state_with(test_config());
    let response = app(state)
        .oneshot(json_post(
            "/telnyx/webhook",
            &telnyx_event("call.hangup", "never-seen"),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

// =============================================================================
// Twilio
// =============================================================================

#[tokio::test]
async fn test_twilio_voice_returns_twiml() {
    let state = state_with(test_config());
    let response = app(state.clone())
        .oneshot(form_post(
            "/twilio/voice",
            "CallSid=CA123&From=%2B15550001111&To=%2B15550002222",
            None,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE].to_str().unwrap(),
        "text/xml"
    );
    let body = body_string(response).await;
    assert!(body.starts_with("<?xml"));
    assert!(body.contains(r#"<Stream url="wss://relay.example.com/media-stream""#));
    assert!(state.relay.get("CA123").is_some());
}

#[tokio::test]
async fn test_twilio_voice_uses_host_header_without_public_host() {
    let mut config = test_config();
    config.public_host = None;
    let state = state_with(config);

    let response = app(state)
        .oneshot(form_post(
            "/twilio/voice",
            "CallSid=CA456",
            Some("abc.ngrok.io"),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        body_string(response)
            .await
            .contains("wss://abc.ngrok.io/media-stream")
    );
}

#[tokio::test]
async fn test_twilio_voice_without_host_is_rejected() {
    let mut config = test_config();
    config.public_host = None;
    let state = state_with(config);

    let response = app(state.clone())
        .oneshot(form_post("/twilio/voice", "CallSid=CA789", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(state.relay.active_calls(), 0);
}

#[tokio::test]
async fn test_twilio_voice_without_call_sid() {
    let state = state_with(test_config());
    let response = app(state)
        .oneshot(form_post("/twilio/voice", "From=%2B15550001111", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_twilio_status_completed_stops_session() {
    let state = state_with(test_config());
    app(state.clone())
        .oneshot(form_post("/twilio/voice", "CallSid=CA999", None))
        .await
        .unwrap();
    let handle = state.relay.get("CA999").unwrap();

    let response = app(state.clone())
        .oneshot(form_post(
            "/twilio/status",
            "CallSid=CA999&CallStatus=ringing",
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(!handle.is_closed());

    let response = app(state.clone())
        .oneshot(form_post(
            "/twilio/status",
            "CallSid=CA999&CallStatus=completed",
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    tokio::time::timeout(mock_providers::WAIT, handle.closed())
        .await
        .unwrap();
}
