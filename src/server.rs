//! Webhook endpoint that accepts incoming SIP calls and starts their sessions.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use serde::Deserialize;
use serde_json::Value;

use crate::Result;
use crate::bridge::{CallBridge, CallContext};
use crate::phone::{self, CallerSources, SipHeader};
use crate::protocol::models::SessionConfig;
use crate::transport::rest::CallsClient;

pub const CALL_INCOMING: &str = "realtime.call.incoming";

/// Accepts a ringing call so its realtime session can be joined.
#[async_trait]
pub trait CallAcceptor: Send + Sync {
    async fn accept(&self, call_id: &str, session: &SessionConfig) -> Result<()>;
}

#[async_trait]
impl CallAcceptor for CallsClient {
    async fn accept(&self, call_id: &str, session: &SessionConfig) -> Result<()> {
        self.sip_accept(call_id, session).await
    }
}

pub struct AppState {
    pub acceptor: Arc<dyn CallAcceptor>,
    pub bridge: CallBridge,
    /// Posted with every accept; carries the assembled instructions.
    pub accept_session: SessionConfig,
    pub greeting: String,
    pub default_phone_number: Option<String>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(health).post(webhook))
        .with_state(state)
}

pub async fn health() -> &'static str {
    "ok"
}

#[derive(Debug, Deserialize)]
struct WebhookEvent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Value,
}

#[derive(Debug, Deserialize)]
struct IncomingCall {
    call_id: String,
    #[serde(default)]
    sip_headers: Vec<SipHeader>,
}

pub async fn webhook(
    State(state): State<Arc<AppState>>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let raw: Value = match serde_json::from_slice(&body) {
        Ok(raw) => raw,
        Err(err) => {
            tracing::warn!("Unparseable webhook body: {err}");
            return (StatusCode::BAD_REQUEST, "invalid body").into_response();
        }
    };
    let event = match WebhookEvent::deserialize(&raw) {
        Ok(event) => event,
        Err(err) => {
            tracing::warn!("Unexpected webhook shape: {err}");
            return (StatusCode::BAD_REQUEST, "invalid event").into_response();
        }
    };
    tracing::info!(event_type = %event.kind, "Webhook received");

    if event.kind != CALL_INCOMING {
        return StatusCode::OK.into_response();
    }
    let call = match IncomingCall::deserialize(&event.data) {
        Ok(call) => call,
        Err(err) => {
            tracing::warn!("Incoming call event without usable data: {err}");
            return (StatusCode::BAD_REQUEST, "missing call data").into_response();
        }
    };

    let caller = phone::resolve(&CallerSources {
        headers: Some(&headers),
        query: Some(&query),
        body: Some(&raw),
        sip_headers: &call.sip_headers,
        fallback: state.default_phone_number.as_deref(),
    });
    let twilio_sid = phone::twilio_call_sid(&call.sip_headers);
    tracing::info!(call_id = %call.call_id, ?caller, ?twilio_sid, "Incoming call");

    if let Err(err) = state.acceptor.accept(&call.call_id, &state.accept_session).await {
        tracing::error!(call_id = %call.call_id, "Accept failed: {err}");
        return (StatusCode::BAD_GATEWAY, "accept failed").into_response();
    }

    state
        .bridge
        .start(CallContext::new(call.call_id, caller, state.greeting.clone()));
    StatusCode::OK.into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use crate::bridge::{BoxFuture, Connector, Transport};
    use crate::prompt::accept_config;
    use axum::http::HeaderValue;
    use serde_json::json;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::mpsc;

    #[derive(Default)]
    struct RecordingAcceptor {
        fail: bool,
        accepted: Mutex<Vec<(String, SessionConfig)>>,
    }

    #[async_trait]
    impl CallAcceptor for RecordingAcceptor {
        async fn accept(&self, call_id: &str, session: &SessionConfig) -> Result<()> {
            if self.fail {
                return Err(Error::ConnectionClosed);
            }
            self.accepted
                .lock()
                .unwrap()
                .push((call_id.to_string(), session.clone()));
            Ok(())
        }
    }

    /// Reports each connect attempt, then refuses it so the session ends.
    struct ReportingConnector {
        attempts: mpsc::UnboundedSender<String>,
    }

    impl Connector for ReportingConnector {
        fn connect<'a>(&'a self, call_id: &'a str) -> BoxFuture<'a, Result<Box<dyn Transport>>> {
            let _ = self.attempts.send(call_id.to_string());
            Box::pin(async { Err(Error::ConnectionClosed) })
        }
    }

    fn state(acceptor: Arc<RecordingAcceptor>) -> (Arc<AppState>, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let bridge = CallBridge::builder()
            .connector(Arc::new(ReportingConnector { attempts: tx }))
            .build()
            .unwrap();
        let state = AppState {
            acceptor,
            bridge,
            accept_session: accept_config("gpt-realtime", "be helpful"),
            greeting: "hello".to_string(),
            default_phone_number: Some("0120000000".to_string()),
        };
        (Arc::new(state), rx)
    }

    async fn post(state: Arc<AppState>, headers: HeaderMap, body: Value) -> Response {
        webhook(
            State(state),
            Query(HashMap::new()),
            headers,
            Bytes::from(body.to_string()),
        )
        .await
    }

    #[tokio::test]
    async fn health_says_ok() {
        assert_eq!(health().await, "ok");
    }

    #[tokio::test]
    async fn incoming_call_is_accepted_then_started() {
        let acceptor = Arc::new(RecordingAcceptor::default());
        let (state, mut attempts) = state(Arc::clone(&acceptor));
        let mut headers = HeaderMap::new();
        headers.insert("x-phone-number", HeaderValue::from_static("+81 90 1111 2222"));

        let response = post(
            state,
            headers,
            json!({"type": "realtime.call.incoming", "data": {"call_id": "rtc_1", "sip_headers": [
                {"name": "From", "value": "<sip:+815011112222@pstn>"}
            ]}}),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let accepted = acceptor.accepted.lock().unwrap().clone();
        assert_eq!(accepted.len(), 1);
        assert_eq!(accepted[0].0, "rtc_1");
        assert_eq!(accepted[0].1.instructions.as_deref(), Some("be helpful"));

        let started = tokio::time::timeout(Duration::from_secs(2), attempts.recv())
            .await
            .unwrap();
        assert_eq!(started.as_deref(), Some("rtc_1"));
    }

    #[tokio::test]
    async fn accept_failure_is_bad_gateway_and_starts_nothing() {
        let acceptor = Arc::new(RecordingAcceptor {
            fail: true,
            ..RecordingAcceptor::default()
        });
        let (state, mut attempts) = state(acceptor);
        let response = post(
            state,
            HeaderMap::new(),
            json!({"type": "realtime.call.incoming", "data": {"call_id": "rtc_2"}}),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert!(attempts.try_recv().is_err());
    }

    #[tokio::test]
    async fn other_events_are_acknowledged_whatever_their_data() {
        let acceptor = Arc::new(RecordingAcceptor::default());
        let (state, _attempts) = state(Arc::clone(&acceptor));
        for body in [
            json!({"type": "realtime.call.ended", "data": {"call_id": "rtc_3"}}),
            json!({"type": "realtime.call.ended", "data": {"sip_call_id": "x"}}),
            json!({"type": "some.other", "data": "string"}),
            json!({"type": "some.other"}),
        ] {
            let response = post(Arc::clone(&state), HeaderMap::new(), body.clone()).await;
            assert_eq!(response.status(), StatusCode::OK, "{body}");
        }
        assert!(acceptor.accepted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn sip_header_without_value_does_not_drop_the_call() {
        let acceptor = Arc::new(RecordingAcceptor::default());
        let (state, mut attempts) = state(Arc::clone(&acceptor));
        let response = post(
            state,
            HeaderMap::new(),
            json!({"type": "realtime.call.incoming", "data": {"call_id": "rtc_4", "sip_headers": [
                {"name": "Diversion"},
                {"name": "From", "value": "<sip:+819012345678@pstn>"}
            ]}}),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(acceptor.accepted.lock().unwrap().len(), 1);
        let started = tokio::time::timeout(Duration::from_secs(2), attempts.recv())
            .await
            .unwrap();
        assert_eq!(started.as_deref(), Some("rtc_4"));
    }

    #[tokio::test]
    async fn garbage_is_bad_request() {
        let (state, _attempts) = state(Arc::new(RecordingAcceptor::default()));
        let response = webhook(
            State(Arc::clone(&state)),
            Query(HashMap::new()),
            HeaderMap::new(),
            Bytes::from_static(b"not json"),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = post(state, HeaderMap::new(), json!({"type": "realtime.call.incoming"})).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
