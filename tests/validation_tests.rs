use oai_rt_phone::Error;
use oai_rt_phone::protocol::client_events::ClientEvent;
use oai_rt_phone::protocol::models::{SessionUpdate, Tool};
use oai_rt_phone::transport::rest::CallsClient;
use oai_rt_phone::{SessionConfig, SessionKind};
use serde_json::json;

fn function(name: &str) -> Tool {
    Tool::Function {
        name: name.to_string(),
        description: None,
        parameters: json!({"type": "object"}),
    }
}

fn with_tools(tools: Vec<Tool>) -> ClientEvent {
    ClientEvent::session_update(SessionUpdate {
        tools: Some(tools),
        ..SessionUpdate::default()
    })
}

#[test]
fn test_distinct_tool_names_pass() {
    assert!(with_tools(vec![function("get_task"), function("list_tasks")])
        .validate()
        .is_ok());
}

#[test]
fn test_duplicate_tool_names_fail() {
    let err = with_tools(vec![function("get_task"), function("get_task")])
        .validate()
        .unwrap_err();
    assert!(matches!(err, Error::InvalidClientEvent(msg) if msg.contains("get_task")));
}

#[test]
fn test_blank_tool_name_fails() {
    assert!(matches!(
        with_tools(vec![function("  ")]).validate(),
        Err(Error::InvalidClientEvent(_))
    ));
}

#[test]
fn test_tool_output_needs_call_id() {
    assert!(ClientEvent::function_call_output("call_1", "{}").validate().is_ok());
    assert!(matches!(
        ClientEvent::function_call_output("", "{}").validate(),
        Err(Error::InvalidClientEvent(_))
    ));
}

#[test]
fn test_response_create_always_valid() {
    assert!(ClientEvent::response_create(None).validate().is_ok());
}

#[tokio::test]
async fn test_sip_accept_rejects_transcription_sessions() {
    let client = CallsClient::new("sk-test")
        .unwrap()
        .with_base_url("http://127.0.0.1:9/v1/realtime");
    let session = SessionConfig::new(SessionKind::Transcription, "gpt-realtime");
    assert!(matches!(
        client.sip_accept("rtc_1", &session).await,
        Err(Error::InvalidClientEvent(_))
    ));
}
