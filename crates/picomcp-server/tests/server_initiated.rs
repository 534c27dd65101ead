//! Server-initiated interactions: outbox flushing, elicitation and
//! sampling round-trips, watchdog integration, and housekeeping.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use picomcp_core::{Clock, ManualClock, RetryOutcome, WatchdogState};
use picomcp_protocol::types::elicitation::ElicitRequest;
use picomcp_protocol::types::prompts::Role;
use picomcp_protocol::types::sampling::{CreateMessageParams, SamplingMessage};
use picomcp_protocol::types::content::Content;
use picomcp_server::{McpServer, RequestEnvelope, ServerBuilder, ToolDef, Transport};
use serde_json::{json, Value};

fn rpc(id: i64, method: &str, params: Value) -> String {
    json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params}).to_string()
}

async fn initialize(server: &McpServer) -> String {
    let payload = rpc(
        1,
        "initialize",
        json!({
            "protocolVersion": "2025-03-26",
            "capabilities": {},
            "clientInfo": {"name": "t", "version": "1"}
        }),
    );
    let outcome = server.receive(RequestEnvelope::new(payload)).await;
    outcome.session_id.expect("initialize creates a session")
}

#[derive(Default)]
struct RecordingTransport {
    delivered: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn push(&self, session_id: &str, payload: String) {
        self.delivered.lock().push((session_id.to_string(), payload));
    }
}

#[tokio::test]
async fn flush_pushes_queued_payloads_per_session() {
    let server = ServerBuilder::new().build();
    let session = initialize(&server).await;

    server.log_message(
        picomcp_protocol::types::logging::LogLevel::Error,
        "core",
        json!("i2c bus stuck"),
    );

    let transport = RecordingTransport::default();
    server.flush_notifications(&transport).await;

    let delivered = transport.delivered.lock();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].0, session);
    let payload: Value = serde_json::from_str(&delivered[0].1).unwrap();
    assert_eq!(payload["method"], "notifications/message");

    // The outbox drained; a second flush delivers nothing.
    drop(delivered);
    server.flush_notifications(&transport).await;
    assert_eq!(transport.delivered.lock().len(), 1);
}

#[tokio::test]
async fn elicitation_round_trip() {
    let server = ServerBuilder::new().build();
    let session = initialize(&server).await;

    let answer: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));
    let answer2 = answer.clone();
    let request_id = server.request_elicitation(
        &session,
        ElicitRequest {
            message: "Which unit?".to_string(),
            requested_schema: json!({
                "type": "object",
                "properties": {"unit": {"type": "string", "enum": ["celsius", "fahrenheit"]}},
                "required": ["unit"]
            }),
        },
        move |result| {
            let result = result.expect("client answered");
            *answer2.lock() = result.get_str("unit").map(str::to_string);
        },
    );
    assert_eq!(request_id, 8000);

    // The request is queued for the transport.
    let queued = server.take_notifications(&session);
    assert_eq!(queued.len(), 1);
    let outgoing: Value = serde_json::from_str(&queued[0]).unwrap();
    assert_eq!(outgoing["method"], "elicitation/create");
    assert_eq!(outgoing["id"], 8000);
    assert_eq!(outgoing["params"]["message"], "Which unit?");

    // The client responds; the callback observes the accepted content.
    let response = json!({
        "jsonrpc": "2.0",
        "id": 8000,
        "result": {"action": "accept", "content": {"unit": "celsius"}}
    })
    .to_string();
    let outcome = server.receive(RequestEnvelope::new(response).session(session)).await;
    assert!(outcome.response.is_none());
    assert_eq!(answer.lock().as_deref(), Some("celsius"));
}

#[tokio::test]
async fn sampling_error_response_yields_none() {
    let server = ServerBuilder::new().build();
    let session = initialize(&server).await;

    let observed: Arc<Mutex<Option<bool>>> = Arc::new(Mutex::new(None));
    let observed2 = observed.clone();
    let request_id = server.request_sampling(
        &session,
        CreateMessageParams {
            messages: vec![SamplingMessage {
                role: Role::User,
                content: Content::text("Summarize the event log"),
            }],
            max_tokens: 100,
            system_prompt: None,
            temperature: Some(0.2),
        },
        move |result| {
            *observed2.lock() = Some(result.is_some());
        },
    );
    assert_eq!(request_id, 5000);

    let response = json!({
        "jsonrpc": "2.0",
        "id": 5000,
        "error": {"code": -1, "message": "sampling unavailable"}
    })
    .to_string();
    server.receive(RequestEnvelope::new(response).session(session)).await;
    assert_eq!(*observed.lock(), Some(false));
}

#[tokio::test]
async fn tool_calls_kick_their_watchdog() {
    let clock = ManualClock::shared();
    let server = ServerBuilder::new().clock(clock.clone()).build();
    server.watchdog().add("sensor_loop", 5000, None);
    server
        .add_tool(
            ToolDef::new("read_sensor", "read the sensor")
                .watchdog("sensor_loop")
                .handler(|_| RetryOutcome::success("22.5")),
        )
        .unwrap();
    let session = initialize(&server).await;

    let payload = rpc(2, "tools/call", json!({"name": "read_sensor", "arguments": {}}));
    server
        .receive(RequestEnvelope::new(payload).session(session.clone()))
        .await;

    // Kicked at t=0; healthy well before the deadline.
    clock.advance(4_999);
    assert_eq!(server.watchdog().check(clock.now_ms()), 0);

    // Without further calls the deadline elapses.
    clock.advance(1);
    assert_eq!(server.watchdog().check(clock.now_ms()), 1);
    assert_eq!(server.watchdog().state("sensor_loop"), WatchdogState::Expired);

    // A new call re-kicks and restores health.
    let payload = rpc(3, "tools/call", json!({"name": "read_sensor", "arguments": {}}));
    server.receive(RequestEnvelope::new(payload).session(session)).await;
    assert_eq!(server.watchdog().state("sensor_loop"), WatchdogState::Healthy);
}

#[tokio::test]
async fn maintain_runs_scheduler_and_prunes() {
    let clock = ManualClock::shared();
    let server = ServerBuilder::new().sessions(4, 1000).clock(clock.clone()).build();
    let session = initialize(&server).await;

    let ticks = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let ticks2 = ticks.clone();
    server.scheduler().every(100, move || {
        ticks2.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
    }, "heartbeat");

    clock.advance(100);
    server.maintain();
    assert_eq!(ticks.load(std::sync::atomic::Ordering::SeqCst), 1);
    assert_eq!(server.sessions().active_count(), 1);

    // The session idles past its timeout and is pruned.
    clock.advance(1001);
    server.maintain();
    assert_eq!(server.sessions().active_count(), 0);
    assert!(!server.sessions().validate_session(&session));

    // Expired state entries are purged with a deletion notification.
    server.state_store().set("ephemeral", "v", 50);
    clock.advance(51);
    server.maintain();
    assert!(!server.state_store().has("ephemeral"));
}
