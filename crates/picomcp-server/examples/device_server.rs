//! Manual device server example.
//!
//! Wires a small bench-device catalog (GPIO tools, a status resource, a
//! sensor template, a diagnostic prompt) into the server core with RBAC,
//! rate limiting, a retry policy, and a watchdog, then serves newline-
//! delimited JSON-RPC over stdio. The line framing stands in for a real
//! transport; the core only sees the envelope contract.

use std::io::{BufRead, Write};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use picomcp_core::{JitterMode, RetryOutcome, RetryPolicy};
use picomcp_protocol::types::content::Content;
use picomcp_protocol::types::prompts::{PromptMessage, Role};
use picomcp_server::{
    PromptDef, RateLimitKeySource, RequestEnvelope, ResourceDef, ServerBuilder, TemplateDef,
    ToolDef,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let server = ServerBuilder::new()
        .name("bench-device")
        .version("0.3.0")
        .instructions("A bench test rig. GPIO writes need the admin role.")
        .rate_limit(20.0, 10)
        .keyed_rate_limit(5.0, 3, 16, RateLimitKeySource::ApiKey)
        .build();

    // Simulated pin bank shared by the GPIO tools.
    let pins: Arc<Vec<AtomicU32>> = Arc::new((0..40).map(|_| AtomicU32::new(0)).collect());

    let read_pins = pins.clone();
    server.add_tool(
        ToolDef::new("gpio_read", "Read the logic level of a GPIO pin")
            .input_schema(
                r#"{"type":"object","properties":{"pin":{"type":"integer","minimum":0,"maximum":39}},"required":["pin"]}"#,
            )
            .handler(move |args| {
                let pin = args.get("pin").and_then(|v| v.as_u64()).unwrap_or(0) as usize;
                let state = read_pins[pin].load(Ordering::Relaxed);
                RetryOutcome::success(format!("{{\"pin\":{pin},\"state\":{state}}}"))
            }),
    )?;

    let write_pins = pins.clone();
    server.add_tool(
        ToolDef::new("gpio_write", "Drive a GPIO pin high or low")
            .input_schema(
                r#"{"type":"object","properties":{"pin":{"type":"integer","minimum":0,"maximum":39},"state":{"type":"integer","enum":[0,1]}},"required":["pin","state"]}"#,
            )
            .resource_key("gpio")
            .watchdog("gpio_bank")
            .handler(move |args| {
                let pin = args.get("pin").and_then(|v| v.as_u64()).unwrap_or(0) as usize;
                let state = args.get("state").and_then(|v| v.as_u64()).unwrap_or(0) as u32;
                write_pins[pin].store(state, Ordering::Relaxed);
                RetryOutcome::success("\"ok\"")
            }),
    )?;

    let status_server = server.clone();
    server.add_resource(
        ResourceDef::new("device://status", "Device status", move || {
            status_server.stats_json().to_string()
        })
        .description("Aggregate diagnostics for every subsystem")
        .mime_type("application/json"),
    )?;

    let sensor_pins = pins.clone();
    server.add_template(
        TemplateDef::new("gpio://{pin}", "GPIO pin state", move |vars| {
            let pin: usize = vars["pin"].parse().unwrap_or(0);
            format!("{}", sensor_pins[pin.min(39)].load(Ordering::Relaxed))
        })
        .mime_type("text/plain"),
    );

    server.add_prompt(
        PromptDef::new("diagnose_pin", |args| {
            let pin = args.get("pin").cloned().unwrap_or_else(|| "?".to_string());
            vec![PromptMessage {
                role: Role::User,
                content: Content::text(format!(
                    "Pin {pin} is misbehaving. Walk through continuity, pull-up, and drive checks."
                )),
            }]
        })
        .description("Debug a flaky GPIO pin")
        .argument("pin", "pin number", true),
    )?;

    // Writes are reserved for the admin key; everyone else reads.
    {
        let mut access = server.access_control();
        access.enable();
        access.map_key_to_role("bench-admin-key", "admin");
        access.set_default_role("viewer");
        access.restrict_tool("gpio_write", &["admin"]);
    }

    // The GPIO bank occasionally needs a second try.
    server.retries().set(
        "gpio",
        RetryPolicy {
            max_retries: 2,
            base_delay_ms: 10,
            multiplier: 2.0,
            max_delay_ms: 100,
            total_timeout_ms: 500,
            jitter: JitterMode::Equal,
        },
    );
    server.watchdog().add("gpio_bank", 60_000, None);

    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();
    let mut session: Option<String> = None;

    for line in stdin.lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let mut envelope = RequestEnvelope::new(line);
        if let Some(id) = &session {
            envelope = envelope.session(id.clone());
        }

        let outcome = server.receive(envelope).await;
        if let Some(id) = outcome.session_id {
            session = Some(id);
        }
        if let Some(response) = outcome.response {
            writeln!(stdout, "{response}")?;
            stdout.flush()?;
        }

        // Deliver anything the dispatcher queued for this session.
        if let Some(id) = &session {
            for payload in server.take_notifications(id) {
                writeln!(stdout, "{payload}")?;
                stdout.flush()?;
            }
        }

        server.maintain();
    }

    Ok(())
}
