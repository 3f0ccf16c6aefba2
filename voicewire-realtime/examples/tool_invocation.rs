//! Drive the tool invocation engine against a synthetic done event.
//!
//! Run with: cargo run -p voicewire-realtime --example tool_invocation

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use voicewire_realtime::events::FunctionCallDone;
use voicewire_realtime::tools::{
    ToolInvoker, ToolRegistration, ToolRegistry, create_function_call_output_events,
};
use voicewire_realtime::SessionConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let registry = Arc::new(
        ToolRegistry::new()
            .with_tool(
                ToolRegistration::from_fn(
                    "get_weather",
                    "Get the current weather for a city",
                    |input, _cancel| async move {
                        let city = input
                            .as_ref()
                            .and_then(|v| v.get("city"))
                            .and_then(|v| v.as_str())
                            .unwrap_or("somewhere");
                        Ok(json!({ "city": city, "forecast": "sunny", "temperature_c": 21 }))
                    },
                )
                .with_parameters(json!({
                    "type": "object",
                    "properties": { "city": { "type": "string" } },
                    "required": ["city"]
                })),
            )
            .with_tool(ToolRegistration::from_fn(
                "slow_lookup",
                "Waits longer than the engine allows",
                |_input, cancel| async move {
                    cancel.cancelled().await;
                    Err(anyhow::anyhow!("aborted"))
                },
            )),
    );

    // The descriptors slot straight into the session configuration the
    // client sends during the SDP exchange.
    let config = SessionConfig::new()
        .with_model("gpt-realtime")
        .with_voice("marin")
        .with_tools(registry.descriptors());
    println!("session config:\n{}\n", serde_json::to_string_pretty(&config)?);

    let invoker = ToolInvoker::new(registry).with_timeout(Duration::from_millis(250));

    for done in [
        done_event("call_1", "get_weather", r#"{"city":"Lisbon"}"#),
        done_event("call_2", "slow_lookup", "{}"),
        done_event("call_3", "no_such_tool", "{}"),
    ] {
        let output = invoker.invoke(&done).await;
        println!("{} -> {}", done.call_id, serde_json::to_string(&output)?);
        for event in create_function_call_output_events(&done.call_id, &output, true)? {
            println!("  outbound: {}", event.to_json()?);
        }
    }

    Ok(())
}

fn done_event(call_id: &str, name: &str, arguments: &str) -> FunctionCallDone {
    FunctionCallDone {
        call_id: call_id.to_string(),
        arguments: arguments.to_string(),
        name: Some(name.to_string()),
        item_id: None,
        output_index: None,
        response_id: None,
        event_id: None,
    }
}
