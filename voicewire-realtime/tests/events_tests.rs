//! Tests for the event protocol codec.

use serde_json::json;
use voicewire_realtime::events::{
    self, FunctionCallDone, ServerEvent, function_call_item_added, parse_client_event,
    parse_server_event,
};

#[test]
fn parses_function_call_delta() {
    let raw = json!({
        "type": "response.function_call_arguments.delta",
        "call_id": "call_1",
        "delta": "{\"city\":\"San",
        "item_id": "item_1",
        "output_index": 0,
        "response_id": "resp_1",
        "event_id": "evt_1"
    });

    let event = parse_server_event(&raw).unwrap();
    match event {
        ServerEvent::FunctionCallDelta(delta) => {
            assert_eq!(delta.call_id, "call_1");
            assert_eq!(delta.delta, "{\"city\":\"San");
            assert_eq!(delta.item_id.as_deref(), Some("item_1"));
            assert_eq!(delta.response_id.as_deref(), Some("resp_1"));
        }
        other => panic!("expected delta, got {other:?}"),
    }
}

#[test]
fn parses_function_call_done() {
    let raw = json!({
        "type": "response.function_call_arguments.done",
        "call_id": "call_2",
        "arguments": "{\"city\":\"Paris\"}",
        "name": "get_weather"
    });

    let event = parse_server_event(&raw).unwrap();
    assert!(event.is_done());
    match event {
        ServerEvent::FunctionCallDone(done) => {
            assert_eq!(done.arguments, "{\"city\":\"Paris\"}");
            assert_eq!(done.name.as_deref(), Some("get_weather"));
        }
        other => panic!("expected done, got {other:?}"),
    }
}

#[test]
fn normalizes_output_item_done_into_canonical_done() {
    let raw = json!({
        "type": "response.output_item.done",
        "output_index": 2,
        "response_id": "r",
        "item": {
            "type": "function_call",
            "call_id": "c3",
            "arguments": "{}",
            "name": "echo",
            "id": "itm"
        }
    });

    let event = parse_server_event(&raw).unwrap();
    assert_eq!(
        event,
        ServerEvent::FunctionCallDone(FunctionCallDone {
            call_id: "c3".to_string(),
            arguments: "{}".to_string(),
            name: Some("echo".to_string()),
            item_id: Some("itm".to_string()),
            output_index: Some(2),
            response_id: Some("r".to_string()),
            event_id: None,
        })
    );
}

#[test]
fn output_item_done_without_function_call_passes_through() {
    let raw = json!({
        "type": "response.output_item.done",
        "item": { "type": "message", "id": "itm" }
    });

    let event = parse_server_event(&raw).unwrap();
    assert!(matches!(event, ServerEvent::Other(_)));
    assert_eq!(event.event_type(), "response.output_item.done");
}

#[test]
fn parses_error_event() {
    let raw = json!({
        "type": "error",
        "event_id": "evt_9",
        "error": {
            "type": "invalid_request_error",
            "message": "Bad session",
            "code": "bad_session"
        }
    });

    let event = parse_server_event(&raw).unwrap();
    match event {
        ServerEvent::Error(error) => {
            assert_eq!(error.error.error_type, "invalid_request_error");
            assert_eq!(error.error.message, "Bad session");
            assert_eq!(error.error.code.as_deref(), Some("bad_session"));
        }
        other => panic!("expected error, got {other:?}"),
    }
}

#[test]
fn parses_audio_delta_with_default_sample_rate() {
    let raw = json!({
        "type": "response.audio.delta",
        "delta": "AAAA"
    });

    match parse_server_event(&raw).unwrap() {
        ServerEvent::AudioDelta(audio) => {
            assert_eq!(audio.sample_rate(), 24_000);
        }
        other => panic!("expected audio delta, got {other:?}"),
    }
}

#[test]
fn unknown_envelope_passes_through_with_fields_preserved() {
    let raw = json!({
        "type": "response.text.delta",
        "delta": "Hello",
        "custom_field": { "nested": true }
    });

    let event = parse_server_event(&raw).unwrap();
    assert_eq!(event.event_type(), "response.text.delta");
    assert_eq!(event.to_value(), raw);
}

#[test]
fn malformed_known_type_falls_back_to_passthrough() {
    // A delta without its required call_id is not rejected; it passes
    // through under open-envelope semantics.
    let raw = json!({
        "type": "response.function_call_arguments.delta",
        "delta": "x"
    });

    let event = parse_server_event(&raw).unwrap();
    assert!(matches!(event, ServerEvent::Other(_)));
}

#[test]
fn rejects_payloads_without_an_envelope() {
    for raw in [json!([1, 2]), json!("event"), json!({}), json!({ "type": "" }), json!({ "type": 7 })]
    {
        let error = parse_server_event(&raw).unwrap_err();
        assert_eq!(error.to_string(), events::SERVER_ENVELOPE_ERROR);
    }
}

#[test]
fn normalization_is_idempotent() {
    let samples = [
        json!({
            "type": "response.function_call_arguments.delta",
            "call_id": "c1",
            "delta": "{\"a\":"
        }),
        json!({
            "type": "response.output_item.done",
            "output_index": 1,
            "response_id": "r",
            "item": { "type": "function_call", "call_id": "c2", "arguments": "{}", "name": "n" }
        }),
        json!({
            "type": "error",
            "error": { "type": "server_error", "message": "boom" }
        }),
        json!({ "type": "rate_limits.updated", "rate_limits": [] }),
        json!({ "type": "runtime.connection.open" }),
    ];

    for raw in samples {
        let first = parse_server_event(&raw).unwrap();
        let second = parse_server_event(&first.to_value()).unwrap();
        assert_eq!(first, second);
    }
}

#[test]
fn lifecycle_events_round_trip() {
    assert_eq!(
        parse_server_event(&ServerEvent::ConnectionOpen.to_value()).unwrap(),
        ServerEvent::ConnectionOpen
    );
    assert_eq!(
        parse_server_event(&ServerEvent::ConnectionClosed.to_value()).unwrap(),
        ServerEvent::ConnectionClosed
    );
}

#[test]
fn extracts_function_call_item_added_metadata() {
    let raw = json!({
        "type": "response.output_item.added",
        "item": { "type": "function_call", "call_id": "c2", "name": "render_ui", "id": "itm_2" }
    });

    let added = function_call_item_added(&raw).unwrap();
    assert_eq!(added.call_id, "c2");
    assert_eq!(added.name, "render_ui");
    assert_eq!(added.item_id.as_deref(), Some("itm_2"));

    // The added event itself still flows through as a passthrough envelope.
    assert!(matches!(parse_server_event(&raw).unwrap(), ServerEvent::Other(_)));
}

#[test]
fn item_added_without_function_call_yields_no_metadata() {
    let raw = json!({
        "type": "response.output_item.added",
        "item": { "type": "message" }
    });
    assert!(function_call_item_added(&raw).is_none());
}

#[test]
fn validates_client_event_envelopes() {
    let valid = json!({ "type": "response.create", "response": {} });
    let event = parse_client_event(&valid).unwrap();
    assert_eq!(event.event_type(), "response.create");

    for raw in [json!(42), json!({ "type": "" }), json!({ "no_type": true })] {
        let error = parse_client_event(&raw).unwrap_err();
        assert_eq!(error.to_string(), events::CLIENT_ENVELOPE_ERROR);
    }
}

#[test]
fn client_event_constructors_produce_wire_shapes() {
    let item = json!({ "type": "function_call_output", "call_id": "c1", "output": "{}" });
    let create = voicewire_realtime::ClientEvent::conversation_item_create(item.clone());
    assert_eq!(create.event_type(), "conversation.item.create");
    assert_eq!(create.get("item"), Some(&item));

    let response = voicewire_realtime::ClientEvent::response_create();
    assert_eq!(response.to_value(), json!({ "type": "response.create", "response": {} }));
}
