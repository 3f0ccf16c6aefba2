//! Tests for the tool-call accumulator.

use std::sync::Arc;

use proptest::prelude::*;
use voicewire_realtime::accumulator::{
    ToolCallLedger, UNKNOWN_RESPONSE_ID, reduce, should_invoke,
};
use voicewire_realtime::events::{FunctionCallDelta, FunctionCallDone, ServerEvent};

fn delta(call_id: &str, text: &str) -> ServerEvent {
    ServerEvent::FunctionCallDelta(FunctionCallDelta {
        call_id: call_id.to_string(),
        delta: text.to_string(),
        item_id: None,
        output_index: None,
        response_id: None,
        event_id: None,
    })
}

fn done(call_id: &str, arguments: &str, name: Option<&str>) -> FunctionCallDone {
    FunctionCallDone {
        call_id: call_id.to_string(),
        arguments: arguments.to_string(),
        name: name.map(str::to_string),
        item_id: None,
        output_index: None,
        response_id: None,
        event_id: None,
    }
}

#[test]
fn deltas_append_and_done_completes() {
    let mut state = Arc::new(ToolCallLedger::new());
    state = reduce(&state, &delta("c1", "{\"city\":\"San"), 1);
    state = reduce(&state, &delta("c1", " Francisco\"}"), 2);

    let entry = state.get("c1").unwrap();
    assert_eq!(entry.argument_text, "{\"city\":\"San Francisco\"}");
    assert!(!entry.is_done);
    assert_eq!(entry.updated_at_ms, 2);

    let done_event = done("c1", "{\"city\":\"San Francisco\"}", Some("get_weather"));
    state = reduce(&state, &ServerEvent::FunctionCallDone(done_event), 3);

    let entry = state.get("c1").unwrap();
    assert!(entry.is_done);
    assert_eq!(entry.done_arguments.as_deref(), Some("{\"city\":\"San Francisco\"}"));
    assert_eq!(entry.argument_text, "{\"city\":\"San Francisco\"}");
    assert_eq!(entry.name.as_deref(), Some("get_weather"));
}

#[test]
fn identifiers_default_when_events_omit_them() {
    let state = reduce(&Arc::new(ToolCallLedger::new()), &delta("c1", "x"), 0);
    let entry = state.get("c1").unwrap();
    assert_eq!(entry.item_id, "c1");
    assert_eq!(entry.response_id, UNKNOWN_RESPONSE_ID);
}

#[test]
fn identifiers_propagate_from_previous_events() {
    let mut state = Arc::new(ToolCallLedger::new());
    state = reduce(
        &state,
        &ServerEvent::FunctionCallDelta(FunctionCallDelta {
            call_id: "c1".to_string(),
            delta: "a".to_string(),
            item_id: Some("itm".to_string()),
            output_index: Some(0),
            response_id: Some("resp".to_string()),
            event_id: None,
        }),
        0,
    );
    // Later events omit the identifiers; the entry keeps them.
    state = reduce(&state, &delta("c1", "b"), 1);
    state = reduce(&state, &ServerEvent::FunctionCallDone(done("c1", "ab", None)), 2);

    let entry = state.get("c1").unwrap();
    assert_eq!(entry.item_id, "itm");
    assert_eq!(entry.response_id, "resp");
}

#[test]
fn done_without_prior_deltas_seeds_argument_text() {
    let state = reduce(
        &Arc::new(ToolCallLedger::new()),
        &ServerEvent::FunctionCallDone(done("c1", "{\"v\":1}", Some("echo"))),
        0,
    );
    let entry = state.get("c1").unwrap();
    assert_eq!(entry.argument_text, "{\"v\":1}");
    assert_eq!(entry.done_arguments.as_deref(), Some("{\"v\":1}"));
}

#[test]
fn late_deltas_append_without_unsetting_done() {
    let mut state = Arc::new(ToolCallLedger::new());
    state = reduce(&state, &delta("c1", "ab"), 0);
    state = reduce(&state, &ServerEvent::FunctionCallDone(done("c1", "ab", Some("echo"))), 1);
    state = reduce(&state, &delta("c1", "cd"), 2);

    let entry = state.get("c1").unwrap();
    assert_eq!(entry.argument_text, "abcd");
    assert!(entry.is_done);
    assert_eq!(entry.done_arguments.as_deref(), Some("ab"));
    assert_eq!(entry.name.as_deref(), Some("echo"));
}

#[test]
fn unrelated_events_return_the_same_allocation() {
    let state = reduce(&Arc::new(ToolCallLedger::new()), &delta("c1", "x"), 0);

    let mut passthrough = serde_json::Map::new();
    passthrough.insert("type".to_string(), serde_json::Value::String("response.done".into()));
    for event in [
        ServerEvent::ConnectionOpen,
        ServerEvent::ConnectionClosed,
        ServerEvent::Other(passthrough),
        ServerEvent::local_error("transport_error", "boom"),
    ] {
        let next = reduce(&state, &event, 99);
        assert!(Arc::ptr_eq(&state, &next));
    }
}

#[test]
fn should_invoke_dispatches_once_per_call() {
    let mut state = Arc::new(ToolCallLedger::new());
    let first = done("c6", "{}", Some("echo"));

    assert!(should_invoke(&state, &first));
    state = reduce(&state, &ServerEvent::FunctionCallDone(first.clone()), 0);

    // The duplicate done is suppressed.
    assert!(!should_invoke(&state, &first));
}

#[test]
fn should_invoke_again_when_a_nameless_done_gains_a_name() {
    let mut state = Arc::new(ToolCallLedger::new());
    let nameless = done("c1", "{}", None);

    assert!(should_invoke(&state, &nameless));
    state = reduce(&state, &ServerEvent::FunctionCallDone(nameless.clone()), 0);

    // Still nameless: suppressed.
    assert!(!should_invoke(&state, &nameless));

    // A later done that finally names the tool dispatches once more.
    let named = done("c1", "{}", Some("echo"));
    assert!(should_invoke(&state, &named));
    state = reduce(&state, &ServerEvent::FunctionCallDone(named.clone()), 1);
    assert!(!should_invoke(&state, &named));
}

proptest! {
    /// The concatenation of a call's delta fragments equals its final
    /// accumulated argument text.
    #[test]
    fn concatenation_matches_argument_text(fragments in proptest::collection::vec("[a-z{}\":,]{0,8}", 0..12)) {
        let mut state = Arc::new(ToolCallLedger::new());
        for fragment in &fragments {
            state = reduce(&state, &delta("c1", fragment), 0);
        }
        let expected: String = fragments.concat();
        match state.get("c1") {
            Some(entry) => prop_assert_eq!(&entry.argument_text, &expected),
            None => prop_assert!(fragments.is_empty()),
        }
    }

    /// Events for distinct call ids commute: any interleaving produces the
    /// same ledger as reducing each call's events on their own.
    #[test]
    fn distinct_calls_commute(
        a in proptest::collection::vec("[a-z]{1,4}", 1..6),
        b in proptest::collection::vec("[a-z]{1,4}", 1..6),
        order in proptest::collection::vec(any::<bool>(), 0..12),
    ) {
        let mut interleaved = Arc::new(ToolCallLedger::new());
        let (mut ai, mut bi) = (0usize, 0usize);
        for pick_a in &order {
            if *pick_a && ai < a.len() {
                interleaved = reduce(&interleaved, &delta("call_a", &a[ai]), 0);
                ai += 1;
            } else if bi < b.len() {
                interleaved = reduce(&interleaved, &delta("call_b", &b[bi]), 0);
                bi += 1;
            }
        }
        while ai < a.len() {
            interleaved = reduce(&interleaved, &delta("call_a", &a[ai]), 0);
            ai += 1;
        }
        while bi < b.len() {
            interleaved = reduce(&interleaved, &delta("call_b", &b[bi]), 0);
            bi += 1;
        }

        let mut sequential = Arc::new(ToolCallLedger::new());
        for fragment in &a {
            sequential = reduce(&sequential, &delta("call_a", fragment), 0);
        }
        for fragment in &b {
            sequential = reduce(&sequential, &delta("call_b", fragment), 0);
        }

        prop_assert_eq!(&*interleaved, &*sequential);
    }
}
