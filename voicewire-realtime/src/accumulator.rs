//! Tool-call accumulator.
//!
//! A pure reducer over the server event stream. The ledger is an immutable
//! value keyed by `call_id`; reducing an event that does not touch tool-call
//! state returns the same allocation, so callers can detect no-ops by
//! pointer identity.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::events::{FunctionCallDelta, FunctionCallDone, ServerEvent};

/// Sentinel response id for calls whose events never carried one.
pub const UNKNOWN_RESPONSE_ID: &str = "unknown_response";

/// Accumulated state for one tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallEntry {
    pub call_id: String,
    /// Defaults to `call_id` when no event supplied one.
    pub item_id: String,
    /// Defaults to [`UNKNOWN_RESPONSE_ID`].
    pub response_id: String,
    /// Concatenation of all deltas observed so far. Append-only; deltas
    /// arriving after the done event still append here even though the
    /// per-call chunk stream has completed.
    pub argument_text: String,
    /// Full argument text from the done event, once it arrives.
    pub done_arguments: Option<String>,
    /// Tool name from whichever event first supplied it.
    pub name: Option<String>,
    pub is_done: bool,
    pub updated_at_ms: u64,
}

/// Immutable map of in-flight tool calls.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolCallLedger {
    calls: BTreeMap<String, ToolCallEntry>,
}

impl ToolCallLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, call_id: &str) -> Option<&ToolCallEntry> {
        self.calls.get(call_id)
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = &ToolCallEntry> {
        self.calls.values()
    }
}

/// Reduce one event into a new ledger.
///
/// Events other than argument deltas and dones return the input `Arc`
/// unchanged (identity, not a copy).
pub fn reduce(
    state: &Arc<ToolCallLedger>,
    event: &ServerEvent,
    now_ms: u64,
) -> Arc<ToolCallLedger> {
    match event {
        ServerEvent::FunctionCallDelta(delta) => Arc::new(apply_delta(state, delta, now_ms)),
        ServerEvent::FunctionCallDone(done) => Arc::new(apply_done(state, done, now_ms)),
        _ => Arc::clone(state),
    }
}

fn apply_delta(state: &ToolCallLedger, delta: &FunctionCallDelta, now_ms: u64) -> ToolCallLedger {
    let mut calls = state.calls.clone();
    let previous = calls.get(&delta.call_id);

    let entry = ToolCallEntry {
        call_id: delta.call_id.clone(),
        item_id: delta
            .item_id
            .clone()
            .or_else(|| previous.map(|p| p.item_id.clone()))
            .unwrap_or_else(|| delta.call_id.clone()),
        response_id: delta
            .response_id
            .clone()
            .or_else(|| previous.map(|p| p.response_id.clone()))
            .unwrap_or_else(|| UNKNOWN_RESPONSE_ID.to_string()),
        argument_text: match previous {
            Some(p) => format!("{}{}", p.argument_text, delta.delta),
            None => delta.delta.clone(),
        },
        done_arguments: previous.and_then(|p| p.done_arguments.clone()),
        name: previous.and_then(|p| p.name.clone()),
        is_done: previous.is_some_and(|p| p.is_done),
        updated_at_ms: now_ms,
    };

    calls.insert(delta.call_id.clone(), entry);
    ToolCallLedger { calls }
}

fn apply_done(state: &ToolCallLedger, done: &FunctionCallDone, now_ms: u64) -> ToolCallLedger {
    let mut calls = state.calls.clone();
    let previous = calls.get(&done.call_id);

    let entry = ToolCallEntry {
        call_id: done.call_id.clone(),
        item_id: done
            .item_id
            .clone()
            .or_else(|| previous.map(|p| p.item_id.clone()))
            .unwrap_or_else(|| done.call_id.clone()),
        response_id: done
            .response_id
            .clone()
            .or_else(|| previous.map(|p| p.response_id.clone()))
            .unwrap_or_else(|| UNKNOWN_RESPONSE_ID.to_string()),
        // Previously accumulated deltas win; a done with no prior deltas
        // seeds the text with its full arguments.
        argument_text: match previous {
            Some(p) => p.argument_text.clone(),
            None => done.arguments.clone(),
        },
        done_arguments: Some(done.arguments.clone()),
        name: done.name.clone().or_else(|| previous.and_then(|p| p.name.clone())),
        is_done: true,
        updated_at_ms: now_ms,
    };

    calls.insert(done.call_id.clone(), entry);
    ToolCallLedger { calls }
}

/// Whether a done event should dispatch the tool.
///
/// Returns `true` for the first done seen for a call, and again only when a
/// previously name-less completed entry gains a name. The upstream may emit
/// both `output_item.done` and `function_call_arguments.done` for one call,
/// and dispatching must happen at most once per name-known call.
pub fn should_invoke(state: &ToolCallLedger, done: &FunctionCallDone) -> bool {
    match state.get(&done.call_id) {
        None => true,
        Some(entry) if !entry.is_done => true,
        Some(entry) => entry.name.is_none() && done.name.is_some(),
    }
}
