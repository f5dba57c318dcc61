use std::collections::{HashMap, HashSet};

use serde_json::{Map, Value};

use super::tools::{ToolCall, ToolResult};
use super::transport::Transport;
use crate::Result;
use crate::protocol::client_events::ClientEvent;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PendingToolCall {
    pub name: Option<String>,
    pub arguments: String,
}

/// What to do with a `function_call_arguments.done` event.
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    /// Run the call and reply to it.
    Ready(ToolCall),
    /// The event carried no call id; nothing can be replied to.
    MissingCallId,
    /// The id was already completed earlier in this session.
    Duplicate(String),
}

/// Function calls whose arguments are still streaming, keyed by call id.
#[derive(Debug, Default)]
pub struct PendingToolCalls {
    pending: HashMap<String, PendingToolCall>,
    completed: HashSet<String>,
}

impl PendingToolCalls {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, call_id: &str) -> Option<&PendingToolCall> {
        self.pending.get(call_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Record an argument fragment, binding the tool name when one is given.
    pub fn append_fragment(&mut self, call_id: Option<&str>, name: Option<&str>, delta: &str) {
        let Some(call_id) = call_id else {
            tracing::debug!("Argument fragment without call_id ignored");
            return;
        };
        if self.completed.contains(call_id) {
            tracing::warn!(call_id, "Argument fragment for completed tool call ignored");
            return;
        }
        let entry = self.pending.entry(call_id.to_string()).or_default();
        if let Some(name) = name.filter(|n| !n.is_empty()) {
            entry.name = Some(name.to_string());
        }
        entry.arguments.push_str(delta);
    }

    /// Close a call and turn it into something runnable.
    ///
    /// The event's name wins over one bound by earlier fragments. The
    /// event's `arguments` are authoritative; if absent or not a JSON object
    /// the call runs with `{}`.
    pub fn complete(
        &mut self,
        call_id: Option<&str>,
        name: Option<&str>,
        arguments: Option<&str>,
    ) -> Completion {
        let Some(call_id) = call_id.filter(|id| !id.is_empty()) else {
            return Completion::MissingCallId;
        };
        if !self.completed.insert(call_id.to_string()) {
            return Completion::Duplicate(call_id.to_string());
        }
        let buffered = self.pending.remove(call_id).unwrap_or_default();
        let name = name
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .or(buffered.name)
            .unwrap_or_default();

        Completion::Ready(ToolCall {
            name,
            call_id: call_id.to_string(),
            arguments: parse_arguments(call_id, arguments),
        })
    }
}

fn parse_arguments(call_id: &str, raw: Option<&str>) -> Value {
    let Some(raw) = raw.filter(|r| !r.trim().is_empty()) else {
        return Value::Object(Map::new());
    };
    match serde_json::from_str::<Value>(raw) {
        Ok(value @ Value::Object(_)) => value,
        Ok(other) => {
            tracing::warn!(call_id, "Tool arguments are not an object: {other}");
            Value::Object(Map::new())
        }
        Err(err) => {
            tracing::warn!(call_id, "Unparseable tool arguments: {err}");
            Value::Object(Map::new())
        }
    }
}

/// Return a tool result to the model and ask it to continue.
///
/// # Errors
/// Returns the first transport error; the continuation is not sent if the
/// result could not be.
pub async fn send_tool_result(transport: &mut dyn Transport, result: ToolResult) -> Result<()> {
    let output = serde_json::to_string(&result.output)?;
    transport
        .send(ClientEvent::function_call_output(result.call_id, output))
        .await?;
    transport.send(ClientEvent::response_create(None)).await
}
