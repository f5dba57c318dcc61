//! Per-call realtime session: connection lifecycle, transcript logging and
//! tool dispatch.

pub mod call_log;
pub mod session;
pub mod tool_calls;
pub mod tools;
pub mod transcript;
pub mod transport;

pub use call_log::{
    CallLogEntry, CallLogSink, JsonlCallLogSink, MemoryCallLogSink, Speaker, TracingCallLogSink,
};
pub use session::{CallBridge, CallBridgeBuilder, CallContext};
pub use tool_calls::{Completion, PendingToolCall, PendingToolCalls};
pub use tools::{ToolCall, ToolDefinition, ToolRegistry, ToolResult};
pub use transcript::TranscriptAccumulator;
pub use transport::{BoxFuture, Connector, Transport, WsConnector, WsTransport};
