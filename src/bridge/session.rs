use std::sync::Arc;

use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::Instrument;

use super::call_log::{CallLogEntry, CallLogSink, Speaker, TracingCallLogSink};
use super::tool_calls::{Completion, PendingToolCalls, send_tool_result};
use super::tools::ToolRegistry;
use super::transcript::{TranscriptAccumulator, non_blank};
use super::transport::{Connector, Transport, WsConnector};
use crate::protocol::client_events::ClientEvent;
use crate::protocol::models::{AudioConfig, InputAudioTranscription, SessionKind, SessionUpdate};
use crate::protocol::server_events::ServerEvent;
use crate::{Error, Result};

pub const DEFAULT_TRANSCRIPTION_MODEL: &str = "whisper-1";
pub const DEFAULT_TRANSCRIPTION_LANGUAGE: &str = "ja";

/// Who is on the line and what to say first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallContext {
    pub call_id: String,
    pub caller: Option<String>,
    pub greeting: String,
}

impl CallContext {
    #[must_use]
    pub fn new(call_id: impl Into<String>, caller: Option<String>, greeting: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            caller,
            greeting: greeting.into(),
        }
    }
}

struct Inner {
    connector: Arc<dyn Connector>,
    tools: Arc<ToolRegistry>,
    call_log: Arc<dyn CallLogSink>,
    session: SessionUpdate,
}

/// Runs one realtime session per accepted call.
///
/// Cheap to clone; every call shares the tool registry and call log sink.
#[derive(Clone)]
pub struct CallBridge {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for CallBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallBridge")
            .field("tools", &self.inner.tools)
            .field("session", &self.inner.session)
            .finish_non_exhaustive()
    }
}

impl CallBridge {
    #[must_use]
    pub fn builder() -> CallBridgeBuilder {
        CallBridgeBuilder::new()
    }

    /// The `session.update` sent right after connecting.
    #[must_use]
    pub fn session_update(&self) -> &SessionUpdate {
        &self.inner.session
    }

    /// Spawn the session for `call` on its own task.
    pub fn start(&self, call: CallContext) -> JoinHandle<()> {
        let bridge = self.clone();
        tokio::spawn(async move { bridge.run(call).await })
    }

    /// Connect and run the session until the connection ends.
    ///
    /// Connection failures end the call without retrying.
    pub async fn run(&self, call: CallContext) {
        let span = tracing::info_span!("call", call_id = %call.call_id);
        async {
            let transport = match self.inner.connector.connect(&call.call_id).await {
                Ok(transport) => transport,
                Err(err) => {
                    tracing::error!("Realtime connect failed: {err}");
                    return;
                }
            };
            self.drive(transport, &call).await;
        }
        .instrument(span)
        .await;
    }

    /// Run the session over an already open transport.
    pub async fn drive(&self, mut transport: Box<dyn Transport>, call: &CallContext) {
        let mut session = CallSession::new(&self.inner, call);

        if let Err(err) = transport
            .send(ClientEvent::session_update(self.inner.session.clone()))
            .await
        {
            tracing::warn!("session.update failed, continuing without it: {err}");
        }

        match transport
            .send(ClientEvent::response_create(Some(call.greeting.clone())))
            .await
        {
            Ok(()) => {
                if let Some(text) = non_blank(&call.greeting) {
                    session.record(Speaker::Assistant, text).await;
                }
            }
            Err(err) => {
                tracing::error!("Greeting failed: {err}");
                close(transport.as_mut()).await;
                return;
            }
        }

        loop {
            match transport.next_frame().await {
                Ok(Some(frame)) => {
                    if let Err(err) = session.handle_frame(transport.as_mut(), &frame).await {
                        tracing::error!("Realtime send failed: {err}");
                        break;
                    }
                }
                Ok(None) => {
                    tracing::info!("Realtime connection closed");
                    break;
                }
                Err(err) => {
                    tracing::error!("Realtime receive failed: {err}");
                    break;
                }
            }
        }

        close(transport.as_mut()).await;
    }
}

async fn close(transport: &mut dyn Transport) {
    if let Err(err) = transport.close().await {
        tracing::debug!("Close failed: {err}");
    }
}

/// Per-call state, owned by the call's task.
struct CallSession<'a> {
    inner: &'a Inner,
    call: &'a CallContext,
    transcripts: TranscriptAccumulator,
    tool_calls: PendingToolCalls,
}

impl<'a> CallSession<'a> {
    fn new(inner: &'a Inner, call: &'a CallContext) -> Self {
        Self {
            inner,
            call,
            transcripts: TranscriptAccumulator::new(),
            tool_calls: PendingToolCalls::new(),
        }
    }

    async fn record(&self, speaker: Speaker, text: String) {
        let entry = CallLogEntry::new(self.call.caller.as_deref(), speaker, text, &self.call.call_id);
        if let Err(err) = self.inner.call_log.append(&entry).await {
            tracing::warn!(%speaker, "Call log write failed: {err}");
        }
    }

    async fn record_if_any(&self, speaker: Speaker, text: Option<String>) {
        if let Some(text) = text {
            self.record(speaker, text).await;
        }
    }

    /// Handle one inbound frame. Only transport errors are returned.
    async fn handle_frame(&mut self, transport: &mut dyn Transport, frame: &str) -> Result<()> {
        match ServerEvent::parse(frame) {
            Ok(event) => self.handle_event(transport, event).await,
            Err(err) => {
                tracing::warn!("Ignoring malformed frame: {err}");
                Ok(())
            }
        }
    }

    async fn handle_event(&mut self, transport: &mut dyn Transport, event: ServerEvent) -> Result<()> {
        match event {
            ServerEvent::Error { error, .. } => {
                tracing::error!(
                    error_type = ?error.error_type,
                    code = ?error.code,
                    param = ?error.param,
                    "Realtime error: {}",
                    error.message
                );
            }
            ServerEvent::InputAudioBufferCommitted { item_id, .. } => {
                tracing::debug!(?item_id, "Input audio committed");
            }
            ServerEvent::ResponseOutputTextDelta { delta, .. } => {
                self.transcripts.push(Speaker::Assistant, &delta.text());
            }
            ServerEvent::ResponseOutputAudioTranscriptDelta { delta, .. } => {
                self.transcripts.push(Speaker::Assistant, &delta);
            }
            ServerEvent::ResponseOutputAudioTranscriptDone { transcript, .. } => {
                let buffered = self.transcripts.flush(Speaker::Assistant);
                let text = transcript.as_deref().and_then(non_blank).or(buffered);
                self.record_if_any(Speaker::Assistant, text).await;
            }
            ServerEvent::ResponseOutputTextDone { text, .. } => {
                let text = self
                    .transcripts
                    .flush(Speaker::Assistant)
                    .or_else(|| text.as_deref().and_then(non_blank));
                self.record_if_any(Speaker::Assistant, text).await;
            }
            ServerEvent::ResponseDone { .. } => {
                // Last chance for a turn that never got a text or transcript done.
                let text = self.transcripts.flush(Speaker::Assistant);
                self.record_if_any(Speaker::Assistant, text).await;
            }
            ServerEvent::ResponseFunctionCallArgumentsDelta {
                call_id,
                name,
                delta,
                ..
            } => {
                self.tool_calls
                    .append_fragment(call_id.as_deref(), name.as_deref(), &delta);
            }
            ServerEvent::ResponseFunctionCallArgumentsDone {
                call_id,
                name,
                arguments,
                ..
            } => {
                match self
                    .tool_calls
                    .complete(call_id.as_deref(), name.as_deref(), arguments.as_deref())
                {
                    Completion::Ready(call) => {
                        tracing::info!(tool = %call.name, call_id = %call.call_id, "Running tool");
                        let result = self.inner.tools.dispatch(call).await;
                        send_tool_result(transport, result).await?;
                    }
                    Completion::MissingCallId => {
                        tracing::warn!(?name, "Tool call completed without call_id; not run");
                    }
                    Completion::Duplicate(call_id) => {
                        tracing::warn!(%call_id, "Tool call completed twice; ignored");
                    }
                }
            }
            ServerEvent::InputAudioTranscriptionCompleted {
                transcript,
                transcription,
                ..
            } => {
                let text = transcript.as_deref().and_then(non_blank).or_else(|| {
                    transcription
                        .and_then(|nested| nested.text)
                        .as_deref()
                        .and_then(non_blank)
                });
                self.record_if_any(Speaker::Caller, text).await;
            }
            ServerEvent::InputAudioTranscriptionDelta { delta, .. } => {
                tracing::debug!("Caller transcription delta: {delta}");
            }
            ServerEvent::ConversationItemAdded { item, .. }
            | ServerEvent::ConversationItemDone { item, .. } => {
                for text in item.input_audio_transcripts() {
                    self.record_if_any(Speaker::Caller, non_blank(text)).await;
                }
            }
            ServerEvent::Unknown(raw) if raw.get("type").and_then(Value::as_str) == Some("error") => {
                tracing::error!("Realtime error (unrecognised shape): {raw}");
            }
            unknown @ ServerEvent::Unknown(_) => {
                tracing::trace!(event_type = unknown.event_type(), "Ignoring event");
            }
        }
        Ok(())
    }
}

pub struct CallBridgeBuilder {
    api_key: Option<String>,
    connector: Option<Arc<dyn Connector>>,
    tools: ToolRegistry,
    call_log: Option<Arc<dyn CallLogSink>>,
    transcription: InputAudioTranscription,
}

impl CallBridgeBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            api_key: None,
            connector: None,
            tools: ToolRegistry::new(),
            call_log: None,
            transcription: InputAudioTranscription::new(
                DEFAULT_TRANSCRIPTION_MODEL,
                DEFAULT_TRANSCRIPTION_LANGUAGE,
            ),
        }
    }

    #[must_use]
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Replace the WebSocket connector, e.g. with an in-process transport.
    #[must_use]
    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    #[must_use]
    pub fn tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    #[must_use]
    pub fn call_log(mut self, sink: Arc<dyn CallLogSink>) -> Self {
        self.call_log = Some(sink);
        self
    }

    #[must_use]
    pub fn transcription(mut self, model: impl Into<String>, language: impl Into<String>) -> Self {
        self.transcription = InputAudioTranscription::new(model, language);
        self
    }

    /// # Errors
    /// Returns an error if neither an API key nor a connector was given, or
    /// if a tool schema cannot be serialized.
    #[allow(clippy::result_large_err)]
    pub fn build(self) -> Result<CallBridge> {
        let connector: Arc<dyn Connector> = match (self.connector, self.api_key) {
            (Some(connector), _) => connector,
            (None, Some(key)) if !key.trim().is_empty() => Arc::new(WsConnector::new(key)),
            _ => return Err(Error::Config("api_key required".to_string())),
        };

        let tools = self.tools.try_as_tools()?;
        let session = SessionUpdate {
            kind: Some(SessionKind::Realtime),
            instructions: None,
            tools: (!tools.is_empty()).then_some(tools),
            audio: Some(AudioConfig::with_transcription(self.transcription)),
        };

        Ok(CallBridge {
            inner: Arc::new(Inner {
                connector,
                tools: Arc::new(self.tools),
                call_log: self.call_log.unwrap_or_else(|| Arc::new(TracingCallLogSink)),
                session,
            }),
        })
    }
}

impl Default for CallBridgeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::call_log::MemoryCallLogSink;
    use crate::bridge::transport::BoxFuture;
    use crate::protocol::models::Item;
    use serde_json::{Value, json};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::mpsc;

    const GREETING: &str = "Thank you for calling. Reservation or a question?";

    struct MockTransport {
        incoming: mpsc::Receiver<Result<String>>,
        outgoing: mpsc::UnboundedSender<ClientEvent>,
        /// Zero-based index of the send that fails, if any.
        fail_send: Option<usize>,
        sends: usize,
        closed: Arc<AtomicBool>,
    }

    impl MockTransport {
        fn new(
            incoming: mpsc::Receiver<Result<String>>,
            outgoing: mpsc::UnboundedSender<ClientEvent>,
        ) -> Self {
            Self {
                incoming,
                outgoing,
                fail_send: None,
                sends: 0,
                closed: Arc::new(AtomicBool::new(false)),
            }
        }
    }

    impl Transport for MockTransport {
        fn send(&mut self, event: ClientEvent) -> BoxFuture<'_, Result<()>> {
            let index = self.sends;
            self.sends += 1;
            let fail = self.fail_send == Some(index);
            let outgoing = self.outgoing.clone();
            Box::pin(async move {
                if fail {
                    return Err(Error::ConnectionClosed);
                }
                outgoing.send(event).map_err(|_| Error::ConnectionClosed)?;
                Ok(())
            })
        }

        fn next_frame(&mut self) -> BoxFuture<'_, Result<Option<String>>> {
            Box::pin(async move { self.incoming.recv().await.transpose() })
        }

        fn close(&mut self) -> BoxFuture<'_, Result<()>> {
            self.closed.store(true, Ordering::SeqCst);
            Box::pin(async { Ok(()) })
        }
    }

    struct Harness {
        bridge: CallBridge,
        sink: Arc<MemoryCallLogSink>,
        seen: Arc<Mutex<Vec<Value>>>,
    }

    fn harness() -> Harness {
        let sink = Arc::new(MemoryCallLogSink::new());
        let seen = Arc::new(Mutex::new(Vec::new()));

        let mut tools = ToolRegistry::new();
        let seen_args = Arc::clone(&seen);
        tools.tool_with_description("create_task", "Create a reservation", move |args: Value| {
            let seen_args = Arc::clone(&seen_args);
            async move {
                seen_args.lock().unwrap().push(args.clone());
                Ok(json!({ "item": args }))
            }
        });
        tools.tool("fails", |_: Value| async move {
            Err::<Value, _>(Error::Tool("backend down".to_string()))
        });

        let bridge = CallBridge::builder()
            .api_key("sk-test")
            .tools(tools)
            .call_log(sink.clone())
            .build()
            .unwrap();
        Harness { bridge, sink, seen }
    }

    /// Feed `frames`, let the session run until the inbound side closes, and
    /// return everything it sent.
    async fn run_frames(bridge: &CallBridge, frames: &[Value]) -> Vec<ClientEvent> {
        run_raw(bridge, frames.iter().map(Value::to_string).collect()).await
    }

    async fn run_raw(bridge: &CallBridge, frames: Vec<String>) -> Vec<ClientEvent> {
        run_script(bridge, frames.into_iter().map(Ok).collect(), None).await.0
    }

    /// Like `run_raw`, with injectable receive errors and a failing send.
    /// Also reports whether the transport was closed.
    async fn run_script(
        bridge: &CallBridge,
        frames: Vec<Result<String>>,
        fail_send: Option<usize>,
    ) -> (Vec<ClientEvent>, bool) {
        let (in_tx, in_rx) = mpsc::channel(frames.len().max(1));
        let (out_tx, mut out_rx) = mpsc::unbounded_channel();
        for frame in frames {
            in_tx.send(frame).await.unwrap();
        }
        drop(in_tx);

        let mut transport = MockTransport::new(in_rx, out_tx);
        transport.fail_send = fail_send;
        let closed = Arc::clone(&transport.closed);
        let call = CallContext::new("rtc_test", Some("09012345678".to_string()), GREETING);
        tokio::time::timeout(
            std::time::Duration::from_secs(2),
            bridge.drive(Box::new(transport), &call),
        )
        .await
        .unwrap();

        let mut sent = Vec::new();
        while let Ok(event) = out_rx.try_recv() {
            sent.push(event);
        }
        (sent, closed.load(Ordering::SeqCst))
    }

    fn texts(sink: &MemoryCallLogSink) -> Vec<(Speaker, String)> {
        sink.entries()
            .into_iter()
            .map(|entry| (entry.speaker, entry.text))
            .collect()
    }

    #[tokio::test]
    async fn configures_then_greets_and_logs_greeting() {
        let h = harness();
        let sent = run_frames(&h.bridge, &[]).await;

        assert_eq!(sent.len(), 2);
        let ClientEvent::SessionUpdate { session, .. } = &sent[0] else {
            panic!("expected session.update first, got {:?}", sent[0]);
        };
        assert_eq!(session.kind, Some(SessionKind::Realtime));
        assert_eq!(session.tools.as_ref().map(Vec::len), Some(2));
        assert_eq!(
            serde_json::to_value(&sent[1]).unwrap(),
            json!({"type": "response.create", "response": {"instructions": GREETING}})
        );

        let entries = h.sink.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].speaker, Speaker::Assistant);
        assert_eq!(entries[0].text, GREETING);
        assert_eq!(entries[0].call_id, "rtc_test");
        assert_eq!(entries[0].caller, "09012345678");
    }

    #[tokio::test]
    async fn transcript_fragments_log_once_on_done() {
        let h = harness();
        run_frames(
            &h.bridge,
            &[
                json!({"type": "response.output_audio_transcript.delta", "delta": "Your "}),
                json!({"type": "response.output_audio_transcript.delta", "delta": "reservation "}),
                json!({"type": "response.output_audio_transcript.delta", "delta": "is confirmed."}),
                json!({"type": "response.output_audio_transcript.done", "transcript": "Your reservation is confirmed."}),
                json!({"type": "response.done"}),
            ],
        )
        .await;

        assert_eq!(
            texts(&h.sink),
            vec![
                (Speaker::Assistant, GREETING.to_string()),
                (Speaker::Assistant, "Your reservation is confirmed.".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn transcript_done_without_text_uses_buffer() {
        let h = harness();
        run_frames(
            &h.bridge,
            &[
                json!({"type": "response.output_audio_transcript.delta", "delta": " Hello"}),
                json!({"type": "response.output_audio_transcript.delta", "delta": " there "}),
                json!({"type": "response.output_audio_transcript.done", "transcript": "  "}),
            ],
        )
        .await;
        assert_eq!(texts(&h.sink)[1], (Speaker::Assistant, "Hello there".to_string()));
    }

    #[tokio::test]
    async fn text_fragments_flush_on_completion() {
        let h = harness();
        run_frames(
            &h.bridge,
            &[
                json!({"type": "response.output_text.delta", "delta": "ご予約"}),
                json!({"type": "response.output_text.delta", "delta": {"content": [{"type": "output_text", "text": "承りました"}]}}),
                json!({"type": "response.completed"}),
                json!({"type": "response.output_text.done"}),
            ],
        )
        .await;
        assert_eq!(
            texts(&h.sink),
            vec![
                (Speaker::Assistant, GREETING.to_string()),
                (Speaker::Assistant, "ご予約承りました".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn blank_turn_is_not_logged() {
        let h = harness();
        run_frames(
            &h.bridge,
            &[
                json!({"type": "response.output_text.delta", "delta": "   "}),
                json!({"type": "response.done"}),
            ],
        )
        .await;
        assert_eq!(h.sink.entries().len(), 1);
    }

    #[tokio::test]
    async fn create_task_call_replies_and_continues() {
        let h = harness();
        let sent = run_frames(
            &h.bridge,
            &[
                json!({"type": "response.function_call_arguments.delta", "call_id": "call_1", "name": "create_task", "delta": "{\"name\":"}),
                json!({"type": "response.function_call_arguments.delta", "call_id": "call_1", "delta": "\"Tanaka\"}"}),
                json!({"type": "response.function_call_arguments.done", "call_id": "call_1", "name": "create_task", "arguments": "{\"name\":\"Tanaka\"}"}),
            ],
        )
        .await;

        assert_eq!(*h.seen.lock().unwrap(), vec![json!({"name": "Tanaka"})]);
        assert_eq!(sent.len(), 4);
        let ClientEvent::ConversationItemCreate { item, .. } = &sent[2] else {
            panic!("expected conversation.item.create, got {:?}", sent[2]);
        };
        let Item::FunctionCallOutput { call_id, output, .. } = item.as_ref() else {
            panic!("expected function_call_output, got {item:?}");
        };
        assert_eq!(call_id, "call_1");
        assert_eq!(
            serde_json::from_str::<Value>(output).unwrap(),
            json!({"item": {"name": "Tanaka"}})
        );
        assert_eq!(sent[3], ClientEvent::response_create(None));
    }

    #[tokio::test]
    async fn unknown_tool_still_continues() {
        let h = harness();
        let sent = run_frames(
            &h.bridge,
            &[json!({"type": "response.function_call_arguments.done", "call_id": "call_x", "name": "teleport", "arguments": "{}"})],
        )
        .await;

        assert_eq!(
            sent[2],
            ClientEvent::function_call_output("call_x", r#"{"error":"unknown tool: teleport"}"#)
        );
        assert_eq!(sent[3], ClientEvent::response_create(None));
    }

    #[tokio::test]
    async fn failing_tool_does_not_stop_the_loop() {
        let h = harness();
        let sent = run_frames(
            &h.bridge,
            &[
                json!({"type": "response.function_call_arguments.done", "call_id": "call_f", "name": "fails", "arguments": "{}"}),
                json!({"type": "response.output_audio_transcript.done", "transcript": "Sorry about that."}),
            ],
        )
        .await;

        let ClientEvent::ConversationItemCreate { item, .. } = &sent[2] else {
            panic!("expected tool output, got {:?}", sent[2]);
        };
        let Item::FunctionCallOutput { output, .. } = item.as_ref() else {
            panic!("expected function_call_output, got {item:?}");
        };
        assert!(output.contains("backend down"));
        assert_eq!(texts(&h.sink)[1], (Speaker::Assistant, "Sorry about that.".to_string()));
    }

    #[tokio::test]
    async fn malformed_frames_are_skipped() {
        let h = harness();
        run_raw(
            &h.bridge,
            vec![
                "not json at all".to_string(),
                r#"{"type":"session.created","session":{}}"#.to_string(),
                r#"{"type":"response.output_audio_transcript.done","transcript":"Still here."}"#
                    .to_string(),
            ],
        )
        .await;
        assert_eq!(texts(&h.sink)[1], (Speaker::Assistant, "Still here.".to_string()));
    }

    #[tokio::test]
    async fn duplicate_and_anonymous_completions_are_not_run() {
        let h = harness();
        let done = json!({"type": "response.function_call_arguments.done", "call_id": "call_1", "name": "create_task", "arguments": "{\"name\":\"A\"}"});
        let sent = run_frames(
            &h.bridge,
            &[
                done.clone(),
                done,
                json!({"type": "response.function_call_arguments.done", "name": "create_task", "arguments": "{\"name\":\"B\"}"}),
            ],
        )
        .await;

        assert_eq!(h.seen.lock().unwrap().len(), 1);
        assert_eq!(sent.len(), 4);
    }

    #[tokio::test]
    async fn caller_transcripts_from_every_shape_are_logged() {
        let h = harness();
        run_frames(
            &h.bridge,
            &[
                json!({"type": "conversation.item.input_audio_transcription.delta", "delta": "もし"}),
                json!({"type": "conversation.item.input_audio_transcription.completed", "transcript": " 予約したいです "}),
                json!({"type": "input_audio_transcription.completed", "transcription": {"text": "田中です"}}),
                json!({"type": "conversation.item.input_audio_transcription.completed", "transcript": "  "}),
                json!({"type": "conversation.item.done", "item": {
                    "type": "message", "role": "user",
                    "content": [{"type": "input_audio", "transcript": "明日の10時"}]
                }}),
            ],
        )
        .await;

        assert_eq!(
            texts(&h.sink)[1..],
            [
                (Speaker::Caller, "予約したいです".to_string()),
                (Speaker::Caller, "田中です".to_string()),
                (Speaker::Caller, "明日の10時".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn error_events_do_not_end_the_session() {
        let h = harness();
        run_frames(
            &h.bridge,
            &[
                json!({"type": "error", "error": {"type": "invalid_request_error", "message": "bad"}}),
                json!({"type": "input_audio_buffer.committed", "item_id": "item_1"}),
                json!({"type": "response.output_audio_transcript.done", "transcript": "ok"}),
            ],
        )
        .await;
        assert_eq!(h.sink.entries().len(), 2);
    }

    #[tokio::test]
    async fn failed_session_update_still_greets_and_listens() {
        let h = harness();
        let (sent, closed) = run_script(
            &h.bridge,
            vec![Ok(
                json!({"type": "response.output_audio_transcript.done", "transcript": "Go ahead."})
                    .to_string(),
            )],
            Some(0),
        )
        .await;

        assert_eq!(sent.len(), 1);
        assert!(matches!(sent[0], ClientEvent::ResponseCreate { .. }));
        assert_eq!(
            texts(&h.sink),
            vec![
                (Speaker::Assistant, GREETING.to_string()),
                (Speaker::Assistant, "Go ahead.".to_string()),
            ]
        );
        assert!(closed);
    }

    #[tokio::test]
    async fn failed_greeting_closes_without_listening() {
        let h = harness();
        let (sent, closed) = run_script(
            &h.bridge,
            vec![Ok(
                json!({"type": "response.output_audio_transcript.done", "transcript": "unheard"})
                    .to_string(),
            )],
            Some(1),
        )
        .await;

        assert_eq!(sent.len(), 1);
        assert!(h.sink.entries().is_empty());
        assert!(closed);
    }

    #[tokio::test]
    async fn receive_error_ends_the_session_and_closes() {
        let h = harness();
        let (_, closed) = run_script(
            &h.bridge,
            vec![
                Ok(json!({"type": "response.output_audio_transcript.done", "transcript": "First."})
                    .to_string()),
                Err(Error::ConnectionClosed),
                Ok(json!({"type": "response.output_audio_transcript.done", "transcript": "Never."})
                    .to_string()),
            ],
            None,
        )
        .await;

        assert_eq!(
            texts(&h.sink),
            vec![
                (Speaker::Assistant, GREETING.to_string()),
                (Speaker::Assistant, "First.".to_string()),
            ]
        );
        assert!(closed);
    }

    #[tokio::test]
    async fn error_events_of_any_shape_keep_the_session_alive() {
        let h = harness();
        run_frames(
            &h.bridge,
            &[
                json!({"type": "error", "error": {"message": "bad", "code": 400}}),
                json!({"type": "error", "error": {"message": "bad", "param": ["a"]}}),
                json!({"type": "error", "error": "rate limited"}),
                json!({"type": "response.output_audio_transcript.done", "transcript": "still here"}),
            ],
        )
        .await;
        assert_eq!(texts(&h.sink)[1], (Speaker::Assistant, "still here".to_string()));
    }

    struct OneShotConnector {
        transport: Mutex<Option<Box<dyn Transport>>>,
    }

    impl Connector for OneShotConnector {
        fn connect<'a>(&'a self, _call_id: &'a str) -> BoxFuture<'a, Result<Box<dyn Transport>>> {
            let transport = self.transport.lock().unwrap().take();
            Box::pin(async move { transport.ok_or(Error::ConnectionClosed) })
        }
    }

    #[tokio::test]
    async fn start_runs_on_a_spawned_task() {
        let (in_tx, in_rx) = mpsc::channel(1);
        let (out_tx, _out_rx) = mpsc::unbounded_channel();
        drop(in_tx);
        let connector = Arc::new(OneShotConnector {
            transport: Mutex::new(Some(Box::new(MockTransport::new(in_rx, out_tx)))),
        });
        let sink = Arc::new(MemoryCallLogSink::new());
        let bridge = CallBridge::builder()
            .connector(connector)
            .call_log(sink.clone())
            .build()
            .unwrap();

        bridge
            .start(CallContext::new("rtc_a", None, "hello"))
            .await
            .unwrap();
        // A second call finds no transport and ends without logging.
        bridge
            .start(CallContext::new("rtc_b", None, "hello"))
            .await
            .unwrap();

        let entries = sink.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].call_id, "rtc_a");
        assert_eq!(entries[0].caller, "unknown");
    }

    #[test]
    fn builder_requires_credentials() {
        assert!(matches!(
            CallBridge::builder().build(),
            Err(Error::Config(_))
        ));
    }
}
