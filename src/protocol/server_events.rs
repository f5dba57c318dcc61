use serde::{Deserialize, Deserializer};

use super::models::{ArbitraryJson, ContentPart, Item};
use crate::error::{Result, ServerError};

/// Inbound realtime events the call bridge reacts to.
///
/// Event types that are not listed here, or known types whose payload does not
/// match, deserialize into [`ServerEvent::Unknown`] instead of failing.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    Error {
        event_id: Option<String>,
        error: ServerError,
    },
    InputAudioBufferCommitted {
        event_id: Option<String>,
        item_id: Option<String>,
    },
    ResponseOutputTextDelta {
        event_id: Option<String>,
        delta: TextDelta,
    },
    ResponseOutputTextDone {
        event_id: Option<String>,
        text: Option<String>,
    },
    ResponseOutputAudioTranscriptDelta {
        event_id: Option<String>,
        delta: String,
    },
    ResponseOutputAudioTranscriptDone {
        event_id: Option<String>,
        transcript: Option<String>,
    },
    ResponseDone {
        event_id: Option<String>,
    },
    ResponseFunctionCallArgumentsDelta {
        event_id: Option<String>,
        call_id: Option<String>,
        name: Option<String>,
        delta: String,
    },
    ResponseFunctionCallArgumentsDone {
        event_id: Option<String>,
        call_id: Option<String>,
        name: Option<String>,
        arguments: Option<String>,
    },
    InputAudioTranscriptionDelta {
        event_id: Option<String>,
        item_id: Option<String>,
        delta: String,
    },
    InputAudioTranscriptionCompleted {
        event_id: Option<String>,
        item_id: Option<String>,
        transcript: Option<String>,
        transcription: Option<NestedTranscription>,
    },
    ConversationItemAdded {
        event_id: Option<String>,
        item: Item,
    },
    ConversationItemDone {
        event_id: Option<String>,
        item: Item,
    },
    Unknown(ArbitraryJson),
}

/// Text deltas arrive either as a bare string or as a list of content parts.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum TextDelta {
    Text(String),
    Parts {
        #[serde(default)]
        content: Vec<ContentPart>,
    },
}

impl TextDelta {
    /// The fragment text; for content lists, every `output_text` part in order.
    #[must_use]
    pub fn text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Parts { content } => content.iter().filter_map(ContentPart::output_text).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Default)]
pub struct NestedTranscription {
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
enum ServerEventRepr {
    #[serde(rename = "error")]
    Error {
        event_id: Option<String>,
        error: ServerError,
    },
    #[serde(rename = "input_audio_buffer.committed")]
    InputAudioBufferCommitted {
        event_id: Option<String>,
        item_id: Option<String>,
    },
    #[serde(rename = "response.output_text.delta")]
    ResponseOutputTextDelta {
        event_id: Option<String>,
        delta: TextDelta,
    },
    #[serde(rename = "response.output_text.done")]
    ResponseOutputTextDone {
        event_id: Option<String>,
        text: Option<String>,
    },
    #[serde(rename = "response.output_audio_transcript.delta")]
    ResponseOutputAudioTranscriptDelta {
        event_id: Option<String>,
        #[serde(default)]
        delta: String,
    },
    #[serde(rename = "response.output_audio_transcript.done")]
    ResponseOutputAudioTranscriptDone {
        event_id: Option<String>,
        transcript: Option<String>,
    },
    #[serde(rename = "response.done", alias = "response.completed")]
    ResponseDone { event_id: Option<String> },
    #[serde(rename = "response.function_call_arguments.delta")]
    ResponseFunctionCallArgumentsDelta {
        event_id: Option<String>,
        call_id: Option<String>,
        name: Option<String>,
        #[serde(default)]
        delta: String,
    },
    #[serde(rename = "response.function_call_arguments.done")]
    ResponseFunctionCallArgumentsDone {
        event_id: Option<String>,
        call_id: Option<String>,
        name: Option<String>,
        arguments: Option<String>,
    },
    #[serde(rename = "conversation.item.input_audio_transcription.delta")]
    InputAudioTranscriptionDelta {
        event_id: Option<String>,
        item_id: Option<String>,
        #[serde(default)]
        delta: String,
    },
    #[serde(
        rename = "conversation.item.input_audio_transcription.completed",
        alias = "input_audio_transcription.completed"
    )]
    InputAudioTranscriptionCompleted {
        event_id: Option<String>,
        item_id: Option<String>,
        transcript: Option<String>,
        transcription: Option<NestedTranscription>,
    },
    #[serde(rename = "conversation.item.added")]
    ConversationItemAdded { event_id: Option<String>, item: Item },
    #[serde(rename = "conversation.item.done")]
    ConversationItemDone { event_id: Option<String>, item: Item },
}

impl From<ServerEventRepr> for ServerEvent {
    fn from(repr: ServerEventRepr) -> Self {
        match repr {
            ServerEventRepr::Error { event_id, error } => Self::Error { event_id, error },
            ServerEventRepr::InputAudioBufferCommitted { event_id, item_id } => {
                Self::InputAudioBufferCommitted { event_id, item_id }
            }
            ServerEventRepr::ResponseOutputTextDelta { event_id, delta } => {
                Self::ResponseOutputTextDelta { event_id, delta }
            }
            ServerEventRepr::ResponseOutputTextDone { event_id, text } => {
                Self::ResponseOutputTextDone { event_id, text }
            }
            ServerEventRepr::ResponseOutputAudioTranscriptDelta { event_id, delta } => {
                Self::ResponseOutputAudioTranscriptDelta { event_id, delta }
            }
            ServerEventRepr::ResponseOutputAudioTranscriptDone {
                event_id,
                transcript,
            } => Self::ResponseOutputAudioTranscriptDone {
                event_id,
                transcript,
            },
            ServerEventRepr::ResponseDone { event_id } => Self::ResponseDone { event_id },
            ServerEventRepr::ResponseFunctionCallArgumentsDelta {
                event_id,
                call_id,
                name,
                delta,
            } => Self::ResponseFunctionCallArgumentsDelta {
                event_id,
                call_id,
                name,
                delta,
            },
            ServerEventRepr::ResponseFunctionCallArgumentsDone {
                event_id,
                call_id,
                name,
                arguments,
            } => Self::ResponseFunctionCallArgumentsDone {
                event_id,
                call_id,
                name,
                arguments,
            },
            ServerEventRepr::InputAudioTranscriptionDelta {
                event_id,
                item_id,
                delta,
            } => Self::InputAudioTranscriptionDelta {
                event_id,
                item_id,
                delta,
            },
            ServerEventRepr::InputAudioTranscriptionCompleted {
                event_id,
                item_id,
                transcript,
                transcription,
            } => Self::InputAudioTranscriptionCompleted {
                event_id,
                item_id,
                transcript,
                transcription,
            },
            ServerEventRepr::ConversationItemAdded { event_id, item } => {
                Self::ConversationItemAdded { event_id, item }
            }
            ServerEventRepr::ConversationItemDone { event_id, item } => {
                Self::ConversationItemDone { event_id, item }
            }
        }
    }
}

impl<'de> Deserialize<'de> for ServerEvent {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = ArbitraryJson::deserialize(deserializer)?;
        match ServerEventRepr::deserialize(value.clone()) {
            Ok(repr) => Ok(repr.into()),
            Err(err) => {
                tracing::debug!("Failed to parse ServerEvent: {err}");
                Ok(Self::Unknown(value))
            }
        }
    }
}

impl ServerEvent {
    /// Parse one text frame.
    ///
    /// # Errors
    /// Returns an error only when the frame is not JSON at all; unrecognised
    /// JSON events become [`ServerEvent::Unknown`].
    #[allow(clippy::result_large_err)]
    pub fn parse(frame: &str) -> Result<Self> {
        Ok(serde_json::from_str(frame)?)
    }

    /// The wire `type` tag of this event.
    #[must_use]
    pub fn event_type(&self) -> &str {
        match self {
            Self::Error { .. } => "error",
            Self::InputAudioBufferCommitted { .. } => "input_audio_buffer.committed",
            Self::ResponseOutputTextDelta { .. } => "response.output_text.delta",
            Self::ResponseOutputTextDone { .. } => "response.output_text.done",
            Self::ResponseOutputAudioTranscriptDelta { .. } => {
                "response.output_audio_transcript.delta"
            }
            Self::ResponseOutputAudioTranscriptDone { .. } => {
                "response.output_audio_transcript.done"
            }
            Self::ResponseDone { .. } => "response.done",
            Self::ResponseFunctionCallArgumentsDelta { .. } => {
                "response.function_call_arguments.delta"
            }
            Self::ResponseFunctionCallArgumentsDone { .. } => {
                "response.function_call_arguments.done"
            }
            Self::InputAudioTranscriptionDelta { .. } => {
                "conversation.item.input_audio_transcription.delta"
            }
            Self::InputAudioTranscriptionCompleted { .. } => {
                "conversation.item.input_audio_transcription.completed"
            }
            Self::ConversationItemAdded { .. } => "conversation.item.added",
            Self::ConversationItemDone { .. } => "conversation.item.done",
            Self::Unknown(value) => value
                .get("type")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown"),
        }
    }

    #[must_use]
    pub fn event_id(&self) -> Option<&str> {
        match self {
            Self::Error { event_id, .. }
            | Self::InputAudioBufferCommitted { event_id, .. }
            | Self::ResponseOutputTextDelta { event_id, .. }
            | Self::ResponseOutputTextDone { event_id, .. }
            | Self::ResponseOutputAudioTranscriptDelta { event_id, .. }
            | Self::ResponseOutputAudioTranscriptDone { event_id, .. }
            | Self::ResponseDone { event_id }
            | Self::ResponseFunctionCallArgumentsDelta { event_id, .. }
            | Self::ResponseFunctionCallArgumentsDone { event_id, .. }
            | Self::InputAudioTranscriptionDelta { event_id, .. }
            | Self::InputAudioTranscriptionCompleted { event_id, .. }
            | Self::ConversationItemAdded { event_id, .. }
            | Self::ConversationItemDone { event_id, .. } => event_id.as_deref(),
            Self::Unknown(value) => value.get("event_id").and_then(|v| v.as_str()),
        }
    }
}
