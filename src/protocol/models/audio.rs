use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct AudioConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<InputAudioConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct InputAudioConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcription: Option<InputAudioTranscription>,
}

/// Server-side ASR settings. Caller transcription events are only emitted
/// when a transcription model is configured on the session.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct InputAudioTranscription {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
}

impl InputAudioTranscription {
    #[must_use]
    pub fn new(model: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            model: Some(model.into()),
            language: Some(language.into()),
            prompt: None,
        }
    }
}

impl AudioConfig {
    #[must_use]
    pub fn with_transcription(transcription: InputAudioTranscription) -> Self {
        Self {
            input: Some(InputAudioConfig {
                transcription: Some(transcription),
            }),
        }
    }
}
