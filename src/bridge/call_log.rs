use std::path::{Path, PathBuf};
use std::sync::Mutex as StdMutex;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::{Error, Result};

pub const UNKNOWN_CALLER: &str = "unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Speaker {
    Assistant,
    Caller,
}

impl Speaker {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Assistant => "assistant",
            Self::Caller => "caller",
        }
    }

    const fn text_field(self) -> &'static str {
        match self {
            Self::Assistant => "assistant_text",
            Self::Caller => "user_text",
        }
    }
}

impl std::fmt::Display for Speaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One finalized turn of a call transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallLogEntry {
    pub caller: String,
    pub ts: DateTime<Utc>,
    pub speaker: Speaker,
    pub text: String,
    pub call_id: String,
}

impl CallLogEntry {
    #[must_use]
    pub fn new(
        caller: Option<&str>,
        speaker: Speaker,
        text: impl Into<String>,
        call_id: impl Into<String>,
    ) -> Self {
        Self {
            caller: caller.unwrap_or(UNKNOWN_CALLER).to_string(),
            ts: Utc::now(),
            speaker,
            text: text.into(),
            call_id: call_id.into(),
        }
    }
}

/// Serialized as `{phone_number, ts, assistant_text | user_text, call_sid}`.
impl Serialize for CallLogEntry {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut state = serializer.serialize_struct("CallLogEntry", 4)?;
        state.serialize_field("phone_number", &self.caller)?;
        state.serialize_field("ts", &self.ts.to_rfc3339_opts(SecondsFormat::Micros, true))?;
        state.serialize_field(self.speaker.text_field(), &self.text)?;
        state.serialize_field("call_sid", &self.call_id)?;
        state.end()
    }
}

/// Durable store for transcript turns.
///
/// Writes are best effort: the session logs a failed append and carries on.
#[async_trait]
pub trait CallLogSink: Send + Sync {
    async fn append(&self, entry: &CallLogEntry) -> Result<()>;
}

/// Emits each turn as a structured `tracing` event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingCallLogSink;

#[async_trait]
impl CallLogSink for TracingCallLogSink {
    async fn append(&self, entry: &CallLogEntry) -> Result<()> {
        tracing::info!(
            target: "call_log",
            caller = %entry.caller,
            speaker = %entry.speaker,
            call_id = %entry.call_id,
            ts = %entry.ts.to_rfc3339_opts(SecondsFormat::Micros, true),
            "{}",
            entry.text
        );
        Ok(())
    }
}

/// Appends one JSON object per line to a file.
#[derive(Debug)]
pub struct JsonlCallLogSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonlCallLogSink {
    /// Open (or create) `path` for appending.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl CallLogSink for JsonlCallLogSink {
    async fn append(&self, entry: &CallLogEntry) -> Result<()> {
        let mut line = serde_json::to_vec(entry)?;
        line.push(b'\n');
        let mut file = self.file.lock().await;
        file.write_all(&line)
            .await
            .map_err(|e| Error::CallLog(format!("{}: {e}", self.path.display())))?;
        file.flush().await?;
        Ok(())
    }
}

/// Keeps entries in memory, in append order.
#[derive(Debug, Default)]
pub struct MemoryCallLogSink {
    entries: StdMutex<Vec<CallLogEntry>>,
}

impl MemoryCallLogSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn entries(&self) -> Vec<CallLogEntry> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl CallLogSink for MemoryCallLogSink {
    async fn append(&self, entry: &CallLogEntry) -> Result<()> {
        self.entries
            .lock()
            .map_err(|_| Error::CallLog("memory sink poisoned".to_string()))?
            .push(entry.clone());
        Ok(())
    }
}
