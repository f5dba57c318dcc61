//! Runtime configuration.
//!
//! Values come from the environment (after `.env` is loaded by the binary).
//! A YAML file, when given, overrides any of them:
//!
//! ```yaml
//! api_key: "sk-..."
//! bind_addr: "127.0.0.1:8000"
//! model: "gpt-realtime"
//! greeting: "お電話ありがとうございます。"
//! transcription_model: "whisper-1"
//! transcription_language: "ja"
//! system_prompt_path: "system_prompt.txt"
//! faq_kb_path: "faq.txt"
//! call_log_path: "calls.jsonl"
//! tasks_path: "tasks.json"
//! default_phone_number: "0312345678"
//! client_id: "default"
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::bridge::session::{DEFAULT_TRANSCRIPTION_LANGUAGE, DEFAULT_TRANSCRIPTION_MODEL};
use crate::prompt::DEFAULT_GREETING;
use crate::protocol::models::DEFAULT_MODEL;
use crate::{Error, Result};

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8000";
pub const DEFAULT_SYSTEM_PROMPT_PATH: &str = "system_prompt.txt";
pub const DEFAULT_FAQ_PATH: &str = "faq.txt";
pub const DEFAULT_CLIENT_ID: &str = "default";

#[derive(Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    pub api_key: String,
    pub bind_addr: SocketAddr,
    pub model: String,
    pub greeting: String,
    pub transcription_model: String,
    pub transcription_language: String,
    pub system_prompt_path: PathBuf,
    pub faq_path: PathBuf,
    /// JSONL call log; `None` logs conversation lines through `tracing` only.
    pub call_log_path: Option<PathBuf>,
    /// JSON file backing the reservation tasks; `None` keeps them in memory.
    pub tasks_path: Option<PathBuf>,
    /// Caller number used when the webhook carries none.
    pub default_phone_number: Option<String>,
    /// Tenant the reservation tools operate on.
    pub client_id: String,
}

impl std::fmt::Debug for BridgeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeConfig")
            .field("api_key", &"<redacted>")
            .field("bind_addr", &self.bind_addr)
            .field("model", &self.model)
            .field("transcription_model", &self.transcription_model)
            .field("transcription_language", &self.transcription_language)
            .field("system_prompt_path", &self.system_prompt_path)
            .field("faq_path", &self.faq_path)
            .field("call_log_path", &self.call_log_path)
            .field("tasks_path", &self.tasks_path)
            .field("default_phone_number", &self.default_phone_number)
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

impl BridgeConfig {
    /// # Errors
    /// Returns [`Error::Config`] if `OPENAI_API_KEY` is missing or
    /// `BIND_ADDR` is not a socket address.
    #[allow(clippy::result_large_err)]
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(env_var)
    }

    /// Like [`BridgeConfig::from_env`], with variables read through `lookup`.
    ///
    /// # Errors
    /// See [`BridgeConfig::from_env`].
    #[allow(clippy::result_large_err)]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        Settings::from_lookup(lookup).resolve()
    }

    /// Environment values overridden by the YAML file at `path`.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed, or if the merged
    /// values fail validation.
    #[allow(clippy::result_large_err)]
    pub fn from_file(path: &Path) -> Result<Self> {
        Self::from_file_with(path, env_var)
    }

    /// # Errors
    /// See [`BridgeConfig::from_file`].
    #[allow(clippy::result_large_err)]
    pub fn from_file_with(path: &Path, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("failed to read config file {}: {e}", path.display()))
        })?;
        let file: Settings = serde_yaml::from_str(&contents)?;
        Settings::from_lookup(lookup).overlay(file).resolve()
    }
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Unvalidated values from one source.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct Settings {
    api_key: Option<String>,
    bind_addr: Option<String>,
    model: Option<String>,
    greeting: Option<String>,
    transcription_model: Option<String>,
    transcription_language: Option<String>,
    system_prompt_path: Option<PathBuf>,
    faq_kb_path: Option<PathBuf>,
    call_log_path: Option<PathBuf>,
    tasks_path: Option<PathBuf>,
    default_phone_number: Option<String>,
    client_id: Option<String>,
}

impl Settings {
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        Self {
            api_key: get("OPENAI_API_KEY"),
            bind_addr: get("BIND_ADDR"),
            model: get("REALTIME_MODEL"),
            greeting: get("GREETING_TEXT"),
            transcription_model: get("TRANSCRIPTION_MODEL"),
            transcription_language: get("TRANSCRIPTION_LANGUAGE"),
            system_prompt_path: get("SYSTEM_PROMPT_PATH").map(PathBuf::from),
            faq_kb_path: get("FAQ_KB_PATH").map(PathBuf::from),
            call_log_path: get("CALL_LOG_PATH").map(PathBuf::from),
            tasks_path: get("TASKS_PATH").map(PathBuf::from),
            default_phone_number: get("DEFAULT_PHONE_NUMBER"),
            client_id: get("CLIENT_ID"),
        }
    }

    fn overlay(self, over: Self) -> Self {
        Self {
            api_key: over.api_key.or(self.api_key),
            bind_addr: over.bind_addr.or(self.bind_addr),
            model: over.model.or(self.model),
            greeting: over.greeting.or(self.greeting),
            transcription_model: over.transcription_model.or(self.transcription_model),
            transcription_language: over.transcription_language.or(self.transcription_language),
            system_prompt_path: over.system_prompt_path.or(self.system_prompt_path),
            faq_kb_path: over.faq_kb_path.or(self.faq_kb_path),
            call_log_path: over.call_log_path.or(self.call_log_path),
            tasks_path: over.tasks_path.or(self.tasks_path),
            default_phone_number: over.default_phone_number.or(self.default_phone_number),
            client_id: over.client_id.or(self.client_id),
        }
    }

    #[allow(clippy::result_large_err)]
    fn resolve(self) -> Result<BridgeConfig> {
        let api_key = self
            .api_key
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| Error::Config("OPENAI_API_KEY is required".to_string()))?;
        let bind = self.bind_addr.as_deref().unwrap_or(DEFAULT_BIND_ADDR);
        let bind_addr = bind
            .parse()
            .map_err(|e| Error::Config(format!("invalid bind address {bind:?}: {e}")))?;

        Ok(BridgeConfig {
            api_key,
            bind_addr,
            model: self.model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            greeting: self.greeting.unwrap_or_else(|| DEFAULT_GREETING.to_string()),
            transcription_model: self
                .transcription_model
                .unwrap_or_else(|| DEFAULT_TRANSCRIPTION_MODEL.to_string()),
            transcription_language: self
                .transcription_language
                .unwrap_or_else(|| DEFAULT_TRANSCRIPTION_LANGUAGE.to_string()),
            system_prompt_path: self
                .system_prompt_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SYSTEM_PROMPT_PATH)),
            faq_path: self
                .faq_kb_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_FAQ_PATH)),
            call_log_path: self.call_log_path,
            tasks_path: self.tasks_path,
            default_phone_number: self.default_phone_number,
            client_id: self
                .client_id
                .unwrap_or_else(|| DEFAULT_CLIENT_ID.to_string()),
        })
    }
}
