use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::models::{Item, ResponseConfig, SessionUpdate};
use crate::error::{Error, Result};

/// Outbound events the call bridge writes to the realtime connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    #[serde(rename = "session.update")]
    SessionUpdate {
        #[serde(skip_serializing_if = "Option::is_none")]
        event_id: Option<String>,
        session: Box<SessionUpdate>,
    },
    #[serde(rename = "conversation.item.create")]
    ConversationItemCreate {
        #[serde(skip_serializing_if = "Option::is_none")]
        event_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        previous_item_id: Option<String>,
        item: Box<Item>,
    },
    #[serde(rename = "response.create")]
    ResponseCreate {
        #[serde(skip_serializing_if = "Option::is_none")]
        event_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        response: Option<Box<ResponseConfig>>,
    },
}

impl ClientEvent {
    #[must_use]
    pub fn session_update(session: SessionUpdate) -> Self {
        Self::SessionUpdate {
            event_id: None,
            session: Box::new(session),
        }
    }

    /// `response.create`, optionally with per-response instructions.
    #[must_use]
    pub fn response_create(instructions: Option<String>) -> Self {
        Self::ResponseCreate {
            event_id: None,
            response: instructions.map(|text| Box::new(ResponseConfig::with_instructions(text))),
        }
    }

    #[must_use]
    pub fn function_call_output(call_id: impl Into<String>, output: impl Into<String>) -> Self {
        Self::ConversationItemCreate {
            event_id: None,
            previous_item_id: None,
            item: Box::new(Item::function_call_output(call_id, output)),
        }
    }

    /// Reject events the server would refuse anyway.
    ///
    /// # Errors
    /// Returns [`Error::InvalidClientEvent`] for a function output without a
    /// call id, or a tool list with blank or duplicate names.
    #[allow(clippy::result_large_err)]
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::ConversationItemCreate { item, .. } => match item.as_ref() {
                Item::FunctionCallOutput { call_id, .. } if call_id.trim().is_empty() => Err(
                    Error::InvalidClientEvent("function_call_output requires a call_id".to_string()),
                ),
                _ => Ok(()),
            },
            Self::SessionUpdate { session, .. } => {
                let Some(tools) = &session.tools else {
                    return Ok(());
                };
                let mut seen = HashSet::new();
                for tool in tools {
                    let name = tool.name();
                    if name.trim().is_empty() {
                        return Err(Error::InvalidClientEvent(
                            "tool name must not be empty".to_string(),
                        ));
                    }
                    if !seen.insert(name) {
                        return Err(Error::InvalidClientEvent(format!(
                            "duplicate tool name: {name}"
                        )));
                    }
                }
                Ok(())
            }
            Self::ResponseCreate { .. } => Ok(()),
        }
    }
}
