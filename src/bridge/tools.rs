use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use schemars::JsonSchema;
use schemars::schema::RootSchema;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use super::transport::BoxFuture;
use crate::protocol::models::Tool;
use crate::{Error, Result};

type ToolHandler = Box<dyn Fn(Value) -> BoxFuture<'static, Result<Value>> + Send + Sync>;

#[derive(Clone, Debug)]
pub struct ToolDefinition {
    pub name: String,
    pub description: Option<String>,
    pub schema: RootSchema,
}

/// A completed function call, ready to run.
#[derive(Clone, Debug, PartialEq)]
pub struct ToolCall {
    pub name: String,
    pub call_id: String,
    pub arguments: Value,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ToolResult {
    pub call_id: String,
    pub output: Value,
}

impl ToolResult {
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.output.get("error").is_some()
    }
}

/// Named async functions the model may call during a session.
///
/// Shared read-only across every concurrent call once built.
#[derive(Default)]
pub struct ToolRegistry {
    defs: Vec<ToolDefinition>,
    handlers: HashMap<String, ToolHandler>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.defs.iter().map(|d| &d.name).collect::<Vec<_>>())
            .finish()
    }
}

impl ToolRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn definitions(&self) -> &[ToolDefinition] {
        &self.defs
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }

    pub fn tool<TArgs, TResp, F, Fut>(&mut self, name: &str, handler: F)
    where
        TArgs: DeserializeOwned + JsonSchema + Send + 'static,
        TResp: Serialize + Send + 'static,
        F: Fn(TArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<TResp>> + Send + 'static,
    {
        self.register(name, None, handler);
    }

    pub fn tool_with_description<TArgs, TResp, F, Fut>(
        &mut self,
        name: &str,
        description: impl Into<String>,
        handler: F,
    ) where
        TArgs: DeserializeOwned + JsonSchema + Send + 'static,
        TResp: Serialize + Send + 'static,
        F: Fn(TArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<TResp>> + Send + 'static,
    {
        self.register(name, Some(description.into()), handler);
    }

    fn register<TArgs, TResp, F, Fut>(&mut self, name: &str, description: Option<String>, handler: F)
    where
        TArgs: DeserializeOwned + JsonSchema + Send + 'static,
        TResp: Serialize + Send + 'static,
        F: Fn(TArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<TResp>> + Send + 'static,
    {
        let schema = schemars::schema_for!(TArgs);
        let name = name.to_string();
        let entry = ToolDefinition {
            name: name.clone(),
            description,
            schema,
        };
        // Re-registering a name replaces the earlier tool.
        match self.defs.iter_mut().find(|d| d.name == name) {
            Some(existing) => *existing = entry,
            None => self.defs.push(entry),
        }

        let user_handler = Arc::new(handler);
        let handler = move |value: Value| -> BoxFuture<'static, Result<Value>> {
            let user_handler = Arc::clone(&user_handler);
            Box::pin(async move {
                let args: TArgs = serde_json::from_value(value)
                    .map_err(|e| Error::InvalidArguments(e.to_string()))?;
                let resp = user_handler(args).await?;
                serde_json::to_value(resp).map_err(|e| Error::Tool(e.to_string()))
            })
        };

        self.handlers.insert(name, Box::new(handler));
    }

    /// Protocol-level tool definitions for `session.update`.
    ///
    /// # Errors
    /// Returns an error if schema serialization fails.
    #[allow(clippy::result_large_err)]
    pub fn try_as_tools(&self) -> Result<Vec<Tool>> {
        self.defs
            .iter()
            .map(|def| {
                Ok(Tool::Function {
                    name: def.name.clone(),
                    description: def.description.clone(),
                    parameters: serde_json::to_value(&def.schema)?,
                })
            })
            .collect()
    }

    /// Run `name` with `arguments`.
    ///
    /// # Errors
    /// [`Error::UnknownTool`] if nothing is registered under `name`,
    /// [`Error::InvalidArguments`] if the arguments do not fit the tool, or
    /// whatever the tool itself returns. A panicking tool is reported as
    /// [`Error::Tool`].
    pub async fn invoke(&self, name: &str, arguments: Value) -> Result<Value> {
        let handler = self
            .handlers
            .get(name)
            .ok_or_else(|| Error::UnknownTool(name.to_string()))?;
        match AssertUnwindSafe(handler(arguments)).catch_unwind().await {
            Ok(result) => result,
            Err(_) => Err(Error::Tool(format!("{name} panicked"))),
        }
    }

    /// Run a call to completion; failures become an `{"error": …}` payload.
    pub async fn dispatch(&self, call: ToolCall) -> ToolResult {
        let output = match self.invoke(&call.name, call.arguments).await {
            Ok(output) => output,
            Err(err) => {
                tracing::warn!(tool = %call.name, call_id = %call.call_id, "Tool call failed: {err}");
                json!({ "error": err.to_string() })
            }
        };
        ToolResult {
            call_id: call.call_id,
            output,
        }
    }
}
