//! Reservation tasks and the tools that manage them during a call.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use schemars::JsonSchema;
use schemars::r#gen::SchemaGenerator;
use schemars::schema::Schema;
use serde::{Deserialize, Deserializer, Serialize};
use tokio::sync::{Mutex, RwLock};

use crate::Result;
use crate::bridge::ToolRegistry;

pub const MAX_LIST_LIMIT: u32 = 200;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub client_id: String,
    pub name: String,
    pub request: String,
    pub start_datetime: String,
    pub phone_number: String,
    pub address: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Fields that `update_task` may change; `None` leaves a field alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, JsonSchema)]
pub struct TaskUpdate {
    pub request: Option<String>,
    /// Start date and time (YYYY-MM-DD HH:MM)
    pub start_datetime: Option<String>,
    pub phone_number: Option<String>,
    pub address: Option<String>,
}

impl TaskUpdate {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.request.is_none()
            && self.start_datetime.is_none()
            && self.phone_number.is_none()
            && self.address.is_none()
    }

    fn apply(self, task: &mut Task, now: &str) {
        if let Some(value) = self.request {
            task.request = value;
        }
        if let Some(value) = self.start_datetime {
            task.start_datetime = value;
        }
        if let Some(value) = self.phone_number {
            task.phone_number = value;
        }
        if let Some(value) = self.address {
            task.address = value;
        }
        task.updated_at = now.to_string();
    }
}

/// Tenant-scoped task storage keyed by `(client_id, name)`.
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn list(&self, client_id: &str, limit: usize) -> Result<Vec<Task>>;
    /// Insert or replace.
    async fn create(&self, task: Task) -> Result<()>;
    async fn get(&self, client_id: &str, name: &str) -> Result<Option<Task>>;
    /// Apply `update` to an existing task; `None` if there is no such task.
    async fn update(&self, client_id: &str, name: &str, update: TaskUpdate) -> Result<Option<Task>>;
    /// Returns whether a task was removed.
    async fn delete(&self, client_id: &str, name: &str) -> Result<bool>;
}

#[derive(Debug, Default)]
pub struct InMemoryTaskStore {
    tasks: RwLock<TaskMap>,
}

impl InMemoryTaskStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn key(client_id: &str, name: &str) -> (String, String) {
    (client_id.to_string(), name.to_string())
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn list(&self, client_id: &str, limit: usize) -> Result<Vec<Task>> {
        let tasks = self.tasks.read().await;
        Ok(tasks
            .values()
            .filter(|task| task.client_id == client_id)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn create(&self, task: Task) -> Result<()> {
        self.tasks
            .write()
            .await
            .insert(key(&task.client_id, &task.name), task);
        Ok(())
    }

    async fn get(&self, client_id: &str, name: &str) -> Result<Option<Task>> {
        Ok(self.tasks.read().await.get(&key(client_id, name)).cloned())
    }

    async fn update(&self, client_id: &str, name: &str, update: TaskUpdate) -> Result<Option<Task>> {
        let mut tasks = self.tasks.write().await;
        Ok(tasks.get_mut(&key(client_id, name)).map(|task| {
            update.apply(task, &now_iso());
            task.clone()
        }))
    }

    async fn delete(&self, client_id: &str, name: &str) -> Result<bool> {
        Ok(self.tasks.write().await.remove(&key(client_id, name)).is_some())
    }
}

type TaskMap = BTreeMap<(String, String), Task>;

/// Keeps every task in one JSON file, rewritten after each change.
#[derive(Debug)]
pub struct JsonFileTaskStore {
    path: PathBuf,
    tasks: Mutex<TaskMap>,
}

impl JsonFileTaskStore {
    /// Load tasks from `path`; a missing file starts empty.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let tasks: Vec<Task> = match tokio::fs::read(&path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Vec::new(),
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(err) if err.kind() == ErrorKind::NotFound => Vec::new(),
            Err(err) => return Err(err.into()),
        };
        tracing::info!(path = %path.display(), count = tasks.len(), "Loaded tasks");
        let tasks = tasks
            .into_iter()
            .map(|task| (key(&task.client_id, &task.name), task))
            .collect();
        Ok(Self {
            path,
            tasks: Mutex::new(tasks),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write to a sibling temp file, then rename over the old one.
    async fn save(&self, tasks: &TaskMap) -> Result<()> {
        let records: Vec<&Task> = tasks.values().collect();
        let bytes = serde_json::to_vec_pretty(&records)?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl TaskStore for JsonFileTaskStore {
    async fn list(&self, client_id: &str, limit: usize) -> Result<Vec<Task>> {
        let tasks = self.tasks.lock().await;
        Ok(tasks
            .values()
            .filter(|task| task.client_id == client_id)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn create(&self, task: Task) -> Result<()> {
        let mut tasks = self.tasks.lock().await;
        tasks.insert(key(&task.client_id, &task.name), task);
        self.save(&tasks).await
    }

    async fn get(&self, client_id: &str, name: &str) -> Result<Option<Task>> {
        Ok(self.tasks.lock().await.get(&key(client_id, name)).cloned())
    }

    async fn update(&self, client_id: &str, name: &str, update: TaskUpdate) -> Result<Option<Task>> {
        let mut tasks = self.tasks.lock().await;
        let Some(task) = tasks.get_mut(&key(client_id, name)) else {
            return Ok(None);
        };
        update.apply(task, &now_iso());
        let task = task.clone();
        self.save(&tasks).await?;
        Ok(Some(task))
    }

    async fn delete(&self, client_id: &str, name: &str) -> Result<bool> {
        let mut tasks = self.tasks.lock().await;
        if tasks.remove(&key(client_id, name)).is_none() {
            return Ok(false);
        }
        self.save(&tasks).await?;
        Ok(true)
    }
}

fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, false)
}

/// Customer name. Advertised as required; an absent or null value reads as
/// empty so the tool can answer with a readable error instead of a
/// deserialization failure.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskName(pub String);

impl TaskName {
    fn non_blank(&self) -> Option<&str> {
        let name = self.0.trim();
        (!name.is_empty()).then_some(name)
    }
}

impl<'de> Deserialize<'de> for TaskName {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Self(Option::<String>::deserialize(deserializer)?.unwrap_or_default()))
    }
}

impl JsonSchema for TaskName {
    fn schema_name() -> String {
        "TaskName".to_string()
    }

    fn is_referenceable() -> bool {
        false
    }

    fn json_schema(generator: &mut SchemaGenerator) -> Schema {
        String::json_schema(generator)
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ListTasksArgs {
    #[schemars(range(min = 1, max = 200))]
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CreateTaskArgs {
    /// Customer name
    pub name: TaskName,
    /// Requirements or notes
    #[serde(alias = "requirement")]
    pub request: Option<String>,
    /// Start date and time (YYYY-MM-DD HH:MM)
    #[serde(alias = "start_date")]
    pub start_datetime: Option<String>,
    #[serde(alias = "phone")]
    pub phone_number: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct TaskNameArgs {
    pub name: TaskName,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct UpdateTaskArgs {
    pub name: TaskName,
    #[serde(flatten)]
    pub changes: TaskUpdate,
}

/// Tool result payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum TaskReply {
    Item { item: Task },
    Items { items: Vec<Task> },
    Ok { ok: bool },
    Error { error: String },
}

impl TaskReply {
    fn error(message: impl Into<String>) -> Self {
        Self::Error {
            error: message.into(),
        }
    }
}

const NAME_REQUIRED: &str = "name is required";
const NOT_FOUND: &str = "not found";
const NOTHING_TO_UPDATE: &str = "nothing to update";

/// The reservation tools bound to one tenant.
pub struct TaskTools {
    store: Arc<dyn TaskStore>,
    client_id: String,
}

impl TaskTools {
    #[must_use]
    pub fn new(store: Arc<dyn TaskStore>, client_id: impl Into<String>) -> Self {
        Self {
            store,
            client_id: client_id.into(),
        }
    }

    async fn list(&self, args: ListTasksArgs) -> TaskReply {
        let limit = args.limit.unwrap_or(MAX_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT);
        match self.store.list(&self.client_id, limit as usize).await {
            Ok(items) => {
                tracing::debug!(count = items.len(), "list_tasks");
                TaskReply::Items { items }
            }
            Err(err) => TaskReply::error(err.to_string()),
        }
    }

    async fn create(&self, args: CreateTaskArgs) -> TaskReply {
        let Some(name) = args.name.non_blank() else {
            return TaskReply::error(NAME_REQUIRED);
        };
        let now = now_iso();
        let task = Task {
            client_id: self.client_id.clone(),
            name: name.to_string(),
            request: args.request.unwrap_or_default(),
            start_datetime: args.start_datetime.unwrap_or_default(),
            phone_number: args.phone_number.unwrap_or_default(),
            address: args.address.unwrap_or_default(),
            created_at: now.clone(),
            updated_at: now,
        };
        match self.store.create(task.clone()).await {
            Ok(()) => {
                tracing::info!(name = %task.name, "Task created");
                TaskReply::Item { item: task }
            }
            Err(err) => TaskReply::error(err.to_string()),
        }
    }

    async fn get(&self, args: TaskNameArgs) -> TaskReply {
        let Some(name) = args.name.non_blank() else {
            return TaskReply::error(NAME_REQUIRED);
        };
        match self.store.get(&self.client_id, name).await {
            Ok(Some(item)) => TaskReply::Item { item },
            Ok(None) => TaskReply::error(NOT_FOUND),
            Err(err) => TaskReply::error(err.to_string()),
        }
    }

    async fn update(&self, args: UpdateTaskArgs) -> TaskReply {
        let Some(name) = args.name.non_blank() else {
            return TaskReply::error(NAME_REQUIRED);
        };
        if args.changes.is_empty() {
            return TaskReply::error(NOTHING_TO_UPDATE);
        }
        match self.store.update(&self.client_id, name, args.changes).await {
            Ok(Some(item)) => {
                tracing::info!(name, "Task updated");
                TaskReply::Item { item }
            }
            Ok(None) => TaskReply::error(NOT_FOUND),
            Err(err) => TaskReply::error(err.to_string()),
        }
    }

    async fn delete(&self, args: TaskNameArgs) -> TaskReply {
        let Some(name) = args.name.non_blank() else {
            return TaskReply::error(NAME_REQUIRED);
        };
        match self.store.delete(&self.client_id, name).await {
            Ok(removed) => {
                tracing::info!(name, removed, "Task deleted");
                TaskReply::Ok { ok: true }
            }
            Err(err) => TaskReply::error(err.to_string()),
        }
    }

    /// Register `list_tasks`, `create_task`, `get_task`, `update_task` and
    /// `delete_task`.
    pub fn register(self, registry: &mut ToolRegistry) {
        let tools = Arc::new(self);

        let t = Arc::clone(&tools);
        registry.tool_with_description(
            "list_tasks",
            "List existing reservation tasks",
            move |args: ListTasksArgs| {
                let t = Arc::clone(&t);
                async move { Ok(t.list(args).await) }
            },
        );

        let t = Arc::clone(&tools);
        registry.tool_with_description(
            "create_task",
            "Create reservation with basic details",
            move |args: CreateTaskArgs| {
                let t = Arc::clone(&t);
                async move { Ok(t.create(args).await) }
            },
        );

        let t = Arc::clone(&tools);
        registry.tool_with_description(
            "get_task",
            "Get reservation by name",
            move |args: TaskNameArgs| {
                let t = Arc::clone(&t);
                async move { Ok(t.get(args).await) }
            },
        );

        let t = Arc::clone(&tools);
        registry.tool_with_description(
            "update_task",
            "Update reservation fields by name",
            move |args: UpdateTaskArgs| {
                let t = Arc::clone(&t);
                async move { Ok(t.update(args).await) }
            },
        );

        registry.tool_with_description(
            "delete_task",
            "Delete reservation by name",
            move |args: TaskNameArgs| {
                let t = Arc::clone(&tools);
                async move { Ok(t.delete(args).await) }
            },
        );
    }
}
