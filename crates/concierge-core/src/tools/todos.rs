//! To-do list tools backed by a flat JSON file

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use super::json_store::{JsonFile, integer_arg, next_id};
use super::{ToolHandler, json_schema, str_arg};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TodoStatus {
    Pending,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TodoItem {
    pub id: u64,
    pub task: String,
    pub status: TodoStatus,
    pub created_at: DateTime<Local>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Local>>,
}

/// Result of marking an item complete
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    Completed(TodoItem),
    AlreadyCompleted(TodoItem),
}

pub struct TodoStore {
    file: JsonFile<TodoItem>,
}

impl TodoStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            file: JsonFile::new(path),
        }
    }

    pub async fn all(&self) -> Result<Vec<TodoItem>> {
        self.file.read().await
    }

    pub async fn add(&self, task: &str) -> Result<TodoItem> {
        let item = self
            .file
            .update(|items| {
                let item = TodoItem {
                    id: next_id(items.iter().map(|i| i.id)),
                    task: task.to_string(),
                    status: TodoStatus::Pending,
                    created_at: Local::now(),
                    completed_at: None,
                };
                items.push(item.clone());
                Ok(item)
            })
            .await?;
        info!("Added to-do item #{}: '{}'", item.id, item.task);
        Ok(item)
    }

    pub async fn complete(&self, id: u64) -> Result<Completion> {
        let completion = self
            .file
            .update(|items| {
                let item = items
                    .iter_mut()
                    .find(|i| i.id == id)
                    .ok_or_else(|| anyhow!("To-do item with ID {} not found", id))?;
                if item.status == TodoStatus::Completed {
                    return Ok(Completion::AlreadyCompleted(item.clone()));
                }
                item.status = TodoStatus::Completed;
                item.completed_at = Some(Local::now());
                Ok(Completion::Completed(item.clone()))
            })
            .await?;
        if let Completion::Completed(item) = &completion {
            info!("Completed to-do item #{}: '{}'", item.id, item.task);
        }
        Ok(completion)
    }
}

pub struct AddTodoTool {
    store: Arc<TodoStore>,
}

impl AddTodoTool {
    pub fn new(store: Arc<TodoStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ToolHandler for AddTodoTool {
    fn name(&self) -> &str {
        "add_todo"
    }

    fn description(&self) -> &str {
        "Add a new task to the to-do list."
    }

    fn input_schema(&self) -> Value {
        json_schema(
            serde_json::json!({
                "task": {"type": "string", "description": "A clear and concise description of the task"}
            }),
            vec!["task"],
        )
    }

    async fn execute(&self, input: Value) -> Result<String> {
        let task = str_arg(&input, "task")?;
        let item = self.store.add(task).await?;
        Ok(format!("To-do item added: '{}' (ID: {}).", item.task, item.id))
    }
}

pub struct ViewTodosTool {
    store: Arc<TodoStore>,
}

impl ViewTodosTool {
    pub fn new(store: Arc<TodoStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ToolHandler for ViewTodosTool {
    fn name(&self) -> &str {
        "view_todos"
    }

    fn description(&self) -> &str {
        "Show all to-do items, grouped into pending and completed."
    }

    fn input_schema(&self) -> Value {
        json_schema(serde_json::json!({}), vec![])
    }

    async fn execute(&self, _input: Value) -> Result<String> {
        let items = self.store.all().await?;
        Ok(render_todos(&items))
    }
}

fn render_todos(items: &[TodoItem]) -> String {
    if items.is_empty() {
        return "Your to-do list is empty!".to_string();
    }

    let line = |i: &TodoItem| format!("  - ID {}: {}", i.id, i.task);
    let pending: Vec<String> = items
        .iter()
        .filter(|i| i.status == TodoStatus::Pending)
        .map(line)
        .collect();
    let completed: Vec<String> = items
        .iter()
        .filter(|i| i.status == TodoStatus::Completed)
        .map(line)
        .collect();

    let mut out = if pending.is_empty() {
        "No pending tasks!".to_string()
    } else {
        format!("Pending Tasks:\n{}", pending.join("\n"))
    };
    if !completed.is_empty() {
        out.push_str(&format!("\n\nCompleted Tasks:\n{}", completed.join("\n")));
    }
    out
}

pub struct CompleteTodoTool {
    store: Arc<TodoStore>,
}

impl CompleteTodoTool {
    pub fn new(store: Arc<TodoStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ToolHandler for CompleteTodoTool {
    fn name(&self) -> &str {
        "complete_todo"
    }

    fn description(&self) -> &str {
        "Mark a to-do item as complete by its ID."
    }

    fn input_schema(&self) -> Value {
        json_schema(
            serde_json::json!({
                "task_id": {"type": "integer", "description": "ID of the task to mark as complete"}
            }),
            vec!["task_id"],
        )
    }

    async fn execute(&self, input: Value) -> Result<String> {
        let id = integer_arg(&input, "task_id")?;
        Ok(match self.store.complete(id).await? {
            Completion::Completed(item) => {
                format!("Great job! Task ID {} ('{}') has been marked as complete.", item.id, item.task)
            }
            Completion::AlreadyCompleted(item) => {
                format!("Task ID {} is already marked as complete.", item.id)
            }
        })
    }
}
