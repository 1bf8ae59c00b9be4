//! Tool registry and executor system

use async_trait::async_trait;
use serde_json::Value;
use anyhow::{Result, anyhow};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::providers::{LlmProvider, ToolDefinition};

pub mod filesystem;
mod json_store;
pub mod notes;
pub mod search;
pub mod system;
pub mod todos;
pub mod writing;

/// Trait for executing tools
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(&self, tool_name: &str, input: Value) -> Result<String>;
    fn list_tools(&self) -> Vec<ToolDefinition>;
}

/// Individual tool handler
#[async_trait]
pub trait ToolHandler: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn input_schema(&self) -> Value;
    async fn execute(&self, input: Value) -> Result<String>;
}

/// Registry of available tools
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn ToolHandler>>,
}

impl ToolRegistry {
    /// Create a new empty tool registry
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool handler
    pub fn register(&mut self, handler: Arc<dyn ToolHandler>) {
        let name = handler.name().to_string();
        debug!("Registering tool: {}", name);
        self.tools.insert(name, handler);
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn ToolHandler>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Registered tool names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Number of registered tools
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check if registry is empty
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Get tool definitions for only the named tools
    pub fn filter_tools(&self, names: &[String]) -> Vec<ToolDefinition> {
        names.iter()
            .filter_map(|name| self.tools.get(name))
            .map(|handler| definition(handler.as_ref()))
            .collect()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn definition(handler: &dyn ToolHandler) -> ToolDefinition {
    ToolDefinition {
        name: handler.name().to_string(),
        description: handler.description().to_string(),
        input_schema: handler.input_schema(),
    }
}

#[async_trait]
impl ToolExecutor for ToolRegistry {
    async fn execute(&self, tool_name: &str, input: Value) -> Result<String> {
        debug!("Executing tool: {} with input: {:?}", tool_name, input);

        let handler = self.tools.get(tool_name)
            .ok_or_else(|| anyhow!("Unknown tool: {}", tool_name))?;

        match handler.execute(input).await {
            Ok(result) => {
                debug!("Tool {} succeeded", tool_name);
                Ok(result)
            }
            Err(e) => {
                warn!("Tool {} failed: {}", tool_name, e);
                Err(e)
            }
        }
    }

    fn list_tools(&self) -> Vec<ToolDefinition> {
        let mut tools: Vec<ToolDefinition> = self.tools.values()
            .map(|handler| definition(handler.as_ref()))
            .collect();
        tools.sort_by(|a, b| a.name.cmp(&b.name));
        tools
    }
}

/// Restricts a shared registry to the tools one specialist may use
pub struct FilteredToolExecutor {
    inner: Arc<ToolRegistry>,
    allowed: HashSet<String>,
}

impl FilteredToolExecutor {
    pub fn new(registry: Arc<ToolRegistry>, allowed_tools: &[String]) -> Self {
        let allowed: HashSet<String> = allowed_tools.iter().cloned().collect();
        Self {
            inner: registry,
            allowed,
        }
    }
}

#[async_trait]
impl ToolExecutor for FilteredToolExecutor {
    async fn execute(&self, tool_name: &str, input: Value) -> Result<String> {
        if !self.allowed.contains(tool_name) {
            warn!("Specialist attempted to use non-allowed tool: {}", tool_name);
            return Err(anyhow!("Tool '{}' is not available to this specialist", tool_name));
        }
        self.inner.execute(tool_name, input).await
    }

    fn list_tools(&self) -> Vec<ToolDefinition> {
        self.inner.list_tools()
            .into_iter()
            .filter(|t| self.allowed.contains(&t.name))
            .collect()
    }
}

/// Settings the built-in tools need
#[derive(Debug, Clone)]
pub struct ToolSettings {
    /// Roots the filesystem tools may touch
    pub allowed_directories: Vec<String>,
    pub notes_path: PathBuf,
    pub todos_path: PathBuf,
    /// Tavily key; DuckDuckGo is used without one
    pub tavily_api_key: Option<String>,
    pub max_search_results: usize,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            allowed_directories: vec!["~/Documents".to_string()],
            notes_path: PathBuf::from("notes.json"),
            todos_path: PathBuf::from("todo_list.json"),
            tavily_api_key: None,
            max_search_results: 5,
        }
    }
}

/// Registry holding every built-in tool. `llm` backs the writing tools.
pub fn builtin_registry(settings: &ToolSettings, llm: Arc<dyn LlmProvider>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    let dirs = &settings.allowed_directories;

    registry.register(Arc::new(filesystem::ListDirectoryTool::new(dirs.clone())));
    registry.register(Arc::new(filesystem::ReadFileTool::new(dirs.clone())));
    registry.register(Arc::new(filesystem::WriteFileTool::new(dirs.clone())));
    registry.register(Arc::new(filesystem::CreateDirectoryTool::new(dirs.clone())));
    registry.register(Arc::new(filesystem::DeletePathTool::new(dirs.clone())));

    registry.register(Arc::new(search::WebSearchTool::new(
        settings.tavily_api_key.clone(),
        settings.max_search_results,
    )));
    registry.register(Arc::new(search::ScrapeUrlTool::new()));

    let notes = Arc::new(notes::NoteStore::new(settings.notes_path.clone()));
    registry.register(Arc::new(notes::SaveNoteTool::new(notes.clone())));
    registry.register(Arc::new(notes::RetrieveNotesTool::new(notes.clone())));
    registry.register(Arc::new(notes::SearchNotesTool::new(notes.clone())));
    registry.register(Arc::new(notes::DeleteNoteTool::new(notes)));

    let todos = Arc::new(todos::TodoStore::new(settings.todos_path.clone()));
    registry.register(Arc::new(todos::AddTodoTool::new(todos.clone())));
    registry.register(Arc::new(todos::ViewTodosTool::new(todos.clone())));
    registry.register(Arc::new(todos::CompleteTodoTool::new(todos)));

    registry.register(Arc::new(system::CurrentTimeTool));

    for tool in writing::WritingTool::all(llm) {
        registry.register(Arc::new(tool));
    }

    debug!("Built-in tool registry ready ({} tools)", registry.len());
    registry
}

/// Helper function to create a JSON schema for tool input
pub fn json_schema(properties: Value, required: Vec<&str>) -> Value {
    serde_json::json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

/// Required string argument
pub(crate) fn str_arg<'a>(input: &'a Value, key: &str) -> Result<&'a str> {
    input.get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow!("Missing '{}' parameter", key))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct DummyTool(&'static str);

    #[async_trait]
    impl ToolHandler for DummyTool {
        fn name(&self) -> &str {
            self.0
        }

        fn description(&self) -> &str {
            "A dummy tool for testing"
        }

        fn input_schema(&self) -> Value {
            json_schema(
                serde_json::json!({
                    "message": {
                        "type": "string",
                        "description": "Test message"
                    }
                }),
                vec!["message"],
            )
        }

        async fn execute(&self, input: Value) -> Result<String> {
            Ok(format!("{}: {}", self.0, str_arg(&input, "message")?))
        }
    }

    fn registry() -> Arc<ToolRegistry> {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(DummyTool("alpha")));
        registry.register(Arc::new(DummyTool("beta")));
        Arc::new(registry)
    }

    #[tokio::test]
    async fn test_tool_registry() {
        let registry = registry();
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.names(), vec!["alpha", "beta"]);

        let result = registry.execute("alpha", serde_json::json!({"message": "test"})).await;
        assert_eq!(result.unwrap(), "alpha: test");
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let registry = ToolRegistry::new();
        let result = registry.execute("nonexistent", serde_json::json!({})).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_missing_argument() {
        let registry = registry();
        let err = registry.execute("alpha", serde_json::json!({})).await.unwrap_err();
        assert_eq!(err.to_string(), "Missing 'message' parameter");
    }

    #[test]
    fn test_filter_tools() {
        let registry = registry();
        let filtered = registry.filter_tools(&["alpha".to_string()]);
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].name, "alpha");

        let filtered_empty = registry.filter_tools(&["nonexistent".to_string()]);
        assert!(filtered_empty.is_empty());
    }

    #[tokio::test]
    async fn test_filtered_executor() {
        let filtered = FilteredToolExecutor::new(registry(), &["beta".to_string()]);

        let tools = filtered.list_tools();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "beta");

        let ok = filtered.execute("beta", serde_json::json!({"message": "x"})).await;
        assert_eq!(ok.unwrap(), "beta: x");

        let denied = filtered.execute("alpha", serde_json::json!({"message": "x"})).await;
        assert!(denied.unwrap_err().to_string().contains("not available"));
    }
}
