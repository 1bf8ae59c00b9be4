//! Filesystem tools sandboxed to the configured allowed directories

use async_trait::async_trait;
use serde_json::Value;
use anyhow::{Result, Context, anyhow};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info};

use super::{ToolHandler, json_schema, str_arg};

const MAX_READ_BYTES: u64 = 1024 * 1024;
const MAX_LIST_DEPTH: usize = 3;

fn expand_dirs(dirs: Vec<String>) -> Vec<PathBuf> {
    dirs.iter().map(|d| shellexpand(d)).collect()
}

fn shellexpand(s: &str) -> PathBuf {
    if let Some(rest) = s.strip_prefix("~/")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(rest);
    }
    PathBuf::from(s)
}

fn reject_traversal(path: &str) -> Result<()> {
    if Path::new(path).components().any(|c| matches!(c, Component::ParentDir)) || path.contains("..") {
        return Err(anyhow!("Path contains '..' which is not allowed"));
    }
    Ok(())
}

fn within_allowed(canonical: &Path, allowed_dirs: &[PathBuf]) -> bool {
    allowed_dirs.iter().any(|allowed| {
        let allowed_canonical = allowed.canonicalize()
            .unwrap_or_else(|_| allowed.clone());
        canonical.starts_with(&allowed_canonical)
    })
}

/// Resolve an existing path inside one of the allowed directories
fn validate_allowed_path(path: &str, allowed_dirs: &[PathBuf]) -> Result<PathBuf> {
    reject_traversal(path)?;

    let expanded = shellexpand(path);
    let canonical = expanded.canonicalize()
        .with_context(|| format!("Path does not exist: {}", expanded.display()))?;

    if within_allowed(&canonical, allowed_dirs) {
        return Ok(canonical);
    }
    Err(anyhow!(
        "Access denied: '{}' is not within allowed directories",
        canonical.display()
    ))
}

/// Resolve a path that may not exist yet. Its nearest existing ancestor must
/// lie inside an allowed directory.
fn validate_target_path(path: &str, allowed_dirs: &[PathBuf]) -> Result<PathBuf> {
    reject_traversal(path)?;

    let expanded = shellexpand(path);
    let mut existing = expanded.as_path();
    let mut missing = Vec::new();
    while !existing.exists() {
        let name = existing.file_name()
            .ok_or_else(|| anyhow!("Invalid path: {}", expanded.display()))?;
        missing.push(name.to_owned());
        existing = existing.parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
    }

    let mut resolved = existing.canonicalize()
        .with_context(|| format!("Cannot resolve {}", existing.display()))?;
    if !within_allowed(&resolved, allowed_dirs) {
        return Err(anyhow!(
            "Access denied: '{}' is not within allowed directories",
            expanded.display()
        ));
    }
    for part in missing.into_iter().rev() {
        resolved.push(part);
    }
    Ok(resolved)
}

/// List directory contents
pub struct ListDirectoryTool {
    allowed_dirs: Vec<PathBuf>,
}

impl ListDirectoryTool {
    pub fn new(allowed_dirs: Vec<String>) -> Self {
        Self {
            allowed_dirs: expand_dirs(allowed_dirs),
        }
    }
}

#[async_trait]
impl ToolHandler for ListDirectoryTool {
    fn name(&self) -> &str {
        "list_directory"
    }

    fn description(&self) -> &str {
        "List files and directories at a given path. Only accessible within configured allowed directories."
    }

    fn input_schema(&self) -> Value {
        json_schema(
            serde_json::json!({
                "path": {
                    "type": "string",
                    "description": "Directory path to list (supports ~/)"
                },
                "recursive": {
                    "type": "boolean",
                    "description": "List recursively (default: false, max depth: 3)"
                },
                "pattern": {
                    "type": "string",
                    "description": "Optional glob pattern to filter files (e.g. '*.md')"
                }
            }),
            vec!["path"],
        )
    }

    async fn execute(&self, input: Value) -> Result<String> {
        let path_str = str_arg(&input, "path")?;
        let recursive = input.get("recursive")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        let pattern = input.get("pattern")
            .and_then(|v| v.as_str())
            .map(|p| glob::Pattern::new(p).with_context(|| format!("Invalid glob pattern: {}", p)))
            .transpose()?;

        let dir = validate_allowed_path(path_str, &self.allowed_dirs)?;
        if !dir.is_dir() {
            return Err(anyhow!("Not a directory: {}", dir.display()));
        }
        debug!("Listing directory: {}", dir.display());

        let mut entries = Vec::new();
        let walk = Walk { base: &dir, recursive, pattern: pattern.as_ref() };
        walk.visit(&dir, 0, &mut entries)?;

        if entries.is_empty() {
            return Ok("Directory is empty or no files match the pattern.".to_string());
        }
        Ok(entries.join("\n"))
    }
}

struct Walk<'a> {
    base: &'a Path,
    recursive: bool,
    pattern: Option<&'a glob::Pattern>,
}

impl Walk<'_> {
    fn visit(&self, dir: &Path, depth: usize, entries: &mut Vec<String>) -> Result<()> {
        let mut dir_entries: Vec<_> = std::fs::read_dir(dir)
            .with_context(|| format!("Failed to read directory: {}", dir.display()))?
            .filter_map(|e| e.ok())
            .collect();
        dir_entries.sort_by_key(|e| e.file_name());

        for entry in dir_entries {
            let file_name = entry.file_name().to_string_lossy().to_string();
            if file_name.starts_with('.') {
                continue;
            }

            let path = entry.path();
            let display = path.strip_prefix(self.base)
                .unwrap_or(&path)
                .display()
                .to_string();
            let metadata = entry.metadata()?;

            if metadata.is_dir() {
                entries.push(format!("{}/ (dir)", display));
                if self.recursive && depth < MAX_LIST_DEPTH {
                    self.visit(&path, depth + 1, entries)?;
                }
                continue;
            }

            if let Some(pattern) = self.pattern
                && !pattern.matches(&file_name)
            {
                continue;
            }

            let modified = metadata.modified()
                .ok()
                .map(|t| chrono::DateTime::<chrono::Local>::from(t).format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_default();
            entries.push(format!("{} ({}, {})", display, human_size(metadata.len()), modified));
        }
        Ok(())
    }
}

fn human_size(size: u64) -> String {
    if size < 1024 {
        format!("{} B", size)
    } else if size < 1024 * 1024 {
        format!("{:.1} KB", size as f64 / 1024.0)
    } else {
        format!("{:.1} MB", size as f64 / (1024.0 * 1024.0))
    }
}

/// Read a UTF-8 text file
pub struct ReadFileTool {
    allowed_dirs: Vec<PathBuf>,
}

impl ReadFileTool {
    pub fn new(allowed_dirs: Vec<String>) -> Self {
        Self {
            allowed_dirs: expand_dirs(allowed_dirs),
        }
    }
}

#[async_trait]
impl ToolHandler for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read the content of a text file for analysis, summarization, or modification."
    }

    fn input_schema(&self) -> Value {
        json_schema(
            serde_json::json!({
                "file_path": {
                    "type": "string",
                    "description": "Path to the file (supports ~/)"
                }
            }),
            vec!["file_path"],
        )
    }

    async fn execute(&self, input: Value) -> Result<String> {
        let path_str = str_arg(&input, "file_path")?;
        let path = validate_allowed_path(path_str, &self.allowed_dirs)?;
        if !path.is_file() {
            return Err(anyhow!("File not found at '{}'", path_str));
        }

        let size = tokio::fs::metadata(&path).await?.len();
        if size > MAX_READ_BYTES {
            return Err(anyhow!(
                "File is too large to read ({}; limit {})",
                human_size(size),
                human_size(MAX_READ_BYTES)
            ));
        }

        debug!("Reading file: {}", path.display());
        tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Error reading file '{}'", path_str))
    }
}

/// Write text to a file, creating parent directories
pub struct WriteFileTool {
    allowed_dirs: Vec<PathBuf>,
}

impl WriteFileTool {
    pub fn new(allowed_dirs: Vec<String>) -> Self {
        Self {
            allowed_dirs: expand_dirs(allowed_dirs),
        }
    }
}

#[async_trait]
impl ToolHandler for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write content to a file, creating directories if they don't exist. Use this to save text, code, reports, or summaries."
    }

    fn input_schema(&self) -> Value {
        json_schema(
            serde_json::json!({
                "file_path": {
                    "type": "string",
                    "description": "Path to the file (supports ~/)"
                },
                "content": {
                    "type": "string",
                    "description": "Content to write"
                }
            }),
            vec!["file_path", "content"],
        )
    }

    async fn execute(&self, input: Value) -> Result<String> {
        let path_str = str_arg(&input, "file_path")?;
        let content = str_arg(&input, "content")?;
        let path = validate_target_path(path_str, &self.allowed_dirs)?;
        if path.is_dir() {
            return Err(anyhow!("'{}' is a directory", path_str));
        }

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        tokio::fs::write(&path, content)
            .await
            .with_context(|| format!("Error writing to file '{}'", path_str))?;

        info!("Wrote {} bytes to {}", content.len(), path.display());
        Ok(format!("Successfully wrote content to '{}'.", path_str))
    }
}

/// Create a directory and any missing parents
pub struct CreateDirectoryTool {
    allowed_dirs: Vec<PathBuf>,
}

impl CreateDirectoryTool {
    pub fn new(allowed_dirs: Vec<String>) -> Self {
        Self {
            allowed_dirs: expand_dirs(allowed_dirs),
        }
    }
}

#[async_trait]
impl ToolHandler for CreateDirectoryTool {
    fn name(&self) -> &str {
        "create_directory"
    }

    fn description(&self) -> &str {
        "Create a directory, including any missing parent directories."
    }

    fn input_schema(&self) -> Value {
        json_schema(
            serde_json::json!({
                "path": {
                    "type": "string",
                    "description": "Directory path to create (supports ~/)"
                }
            }),
            vec!["path"],
        )
    }

    async fn execute(&self, input: Value) -> Result<String> {
        let path_str = str_arg(&input, "path")?;
        let path = validate_target_path(path_str, &self.allowed_dirs)?;
        if path.is_file() {
            return Err(anyhow!("'{}' already exists as a file", path_str));
        }
        if path.is_dir() {
            return Ok(format!("Directory '{}' already exists.", path_str));
        }

        tokio::fs::create_dir_all(&path)
            .await
            .with_context(|| format!("Error creating directory '{}'", path_str))?;
        info!("Created directory {}", path.display());
        Ok(format!("Successfully created directory '{}'.", path_str))
    }
}

/// Delete a file or a directory tree
pub struct DeletePathTool {
    allowed_dirs: Vec<PathBuf>,
}

impl DeletePathTool {
    pub fn new(allowed_dirs: Vec<String>) -> Self {
        Self {
            allowed_dirs: expand_dirs(allowed_dirs),
        }
    }
}

#[async_trait]
impl ToolHandler for DeletePathTool {
    fn name(&self) -> &str {
        "delete_file_or_directory"
    }

    fn description(&self) -> &str {
        "Delete a file, or a directory and everything in it. This cannot be undone."
    }

    fn input_schema(&self) -> Value {
        json_schema(
            serde_json::json!({
                "path": {
                    "type": "string",
                    "description": "File or directory to delete (supports ~/)"
                }
            }),
            vec!["path"],
        )
    }

    async fn execute(&self, input: Value) -> Result<String> {
        let path_str = str_arg(&input, "path")?;
        let path = validate_allowed_path(path_str, &self.allowed_dirs)?;

        let allowed_root = self.allowed_dirs.iter()
            .filter_map(|d| d.canonicalize().ok())
            .any(|root| root == path);
        if allowed_root {
            return Err(anyhow!("Refusing to delete an allowed root directory"));
        }

        let removed = if path.is_dir() {
            tokio::fs::remove_dir_all(&path).await
        } else {
            tokio::fs::remove_file(&path).await
        };
        removed.with_context(|| format!("Error deleting '{}'", path_str))?;

        info!("Deleted {}", path.display());
        Ok(format!("Successfully deleted '{}'.", path_str))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sandbox() -> (TempDir, String) {
        let temp = TempDir::new().unwrap();
        let path = temp.path().to_str().unwrap().to_string();
        (temp, path)
    }

    #[test]
    fn test_list_directory_tool_schema() {
        let tool = ListDirectoryTool::new(vec!["~/Documents".to_string()]);
        assert_eq!(tool.name(), "list_directory");
        assert!(!tool.description().is_empty());
        let schema = tool.input_schema();
        assert!(schema.get("properties").is_some());
    }

    #[tokio::test]
    async fn test_list_directory_allowed() {
        let (temp, root) = sandbox();
        std::fs::write(temp.path().join("hello.md"), "# hi").unwrap();
        std::fs::write(temp.path().join("world.txt"), "hello world").unwrap();
        std::fs::write(temp.path().join(".hidden"), "x").unwrap();
        std::fs::create_dir(temp.path().join("subdir")).unwrap();

        let tool = ListDirectoryTool::new(vec![root.clone()]);
        let result = tool.execute(serde_json::json!({"path": root})).await.unwrap();

        assert!(result.contains("hello.md"));
        assert!(result.contains("world.txt"));
        assert!(result.contains("subdir/ (dir)"));
        assert!(!result.contains(".hidden"));
    }

    #[tokio::test]
    async fn test_list_directory_pattern_and_recursion() {
        let (temp, root) = sandbox();
        std::fs::create_dir(temp.path().join("nested")).unwrap();
        std::fs::write(temp.path().join("nested/deep.md"), "x").unwrap();
        std::fs::write(temp.path().join("top.txt"), "x").unwrap();

        let tool = ListDirectoryTool::new(vec![root.clone()]);
        let flat = tool.execute(serde_json::json!({"path": root, "pattern": "*.md"})).await.unwrap();
        assert!(!flat.contains("deep.md"));
        assert!(!flat.contains("top.txt"));

        let deep = tool.execute(serde_json::json!({
            "path": root, "pattern": "*.md", "recursive": true
        })).await.unwrap();
        assert!(deep.contains("deep.md"));
        assert!(!deep.contains("top.txt"));
    }

    #[tokio::test]
    async fn test_list_directory_denied() {
        let (_temp, root) = sandbox();
        let tool = ListDirectoryTool::new(vec![root]);
        assert!(tool.execute(serde_json::json!({"path": "/etc"})).await.is_err());
    }

    #[tokio::test]
    async fn test_path_traversal_blocked() {
        let (_temp, root) = sandbox();
        let tool = ListDirectoryTool::new(vec![root.clone()]);
        let result = tool.execute(serde_json::json!({
            "path": format!("{}/../../etc", root)
        })).await;
        assert!(result.unwrap_err().to_string().contains(".."));

        let writer = WriteFileTool::new(vec![root.clone()]);
        let result = writer.execute(serde_json::json!({
            "file_path": format!("{}/../escape.txt", root),
            "content": "x"
        })).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let (temp, root) = sandbox();
        let target = format!("{}/reports/q1/summary.txt", root);

        let writer = WriteFileTool::new(vec![root.clone()]);
        let msg = writer.execute(serde_json::json!({
            "file_path": target, "content": "all good"
        })).await.unwrap();
        assert!(msg.starts_with("Successfully wrote"));
        assert!(temp.path().join("reports/q1/summary.txt").is_file());

        let reader = ReadFileTool::new(vec![root]);
        let content = reader.execute(serde_json::json!({"file_path": target})).await.unwrap();
        assert_eq!(content, "all good");
    }

    #[tokio::test]
    async fn test_write_outside_sandbox_denied() {
        let (_temp, root) = sandbox();
        let (other, _) = sandbox();
        let writer = WriteFileTool::new(vec![root]);
        let result = writer.execute(serde_json::json!({
            "file_path": other.path().join("x.txt").to_str().unwrap(),
            "content": "x"
        })).await;
        assert!(result.unwrap_err().to_string().contains("Access denied"));
    }

    #[tokio::test]
    async fn test_read_missing_file() {
        let (_temp, root) = sandbox();
        let reader = ReadFileTool::new(vec![root.clone()]);
        let result = reader.execute(serde_json::json!({
            "file_path": format!("{}/nope.txt", root)
        })).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_create_and_delete_directory() {
        let (temp, root) = sandbox();
        let dir = format!("{}/a/b", root);

        let create = CreateDirectoryTool::new(vec![root.clone()]);
        create.execute(serde_json::json!({"path": dir})).await.unwrap();
        assert!(temp.path().join("a/b").is_dir());
        let again = create.execute(serde_json::json!({"path": dir})).await.unwrap();
        assert!(again.contains("already exists"));

        std::fs::write(temp.path().join("a/b/file.txt"), "x").unwrap();
        let delete = DeletePathTool::new(vec![root.clone()]);
        delete.execute(serde_json::json!({"path": format!("{}/a", root)})).await.unwrap();
        assert!(!temp.path().join("a").exists());
    }

    #[tokio::test]
    async fn test_delete_refuses_root() {
        let (temp, root) = sandbox();
        let delete = DeletePathTool::new(vec![root.clone()]);
        assert!(delete.execute(serde_json::json!({"path": root})).await.is_err());
        assert!(temp.path().exists());
    }

    #[test]
    fn test_human_size() {
        assert_eq!(human_size(512), "512 B");
        assert_eq!(human_size(2048), "2.0 KB");
        assert_eq!(human_size(3 * 1024 * 1024), "3.0 MB");
    }
}
