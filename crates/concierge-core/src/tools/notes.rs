//! Note-taking tools backed by a flat JSON file

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

use super::json_store::{JsonFile, integer_arg, next_id};
use super::{ToolHandler, json_schema, str_arg};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub id: u64,
    pub title: String,
    pub content: String,
    pub created_at: DateTime<Local>,
}

/// Notes persisted to a JSON file
pub struct NoteStore {
    file: JsonFile<Note>,
}

impl NoteStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            file: JsonFile::new(path),
        }
    }

    pub async fn all(&self) -> Result<Vec<Note>> {
        self.file.read().await
    }

    pub async fn add(&self, title: &str, content: &str) -> Result<Note> {
        let note = self
            .file
            .update(|notes| {
                let note = Note {
                    id: next_id(notes.iter().map(|n| n.id)),
                    title: title.to_string(),
                    content: content.to_string(),
                    created_at: Local::now(),
                };
                notes.push(note.clone());
                Ok(note)
            })
            .await?;
        info!("Saved note #{} to {}", note.id, self.file.path().display());
        Ok(note)
    }

    pub async fn search(&self, query: &str) -> Result<Vec<Note>> {
        let needle = query.to_lowercase();
        Ok(self
            .all()
            .await?
            .into_iter()
            .filter(|n| {
                n.title.to_lowercase().contains(&needle) || n.content.to_lowercase().contains(&needle)
            })
            .collect())
    }

    pub async fn delete(&self, id: u64) -> Result<Note> {
        self.file
            .update(|notes| {
                let pos = notes
                    .iter()
                    .position(|n| n.id == id)
                    .ok_or_else(|| anyhow!("Note with ID {} not found", id))?;
                Ok(notes.remove(pos))
            })
            .await
    }
}

pub struct SaveNoteTool {
    store: Arc<NoteStore>,
}

impl SaveNoteTool {
    pub fn new(store: Arc<NoteStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ToolHandler for SaveNoteTool {
    fn name(&self) -> &str {
        "save_note"
    }

    fn description(&self) -> &str {
        "Save a new note with a title and content."
    }

    fn input_schema(&self) -> Value {
        json_schema(
            serde_json::json!({
                "title": {"type": "string", "description": "A concise title for the note"},
                "content": {"type": "string", "description": "The full content of the note"}
            }),
            vec!["title", "content"],
        )
    }

    async fn execute(&self, input: Value) -> Result<String> {
        let title = str_arg(&input, "title")?;
        let content = str_arg(&input, "content")?;
        let note = self.store.add(title, content).await?;
        Ok(format!("Note '{}' (ID: {}) saved successfully.", note.title, note.id))
    }
}

pub struct RetrieveNotesTool {
    store: Arc<NoteStore>,
}

impl RetrieveNotesTool {
    pub fn new(store: Arc<NoteStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ToolHandler for RetrieveNotesTool {
    fn name(&self) -> &str {
        "retrieve_notes"
    }

    fn description(&self) -> &str {
        "List all saved notes with their IDs, titles and creation dates."
    }

    fn input_schema(&self) -> Value {
        json_schema(serde_json::json!({}), vec![])
    }

    async fn execute(&self, _input: Value) -> Result<String> {
        let notes = self.store.all().await?;
        if notes.is_empty() {
            return Ok("No notes found.".to_string());
        }
        let lines: Vec<String> = notes
            .iter()
            .map(|n| {
                format!(
                    "- ID {}: {} (Created: {})",
                    n.id,
                    n.title,
                    n.created_at.format("%Y-%m-%d %H:%M")
                )
            })
            .collect();
        Ok(format!("Here are your notes:\n{}", lines.join("\n")))
    }
}

pub struct SearchNotesTool {
    store: Arc<NoteStore>,
}

impl SearchNotesTool {
    pub fn new(store: Arc<NoteStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ToolHandler for SearchNotesTool {
    fn name(&self) -> &str {
        "search_notes"
    }

    fn description(&self) -> &str {
        "Search notes whose title or content contains the query text (case-insensitive)."
    }

    fn input_schema(&self) -> Value {
        json_schema(
            serde_json::json!({
                "query": {"type": "string", "description": "Text to look for in note titles and content"}
            }),
            vec!["query"],
        )
    }

    async fn execute(&self, input: Value) -> Result<String> {
        let query = str_arg(&input, "query")?;
        let found = self.store.search(query).await?;
        debug!("search_notes '{}' matched {} note(s)", query, found.len());
        if found.is_empty() {
            return Ok(format!("No notes found matching '{}'.", query));
        }
        let results: Vec<String> = found
            .iter()
            .map(|n| format!("ID {}: {}\n{}", n.id, n.title, n.content))
            .collect();
        Ok(format!("Found matching notes:\n\n{}", results.join("\n---\n")))
    }
}

pub struct DeleteNoteTool {
    store: Arc<NoteStore>,
}

impl DeleteNoteTool {
    pub fn new(store: Arc<NoteStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ToolHandler for DeleteNoteTool {
    fn name(&self) -> &str {
        "delete_note"
    }

    fn description(&self) -> &str {
        "Delete a note by its ID."
    }

    fn input_schema(&self) -> Value {
        json_schema(
            serde_json::json!({
                "note_id": {"type": "integer", "description": "ID of the note to delete"}
            }),
            vec!["note_id"],
        )
    }

    async fn execute(&self, input: Value) -> Result<String> {
        let id = integer_arg(&input, "note_id")?;
        let note = self.store.delete(id).await?;
        Ok(format!("Successfully deleted note ID {} ('{}').", id, note.title))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> Arc<NoteStore> {
        Arc::new(NoteStore::new(dir.path().join("notes.json")))
    }

    #[tokio::test]
    async fn test_ids_follow_max_after_delete() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.add("a", "1").await.unwrap();
        store.add("b", "2").await.unwrap();
        store.add("c", "3").await.unwrap();
        store.delete(2).await.unwrap();

        let note = store.add("d", "4").await.unwrap();
        assert_eq!(note.id, 4);

        store.delete(4).await.unwrap();
        store.delete(3).await.unwrap();
        assert_eq!(store.add("e", "5").await.unwrap().id, 2);
    }

    #[tokio::test]
    async fn test_note_tools_flow() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let save = SaveNoteTool::new(store.clone());
        let list = RetrieveNotesTool::new(store.clone());
        let search = SearchNotesTool::new(store.clone());
        let delete = DeleteNoteTool::new(store.clone());

        assert_eq!(list.execute(serde_json::json!({})).await.unwrap(), "No notes found.");

        let saved = save
            .execute(serde_json::json!({"title": "Groceries", "content": "Milk and EGGS"}))
            .await
            .unwrap();
        assert_eq!(saved, "Note 'Groceries' (ID: 1) saved successfully.");
        save.execute(serde_json::json!({"title": "Ideas", "content": "Write a book"}))
            .await
            .unwrap();

        let listed = list.execute(serde_json::json!({})).await.unwrap();
        assert!(listed.starts_with("Here are your notes:\n- ID 1: Groceries (Created: "));
        assert!(listed.contains("- ID 2: Ideas"));

        let found = search.execute(serde_json::json!({"query": "eggs"})).await.unwrap();
        assert_eq!(found, "Found matching notes:\n\nID 1: Groceries\nMilk and EGGS");
        let none = search.execute(serde_json::json!({"query": "zzz"})).await.unwrap();
        assert_eq!(none, "No notes found matching 'zzz'.");

        let deleted = delete.execute(serde_json::json!({"note_id": 1})).await.unwrap();
        assert_eq!(deleted, "Successfully deleted note ID 1 ('Groceries').");
        let missing = delete.execute(serde_json::json!({"note_id": "1"})).await;
        assert!(missing.unwrap_err().to_string().contains("not found"));
    }

    #[tokio::test]
    async fn test_persists_as_json_array() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.add("t", "c").await.unwrap();

        let raw = std::fs::read_to_string(dir.path().join("notes.json")).unwrap();
        let parsed: Vec<Value> = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed[0]["id"], 1);
        assert_eq!(parsed[0]["title"], "t");
        assert!(parsed[0]["created_at"].is_string());
    }
}
