//! Flat JSON-array persistence shared by the note and to-do tools

use anyhow::{Context, Result, anyhow};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

/// Load-modify-save access to a JSON array file, one writer at a time.
///
/// A missing or empty file reads as an empty list. A file that does not
/// parse is an error and is never overwritten.
pub(crate) struct JsonFile<T> {
    path: PathBuf,
    lock: Mutex<()>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonFile<T>
where
    T: Serialize + DeserializeOwned + Send,
{
    pub(crate) fn new(path: PathBuf) -> Self {
        Self {
            path,
            lock: Mutex::new(()),
            _marker: PhantomData,
        }
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<Vec<T>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) if content.trim().is_empty() => Ok(Vec::new()),
            Ok(content) => serde_json::from_str(&content)
                .with_context(|| format!("Corrupt data file {}", self.path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e).with_context(|| format!("Failed to read {}", self.path.display())),
        }
    }

    async fn save(&self, items: &[T]) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(items)?;
        tokio::fs::write(&self.path, json)
            .await
            .with_context(|| format!("Failed to write {}", self.path.display()))
    }

    pub(crate) async fn read(&self) -> Result<Vec<T>> {
        let _guard = self.lock.lock().await;
        self.load().await
    }

    /// Apply `f` to the stored items and persist them. Nothing is written
    /// when `f` fails.
    pub(crate) async fn update<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut Vec<T>) -> Result<R> + Send,
    {
        let _guard = self.lock.lock().await;
        let mut items = self.load().await?;
        let out = f(&mut items)?;
        self.save(&items).await?;
        Ok(out)
    }
}

/// One past the largest id in use, or 1 for an empty store
pub(crate) fn next_id(ids: impl Iterator<Item = u64>) -> u64 {
    ids.max().map_or(1, |max| max + 1)
}

/// Integer argument, also accepted as a numeric string
pub(crate) fn integer_arg(input: &Value, key: &str) -> Result<u64> {
    input
        .get(key)
        .and_then(|v| v.as_u64().or_else(|| v.as_str().and_then(|s| s.trim().parse().ok())))
        .ok_or_else(|| anyhow!("Missing or invalid '{}' parameter", key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_next_id() {
        assert_eq!(next_id(std::iter::empty()), 1);
        assert_eq!(next_id([1, 7, 3].into_iter()), 8);
    }

    #[test]
    fn test_integer_arg() {
        let input = serde_json::json!({"a": 3, "b": " 12 ", "c": "x", "d": -1});
        assert_eq!(integer_arg(&input, "a").unwrap(), 3);
        assert_eq!(integer_arg(&input, "b").unwrap(), 12);
        assert!(integer_arg(&input, "c").is_err());
        assert!(integer_arg(&input, "d").is_err());
        assert!(integer_arg(&input, "missing").is_err());
    }

    #[tokio::test]
    async fn test_missing_file_reads_empty_and_update_creates_it() {
        let dir = TempDir::new().unwrap();
        let file: JsonFile<u64> = JsonFile::new(dir.path().join("nested/items.json"));
        assert!(file.read().await.unwrap().is_empty());

        file.update(|items| {
            items.push(5);
            Ok(())
        })
        .await
        .unwrap();
        assert_eq!(file.read().await.unwrap(), vec![5]);
    }

    #[tokio::test]
    async fn test_failed_update_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let file: JsonFile<u64> = JsonFile::new(dir.path().join("items.json"));
        let result: Result<()> = file
            .update(|items| {
                items.push(1);
                Err(anyhow!("nope"))
            })
            .await;
        assert!(result.is_err());
        assert!(!dir.path().join("items.json").exists());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_not_overwritten() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("items.json");
        std::fs::write(&path, "{not json").unwrap();

        let file: JsonFile<u64> = JsonFile::new(path.clone());
        let result = file.update(|items| {
            items.push(1);
            Ok(())
        });
        assert!(result.await.is_err());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{not json");
    }
}
