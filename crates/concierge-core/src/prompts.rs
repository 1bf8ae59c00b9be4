//! System prompt building for the router and time-sensitive specialists

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use tracing::debug;

#[derive(Deserialize)]
struct RouterPromptFile {
    system_prompt: String,
}

/// Base router instructions from a `router.yaml` file
pub fn load_router_base(path: &Path) -> Result<String> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read router prompt {}", path.display()))?;
    let file: RouterPromptFile = serde_yml::from_str(&content)
        .with_context(|| format!("Invalid router prompt {}", path.display()))?;
    Ok(file.system_prompt)
}

/// Local wall-clock time as injected into prompts
pub fn timestamp() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Router prompt: base instructions, current time, and the closed list of
/// specialists it may pick from
pub fn router_prompt<S: AsRef<str>>(base: &str, specialists: &[S], now: &str) -> String {
    let available = specialists
        .iter()
        .map(|name| format!("- {}", name.as_ref()))
        .collect::<Vec<_>>()
        .join("\n");

    let prompt = format!(
        "{}\n\nThe current date and time is: {}.\nHere are the ONLY available specialists you can route to:\n{}",
        base.trim_end(),
        now,
        available
    );
    debug!("Built router prompt ({} chars)", prompt.len());
    prompt
}

/// Prefix a specialist prompt with the current time
pub fn with_timestamp(prompt: &str, now: &str) -> String {
    format!(
        "The current date and time is: {}. Use this information to better understand user queries about recent events. {}",
        now, prompt
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_router_prompt_lists_only_given_specialists() {
        let prompt = router_prompt(
            "You route requests.\n",
            &["Search Agent", "Note Agent"],
            "2025-03-01 09:30:00",
        );
        assert!(prompt.starts_with("You route requests.\n\nThe current date and time is: 2025-03-01 09:30:00."));
        assert!(prompt.ends_with("route to:\n- Search Agent\n- Note Agent"));
        assert!(!prompt.contains("Code Agent"));
    }

    #[test]
    fn test_router_prompt_empty_list() {
        let names: Vec<String> = vec![];
        let prompt = router_prompt("base", &names, "now");
        assert!(prompt.ends_with("route to:\n"));
    }

    #[test]
    fn test_with_timestamp() {
        let prompt = with_timestamp("Search the web.", "2025-01-02 03:04:05");
        assert!(prompt.starts_with("The current date and time is: 2025-01-02 03:04:05."));
        assert!(prompt.ends_with("Search the web."));
    }

    #[test]
    fn test_load_router_base() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("router.yaml");
        std::fs::write(&path, "system_prompt: |\n  Pick one.\n").unwrap();
        assert_eq!(load_router_base(&path).unwrap(), "Pick one.\n");

        std::fs::write(&path, "prompt: nope\n").unwrap();
        assert!(load_router_base(&path).is_err());
    }

    #[test]
    fn test_timestamp_format() {
        let ts = timestamp();
        assert!(chrono::NaiveDateTime::parse_from_str(&ts, "%Y-%m-%d %H:%M:%S").is_ok());
    }
}
