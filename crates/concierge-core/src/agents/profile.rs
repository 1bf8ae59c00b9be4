//! Specialist profile: system prompt and toolset read from YAML

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::roster::display_name;

/// Contents of one `config/agents/<name>.yaml` file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecialistProfile {
    pub system_prompt: String,
    #[serde(default)]
    pub tools: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl SpecialistProfile {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            tools: Vec::new(),
            description: None,
        }
    }

    pub fn with_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tools = tools.into_iter().map(Into::into).collect();
        self
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yml::from_str(yaml).context("Failed to parse specialist profile")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read profile {}", path.display()))?;
        Self::from_yaml(&content).with_context(|| format!("Invalid profile {}", path.display()))
    }
}

/// A profile file found on disk, keyed by the display name of its stem
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileFile {
    pub name: String,
    pub path: PathBuf,
}

impl ProfileFile {
    /// `search_agent.yaml` → `Search Agent`
    pub fn from_path(path: PathBuf) -> Option<Self> {
        let stem = path.file_stem()?.to_str()?;
        let name = display_name(stem);
        if name.is_empty() {
            return None;
        }
        Some(Self { name, path })
    }
}
