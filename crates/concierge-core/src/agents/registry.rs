//! Specialist handlers and the name → handler registry

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use super::roster::EnabledAgents;
use crate::history::Message;

/// What a specialist hands back
#[derive(Debug, Clone, PartialEq)]
pub enum SpecialistOutput {
    Text(String),
    Structured(Value),
}

impl SpecialistOutput {
    /// Plain text for the user. JSON strings pass through unquoted, other
    /// values are pretty-printed.
    pub fn into_text(self) -> String {
        match self {
            Self::Text(text) => text,
            Self::Structured(Value::String(text)) => text,
            Self::Structured(value) => {
                serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string())
            }
        }
    }
}

impl From<String> for SpecialistOutput {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for SpecialistOutput {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<Value> for SpecialistOutput {
    fn from(value: Value) -> Self {
        Self::Structured(value)
    }
}

/// An LLM-backed task handler for one domain
#[async_trait]
pub trait Specialist: Send + Sync {
    fn name(&self) -> &str;

    /// Handle `task` with the prior conversation turns as context.
    /// Errors propagate to the caller untouched.
    async fn run(&self, task: &str, history: &[Message]) -> Result<SpecialistOutput>;
}

/// Live specialists keyed by display name
#[derive(Default)]
pub struct SpecialistRegistry {
    specialists: HashMap<String, Arc<dyn Specialist>>,
}

impl SpecialistRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, specialist: Arc<dyn Specialist>) {
        let name = specialist.name().to_string();
        debug!("Registering specialist: {}", name);
        self.specialists.insert(name, specialist);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Specialist>> {
        self.specialists.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.specialists.contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.specialists.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.specialists.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specialists.is_empty()
    }

    /// Drop every specialist not in `enabled`
    pub fn retain_enabled(&mut self, enabled: &EnabledAgents) {
        let before = self.specialists.len();
        self.specialists.retain(|name, _| enabled.contains(name));
        let removed = before - self.specialists.len();
        if removed > 0 {
            info!("Removed {} disabled specialist(s)", removed);
        }
    }
}

impl std::fmt::Debug for SpecialistRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpecialistRegistry")
            .field("specialists", &self.names())
            .finish()
    }
}
