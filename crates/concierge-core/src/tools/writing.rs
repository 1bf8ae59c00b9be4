//! Writing helpers that delegate the rewrite to the language model

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use crate::providers::{ChatMessage, LlmProvider};

use super::{ToolHandler, json_schema, str_arg};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WritingTask {
    Improve,
    FixSpellingGrammar,
    MakeShorter,
    MakeLonger,
    ChangeTone,
}

impl WritingTask {
    pub const ALL: [WritingTask; 5] = [
        Self::Improve,
        Self::FixSpellingGrammar,
        Self::MakeShorter,
        Self::MakeLonger,
        Self::ChangeTone,
    ];

    fn tool_name(self) -> &'static str {
        match self {
            Self::Improve => "improve_writing",
            Self::FixSpellingGrammar => "fix_spelling_grammar",
            Self::MakeShorter => "make_shorter",
            Self::MakeLonger => "make_longer",
            Self::ChangeTone => "change_tone",
        }
    }

    fn description(self) -> &'static str {
        match self {
            Self::Improve => {
                "Improve the provided text, focusing on clarity, engagement, and flow."
            }
            Self::FixSpellingGrammar => "Fix all spelling and grammar mistakes in the provided text.",
            Self::MakeShorter => "Make the provided text shorter and more concise.",
            Self::MakeLonger => "Expand on the provided text, adding more detail and explanation.",
            Self::ChangeTone => "Rewrite the provided text in a specified tone.",
        }
    }

    fn system_prompt(self, tone: Option<&str>) -> String {
        let instruction = match self {
            Self::Improve => "Improve the following text, focusing on clarity, engagement, and flow. Do not just fix grammar and spelling. Only output the improved text.".to_string(),
            Self::FixSpellingGrammar => "Fix all spelling and grammar mistakes in the following text. Only output the corrected text.".to_string(),
            Self::MakeShorter => "Make the following text shorter and more concise. Only output the shortened text.".to_string(),
            Self::MakeLonger => "Expand on the following text, adding more detail and explanation. Only output the expanded text.".to_string(),
            Self::ChangeTone => format!(
                "Rewrite the following text in a {} tone. Only output the rewritten text.",
                tone.unwrap_or("neutral").to_lowercase()
            ),
        };
        format!("You are a writing assistant. {}", instruction)
    }
}

/// One rewrite operation exposed as a tool
pub struct WritingTool {
    task: WritingTask,
    llm: Arc<dyn LlmProvider>,
}

impl WritingTool {
    pub fn new(task: WritingTask, llm: Arc<dyn LlmProvider>) -> Self {
        Self { task, llm }
    }

    /// Every writing tool, sharing one provider
    pub fn all(llm: Arc<dyn LlmProvider>) -> Vec<WritingTool> {
        WritingTask::ALL
            .into_iter()
            .map(|task| Self::new(task, llm.clone()))
            .collect()
    }
}

#[async_trait]
impl ToolHandler for WritingTool {
    fn name(&self) -> &str {
        self.task.tool_name()
    }

    fn description(&self) -> &str {
        self.task.description()
    }

    fn input_schema(&self) -> Value {
        let mut properties = serde_json::json!({
            "text": {"type": "string", "description": "The text to be processed"}
        });
        let mut required = vec!["text"];
        if self.task == WritingTask::ChangeTone {
            properties["tone"] = serde_json::json!({
                "type": "string",
                "description": "The desired tone (e.g., Formal, Casual, Confident, Friendly)"
            });
            required.push("tone");
        }
        json_schema(properties, required)
    }

    async fn execute(&self, input: Value) -> Result<String> {
        let text = str_arg(&input, "text")?;
        let tone = match self.task {
            WritingTask::ChangeTone => Some(str_arg(&input, "tone")?),
            _ => None,
        };
        let prompt = self.task.system_prompt(tone);

        debug!("{} on {} chars via {}", self.name(), text.len(), self.llm.provider_name());
        let response = self
            .llm
            .chat(&[ChatMessage::user(text)], &[], &prompt, None)
            .await?;

        let rewritten = response.text();
        if rewritten.trim().is_empty() {
            return Err(anyhow!("{} produced no text", self.name()));
        }
        Ok(rewritten)
    }
}
