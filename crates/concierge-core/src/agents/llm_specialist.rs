//! Specialist that answers by running the provider tool loop

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

use super::registry::{Specialist, SpecialistOutput};
use crate::history::Message;
use crate::providers::{ChatMessage, LlmProvider, run_tool_loop};
use crate::tools::{FilteredToolExecutor, ToolExecutor, ToolRegistry};

/// A profile's system prompt and toolset bound to a provider
pub struct LlmSpecialist {
    name: String,
    system_prompt: String,
    tools: Vec<String>,
    provider: Arc<dyn LlmProvider>,
    registry: Arc<ToolRegistry>,
}

impl LlmSpecialist {
    pub fn new(
        name: impl Into<String>,
        system_prompt: impl Into<String>,
        tools: Vec<String>,
        provider: Arc<dyn LlmProvider>,
        registry: Arc<ToolRegistry>,
    ) -> Self {
        Self {
            name: name.into(),
            system_prompt: system_prompt.into(),
            tools,
            provider,
            registry,
        }
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn tools(&self) -> &[String] {
        &self.tools
    }
}

#[async_trait]
impl Specialist for LlmSpecialist {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, task: &str, history: &[Message]) -> Result<SpecialistOutput> {
        let executor = FilteredToolExecutor::new(self.registry.clone(), &self.tools);
        debug!(
            "{} starting with {} prior turn(s) and {} tool(s)",
            self.name,
            history.len(),
            executor.list_tools().len()
        );

        let prior = ChatMessage::from_history(history);
        let (answer, usage) = run_tool_loop(
            self.provider.as_ref(),
            &prior,
            task,
            &self.system_prompt,
            &executor,
        )
        .await?;

        info!("{} finished: {}", self.name, usage);
        Ok(SpecialistOutput::Text(answer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{
        ChatMessageContent, ChatResponse, ChatResponseBlock, ChatUsage, OutputSchema,
        StopReason, ToolDefinition,
    };
    use crate::tools::{ToolHandler, json_schema};
    use serde_json::Value;
    use std::sync::Mutex;

    /// Calls `shout` once, then answers with the tool result
    #[derive(Default)]
    struct ToolCallingLlm {
        requests: Mutex<Vec<(String, Vec<ChatMessage>, Vec<String>)>>,
    }

    #[async_trait]
    impl LlmProvider for ToolCallingLlm {
        fn provider_name(&self) -> &str {
            "mock"
        }
        fn model(&self) -> &str {
            "mock-model"
        }
        async fn chat(
            &self,
            messages: &[ChatMessage],
            tools: &[ToolDefinition],
            system: &str,
            _output: Option<&OutputSchema>,
        ) -> Result<ChatResponse> {
            let tool_names = tools.iter().map(|t| t.name.clone()).collect();
            self.requests
                .lock()
                .unwrap()
                .push((system.to_string(), messages.to_vec(), tool_names));

            let last_result = match &messages.last().unwrap().content {
                ChatMessageContent::Blocks(blocks) => blocks.iter().find_map(|b| match b {
                    crate::providers::ChatBlock::ToolResult { content, .. } => {
                        Some(content.clone())
                    }
                    _ => None,
                }),
                ChatMessageContent::Text(_) => None,
            };

            let response = match last_result {
                Some(result) => ChatResponse {
                    blocks: vec![ChatResponseBlock::Text {
                        text: format!("done: {}", result),
                    }],
                    stop_reason: StopReason::EndTurn,
                    usage: ChatUsage::default(),
                },
                None => ChatResponse {
                    blocks: vec![ChatResponseBlock::ToolCall {
                        id: "call_1".to_string(),
                        name: "shout".to_string(),
                        input: serde_json::json!({"text": "hi"}),
                    }],
                    stop_reason: StopReason::ToolUse,
                    usage: ChatUsage::default(),
                },
            };
            Ok(response)
        }
    }

    struct NamedTool(&'static str);

    #[async_trait]
    impl ToolHandler for NamedTool {
        fn name(&self) -> &str {
            self.0
        }
        fn description(&self) -> &str {
            "test"
        }
        fn input_schema(&self) -> Value {
            json_schema(serde_json::json!({}), vec![])
        }
        async fn execute(&self, input: Value) -> Result<String> {
            Ok(input["text"].as_str().unwrap_or_default().to_uppercase())
        }
    }

    #[tokio::test]
    async fn test_runs_tool_loop_with_profile_tools() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(NamedTool("shout")));
        registry.register(Arc::new(NamedTool("secret")));

        let llm = Arc::new(ToolCallingLlm::default());
        let specialist = LlmSpecialist::new(
            "Note Agent",
            "You take notes.",
            vec!["shout".to_string()],
            llm.clone(),
            Arc::new(registry),
        );

        let history = vec![Message::user("earlier"), Message::assistant("reply")];
        let out = specialist.run("do it", &history).await.unwrap();
        assert_eq!(out.into_text(), "done: HI");

        let requests = llm.requests.lock().unwrap();
        let (system, messages, tools) = &requests[0];
        assert_eq!(system, "You take notes.");
        assert_eq!(tools, &vec!["shout".to_string()]);
        assert_eq!(messages.len(), 3);
        assert!(matches!(&messages[2].content, ChatMessageContent::Text(t) if t == "do it"));
    }
}
