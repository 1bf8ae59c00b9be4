//! Provider-agnostic tool use loop

use anyhow::{Result, anyhow};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::tools::ToolExecutor;
use crate::usage::AccumulatedUsage;

use super::types::{
    ChatBlock, ChatMessage, ChatMessageContent, ChatResponseBlock, ChatRole, LlmProvider,
    StopReason,
};

const MAX_ITERATIONS: usize = 10;
const LOOP_TIMEOUT: Duration = Duration::from_secs(300);
const MAX_TOOL_OUTPUT: usize = 100_000;

/// Run `task` against `provider`, executing tool calls until the model
/// produces a final text answer. Gives up after 5 minutes.
pub async fn run_tool_loop(
    provider: &dyn LlmProvider,
    prior_turns: &[ChatMessage],
    task: &str,
    system: &str,
    tool_executor: &dyn ToolExecutor,
) -> Result<(String, AccumulatedUsage)> {
    tokio::time::timeout(
        LOOP_TIMEOUT,
        run_tool_loop_inner(provider, prior_turns, task, system, tool_executor),
    )
    .await
    .map_err(|_| anyhow!("Tool loop timed out after 5 minutes"))?
}

async fn run_tool_loop_inner(
    provider: &dyn LlmProvider,
    prior_turns: &[ChatMessage],
    task: &str,
    system: &str,
    tool_executor: &dyn ToolExecutor,
) -> Result<(String, AccumulatedUsage)> {
    let tools = tool_executor.list_tools();
    let mut accumulated = AccumulatedUsage::new();

    let mut conversation: Vec<ChatMessage> = prior_turns.to_vec();
    conversation.push(ChatMessage::user(task));

    for iteration in 1..=MAX_ITERATIONS {
        debug!("Tool loop iteration {}", iteration);

        let response = provider.chat(&conversation, &tools, system, None).await?;
        accumulated.add(response.usage.input_tokens, response.usage.output_tokens);

        match response.stop_reason {
            StopReason::ToolUse => {
                let mut tool_results = Vec::new();

                for block in &response.blocks {
                    if let ChatResponseBlock::ToolCall { id, name, input } = block {
                        info!("Executing tool: {}", name);
                        accumulated.record_tool_call(name);

                        let mut content = match tool_executor.execute(name, input.clone()).await {
                            Ok(output) => output,
                            Err(e) => {
                                warn!("Tool {} failed: {}", name, e);
                                format!("Error: {}", e)
                            }
                        };
                        truncate_output(&mut content);

                        tool_results.push(ChatBlock::ToolResult {
                            tool_call_id: id.clone(),
                            content,
                        });
                    }
                }

                if tool_results.is_empty() {
                    return Err(anyhow!("Stop reason was tool_use but no tool calls found"));
                }

                conversation.push(ChatMessage {
                    role: ChatRole::Assistant,
                    content: ChatMessageContent::Blocks(
                        response.blocks.into_iter().map(ChatBlock::from).collect(),
                    ),
                });
                conversation.push(ChatMessage {
                    role: ChatRole::User,
                    content: ChatMessageContent::Blocks(tool_results),
                });
            }
            stop => {
                if stop == StopReason::MaxTokens {
                    warn!("Model hit max_tokens; returning partial answer");
                }
                let text = response.text();
                if text.trim().is_empty() {
                    return Err(anyhow!("No text response from model (stop: {:?})", stop));
                }
                debug!(
                    "Tool loop completed (iterations: {}, tokens: in={} out={})",
                    iteration, accumulated.input_tokens, accumulated.output_tokens
                );
                return Ok((text, accumulated));
            }
        }
    }

    warn!("Tool loop exceeded maximum iterations ({})", MAX_ITERATIONS);
    Err(anyhow!("Tool loop exceeded maximum iterations"))
}

/// Cap oversized tool output on a char boundary
fn truncate_output(content: &mut String) {
    if content.len() <= MAX_TOOL_OUTPUT {
        return;
    }
    let mut cut = MAX_TOOL_OUTPUT;
    while !content.is_char_boundary(cut) {
        cut -= 1;
    }
    content.truncate(cut);
    content.push_str("\n[Output truncated]");
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::Mutex;

    use crate::providers::{ChatResponse, ChatUsage, OutputSchema, ToolDefinition};

    /// Replays canned responses and records what it was sent
    struct ScriptedProvider {
        responses: Mutex<Vec<ChatResponse>>,
        seen: Mutex<Vec<Vec<ChatMessage>>>,
    }

    impl ScriptedProvider {
        fn new(mut responses: Vec<ChatResponse>) -> Self {
            responses.reverse();
            Self {
                responses: Mutex::new(responses),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        fn provider_name(&self) -> &str {
            "scripted"
        }
        fn model(&self) -> &str {
            "scripted-model"
        }
        async fn chat(
            &self,
            messages: &[ChatMessage],
            _tools: &[ToolDefinition],
            _system: &str,
            _output: Option<&OutputSchema>,
        ) -> Result<ChatResponse> {
            self.seen.lock().unwrap().push(messages.to_vec());
            self.responses
                .lock()
                .unwrap()
                .pop()
                .ok_or_else(|| anyhow!("script exhausted"))
        }
    }

    struct EchoTools;

    #[async_trait]
    impl ToolExecutor for EchoTools {
        async fn execute(&self, tool_name: &str, input: Value) -> Result<String> {
            match tool_name {
                "echo" => Ok(input["text"].as_str().unwrap_or_default().to_string()),
                "huge" => Ok("é".repeat(MAX_TOOL_OUTPUT)),
                _ => Err(anyhow!("Unknown tool: {}", tool_name)),
            }
        }

        fn list_tools(&self) -> Vec<ToolDefinition> {
            vec![]
        }
    }

    fn text(t: &str) -> ChatResponse {
        ChatResponse {
            blocks: vec![ChatResponseBlock::Text { text: t.to_string() }],
            stop_reason: StopReason::EndTurn,
            usage: ChatUsage {
                input_tokens: 3,
                output_tokens: 2,
            },
        }
    }

    fn call(name: &str, input: Value) -> ChatResponse {
        ChatResponse {
            blocks: vec![ChatResponseBlock::ToolCall {
                id: format!("call_{}", name),
                name: name.to_string(),
                input,
            }],
            stop_reason: StopReason::ToolUse,
            usage: ChatUsage {
                input_tokens: 5,
                output_tokens: 1,
            },
        }
    }

    fn last_tool_result(messages: &[ChatMessage]) -> String {
        match &messages.last().unwrap().content {
            ChatMessageContent::Blocks(blocks) => match &blocks[0] {
                ChatBlock::ToolResult { content, .. } => content.clone(),
                _ => panic!("expected tool result"),
            },
            _ => panic!("expected blocks"),
        }
    }

    #[tokio::test]
    async fn test_direct_answer() {
        let provider = ScriptedProvider::new(vec![text("hello")]);
        let (answer, usage) = run_tool_loop(&provider, &[], "hi", "sys", &EchoTools)
            .await
            .unwrap();
        assert_eq!(answer, "hello");
        assert_eq!(usage.api_calls, 1);
        assert!(usage.tool_calls.is_empty());
    }

    #[tokio::test]
    async fn test_prior_turns_precede_task() {
        let provider = ScriptedProvider::new(vec![text("ok")]);
        let prior = vec![ChatMessage::user("earlier"), ChatMessage::assistant("reply")];
        run_tool_loop(&provider, &prior, "now", "sys", &EchoTools)
            .await
            .unwrap();

        let seen = provider.seen.lock().unwrap();
        assert_eq!(seen[0].len(), 3);
        assert!(matches!(&seen[0][2].content, ChatMessageContent::Text(t) if t == "now"));
    }

    #[tokio::test]
    async fn test_tool_call_then_answer() {
        let provider = ScriptedProvider::new(vec![
            call("echo", serde_json::json!({"text": "pong"})),
            text("done"),
        ]);
        let (answer, usage) = run_tool_loop(&provider, &[], "ping", "sys", &EchoTools)
            .await
            .unwrap();
        assert_eq!(answer, "done");
        assert_eq!(usage.api_calls, 2);
        assert_eq!(usage.tool_calls, vec!["echo".to_string()]);
        assert_eq!(usage.input_tokens, 8);

        let seen = provider.seen.lock().unwrap();
        assert_eq!(last_tool_result(&seen[1]), "pong");
    }

    #[tokio::test]
    async fn test_tool_error_is_fed_back() {
        let provider = ScriptedProvider::new(vec![call("missing", serde_json::json!({})), text("sorry")]);
        let (answer, _) = run_tool_loop(&provider, &[], "x", "sys", &EchoTools)
            .await
            .unwrap();
        assert_eq!(answer, "sorry");

        let seen = provider.seen.lock().unwrap();
        assert!(last_tool_result(&seen[1]).starts_with("Error: Unknown tool"));
    }

    #[tokio::test]
    async fn test_oversized_output_truncated() {
        let provider = ScriptedProvider::new(vec![call("huge", serde_json::json!({})), text("ok")]);
        run_tool_loop(&provider, &[], "x", "sys", &EchoTools)
            .await
            .unwrap();

        let seen = provider.seen.lock().unwrap();
        let result = last_tool_result(&seen[1]);
        assert!(result.ends_with("[Output truncated]"));
        assert!(result.len() <= MAX_TOOL_OUTPUT + 20);
    }

    #[tokio::test]
    async fn test_iteration_limit() {
        let script = (0..=MAX_ITERATIONS)
            .map(|_| call("echo", serde_json::json!({"text": "again"})))
            .collect();
        let provider = ScriptedProvider::new(script);
        let err = run_tool_loop(&provider, &[], "loop", "sys", &EchoTools)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("maximum iterations"));
    }

    #[tokio::test]
    async fn test_empty_answer_is_error() {
        let provider = ScriptedProvider::new(vec![text("  ")]);
        assert!(
            run_tool_loop(&provider, &[], "x", "sys", &EchoTools)
                .await
                .is_err()
        );
    }
}
