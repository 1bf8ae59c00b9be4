//! OpenAI chat-completions provider
//!
//! Speaks the chat-completions wire format against OpenAI itself, any
//! OpenAI-compatible server (Ollama), or an Azure OpenAI deployment.

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use super::types::{
    ChatBlock, ChatMessage, ChatMessageContent, ChatResponse, ChatResponseBlock, ChatRole,
    ChatUsage, LlmProvider, OutputSchema, StopReason, ToolDefinition,
};

/// Where chat-completions requests are sent
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenAiEndpoint {
    /// `{base_url}/v1/chat/completions` with bearer auth
    Standard { base_url: String },
    /// Azure OpenAI deployment with `api-key` auth
    Azure {
        endpoint: String,
        deployment: String,
        api_version: String,
    },
}

impl OpenAiEndpoint {
    fn url(&self) -> String {
        match self {
            Self::Standard { base_url } => {
                format!("{}/v1/chat/completions", base_url.trim_end_matches('/'))
            }
            Self::Azure {
                endpoint,
                deployment,
                api_version,
            } => format!(
                "{}/openai/deployments/{}/chat/completions?api-version={}",
                endpoint.trim_end_matches('/'),
                deployment,
                api_version
            ),
        }
    }
}

pub struct OpenAiProvider {
    client: Client,
    api_key: String,
    endpoint: OpenAiEndpoint,
    model: String,
    max_tokens: u32,
    name: &'static str,
}

impl std::fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("name", &self.name)
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

impl OpenAiProvider {
    pub fn new(api_key: String, model: String, base_url: String, max_tokens: u32) -> Self {
        Self::with_endpoint(
            api_key,
            model,
            OpenAiEndpoint::Standard { base_url },
            max_tokens,
        )
    }

    /// Azure OpenAI; the deployment doubles as the model name
    pub fn azure(
        api_key: String,
        endpoint: String,
        deployment: String,
        api_version: String,
        max_tokens: u32,
    ) -> Self {
        let model = deployment.clone();
        Self::with_endpoint(
            api_key,
            model,
            OpenAiEndpoint::Azure {
                endpoint,
                deployment,
                api_version,
            },
            max_tokens,
        )
        .named("azure")
    }

    /// Local Ollama server through its OpenAI-compatible API
    pub fn ollama(host: String, model: String, max_tokens: u32) -> Self {
        Self::new(String::new(), model, host, max_tokens).named("ollama")
    }

    pub fn with_endpoint(
        api_key: String,
        model: String,
        endpoint: OpenAiEndpoint,
        max_tokens: u32,
    ) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            api_key,
            endpoint,
            model,
            max_tokens,
            name: "openai",
        }
    }

    fn named(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    fn request<'a>(
        &'a self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
        system: &str,
        output: Option<&OutputSchema>,
    ) -> CompletionRequest<'a> {
        CompletionRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            messages: wire_messages(messages, system),
            tools: tools.iter().map(WireTool::from).collect(),
            response_format: output.map(ResponseFormat::from),
        }
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn provider_name(&self) -> &str {
        self.name
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn chat(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
        system: &str,
        output: Option<&OutputSchema>,
    ) -> Result<ChatResponse> {
        let request = self.request(messages, tools, system, output);
        debug!(
            "{} request: model={}, messages={}, tools={}, structured={}",
            self.name,
            self.model,
            request.messages.len(),
            request.tools.len(),
            request.response_format.is_some()
        );

        let builder = self.client.post(self.endpoint.url());
        let builder = match &self.endpoint {
            OpenAiEndpoint::Azure { .. } => builder.header("api-key", &self.api_key),
            OpenAiEndpoint::Standard { .. } if self.api_key.is_empty() => builder,
            OpenAiEndpoint::Standard { .. } => builder.bearer_auth(&self.api_key),
        };

        let response = builder
            .json(&request)
            .send()
            .await
            .with_context(|| format!("Failed to send request to {} API", self.name))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("{} API returned {}: {}", self.name, status, body));
        }

        let body: CompletionResponse = response
            .json()
            .await
            .with_context(|| format!("Failed to parse {} API response", self.name))?;
        debug!(
            "{} response: choices={}, finish_reason={:?}",
            self.name,
            body.choices.len(),
            body.choices.first().and_then(|c| c.finish_reason.as_deref())
        );
        body.try_into()
    }
}

/// Flatten provider-agnostic turns into chat-completions messages.
///
/// Tool results become separate `tool` role messages.
fn wire_messages(messages: &[ChatMessage], system: &str) -> Vec<WireMessage> {
    let mut out = vec![WireMessage::text("system", system)];

    for msg in messages {
        match (msg.role, &msg.content) {
            (ChatRole::System, _) => {}
            (ChatRole::User, ChatMessageContent::Text(text)) => out.push(WireMessage::text("user", text)),
            (ChatRole::Assistant, ChatMessageContent::Text(text)) => {
                out.push(WireMessage::text("assistant", text))
            }
            (ChatRole::Assistant, ChatMessageContent::Blocks(blocks)) => {
                let mut text = Vec::new();
                let mut calls = Vec::new();
                for block in blocks {
                    match block {
                        ChatBlock::Text { text: t } => text.push(t.as_str()),
                        ChatBlock::ToolCall { id, name, input } => calls.push(WireToolCall {
                            id: id.clone(),
                            kind: "function".to_string(),
                            function: WireFunctionCall {
                                name: name.clone(),
                                arguments: input.to_string(),
                            },
                        }),
                        ChatBlock::ToolResult { .. } => {}
                    }
                }
                out.push(WireMessage {
                    role: "assistant",
                    content: (!text.is_empty()).then(|| text.join("\n")),
                    tool_calls: (!calls.is_empty()).then_some(calls),
                    tool_call_id: None,
                });
            }
            (ChatRole::User, ChatMessageContent::Blocks(blocks)) => {
                let mut text = Vec::new();
                for block in blocks {
                    match block {
                        ChatBlock::Text { text: t } => text.push(t.as_str()),
                        ChatBlock::ToolResult {
                            tool_call_id,
                            content,
                        } => out.push(WireMessage {
                            role: "tool",
                            content: Some(content.clone()),
                            tool_calls: None,
                            tool_call_id: Some(tool_call_id.clone()),
                        }),
                        ChatBlock::ToolCall { .. } => {}
                    }
                }
                if !text.is_empty() {
                    out.push(WireMessage::text("user", &text.join("\n")));
                }
            }
        }
    }
    out
}

// ── Wire types ──

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl WireMessage {
    fn text(role: &'static str, text: &str) -> Self {
        Self {
            role,
            content: Some(text.to_string()),
            tool_calls: None,
            tool_call_id: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type", default)]
    kind: String,
    function: WireFunctionCall,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireFunctionCall {
    name: String,
    /// JSON-encoded arguments
    arguments: String,
}

#[derive(Debug, Serialize)]
struct WireTool {
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireToolFunction,
}

#[derive(Debug, Serialize)]
struct WireToolFunction {
    name: String,
    description: String,
    parameters: Value,
}

impl From<&ToolDefinition> for WireTool {
    fn from(t: &ToolDefinition) -> Self {
        Self {
            kind: "function",
            function: WireToolFunction {
                name: t.name.clone(),
                description: t.description.clone(),
                parameters: t.input_schema.clone(),
            },
        }
    }
}

/// `response_format` constraining the reply to a JSON schema
#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
    json_schema: JsonSchemaFormat,
}

#[derive(Debug, Serialize)]
struct JsonSchemaFormat {
    name: String,
    description: String,
    schema: Value,
    strict: bool,
}

impl From<&OutputSchema> for ResponseFormat {
    fn from(o: &OutputSchema) -> Self {
        Self {
            kind: "json_schema",
            json_schema: JsonSchemaFormat {
                name: o.name.clone(),
                description: o.description.clone(),
                schema: o.schema.clone(),
                strict: true,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<WireToolCall>,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

impl TryFrom<CompletionResponse> for ChatResponse {
    type Error = anyhow::Error;

    fn try_from(resp: CompletionResponse) -> Result<Self> {
        let choice = resp
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("Completion response had no choices"))?;

        let mut blocks = Vec::new();
        if let Some(text) = choice.message.content.filter(|t| !t.is_empty()) {
            blocks.push(ChatResponseBlock::Text { text });
        }
        for call in choice.message.tool_calls {
            // Malformed arguments reach the tool as an empty object and fail validation there
            let input = serde_json::from_str(&call.function.arguments)
                .unwrap_or_else(|_| Value::Object(Default::default()));
            blocks.push(ChatResponseBlock::ToolCall {
                id: call.id,
                name: call.function.name,
                input,
            });
        }

        let stop_reason = match choice.finish_reason.as_deref() {
            Some("tool_calls") => StopReason::ToolUse,
            Some("stop") => StopReason::EndTurn,
            Some("length") => StopReason::MaxTokens,
            _ => StopReason::Unknown,
        };

        let usage = resp
            .usage
            .map(|u| ChatUsage {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
            })
            .unwrap_or_default();

        Ok(ChatResponse {
            blocks,
            stop_reason,
            usage,
        })
    }
}
