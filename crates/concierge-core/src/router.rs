//! Router: one structured-output LLM call that picks a specialist

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::history::Message;
use crate::providers::{ChatMessage, LlmProvider};
use crate::route::{Route, RouteSchema, RoutingError};

/// Produces a routing decision for a query
#[async_trait]
pub trait RouteDecider: Send + Sync {
    /// `history` holds the prior turns only; `query` is the current one.
    async fn decide(
        &self,
        query: &str,
        history: &[Message],
        schema: &RouteSchema,
    ) -> Result<Route, RoutingError>;
}

/// Routes with a provider call constrained to the schema's output shape
pub struct LlmRouter {
    provider: Arc<dyn LlmProvider>,
    system_prompt: String,
}

impl LlmRouter {
    pub fn new(provider: Arc<dyn LlmProvider>, system_prompt: impl Into<String>) -> Self {
        Self {
            provider,
            system_prompt: system_prompt.into(),
        }
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }
}

#[async_trait]
impl RouteDecider for LlmRouter {
    async fn decide(
        &self,
        query: &str,
        history: &[Message],
        schema: &RouteSchema,
    ) -> Result<Route, RoutingError> {
        if schema.is_sentinel() {
            return Err(RoutingError::NoSpecialists);
        }

        let mut messages = ChatMessage::from_history(history);
        messages.push(ChatMessage::user(query));

        let output = schema.output_schema();
        debug!(
            "Routing via {} ({}) over {} prior turn(s)",
            self.provider.provider_name(),
            self.provider.model(),
            history.len()
        );
        let response = self
            .provider
            .chat(&messages, &[], &self.system_prompt, Some(&output))
            .await?;

        let result = match response.tool_input(&output.name) {
            Some(input) => schema.validate(input),
            None => schema.parse(&response.text()),
        };
        if let Err(e) = &result {
            warn!(
                "Router output rejected: {} (raw: {})",
                e,
                e.raw_payload().unwrap_or_default()
            );
        }
        result
    }
}
