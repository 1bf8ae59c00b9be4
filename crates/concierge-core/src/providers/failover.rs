//! Provider chain with retry and automatic failover

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::types::{ChatMessage, ChatResponse, LlmProvider, OutputSchema, ToolDefinition};

/// Tries providers in order, retrying transient failures with backoff
pub struct FailoverProvider {
    /// Providers in failover order (index 0 = primary)
    providers: Vec<Box<dyn LlmProvider>>,
    /// Attempts per provider before moving to the next
    max_retries_per_provider: u32,
    /// Base delay for exponential backoff
    base_retry_delay: Duration,
}

impl FailoverProvider {
    /// A chain of providers in failover order
    pub fn new(providers: Vec<Box<dyn LlmProvider>>) -> Result<Self> {
        if providers.is_empty() {
            return Err(anyhow!("FailoverProvider requires at least one provider"));
        }
        Ok(Self {
            providers,
            max_retries_per_provider: 2,
            base_retry_delay: Duration::from_millis(500),
        })
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries_per_provider = max_retries.max(1);
        self
    }

    pub fn with_base_retry_delay(mut self, delay: Duration) -> Self {
        self.base_retry_delay = delay;
        self
    }

    /// Number of providers in the chain
    pub fn provider_count(&self) -> usize {
        self.providers.len()
    }
}

impl std::fmt::Debug for FailoverProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let chain: Vec<String> = self
            .providers
            .iter()
            .map(|p| format!("{}/{}", p.provider_name(), p.model()))
            .collect();
        f.debug_struct("FailoverProvider")
            .field("chain", &chain)
            .field("max_retries_per_provider", &self.max_retries_per_provider)
            .finish()
    }
}

#[async_trait]
impl LlmProvider for FailoverProvider {
    fn provider_name(&self) -> &str {
        self.providers
            .first()
            .map(|p| p.provider_name())
            .unwrap_or("unknown")
    }

    fn model(&self) -> &str {
        self.providers
            .first()
            .map(|p| p.model())
            .unwrap_or("unknown")
    }

    async fn chat(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
        system: &str,
        output: Option<&OutputSchema>,
    ) -> Result<ChatResponse> {
        let mut last_error = None;

        for (idx, provider) in self.providers.iter().enumerate() {
            for attempt in 0..self.max_retries_per_provider {
                debug!(
                    "Trying provider {} ({}/{}) attempt {}/{}",
                    provider.provider_name(),
                    provider.model(),
                    idx + 1,
                    attempt + 1,
                    self.max_retries_per_provider,
                );

                match provider.chat(messages, tools, system, output).await {
                    Ok(response) => {
                        if idx > 0 {
                            info!(
                                "Request succeeded on failover provider {} ({})",
                                provider.provider_name(),
                                provider.model()
                            );
                        }
                        return Ok(response);
                    }
                    Err(e) => {
                        let err_str = format!("{:#}", e);
                        let retryable = is_retryable_error(&err_str);

                        warn!(
                            "Provider {} ({}) failed (attempt {}, retryable={}): {}",
                            provider.provider_name(),
                            provider.model(),
                            attempt + 1,
                            retryable,
                            err_str,
                        );

                        last_error = Some(e);

                        if !retryable {
                            break;
                        }

                        if attempt + 1 < self.max_retries_per_provider {
                            let delay = self.base_retry_delay * 2u32.pow(attempt);
                            debug!("Backing off for {:?} before retry", delay);
                            tokio::time::sleep(delay).await;
                        }
                    }
                }
            }

            if let Some(next) = self.providers.get(idx + 1) {
                info!(
                    "Failing over from {} to {}",
                    provider.provider_name(),
                    next.provider_name()
                );
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow!("All providers failed")))
    }
}

/// Rate limits, server errors and transport hiccups are worth retrying
pub fn is_retryable_error(err: &str) -> bool {
    const RETRYABLE: &[&str] = &[
        "429",
        "500",
        "502",
        "503",
        "504",
        "rate limit",
        "rate_limit",
        "overloaded",
        "timeout",
        "timed out",
        "connection reset",
        "connection refused",
        "temporarily unavailable",
    ];
    let lower = err.to_lowercase();
    RETRYABLE.iter().any(|p| lower.contains(p))
}
