//! One-time construction of everything a session needs

use anyhow::{Context, Result, anyhow, bail};
use concierge_core::agents::{EnabledAgents, SpecialistContext, SpecialistRegistry, load_specialists};
use concierge_core::providers::{AnthropicProvider, FailoverProvider, LlmProvider, OpenAiProvider};
use concierge_core::tools::{ToolRegistry, builtin_registry};
use concierge_core::{Assistant, Dispatcher, LlmRouter, RouteSchema, TemporalAnchor, TurnSink, prompts};
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::{ConciergeConfig, ProvidersConfig, shellexpand};

/// Process-wide state built once at startup and shared read-only
pub struct Runtime {
    pub enabled: EnabledAgents,
    pub schema: Arc<RouteSchema>,
    pub provider: Arc<dyn LlmProvider>,
    pub tools: Arc<ToolRegistry>,
    pub specialists: Arc<SpecialistRegistry>,
    pub router: Arc<LlmRouter>,
    dispatcher: Arc<Dispatcher>,
    search_agent: String,
    history_capacity: usize,
    turn_sink: Option<TurnSink>,
}

impl Runtime {
    pub fn build(config: &ConciergeConfig) -> Result<Self> {
        let enabled = EnabledAgents::from_toggles(config.agents.iter().map(|(k, v)| (k, *v)));
        let schema = Arc::new(RouteSchema::build(enabled.iter()));

        let provider = build_provider(&config.providers)?;
        let tools = Arc::new(builtin_registry(&config.tools.to_settings(), provider.clone()));

        let ctx = SpecialistContext {
            profiles_dir: shellexpand(&config.assistant.agents_dir),
            search_specialist: config.assistant.search_agent.clone(),
            provider: provider.clone(),
            tools: tools.clone(),
        };
        let mut specialists = load_specialists(&enabled, &ctx)?;
        specialists.retain_enabled(&enabled);
        let specialists = Arc::new(specialists);

        let base = prompts::load_router_base(&shellexpand(&config.assistant.router_prompt))?;
        let router_prompt = prompts::router_prompt(&base, enabled.names(), &prompts::timestamp());
        let router = Arc::new(LlmRouter::new(provider.clone(), router_prompt));

        info!(
            "Runtime ready: {} enabled agent(s), {} live specialist(s), {} tool(s), provider {} ({})",
            enabled.len(),
            specialists.len(),
            tools.len(),
            provider.provider_name(),
            provider.model()
        );

        Ok(Self {
            dispatcher: Arc::new(Dispatcher::new(specialists.clone())),
            enabled,
            schema,
            provider,
            tools,
            specialists,
            router,
            search_agent: config.assistant.search_agent.clone(),
            history_capacity: config.assistant.history_capacity,
            turn_sink: None,
        })
    }

    pub fn with_turn_sink(mut self, sink: TurnSink) -> Self {
        self.turn_sink = Some(sink);
        self
    }

    /// A fresh conversation session
    pub fn assistant(&self) -> Assistant {
        let assistant = Assistant::new(self.router.clone(), self.schema.clone(), self.dispatcher.clone())
            .with_history_capacity(self.history_capacity)
            .with_guard(Arc::new(TemporalAnchor::new(self.search_agent.clone())));
        match &self.turn_sink {
            Some(sink) => assistant.with_turn_sink(sink.clone()),
            None => assistant,
        }
    }
}

/// Primary provider plus fallbacks, wrapped for retry and failover
pub fn build_provider(config: &ProvidersConfig) -> Result<Arc<dyn LlmProvider>> {
    let mut names = vec![config.primary.as_str()];
    names.extend(
        config
            .fallbacks
            .iter()
            .map(String::as_str)
            .filter(|n| *n != config.primary),
    );

    let providers = names
        .into_iter()
        .map(|name| provider_by_name(name, config))
        .collect::<Result<Vec<_>>>()?;

    let failover = FailoverProvider::new(providers)?.with_max_retries(config.max_retries);
    debug!("Configured {} provider(s): {:?}", failover.provider_count(), failover);
    Ok(Arc::new(failover))
}

fn provider_by_name(name: &str, config: &ProvidersConfig) -> Result<Box<dyn LlmProvider>> {
    let missing = || anyhow!("Provider '{}' selected but [providers.{}] is not configured", name, name);
    let provider: Box<dyn LlmProvider> = match name {
        "openai" => {
            let c = config.openai.as_ref().ok_or_else(missing)?;
            if c.api_key.is_empty() {
                bail!("OpenAI API key is empty. Set OPENAI_API_KEY or providers.openai.api_key");
            }
            Box::new(OpenAiProvider::new(
                c.api_key.clone(),
                c.model.clone(),
                c.base_url.clone(),
                c.max_tokens,
            ))
        }
        "azure" => {
            let c = config.azure.as_ref().ok_or_else(missing)?;
            if c.endpoint.is_empty() || c.deployment.is_empty() {
                bail!("Azure OpenAI needs both an endpoint and a deployment name");
            }
            Box::new(OpenAiProvider::azure(
                c.api_key.clone(),
                c.endpoint.clone(),
                c.deployment.clone(),
                c.api_version.clone(),
                c.max_tokens,
            ))
        }
        "ollama" => {
            let c = config.ollama.clone().unwrap_or_default();
            Box::new(OpenAiProvider::ollama(c.host, c.model, c.max_tokens))
        }
        "anthropic" => {
            let c = config.anthropic.as_ref().ok_or_else(missing)?;
            if c.api_key.is_empty() {
                bail!("Anthropic API key is empty. Set ANTHROPIC_API_KEY or providers.anthropic.api_key");
            }
            Box::new(AnthropicProvider::new(
                c.api_key.clone(),
                c.model.clone(),
                c.base_url.clone(),
                c.max_tokens,
            ))
        }
        other => bail!(
            "Unknown provider '{}'. Expected one of: openai, azure, ollama, anthropic",
            other
        ),
    };
    Ok(provider)
}

/// Check that the configured directories exist before building
pub fn check_layout(config: &ConciergeConfig) -> Result<()> {
    let agents_dir = shellexpand(&config.assistant.agents_dir);
    if !agents_dir.is_dir() {
        return Err(anyhow!("Agents directory {} not found", agents_dir.display()))
            .context("Run `concierge init` to install the default agent profiles");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config_in(dir: &TempDir) -> ConciergeConfig {
        let agents = dir.path().join("agents");
        std::fs::create_dir_all(&agents).unwrap();
        std::fs::write(
            agents.join("search_agent.yaml"),
            "system_prompt: Search the web.\ntools: [web_search, get_current_time]\n",
        )
        .unwrap();
        std::fs::write(
            agents.join("note_agent.yaml"),
            "system_prompt: Keep notes.\ntools: [save_note]\n",
        )
        .unwrap();
        std::fs::write(
            agents.join("todo_agent.yaml"),
            "system_prompt: Track tasks.\ntools: [add_todo]\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("router.yaml"), "system_prompt: Route it.\n").unwrap();

        let toml = format!(
            r#"
[assistant]
router_prompt = "{root}/router.yaml"
agents_dir = "{root}/agents"

[providers]
primary = "ollama"

[agents]
use_search_agent = true
use_note_agent = true
use_code_agent = true
use_todo_agent = false

[tools]
notes_path = "{root}/notes.json"
todos_path = "{root}/todos.json"
"#,
            root = dir.path().display()
        );
        ConciergeConfig::parse(&toml, |_| None).unwrap()
    }

    #[test]
    fn test_runtime_build() {
        let dir = TempDir::new().unwrap();
        let runtime = Runtime::build(&config_in(&dir)).unwrap();

        assert_eq!(runtime.enabled.names(), &["Code Agent", "Note Agent", "Search Agent"]);
        assert_eq!(runtime.schema.allowed_values(), vec!["Code Agent", "Note Agent", "Search Agent"]);
        assert_eq!(runtime.specialists.names(), vec!["Note Agent", "Search Agent"]);
        assert!(!runtime.specialists.contains("Todo Agent"));
        assert_eq!(runtime.provider.provider_name(), "ollama");

        let prompt = runtime.router.system_prompt();
        assert!(prompt.starts_with("Route it."));
        assert!(prompt.contains("- Code Agent"));
        assert!(!prompt.contains("Todo Agent"));

        let assistant = runtime.assistant();
        assert!(assistant.history().is_empty());
        assert_eq!(assistant.history().capacity(), 10);
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let config: ProvidersConfig = toml::from_str("primary = \"gemini\"").unwrap();
        let err = build_provider(&config).err().unwrap();
        assert!(err.to_string().contains("Unknown provider"));
    }

    #[test]
    fn test_unconfigured_provider_rejected() {
        let config: ProvidersConfig = toml::from_str("primary = \"anthropic\"").unwrap();
        assert!(build_provider(&config).is_err());

        let config: ProvidersConfig =
            toml::from_str("primary = \"openai\"\n[openai]\napi_key = \"\"\n").unwrap();
        let err = build_provider(&config).err().unwrap();
        assert!(err.to_string().contains("OPENAI_API_KEY"));
    }

    #[test]
    fn test_fallbacks_deduplicated() {
        let config: ProvidersConfig = toml::from_str(
            "primary = \"ollama\"\nfallbacks = [\"ollama\", \"anthropic\"]\n[anthropic]\napi_key = \"k\"\n",
        )
        .unwrap();
        let provider = build_provider(&config).unwrap();
        assert_eq!(provider.provider_name(), "ollama");
    }

    #[test]
    fn test_check_layout() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);
        assert!(check_layout(&config).is_ok());

        std::fs::remove_dir_all(dir.path().join("agents")).unwrap();
        assert!(check_layout(&config).is_err());
    }
}
