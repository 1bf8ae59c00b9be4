use anyhow::{Context, Result};
use concierge_core::tools::ToolSettings;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{debug, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConciergeConfig {
    #[serde(default)]
    pub assistant: AssistantConfig,
    pub providers: ProvidersConfig,
    /// Toggle key (`use_search_agent`) → enabled
    #[serde(default = "default_agents")]
    pub agents: BTreeMap<String, bool>,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub journal: JournalConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantConfig {
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
    /// Specialist whose routed queries get anchored to the current year
    #[serde(default = "default_search_agent")]
    pub search_agent: String,
    #[serde(default = "default_router_prompt")]
    pub router_prompt: String,
    #[serde(default = "default_agents_dir")]
    pub agents_dir: String,
}

fn default_history_capacity() -> usize {
    concierge_core::history::DEFAULT_HISTORY_CAPACITY
}

fn default_search_agent() -> String {
    concierge_core::DEFAULT_SEARCH_SPECIALIST.to_string()
}

fn default_router_prompt() -> String {
    "~/.concierge/router.yaml".to_string()
}

fn default_agents_dir() -> String {
    "~/.concierge/agents".to_string()
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            history_capacity: default_history_capacity(),
            search_agent: default_search_agent(),
            router_prompt: default_router_prompt(),
            agents_dir: default_agents_dir(),
        }
    }
}

const AGENT_TOGGLES: &[&str] = &[
    "use_generalist_agent",
    "use_calendar_agent",
    "use_code_agent",
    "use_email_agent",
    "use_file_agent",
    "use_note_agent",
    "use_search_agent",
    "use_system_agent",
    "use_webscraping_agent",
    "use_todo_agent",
    "use_writing_agent",
];

fn default_agents() -> BTreeMap<String, bool> {
    AGENT_TOGGLES.iter().map(|k| (k.to_string(), true)).collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvidersConfig {
    /// One of `openai`, `azure`, `ollama`, `anthropic`
    #[serde(default = "default_primary")]
    pub primary: String,
    /// Tried in order when the primary keeps failing
    #[serde(default)]
    pub fallbacks: Vec<String>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default)]
    pub openai: Option<OpenAiProviderConfig>,
    #[serde(default)]
    pub azure: Option<AzureProviderConfig>,
    #[serde(default)]
    pub ollama: Option<OllamaConfig>,
    #[serde(default)]
    pub anthropic: Option<AnthropicConfig>,
}

fn default_primary() -> String {
    "openai".to_string()
}

fn default_max_retries() -> u32 {
    2
}

#[derive(Clone, Serialize, Deserialize)]
pub struct OpenAiProviderConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,
    #[serde(default = "default_openai_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl std::fmt::Debug for OpenAiProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProviderConfig")
            .field("api_key", &mask_secret(&self.api_key))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

fn default_openai_base_url() -> String {
    "https://api.openai.com".to_string()
}
fn default_openai_model() -> String {
    "gpt-4o".to_string()
}
fn default_max_tokens() -> u32 {
    4096
}

#[derive(Clone, Serialize, Deserialize)]
pub struct AzureProviderConfig {
    #[serde(default)]
    pub api_key: String,
    pub endpoint: String,
    pub deployment: String,
    #[serde(default = "default_azure_api_version")]
    pub api_version: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl std::fmt::Debug for AzureProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AzureProviderConfig")
            .field("api_key", &mask_secret(&self.api_key))
            .field("endpoint", &self.endpoint)
            .field("deployment", &self.deployment)
            .field("api_version", &self.api_version)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

fn default_azure_api_version() -> String {
    "2024-02-01".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    #[serde(default = "default_ollama_host")]
    pub host: String,
    #[serde(default = "default_ollama_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_ollama_host() -> String {
    "http://localhost:11434".to_string()
}

fn default_ollama_model() -> String {
    "llama3".to_string()
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            host: default_ollama_host(),
            model: default_ollama_model(),
            max_tokens: default_max_tokens(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct AnthropicConfig {
    pub api_key: String,
    #[serde(default = "default_anthropic_base_url")]
    pub base_url: String,
    #[serde(default = "default_anthropic_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl std::fmt::Debug for AnthropicConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicConfig")
            .field("api_key", &mask_secret(&self.api_key))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

fn default_anthropic_base_url() -> String {
    "https://api.anthropic.com".to_string()
}

fn default_anthropic_model() -> String {
    "claude-sonnet-4-5".to_string()
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default = "default_allowed_directories")]
    pub allowed_directories: Vec<String>,
    #[serde(default = "default_notes_path")]
    pub notes_path: String,
    #[serde(default = "default_todos_path")]
    pub todos_path: String,
    /// Empty means DuckDuckGo only
    #[serde(default)]
    pub tavily_api_key: String,
    #[serde(default = "default_max_search_results")]
    pub max_search_results: usize,
}

impl std::fmt::Debug for ToolsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolsConfig")
            .field("allowed_directories", &self.allowed_directories)
            .field("notes_path", &self.notes_path)
            .field("todos_path", &self.todos_path)
            .field("tavily_api_key", &mask_secret(&self.tavily_api_key))
            .field("max_search_results", &self.max_search_results)
            .finish()
    }
}

fn default_allowed_directories() -> Vec<String> {
    vec!["~/Documents".to_string()]
}

fn default_notes_path() -> String {
    "~/.concierge/data/notes.json".to_string()
}

fn default_todos_path() -> String {
    "~/.concierge/data/todo_list.json".to_string()
}

fn default_max_search_results() -> usize {
    5
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            allowed_directories: default_allowed_directories(),
            notes_path: default_notes_path(),
            todos_path: default_todos_path(),
            tavily_api_key: String::new(),
            max_search_results: default_max_search_results(),
        }
    }
}

impl ToolsConfig {
    pub fn to_settings(&self) -> ToolSettings {
        let tavily_api_key = Some(self.tavily_api_key.trim())
            .filter(|k| !k.is_empty())
            .map(str::to_string);
        ToolSettings {
            allowed_directories: self.allowed_directories.clone(),
            notes_path: shellexpand(&self.notes_path),
            todos_path: shellexpand(&self.todos_path),
            tavily_api_key,
            max_search_results: self.max_search_results,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_journal_path")]
    pub path: String,
}

fn default_journal_path() -> String {
    "~/.concierge/data/turns.jsonl".to_string()
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: default_journal_path(),
        }
    }
}

/// Mask a secret string for safe display in Debug output / logs.
/// Shows first 3 and last 4 chars for keys longer than 7 chars, otherwise "***".
pub fn mask_secret(s: &str) -> String {
    if s.is_empty() {
        return "(empty)".to_string();
    }
    let chars: Vec<char> = s.chars().collect();
    if chars.len() > 7 {
        let prefix: String = chars[..3].iter().collect();
        let suffix: String = chars[chars.len() - 4..].iter().collect();
        format!("{}...{}", prefix, suffix)
    } else {
        "***".to_string()
    }
}

pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".concierge")
}

/// `~/` expansion for paths taken from the config
pub fn shellexpand(s: &str) -> PathBuf {
    if let Some(rest) = s.strip_prefix("~/")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(rest);
    }
    PathBuf::from(s)
}

impl ConciergeConfig {
    pub fn load(custom_path: &Option<PathBuf>) -> Result<Self> {
        let path = custom_path
            .clone()
            .unwrap_or_else(|| config_dir().join("config.toml"));

        // Refuse group/world readable configs since they may hold keys
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Ok(metadata) = std::fs::metadata(&path) {
                let mode = metadata.permissions().mode();
                if mode & 0o077 != 0 {
                    return Err(anyhow::anyhow!(
                        "Config file {:?} has overly permissive permissions ({:o}). \
                         It may contain secrets. Fix with: chmod 600 {:?}",
                        path,
                        mode & 0o777,
                        path
                    ));
                }
            }
        }

        let content = std::fs::read_to_string(&path).with_context(|| {
            format!(
                "Failed to read config at {}. Run `concierge init` first.",
                path.display()
            )
        })?;

        let mut config = Self::parse(&content, |var| std::env::var(var).ok())
            .with_context(|| format!("Failed to parse config at {}", path.display()))?;
        config.apply_env_toggles(|var| std::env::var(var).ok());
        config.warn_hardcoded_secrets(&content);
        Ok(config)
    }

    /// Parse TOML after expanding allowlisted `${VAR}` references via `lookup`
    pub fn parse(content: &str, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let expanded = expand_env_vars(content, lookup);
        Ok(toml::from_str(&expanded)?)
    }

    /// Let `USE_<AGENT>` variables override `[agents]` toggles
    pub fn apply_env_toggles(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let mut keys: Vec<String> = self.agents.keys().cloned().collect();
        for known in AGENT_TOGGLES {
            if !self.agents.contains_key(*known) {
                keys.push(known.to_string());
            }
        }

        for key in keys {
            let var = toggle_env_var(&key);
            let Some(raw) = lookup(&var) else { continue };
            match parse_bool(&raw) {
                Some(enabled) => {
                    debug!("{}={} overrides agent toggle '{}'", var, enabled, key);
                    self.agents.insert(key, enabled);
                }
                None => warn!("Ignoring {}='{}': expected true or false", var, raw),
            }
        }
    }

    fn warn_hardcoded_secrets(&self, raw: &str) {
        let hardcoded = |key: &str| !key.is_empty() && raw.contains(key);
        if let Some(openai) = &self.providers.openai
            && hardcoded(&openai.api_key)
        {
            warn!(
                "OpenAI API key is hardcoded in config file. For security, use environment variables: api_key = \"${{OPENAI_API_KEY}}\""
            );
        }
        if let Some(anthropic) = &self.providers.anthropic
            && anthropic.api_key.starts_with("sk-ant-")
        {
            warn!(
                "Anthropic API key is hardcoded in config file. For security, use environment variables: api_key = \"${{ANTHROPIC_API_KEY}}\""
            );
        }
    }
}

fn toggle_env_var(key: &str) -> String {
    let key = key.to_uppercase();
    if key.starts_with("USE_") {
        key
    } else {
        format!("USE_{}", key)
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Allowlist of environment variable names that may be expanded in config files.
/// This prevents an attacker who can modify the config from reading arbitrary env vars.
const ALLOWED_ENV_VARS: &[&str] = &[
    "OPENAI_API_KEY",
    "AZURE_OPENAI_API_KEY",
    "AZURE_OPENAI_ENDPOINT",
    "AZURE_LLM_DEPLOYMENT_NAME",
    "ANTHROPIC_API_KEY",
    "TAVILY_API_KEY",
    "OLLAMA_HOST",
    "HOME",
    "USER",
];

fn expand_env_vars(s: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut result = s.to_string();
    let mut pos = 0;
    while pos < result.len() {
        let Some(start) = result[pos..].find("${") else {
            break;
        };
        let abs_start = pos + start;
        let Some(end) = result[abs_start..].find('}') else {
            break;
        };
        let var_name = result[abs_start + 2..abs_start + end].to_string();

        if !ALLOWED_ENV_VARS.contains(&var_name.as_str()) {
            warn!(
                "Skipping expansion of unrecognized env var '{}' in config (not in allowlist)",
                var_name
            );
            // Leave the ${VAR} unexpanded so it's obvious
            pos = abs_start + end + 1;
            continue;
        }

        let value = lookup(&var_name).unwrap_or_default();
        result = format!(
            "{}{}{}",
            &result[..abs_start],
            value,
            &result[abs_start + end + 1..]
        );
        pos = abs_start + value.len();
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: BTreeMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config_parses() {
        let content = include_str!("../../../config/default.toml");
        let config = ConciergeConfig::parse(content, env(&[("OPENAI_API_KEY", "sk-test-123456")]))
            .unwrap();
        assert_eq!(config.providers.primary, "openai");
        assert_eq!(config.providers.openai.unwrap().api_key, "sk-test-123456");
        assert_eq!(config.assistant.search_agent, "Search Agent");
        assert_eq!(config.assistant.history_capacity, 10);
        assert_eq!(config.agents.get("use_search_agent"), Some(&true));
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = ConciergeConfig::parse("[providers]\nprimary = \"ollama\"\n", env(&[])).unwrap();
        assert_eq!(config.agents.len(), AGENT_TOGGLES.len());
        assert!(config.agents.values().all(|on| *on));
        assert_eq!(config.tools.max_search_results, 5);
        assert!(!config.journal.enabled);
        assert!(config.providers.ollama.is_none());
    }

    #[test]
    fn test_env_expansion_allowlist() {
        let lookup = env(&[("TAVILY_API_KEY", "tvly-abc"), ("SECRET", "leak")]);
        let out = expand_env_vars("a=${TAVILY_API_KEY} b=${SECRET} c=${HOME}", lookup);
        assert_eq!(out, "a=tvly-abc b=${SECRET} c=");
    }

    #[test]
    fn test_env_expansion_unterminated() {
        assert_eq!(expand_env_vars("x=${OPENAI_API_KEY", env(&[])), "x=${OPENAI_API_KEY");
    }

    #[test]
    fn test_env_toggle_overrides() {
        let mut config = ConciergeConfig::parse(
            "[providers]\n[agents]\nuse_code_agent = true\nuse_note_agent = false\n",
            env(&[]),
        )
        .unwrap();
        config.apply_env_toggles(env(&[
            ("USE_CODE_AGENT", "false"),
            ("USE_NOTE_AGENT", "True"),
            ("USE_TODO_AGENT", "maybe"),
            ("USE_WRITING_AGENT", "0"),
        ]));
        assert_eq!(config.agents.get("use_code_agent"), Some(&false));
        assert_eq!(config.agents.get("use_note_agent"), Some(&true));
        assert_eq!(config.agents.get("use_todo_agent"), None);
        assert_eq!(config.agents.get("use_writing_agent"), Some(&false));
    }

    #[test]
    fn test_toggle_env_var_names() {
        assert_eq!(toggle_env_var("use_search_agent"), "USE_SEARCH_AGENT");
        assert_eq!(toggle_env_var("search_agent"), "USE_SEARCH_AGENT");
    }

    #[test]
    fn test_mask_secret() {
        assert_eq!(mask_secret(""), "(empty)");
        assert_eq!(mask_secret("short"), "***");
        assert_eq!(mask_secret("sk-1234567890abcd"), "sk-...abcd");
    }

    #[test]
    fn test_debug_hides_keys() {
        let config = ConciergeConfig::parse(
            "[providers.anthropic]\napi_key = \"sk-ant-very-secret-key\"\n",
            env(&[]),
        )
        .unwrap();
        let debug = format!("{:?}", config);
        assert!(!debug.contains("very-secret"));
        assert!(debug.contains("sk-...-key"));
    }

    #[test]
    fn test_tool_settings() {
        let mut tools = ToolsConfig::default();
        assert!(tools.to_settings().tavily_api_key.is_none());
        tools.tavily_api_key = "tvly-1".to_string();
        tools.notes_path = "/tmp/n.json".to_string();
        let settings = tools.to_settings();
        assert_eq!(settings.tavily_api_key.as_deref(), Some("tvly-1"));
        assert_eq!(settings.notes_path, PathBuf::from("/tmp/n.json"));
    }
}
