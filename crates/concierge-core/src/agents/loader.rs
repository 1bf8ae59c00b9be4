//! Builds the live specialist registry from profile files on disk

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::llm_specialist::LlmSpecialist;
use super::profile::{ProfileFile, SpecialistProfile};
use super::registry::SpecialistRegistry;
use super::roster::EnabledAgents;
use crate::prompts;
use crate::providers::LlmProvider;
use crate::tools::ToolRegistry;

/// Every `*.yaml` / `*.yml` profile in `dir`, sorted by path
pub fn discover_profiles(dir: &Path) -> Result<Vec<ProfileFile>> {
    let mut paths: Vec<PathBuf> = Vec::new();
    for ext in ["yaml", "yml"] {
        let pattern = dir.join(format!("*.{}", ext));
        let pattern = pattern
            .to_str()
            .with_context(|| format!("Non UTF-8 profile directory {}", dir.display()))?;
        for entry in glob::glob(pattern).context("Invalid profile glob")? {
            match entry {
                Ok(path) => paths.push(path),
                Err(e) => warn!("Skipping unreadable profile entry: {}", e),
            }
        }
    }
    paths.sort();
    Ok(paths.into_iter().filter_map(ProfileFile::from_path).collect())
}

/// Everything [`load_specialists`] needs besides the enabled set
pub struct SpecialistContext {
    pub profiles_dir: PathBuf,
    /// Name of the specialist whose prompt gets the current timestamp
    pub search_specialist: String,
    pub provider: Arc<dyn LlmProvider>,
    pub tools: Arc<ToolRegistry>,
}

/// Load one specialist per enabled name.
///
/// Names without a profile are skipped with a warning, so they stay
/// routable but have no live handler. Unknown tool names are dropped.
pub fn load_specialists(enabled: &EnabledAgents, ctx: &SpecialistContext) -> Result<SpecialistRegistry> {
    let files: HashMap<String, PathBuf> = discover_profiles(&ctx.profiles_dir)?
        .into_iter()
        .map(|f| (f.name, f.path))
        .collect();
    debug!("Found {} profile(s) in {}", files.len(), ctx.profiles_dir.display());

    let mut registry = SpecialistRegistry::new();
    for name in enabled.iter() {
        let Some(path) = files.get(name) else {
            warn!("Profile for enabled agent '{}' not found, skipping", name);
            continue;
        };

        debug!("Loading enabled agent: {} from {}", name, path.display());
        let profile = SpecialistProfile::load(path)?;

        let (tools, unknown): (Vec<String>, Vec<String>) = profile
            .tools
            .into_iter()
            .partition(|t| ctx.tools.contains(t));
        if !unknown.is_empty() {
            warn!("{}: ignoring unknown tool(s): {}", name, unknown.join(", "));
        }

        let system_prompt = if name == ctx.search_specialist {
            info!("Injecting timestamp into '{}' prompt", name);
            prompts::with_timestamp(&profile.system_prompt, &prompts::timestamp())
        } else {
            profile.system_prompt
        };

        registry.register(Arc::new(LlmSpecialist::new(
            name,
            system_prompt,
            tools,
            ctx.provider.clone(),
            ctx.tools.clone(),
        )));
    }

    info!("Loaded {} of {} enabled specialist(s)", registry.len(), enabled.len());
    Ok(registry)
}
