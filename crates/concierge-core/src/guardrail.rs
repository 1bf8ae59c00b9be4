//! Deterministic post-routing rewrites
//!
//! Guards run in order after the router has picked a specialist and before the
//! dispatcher runs it. They never call an LLM.

use std::sync::LazyLock;

use chrono::Datelike;
use regex::Regex;
use tracing::info;

use crate::route::Route;

/// Display name of the web-search specialist unless configured otherwise
pub const DEFAULT_SEARCH_SPECIALIST: &str = "Search Agent";

static YEAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:19|20)\d{2}\b").expect("valid year regex"));

static YEAR_WITH_SPACING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*\b(?:19|20)\d{2}\b\s*").expect("valid year regex"));

/// A rewrite applied to a routing decision
pub trait RouteGuard: Send + Sync {
    fn name(&self) -> &str;

    /// `original_query` is the user's text, not the router's rephrasing
    fn apply(&self, original_query: &str, route: Route) -> Route;
}

/// Anchors web searches to the current year unless the user named one
#[derive(Debug, Clone)]
pub struct TemporalAnchor {
    search_specialist: String,
}

impl TemporalAnchor {
    pub fn new(search_specialist: impl Into<String>) -> Self {
        Self {
            search_specialist: search_specialist.into(),
        }
    }

    pub fn search_specialist(&self) -> &str {
        &self.search_specialist
    }

    /// Same as [`RouteGuard::apply`] with an explicit current year
    pub fn apply_for_year(&self, original_query: &str, route: Route, year: i32) -> Route {
        if route.specialist_name().as_str() != self.search_specialist {
            return route;
        }
        if contains_year(original_query) {
            return route;
        }

        // Only the whitespace around a removed year is touched
        let stripped = YEAR_WITH_SPACING.replace_all(route.query_for_specialist(), " ");
        let stripped = stripped.trim();
        let anchored = if stripped.is_empty() {
            year.to_string()
        } else {
            format!("{} {}", stripped, year)
        };

        if anchored != route.query_for_specialist() {
            info!(
                "Query modified for {}: '{}' -> '{}'",
                self.search_specialist,
                route.query_for_specialist(),
                anchored
            );
        }
        route.with_query(anchored)
    }
}

impl Default for TemporalAnchor {
    fn default() -> Self {
        Self::new(DEFAULT_SEARCH_SPECIALIST)
    }
}

impl RouteGuard for TemporalAnchor {
    fn name(&self) -> &str {
        "temporal_anchor"
    }

    fn apply(&self, original_query: &str, route: Route) -> Route {
        self.apply_for_year(original_query, route, chrono::Local::now().year())
    }
}

/// Whether `text` contains a standalone year in 1900..=2099
pub fn contains_year(text: &str) -> bool {
    YEAR.is_match(text)
}
