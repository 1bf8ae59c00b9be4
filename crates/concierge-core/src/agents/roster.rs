//! Enabled-agent set derived from boolean toggles

use tracing::info;

/// Human-readable specialist name for a toggle or profile key.
///
/// `use_search_agent` and `search_agent` both become `Search Agent`.
pub fn display_name(key: &str) -> String {
    let key = key.strip_prefix("use_").unwrap_or(key);
    key.split('_')
        .filter(|part| !part.is_empty())
        .map(capitalize)
        .collect::<Vec<_>>()
        .join(" ")
}

fn capitalize(part: &str) -> String {
    let mut chars = part.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

/// Ordered, de-duplicated display names of the agents switched on.
///
/// Computed once at startup and shared read-only afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnabledAgents {
    names: Vec<String>,
}

impl EnabledAgents {
    pub fn from_toggles<I, K>(toggles: I) -> Self
    where
        I: IntoIterator<Item = (K, bool)>,
        K: AsRef<str>,
    {
        let mut names: Vec<String> = Vec::new();
        for (key, enabled) in toggles {
            if !enabled {
                continue;
            }
            let name = display_name(key.as_ref());
            if !name.is_empty() && !names.contains(&name) {
                names.push(name);
            }
        }
        info!("Enabled agents: {:?}", names);
        Self { names }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
