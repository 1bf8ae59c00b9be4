//! Token and tool-call accounting for a single specialist run

use serde::{Deserialize, Serialize};

/// Accumulated usage from a single tool loop (may span multiple API calls)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccumulatedUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub api_calls: u32,
    pub tool_calls: Vec<String>,
}

impl AccumulatedUsage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add usage from a single API response
    pub fn add(&mut self, input_tokens: u32, output_tokens: u32) {
        self.input_tokens += input_tokens as u64;
        self.output_tokens += output_tokens as u64;
        self.api_calls += 1;
    }

    pub fn record_tool_call(&mut self, tool_name: &str) {
        self.tool_calls.push(tool_name.to_string());
    }

    pub fn total_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

impl std::fmt::Display for AccumulatedUsage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} API call(s), {} tokens (in={} out={})",
            self.api_calls,
            self.total_tokens(),
            self.input_tokens,
            self.output_tokens
        )?;
        if !self.tool_calls.is_empty() {
            write!(f, ", tools: {}", self.tool_calls.join(", "))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accumulated_usage() {
        let mut usage = AccumulatedUsage::new();
        usage.add(100, 50);
        usage.add(200, 75);
        usage.record_tool_call("web_search");

        assert_eq!(usage.input_tokens, 300);
        assert_eq!(usage.output_tokens, 125);
        assert_eq!(usage.total_tokens(), 425);
        assert_eq!(usage.api_calls, 2);
        assert_eq!(usage.tool_calls, vec!["web_search"]);
    }

    #[test]
    fn test_display() {
        let mut usage = AccumulatedUsage::new();
        usage.add(10, 5);
        assert_eq!(usage.to_string(), "1 API call(s), 15 tokens (in=10 out=5)");

        usage.record_tool_call("read_file");
        assert!(usage.to_string().ends_with("tools: read_file"));
    }
}
