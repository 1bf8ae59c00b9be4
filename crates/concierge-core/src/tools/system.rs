//! Clock tool

use anyhow::Result;
use async_trait::async_trait;
use chrono::Local;
use serde_json::Value;
use tracing::debug;

use super::{ToolHandler, json_schema};

/// Reports the local date, time and UTC offset
pub struct CurrentTimeTool;

#[async_trait]
impl ToolHandler for CurrentTimeTool {
    fn name(&self) -> &str {
        "get_current_time"
    }

    fn description(&self) -> &str {
        "Get the current date and time, including the timezone offset."
    }

    fn input_schema(&self) -> Value {
        json_schema(serde_json::json!({}), vec![])
    }

    async fn execute(&self, _input: Value) -> Result<String> {
        debug!("Fetching current time");
        let now = Local::now();
        Ok(format!(
            "The current date and time is: {}",
            now.format("%Y-%m-%d %H:%M:%S %:z")
        ))
    }
}
