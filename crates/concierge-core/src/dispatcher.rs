//! Dispatcher: runs the routed specialist and normalises its output

use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use crate::agents::SpecialistRegistry;
use crate::history::Message;
use crate::route::Route;

/// A routed name has no live handler. Rendered straight to the user.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Error: Could not find specialist '{name}'.")]
pub struct SpecialistNotFound {
    pub name: String,
}

/// The specialist's handler failed
#[derive(Debug, Error)]
#[error("specialist '{specialist}' failed: {source}")]
pub struct SpecialistExecutionError {
    pub specialist: String,
    #[source]
    pub source: Box<dyn std::error::Error + Send + Sync>,
}

pub struct Dispatcher {
    specialists: Arc<SpecialistRegistry>,
}

impl Dispatcher {
    pub fn new(specialists: Arc<SpecialistRegistry>) -> Self {
        Self { specialists }
    }

    pub fn specialists(&self) -> &SpecialistRegistry {
        &self.specialists
    }

    /// Run the route's specialist with the prior turns as context.
    ///
    /// A missing specialist yields the [`SpecialistNotFound`] message as a
    /// normal answer. Handler errors propagate.
    pub async fn execute(
        &self,
        route: &Route,
        history: &[Message],
    ) -> Result<String, SpecialistExecutionError> {
        let name = route.specialist_name().as_str();
        let Some(specialist) = self.specialists.get(name) else {
            warn!("Routed to '{}' but no such specialist is loaded", name);
            return Ok(SpecialistNotFound {
                name: name.to_string(),
            }
            .to_string());
        };

        debug!("Dispatching to {}: {}", name, route.query_for_specialist());
        let output = specialist
            .run(route.query_for_specialist(), history)
            .await
            .map_err(|e| SpecialistExecutionError {
                specialist: name.to_string(),
                source: e.into(),
            })?;
        Ok(output.into_text())
    }
}
