//! Route schema: the closed set of destinations a routing decision may name
//!
//! A [`RouteSchema`] is built once from the enabled specialist names. Only the
//! schema can mint a [`SpecialistName`], so a [`Route`] that exists has
//! already passed validation against the schema that produced it.

use std::sync::Arc;

use serde::{Serialize, Serializer};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::providers::OutputSchema;

/// Enum value used when no specialists are enabled. The router never gets to
/// produce it: validation rejects it like any other unknown name.
pub const NO_AGENTS_SENTINEL: &str = "NoAgentsEnabled";

const SPECIALIST_FIELD: &str = "specialist_name";
const QUERY_FIELD: &str = "query_for_specialist";

/// Why a routing decision could not be produced
#[derive(Debug, Error)]
pub enum RoutingError {
    /// Router output failed schema validation. `raw` is the unvalidated payload.
    #[error("route rejected: {reason}")]
    Invalid { reason: String, raw: String },

    /// Schema was built from an empty agent list, so nothing is routable
    #[error("no specialists are enabled")]
    NoSpecialists,

    /// The LLM request itself failed
    #[error(transparent)]
    Request(#[from] anyhow::Error),
}

impl RoutingError {
    fn invalid(reason: impl Into<String>, raw: impl Into<String>) -> Self {
        Self::Invalid {
            reason: reason.into(),
            raw: raw.into(),
        }
    }

    /// Raw router output, when the failure was a validation failure
    pub fn raw_payload(&self) -> Option<&str> {
        match self {
            Self::Invalid { raw, .. } => Some(raw),
            _ => None,
        }
    }
}

/// A specialist name that a [`RouteSchema`] has accepted
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SpecialistName(Arc<str>);

impl SpecialistName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SpecialistName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl PartialEq<str> for SpecialistName {
    fn eq(&self, other: &str) -> bool {
        &*self.0 == other
    }
}

impl PartialEq<&str> for SpecialistName {
    fn eq(&self, other: &&str) -> bool {
        &*self.0 == *other
    }
}

impl Serialize for SpecialistName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

/// A validated routing decision
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Route {
    #[serde(skip)]
    schema_id: Uuid,
    specialist_name: SpecialistName,
    query_for_specialist: String,
}

impl Route {
    pub fn specialist_name(&self) -> &SpecialistName {
        &self.specialist_name
    }

    pub fn query_for_specialist(&self) -> &str {
        &self.query_for_specialist
    }

    /// Same destination, different task text
    pub fn with_query(&self, query: impl Into<String>) -> Route {
        Route {
            schema_id: self.schema_id,
            specialist_name: self.specialist_name.clone(),
            query_for_specialist: query.into(),
        }
    }
}

/// Validation schema for routing decisions
#[derive(Debug, Clone)]
pub struct RouteSchema {
    id: Uuid,
    names: Vec<SpecialistName>,
}

impl RouteSchema {
    /// Build a schema accepting exactly `enabled` (order kept, duplicates dropped)
    pub fn build<I, S>(enabled: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut names: Vec<SpecialistName> = Vec::new();
        for name in enabled {
            let name = name.as_ref();
            if !names.iter().any(|n| n == name) {
                names.push(SpecialistName(Arc::from(name)));
            }
        }
        Self {
            id: Uuid::new_v4(),
            names,
        }
    }

    /// True when built from an empty agent list
    pub fn is_sentinel(&self) -> bool {
        self.names.is_empty()
    }

    /// Values the `specialist_name` field may take, as advertised to the LLM
    pub fn allowed_values(&self) -> Vec<&str> {
        if self.names.is_empty() {
            vec![NO_AGENTS_SENTINEL]
        } else {
            self.names.iter().map(|n| n.as_str()).collect()
        }
    }

    pub fn specialist_names(&self) -> &[SpecialistName] {
        &self.names
    }

    /// Look up a name this schema accepts
    pub fn specialist(&self, name: &str) -> Option<&SpecialistName> {
        self.names.iter().find(|n| *n == name)
    }

    /// Whether `route` was produced by this schema instance
    pub fn owns(&self, route: &Route) -> bool {
        route.schema_id == self.id
    }

    /// JSON Schema describing a routing decision
    pub fn json_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "description": "The routing decision made by the router.",
            "properties": {
                "specialist_name": {
                    "type": "string",
                    "enum": self.allowed_values(),
                    "description": "The name of the specialist agent to route the query to."
                },
                "query_for_specialist": {
                    "type": "string",
                    "description": "The non-empty query to send to the specialist. This might be \
                                    the original user query or a rephrased version for clarity."
                }
            },
            "required": ["specialist_name", "query_for_specialist"],
            "additionalProperties": false,
        })
    }

    /// Structured-output constraint for a provider call
    pub fn output_schema(&self) -> OutputSchema {
        OutputSchema {
            name: "route".to_string(),
            description: "Choose the specialist that should handle the user's request.".to_string(),
            schema: self.json_schema(),
        }
    }

    /// Validate a JSON value as a routing decision
    pub fn validate(&self, raw: &Value) -> Result<Route, RoutingError> {
        let raw_text = raw.to_string();

        let obj = raw
            .as_object()
            .ok_or_else(|| RoutingError::invalid("expected a JSON object", raw_text.clone()))?;

        let name = obj
            .get(SPECIALIST_FIELD)
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                RoutingError::invalid(format!("missing string field '{}'", SPECIALIST_FIELD), raw_text.clone())
            })?;

        let specialist = self.specialist(name).cloned().ok_or_else(|| {
            RoutingError::invalid(
                format!(
                    "'{}' is not one of the available specialists [{}]",
                    name,
                    self.allowed_values().join(", ")
                ),
                raw_text.clone(),
            )
        })?;

        let query = obj
            .get(QUERY_FIELD)
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                RoutingError::invalid(format!("missing string field '{}'", QUERY_FIELD), raw_text.clone())
            })?;

        if query.trim().is_empty() {
            return Err(RoutingError::invalid(
                format!("'{}' must not be empty", QUERY_FIELD),
                raw_text,
            ));
        }

        Ok(Route {
            schema_id: self.id,
            specialist_name: specialist,
            query_for_specialist: query.to_string(),
        })
    }

    /// Parse and validate a textual payload. Markdown code fences are tolerated.
    pub fn parse(&self, raw: &str) -> Result<Route, RoutingError> {
        let body = strip_code_fence(raw);
        let value: Value = serde_json::from_str(body)
            .map_err(|e| RoutingError::invalid(format!("not valid JSON: {}", e), raw))?;
        self.validate(&value)
    }
}

/// Schemas are interchangeable for comparison when their constraints match
impl PartialEq for RouteSchema {
    fn eq(&self, other: &Self) -> bool {
        self.names == other.names
    }
}

impl Eq for RouteSchema {}

fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}
