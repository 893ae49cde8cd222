// src/handlers/mod.rs
// Tool handlers (C8, spec §4.8): ~60 thin adapters from tool name to
// (validate params) -> (call engine or subsystem) -> (build envelope).
//
// Each tool's concrete result payload is an external collaborator's concern
// (spec §1 Non-goals); what's specified here is the uniform contract every
// handler honors: required-field validation, numeric clamping, provenance
// attachment, truncation accounting, and cross-repo speculative tiering.

pub mod operational;

use crate::dispatcher::{HandlerContext, HandlerRegistry, ToolHandler};
use crate::envelope::{Envelope, EnvelopeBuilder, Provenance, Truncation};
use crate::error::CkbError;
use crate::registry::{Tool, TOOLS};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// A required string parameter that is missing, null, or empty fails with
/// `InvalidParams` naming the field (spec §4.8 common behavior).
pub(crate) fn require_string<'a>(arguments: &'a Value, field: &str) -> Result<&'a str, CkbError> {
    match arguments.get(field).and_then(Value::as_str) {
        Some(s) if !s.is_empty() => Ok(s),
        _ => Err(CkbError::InvalidParams(field.to_string())),
    }
}

fn validate_required(tool: &Tool, arguments: &Value) -> Result<(), CkbError> {
    let required = tool
        .input_schema
        .get("required")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    for entry in required {
        let Some(field) = entry.as_str() else { continue };
        let present = match arguments.get(field) {
            Some(Value::String(s)) => !s.is_empty(),
            Some(Value::Null) | None => false,
            Some(_) => true,
        };
        if !present {
            return Err(CkbError::InvalidParams(field.to_string()));
        }
    }
    Ok(())
}

/// Clamps the handful of numeric parameters the catalog documents bounds
/// for (spec §4.8: "out-of-range values are clamped... per the tool's
/// documented bounds").
fn clamp_known_numeric_fields(arguments: &mut Value) {
    let Value::Object(map) = arguments else { return };
    if let Some(depth) = map.get("depth").and_then(Value::as_i64) {
        map.insert("depth".to_string(), Value::from(depth.clamp(1, 10)));
    }
    if let Some(limit) = map.get("limit").and_then(Value::as_i64) {
        map.insert("limit".to_string(), Value::from(limit.clamp(1, 500)));
    }
}

/// Generic adapter used for every declared tool that isn't one of the
/// bespoke subsystem handlers in [`operational`]: validate, query the active
/// engine, wrap the response in an envelope.
pub struct EngineBackedHandler {
    tool: &'static Tool,
}

impl EngineBackedHandler {
    pub fn new(tool: &'static Tool) -> Self {
        Self { tool }
    }
}

#[async_trait]
impl ToolHandler for EngineBackedHandler {
    async fn handle(&self, ctx: &HandlerContext, mut arguments: Value) -> Result<Envelope, CkbError> {
        validate_required(self.tool, &arguments)?;
        clamp_known_numeric_fields(&mut arguments);

        let response = ctx
            .engine
            .with_engine(|engine| {
                let name = self.tool.name;
                let args = arguments.clone();
                async move {
                    engine
                        .query(name, &args)
                        .await
                        .map_err(|e| CkbError::Operation(e.to_string()))
                }
            })
            .await?;

        let mut builder = EnvelopeBuilder::new()
            .data(response.data.clone())
            .confidence(response.confidence_score)
            .provenance(Provenance {
                backends: response.backends.clone(),
                repo_state_id: response.repo_state_id.clone(),
                completeness: response.completeness,
            });

        if let (Some(total), Some(shown)) = (response.total_results, response.returned_results) {
            builder = builder.truncation(Truncation::new(shown, total, None));
        }
        if self.tool.cross_repo {
            builder = builder.cross_repo();
        }

        Ok(builder.build())
    }
}

/// Tool names backed by a bespoke handler rather than the generic
/// engine-backed adapter.
const BESPOKE: &[&str] = &[
    "ping",
    "status",
    "doctor",
    "getConfig",
    "listRepos",
    "switchRepo",
    "getActiveRepo",
    "expandToolset",
    "getMetricsSummary",
];

/// Builds the complete tool-name -> handler table.
pub fn build_registry() -> HandlerRegistry {
    let mut registry: HandlerRegistry = HandlerRegistry::new();

    registry.insert("ping", Arc::new(operational::PingHandler));
    registry.insert("status", Arc::new(operational::StatusHandler));
    registry.insert("doctor", Arc::new(operational::DoctorHandler));
    registry.insert("getConfig", Arc::new(operational::GetConfigHandler));
    registry.insert("listRepos", Arc::new(operational::ListReposHandler));
    registry.insert("switchRepo", Arc::new(operational::SwitchRepoHandler));
    registry.insert("getActiveRepo", Arc::new(operational::GetActiveRepoHandler));
    registry.insert("expandToolset", Arc::new(operational::ExpandToolsetHandler));
    registry.insert("getMetricsSummary", Arc::new(operational::GetMetricsSummaryHandler));

    for tool in TOOLS.iter() {
        if BESPOKE.contains(&tool.name) {
            continue;
        }
        registry.insert(tool.name, Arc::new(EngineBackedHandler::new(tool)));
    }

    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_declared_tool_has_a_handler() {
        let registry = build_registry();
        for tool in TOOLS.iter() {
            assert!(registry.contains_key(tool.name), "missing handler for {}", tool.name);
        }
        assert_eq!(registry.len(), TOOLS.len());
    }

    #[test]
    fn clamp_brings_out_of_range_values_into_bounds() {
        let mut args = serde_json::json!({"depth": 99, "limit": -5});
        clamp_known_numeric_fields(&mut args);
        assert_eq!(args["depth"], 10);
        assert_eq!(args["limit"], 1);
    }

    #[test]
    fn missing_required_field_is_invalid_params() {
        let tool = TOOLS.iter().find(|t| t.name == "searchSymbols").unwrap();
        let err = validate_required(tool, &serde_json::json!({})).unwrap_err();
        assert!(matches!(err, CkbError::InvalidParams(field) if field == "query"));
    }

    #[test]
    fn empty_required_string_is_invalid_params() {
        let tool = TOOLS.iter().find(|t| t.name == "searchSymbols").unwrap();
        let err = validate_required(tool, &serde_json::json!({"query": ""})).unwrap_err();
        assert!(matches!(err, CkbError::InvalidParams(_)));
    }
}
