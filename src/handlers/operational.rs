// src/handlers/operational.rs
// Bespoke handlers for tools that operate on the core's own in-process
// subsystems (registry/presets, engine multiplexer, metrics) rather than
// delegating to the external query engine.

use super::require_string;
use crate::dispatcher::{HandlerContext, ToolHandler};
use crate::envelope::EnvelopeBuilder;
use crate::error::CkbError;
use crate::protocol::Message;
use crate::registry::Preset;
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::warn;

pub struct PingHandler;

#[async_trait]
impl ToolHandler for PingHandler {
    async fn handle(&self, ctx: &HandlerContext, _arguments: Value) -> Result<crate::envelope::Envelope, CkbError> {
        Ok(EnvelopeBuilder::operational(json!({
            "pong": true,
            "sessionId": ctx.session_id.to_string(),
        })))
    }
}

pub struct StatusHandler;

#[async_trait]
impl ToolHandler for StatusHandler {
    async fn handle(&self, ctx: &HandlerContext, _arguments: Value) -> Result<crate::envelope::Envelope, CkbError> {
        let active_repo = ctx.engine.get_active_repo().await;
        Ok(EnvelopeBuilder::operational(json!({
            "preset": ctx.preset_state.active(),
            "expanded": ctx.preset_state.is_expanded(),
            "activeRepo": active_repo.map(|(name, path)| json!({"name": name, "path": path})),
        })))
    }
}

pub struct DoctorHandler;

#[async_trait]
impl ToolHandler for DoctorHandler {
    async fn handle(&self, ctx: &HandlerContext, _arguments: Value) -> Result<crate::envelope::Envelope, CkbError> {
        let cached = ctx.engine.cached_count().await;
        Ok(EnvelopeBuilder::operational(json!({
            "status": "ok",
            "cachedEngines": cached,
            "maxEngines": ctx.config.max_engines,
        })))
    }
}

pub struct GetConfigHandler;

#[async_trait]
impl ToolHandler for GetConfigHandler {
    async fn handle(&self, ctx: &HandlerContext, _arguments: Value) -> Result<crate::envelope::Envelope, CkbError> {
        Ok(EnvelopeBuilder::operational(serde_json::to_value(ctx.config.as_ref())?))
    }
}

pub struct ListReposHandler;

#[async_trait]
impl ToolHandler for ListReposHandler {
    async fn handle(&self, ctx: &HandlerContext, _arguments: Value) -> Result<crate::envelope::Envelope, CkbError> {
        let repos = ctx.engine.list_repos().await;
        Ok(EnvelopeBuilder::operational(serde_json::to_value(repos)?))
    }
}

pub struct SwitchRepoHandler;

#[async_trait]
impl ToolHandler for SwitchRepoHandler {
    async fn handle(&self, ctx: &HandlerContext, arguments: Value) -> Result<crate::envelope::Envelope, CkbError> {
        let name = require_string(&arguments, "name")?;
        let status = ctx.engine.switch_repo(name).await?;
        Ok(EnvelopeBuilder::operational(serde_json::to_value(status)?))
    }
}

pub struct GetActiveRepoHandler;

#[async_trait]
impl ToolHandler for GetActiveRepoHandler {
    async fn handle(&self, ctx: &HandlerContext, _arguments: Value) -> Result<crate::envelope::Envelope, CkbError> {
        let active = ctx.engine.get_active_repo().await;
        Ok(EnvelopeBuilder::operational(match active {
            Some((name, path)) => json!({"name": name, "path": path}),
            None => json!({"name": Value::Null, "path": Value::Null}),
        }))
    }
}

pub struct GetMetricsSummaryHandler;

#[async_trait]
impl ToolHandler for GetMetricsSummaryHandler {
    async fn handle(&self, ctx: &HandlerContext, _arguments: Value) -> Result<crate::envelope::Envelope, CkbError> {
        Ok(EnvelopeBuilder::operational(serde_json::to_value(ctx.metrics.summary())?))
    }
}

/// The `expandToolset` meta-tool (spec §4.4). Expansion is a one-shot
/// transition per session; the refusal envelope on a second call reports the
/// currently active preset, not the one requested (resolved Open Question,
/// see DESIGN.md).
pub struct ExpandToolsetHandler;

#[async_trait]
impl ToolHandler for ExpandToolsetHandler {
    async fn handle(&self, ctx: &HandlerContext, arguments: Value) -> Result<crate::envelope::Envelope, CkbError> {
        let preset_str = require_string(&arguments, "preset")?;
        let reason = require_string(&arguments, "reason")?;
        if reason.len() < 10 {
            return Err(CkbError::InvalidParams("reason".to_string()));
        }
        let target: Preset = preset_str
            .parse()
            .map_err(|_| CkbError::InvalidParams("preset".to_string()))?;

        if ctx.preset_state.try_expand(target) {
            let notification = Message::notification("notifications/tools/list_changed", None);
            if let Err(e) = ctx.outbound.send(&notification).await {
                warn!(error = %e, "failed to send tools/list_changed notification");
            }
            return Ok(EnvelopeBuilder::operational(json!({
                "success": true,
                "preset": target,
                "fallback": "If the client does not react to notifications/tools/list_changed, \
                             restart the session with the desired preset.",
            })));
        }

        Ok(EnvelopeBuilder::operational(json!({
            "success": false,
            "preset": ctx.preset_state.active(),
            "message": "toolset already expanded this session",
        })))
    }
}
