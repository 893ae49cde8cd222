// src/config/env.rs
// Environment-based configuration - single source of truth for session defaults

use crate::registry::Preset;
use serde::Serialize;
use std::path::PathBuf;
use tracing::{debug, warn};

/// Default upper bound on concurrent per-repo query engines (§6.4).
pub const DEFAULT_MAX_ENGINES: usize = 4;
/// Default inbound message cap in bytes (§4.1, §6.4).
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 1_048_576;
/// Default `roots/list` round-trip timeout (§4.5, §6.4).
pub const DEFAULT_ROOTS_TIMEOUT_SECS: u64 = 10;
/// Default streaming page size (§4.9, §6.4).
pub const DEFAULT_STREAM_CHUNK_SIZE: usize = 20;
/// Default streaming backpressure buffer (§4.9, §6.4).
pub const DEFAULT_STREAM_MAX_BUFFER: usize = 100;
/// Default streaming idle heartbeat period (§4.9, §6.4).
pub const DEFAULT_STREAM_HEARTBEAT_SECS: u64 = 15;

/// Session configuration resolved from environment variables.
///
/// Mirrors the enumerated options of spec §6.4. This is the single source of
/// truth: nothing else in the crate reads `std::env::var` for these knobs.
#[derive(Debug, Clone, Serialize)]
pub struct EnvConfig {
    pub preset: Preset,
    pub max_engines: usize,
    pub max_message_size: usize,
    pub roots_request_timeout_secs: u64,
    pub stream_chunk_size: usize,
    pub stream_max_buffer: usize,
    pub stream_heartbeat_secs: u64,
    pub multi_repo_registry_path: Option<PathBuf>,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            preset: Preset::Core,
            max_engines: DEFAULT_MAX_ENGINES,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            roots_request_timeout_secs: DEFAULT_ROOTS_TIMEOUT_SECS,
            stream_chunk_size: DEFAULT_STREAM_CHUNK_SIZE,
            stream_max_buffer: DEFAULT_STREAM_MAX_BUFFER,
            stream_heartbeat_secs: DEFAULT_STREAM_HEARTBEAT_SECS,
            multi_repo_registry_path: None,
        }
    }
}

impl EnvConfig {
    /// Load configuration from `CKB_*` environment variables, falling back
    /// to defaults for anything unset or unparseable.
    pub fn load() -> Self {
        let mut cfg = Self::default();

        if let Some(preset) = Self::read("CKB_PRESET").and_then(|s| s.parse::<Preset>().ok()) {
            cfg.preset = preset;
        }
        cfg.max_engines = Self::read_parsed("CKB_MAX_ENGINES").unwrap_or(cfg.max_engines);
        cfg.max_message_size =
            Self::read_parsed("CKB_MAX_MESSAGE_SIZE").unwrap_or(cfg.max_message_size);
        cfg.roots_request_timeout_secs =
            Self::read_parsed("CKB_ROOTS_TIMEOUT_SECS").unwrap_or(cfg.roots_request_timeout_secs);
        cfg.stream_chunk_size =
            Self::read_parsed("CKB_STREAM_CHUNK_SIZE").unwrap_or(cfg.stream_chunk_size);
        cfg.stream_max_buffer =
            Self::read_parsed("CKB_STREAM_MAX_BUFFER").unwrap_or(cfg.stream_max_buffer);
        cfg.stream_heartbeat_secs =
            Self::read_parsed("CKB_STREAM_HEARTBEAT_SECS").unwrap_or(cfg.stream_heartbeat_secs);
        cfg.multi_repo_registry_path = Self::read("CKB_FEDERATION_REGISTRY").map(PathBuf::from);

        debug!(?cfg, "resolved session configuration");
        cfg
    }

    fn read(name: &str) -> Option<String> {
        std::env::var(name).ok().filter(|v| !v.trim().is_empty())
    }

    fn read_parsed<T: std::str::FromStr>(name: &str) -> Option<T> {
        Self::read(name).and_then(|v| v.parse().ok())
    }

    /// Validate cross-field constraints that single values can't express.
    /// Non-fatal: callers log warnings and proceed with best-effort defaults,
    /// matching the teacher's `ApiKeys`/`EnvConfig` validation pattern.
    pub fn validate(&self) -> ConfigValidation {
        let mut warnings = Vec::new();

        if self.preset == Preset::Federation && self.multi_repo_registry_path.is_none() {
            warnings.push(
                "preset=federation but CKB_FEDERATION_REGISTRY is unset; federation tools will \
                 fail until a repo registry path is configured"
                    .to_string(),
            );
        }
        if self.max_engines == 0 {
            warnings.push("CKB_MAX_ENGINES=0 disables the engine cache entirely".to_string());
        }
        if self.stream_chunk_size == 0 {
            warnings.push("CKB_STREAM_CHUNK_SIZE=0 is invalid; clamped to 1".to_string());
        }
        if self.max_message_size < 1024 {
            warnings.push(
                "CKB_MAX_MESSAGE_SIZE is implausibly small; most requests will fail to parse"
                    .to_string(),
            );
        }

        for warning in &warnings {
            warn!("{warning}");
        }
        ConfigValidation { warnings }
    }
}

/// Result of [`EnvConfig::validate`].
#[derive(Debug, Default)]
pub struct ConfigValidation {
    pub warnings: Vec<String>,
}

impl ConfigValidation {
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}
