// src/config/file.rs
// Optional TOML session-config file, layered under env-var configuration

use crate::registry::Preset;
use serde::Deserialize;
use std::path::Path;
use tracing::{debug, warn};

/// Optional file-based overrides for session defaults.
///
/// Loaded once at startup (if present) and applied *before* environment
/// variables, so `CKB_*` env vars always win — matching the teacher's
/// layering of `MiraConfig` (file) under `EnvConfig` (env).
#[derive(Debug, Deserialize, Default)]
pub struct FileConfig {
    #[serde(default)]
    pub session: SessionSection,
}

#[derive(Debug, Deserialize, Default)]
pub struct SessionSection {
    pub preset: Option<String>,
    pub max_engines: Option<usize>,
    pub multi_repo_registry_path: Option<String>,
}

impl FileConfig {
    /// Load from a TOML file at `path`. Missing file is not an error (most
    /// deployments have none); malformed TOML is logged and treated as
    /// absent so a single bad file never blocks startup.
    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(text) => match toml::from_str::<FileConfig>(&text) {
                Ok(cfg) => {
                    debug!(path = %path.display(), "loaded session config file");
                    cfg
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "malformed session config file, ignoring");
                    FileConfig::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => FileConfig::default(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "could not read session config file");
                FileConfig::default()
            }
        }
    }

    /// Apply the parsed `preset` field, if any, returning it typed.
    pub fn resolved_preset(&self) -> Option<Preset> {
        self.session.preset.as_deref().and_then(|s| s.parse().ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_is_default() {
        let cfg = FileConfig::load_from(Path::new("/nonexistent/ckb-config-test.toml"));
        assert!(cfg.session.preset.is_none());
    }

    #[test]
    fn parses_session_section() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "[session]\npreset = \"review\"\nmax_engines = 8").unwrap();
        let cfg = FileConfig::load_from(f.path());
        assert_eq!(cfg.session.preset.as_deref(), Some("review"));
        assert_eq!(cfg.session.max_engines, Some(8));
        assert_eq!(cfg.resolved_preset(), Some(Preset::Review));
    }
}
