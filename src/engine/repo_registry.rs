// src/engine/repo_registry.rs
// External repo registry collaborator: resolves a repo name to a path and
// state. Backed by an optional TOML file (`multiRepoRegistryPath`, spec
// §6.4) or, in single-repo mode, a single fixed entry.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Instant;

/// State of a registered repository, as reported by the external registry
/// (spec §4.6 failure policies).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepoState {
    Ready(PathBuf),
    Missing,
    Uninitialized,
}

pub trait RepoRegistry: Send + Sync {
    fn resolve(&self, name: &str) -> RepoState;
    fn touch(&self, name: &str);
    fn list(&self) -> Vec<String>;
}

#[derive(Debug, Deserialize)]
struct RegistryFile {
    #[serde(default)]
    repos: HashMap<String, RegistryFileEntry>,
}

#[derive(Debug, Deserialize)]
struct RegistryFileEntry {
    path: String,
    #[serde(default)]
    initialized: bool,
}

/// Multi-repo registry backed by a TOML file: `name -> {path, initialized}`.
pub struct FileRepoRegistry {
    entries: HashMap<String, (PathBuf, bool)>,
    last_used: Mutex<HashMap<String, Instant>>,
}

impl FileRepoRegistry {
    pub fn load(path: &Path) -> Result<Self, crate::error::CkbError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            crate::error::CkbError::Config(format!(
                "could not read federation registry {}: {e}",
                path.display()
            ))
        })?;
        let parsed: RegistryFile = toml::from_str(&text).map_err(|e| {
            crate::error::CkbError::Config(format!("malformed federation registry: {e}"))
        })?;
        let entries = parsed
            .repos
            .into_iter()
            .map(|(name, entry)| (name, (PathBuf::from(entry.path), entry.initialized)))
            .collect();
        Ok(Self {
            entries,
            last_used: Mutex::new(HashMap::new()),
        })
    }
}

impl RepoRegistry for FileRepoRegistry {
    fn resolve(&self, name: &str) -> RepoState {
        match self.entries.get(name) {
            None => RepoState::Missing,
            Some((_, false)) => RepoState::Uninitialized,
            Some((path, true)) => RepoState::Ready(path.clone()),
        }
    }

    fn touch(&self, name: &str) {
        self.last_used
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(name.to_string(), Instant::now());
    }

    fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.keys().cloned().collect();
        names.sort();
        names
    }
}

/// Single-repo registry: one fixed name/path pair, always `Ready`.
pub struct SingleRepoRegistry {
    name: String,
    path: PathBuf,
}

impl SingleRepoRegistry {
    pub fn new(name: impl Into<String>, path: PathBuf) -> Self {
        Self {
            name: name.into(),
            path,
        }
    }
}

impl RepoRegistry for SingleRepoRegistry {
    fn resolve(&self, name: &str) -> RepoState {
        if name == self.name {
            RepoState::Ready(self.path.clone())
        } else {
            RepoState::Missing
        }
    }

    fn touch(&self, _name: &str) {}

    fn list(&self) -> Vec<String> {
        vec![self.name.clone()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_repo_registry_resolves_its_own_name() {
        let reg = SingleRepoRegistry::new("self", PathBuf::from("/tmp/self"));
        assert_eq!(reg.resolve("self"), RepoState::Ready(PathBuf::from("/tmp/self")));
        assert_eq!(reg.resolve("other"), RepoState::Missing);
    }

    #[test]
    fn file_registry_distinguishes_states() {
        let toml = r#"
            [repos.a]
            path = "/repos/a"
            initialized = true

            [repos.b]
            path = "/repos/b"
            initialized = false
        "#;
        let mut f = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut f, toml.as_bytes()).unwrap();
        let reg = FileRepoRegistry::load(f.path()).unwrap();

        assert_eq!(reg.resolve("a"), RepoState::Ready(PathBuf::from("/repos/a")));
        assert_eq!(reg.resolve("b"), RepoState::Uninitialized);
        assert_eq!(reg.resolve("missing"), RepoState::Missing);
        assert_eq!(reg.list(), vec!["a".to_string(), "b".to_string()]);
    }
}
