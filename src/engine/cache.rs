// src/engine/cache.rs
// Engine multiplexer (C6, spec §4.6): LRU cache of per-repo query engines.
//
// Single-repo deployments use a `SingleRepoRegistry` with `max_engines == 1`
// — the same switch/cache/evict machinery below then degenerates naturally
// into "one fixed engine, further switches are no-ops", so no special-cased
// single-repo branch is needed.

use super::query::{EngineFactory, QueryEngine};
use super::repo_registry::{RepoRegistry, RepoState};
use crate::error::CkbError;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Instant;
use tokio::sync::{Mutex, Notify};
use tracing::debug;

/// Wait-group-like counter tracking in-flight operations against one engine
/// (spec §3 "Engine entry", invariant "an engine is never closed while its
/// activeOps > 0").
#[derive(Default)]
pub struct ActiveOps {
    count: AtomicUsize,
    notify: Notify,
}

impl ActiveOps {
    fn enter(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }

    fn leave(&self) {
        if self.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.notify.notify_waiters();
        }
    }

    /// Wait until the counter reaches zero. Subscribes to the notifier
    /// *before* checking the count so a `leave()` racing with this call can
    /// never be missed.
    pub async fn wait_for_zero(&self) {
        loop {
            let notified = self.notify.notified();
            if self.count.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }

    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

/// RAII guard ensuring `leave()` runs on every exit path, including a
/// handler panic unwinding through `with_engine`.
struct ActiveOpsGuard<'a>(&'a ActiveOps);

impl Drop for ActiveOpsGuard<'_> {
    fn drop(&mut self) {
        self.0.leave();
    }
}

pub struct EngineEntry {
    pub engine: Arc<dyn QueryEngine>,
    pub repo_path: PathBuf,
    pub repo_name: String,
    pub loaded_at: Instant,
    last_used: StdMutex<Instant>,
    pub active_ops: ActiveOps,
}

#[derive(Debug, Clone, Serialize)]
pub struct RepoStatus {
    pub name: String,
    pub path: Option<PathBuf>,
    pub loaded: bool,
    pub active: bool,
    pub state: String,
}

/// Bounded, LRU-evicted cache of per-repo query engines (spec §4.6).
pub struct EngineMultiplexer {
    registry: Arc<dyn RepoRegistry>,
    factory: Arc<dyn EngineFactory>,
    max_engines: usize,
    cache: Mutex<HashMap<String, Arc<EngineEntry>>>,
    active: Mutex<Option<String>>,
}

impl EngineMultiplexer {
    pub fn new(registry: Arc<dyn RepoRegistry>, factory: Arc<dyn EngineFactory>, max_engines: usize) -> Self {
        Self {
            registry,
            factory,
            max_engines: max_engines.max(1),
            cache: Mutex::new(HashMap::new()),
            active: Mutex::new(None),
        }
    }

    pub async fn list_repos(&self) -> Vec<RepoStatus> {
        let cache = self.cache.lock().await;
        let active = self.active.lock().await.clone();
        self.registry
            .list()
            .into_iter()
            .map(|name| {
                let resolved = self.registry.resolve(&name);
                let (state, path) = match resolved {
                    RepoState::Ready(path) => ("ready".to_string(), Some(path)),
                    RepoState::Missing => ("missing".to_string(), None),
                    RepoState::Uninitialized => ("uninitialized".to_string(), None),
                };
                RepoStatus {
                    loaded: cache.contains_key(&name),
                    active: active.as_deref() == Some(name.as_str()),
                    name,
                    path,
                    state,
                }
            })
            .collect()
    }

    pub async fn get_active_repo(&self) -> Option<(String, PathBuf)> {
        let active = self.active.lock().await.clone()?;
        let cache = self.cache.lock().await;
        cache.get(&active).map(|e| (active.clone(), e.repo_path.clone()))
    }

    /// Resolve `name`, activate its (possibly newly created) engine, evicting
    /// an LRU non-active entry first if the cache is full (spec §4.6, P5).
    pub async fn switch_repo(&self, name: &str) -> Result<RepoStatus, CkbError> {
        let path = match self.registry.resolve(name) {
            RepoState::Missing => {
                return Err(CkbError::InvalidParams(format!(
                    "repo '{name}' is missing; run remove"
                )))
            }
            RepoState::Uninitialized => {
                return Err(CkbError::InvalidParams(format!(
                    "repo '{name}' is uninitialized; run init"
                )))
            }
            RepoState::Ready(path) => path,
        };

        let already_cached = self.cache.lock().await.contains_key(name);
        if !already_cached {
            self.make_room().await?;
            let engine = self
                .factory
                .create(&path)
                .await
                .map_err(|e| CkbError::Operation(e.to_string()))?;
            let entry = Arc::new(EngineEntry {
                engine,
                repo_path: path.clone(),
                repo_name: name.to_string(),
                loaded_at: Instant::now(),
                last_used: StdMutex::new(Instant::now()),
                active_ops: ActiveOps::default(),
            });
            // Insert before advancing last_used / activating (spec design note).
            self.cache.lock().await.entry(name.to_string()).or_insert(entry);
            debug!(repo = name, "created engine");
        }

        if let Some(entry) = self.cache.lock().await.get(name) {
            *entry.last_used.lock().unwrap_or_else(|e| e.into_inner()) = Instant::now();
        }
        self.registry.touch(name);
        *self.active.lock().await = Some(name.to_string());

        Ok(RepoStatus {
            name: name.to_string(),
            path: Some(path),
            loaded: true,
            active: true,
            state: "ready".to_string(),
        })
    }

    /// Evict the LRU non-active entry if the cache is at capacity. No-op if
    /// there's already room.
    async fn make_room(&self) -> Result<(), CkbError> {
        let victim = {
            let cache = self.cache.lock().await;
            if cache.len() < self.max_engines {
                return Ok(());
            }
            let active = self.active.lock().await.clone();
            cache
                .iter()
                .filter(|(n, _)| Some(n.as_str()) != active.as_deref())
                .min_by_key(|(_, e)| *e.last_used.lock().unwrap_or_else(|err| err.into_inner()))
                .map(|(n, _)| n.clone())
        };

        let victim = victim.ok_or_else(|| {
            CkbError::Operation(
                "engine cache is full and the active engine cannot be evicted".to_string(),
            )
        })?;

        let entry = self.cache.lock().await.remove(&victim);
        if let Some(entry) = entry {
            entry.active_ops.wait_for_zero().await;
            entry.engine.close().await;
            debug!(repo = victim, "evicted engine (LRU)");
        }
        Ok(())
    }

    /// Run `f` against the active engine with `activeOps` held for its
    /// duration; decremented on every exit path, including panics.
    pub async fn with_engine<F, Fut, T>(&self, f: F) -> Result<T, CkbError>
    where
        F: FnOnce(Arc<dyn QueryEngine>) -> Fut,
        Fut: Future<Output = Result<T, CkbError>>,
    {
        let active_name = self
            .active
            .lock()
            .await
            .clone()
            .ok_or_else(|| CkbError::InvalidParams("no active repository; call switchRepo first".into()))?;

        let entry = self.cache.lock().await.get(&active_name).cloned();
        let entry = entry.ok_or_else(|| {
            CkbError::Operation(format!(
                "active repo '{active_name}' has no cached engine; call switchRepo again"
            ))
        })?;

        entry.active_ops.enter();
        let _guard = ActiveOpsGuard(&entry.active_ops);
        f(entry.engine.clone()).await
    }

    /// Snapshot entries under lock, release, then drain `activeOps` and
    /// close each engine outside the lock (spec §4.6, §9 design notes).
    pub async fn close_all(&self) {
        let entries: Vec<Arc<EngineEntry>> = {
            let mut cache = self.cache.lock().await;
            let entries = cache.values().cloned().collect();
            cache.clear();
            entries
        };
        for entry in entries {
            entry.active_ops.wait_for_zero().await;
            entry.engine.close().await;
        }
        *self.active.lock().await = None;
    }

    pub async fn cached_count(&self) -> usize {
        self.cache.lock().await.len()
    }
}
