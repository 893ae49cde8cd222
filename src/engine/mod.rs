// src/engine/mod.rs
// Engine multiplexer (C6, spec §4.6): the query-engine seam, its per-repo
// cache, and the external repo registry collaborator.

pub mod cache;
pub mod query;
pub mod repo_registry;

pub use cache::{EngineMultiplexer, RepoStatus};
pub use query::{EngineError, EngineFactory, EngineResponse, NullEngine, NullEngineFactory, QueryEngine};
pub use repo_registry::{FileRepoRegistry, RepoRegistry, RepoState, SingleRepoRegistry};
