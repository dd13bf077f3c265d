//! Core types shared by every other crate in the workspace: the graph
//! value, the execution context, the handler registry and plug-in
//! scoping, configuration, error kinds, and per-message job tracking.
//!
//! Kept as a single crate with internal modules (rather than splitting
//! the registry out on its own) because `Context` owns a `Registry`
//! directly; a separate registry crate would need to depend back on
//! this one for `Context`/`TwineError`, which is circular.

pub mod config;
pub mod context;
pub mod error;
pub mod graph;
pub mod job;
pub mod plugin;
pub mod registry;
pub mod traits;

pub use config::Config;
pub use context::{Context, ContextBuilder};
pub use error::{Result, TwineError};
pub use graph::Graph;
pub use job::Job;
pub use plugin::{AttachFn, DetachFn, PluginManager, PluginToken, PluginTokenSource};
pub use registry::{BulkAdvance, Registry};
pub use traits::{ClusterHandle, ObjectStore, SingleNode, SparqlClient, SqlIndex};
