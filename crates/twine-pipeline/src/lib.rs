//! The ordered graph-processing pipeline and its five built-in
//! processors (`sparql-get`, `sparql-put`, `s3-get`, `s3-put`,
//! `dump-nquads`).

pub mod builtins;
pub mod pipeline;
pub mod rdf_input;

pub use builtins::register_builtins;
pub use pipeline::{Pipeline, DEFAULT_WORKFLOW};
pub use rdf_input::{process_rdf_quads, register_rdf_input};
