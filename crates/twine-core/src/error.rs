use thiserror::Error;

/// The error kinds named in the workflow engine's error handling design.
///
/// Each variant carries the propagation policy described alongside it;
/// callers (the dispatch loop, the pipeline) match on `TwineError` rather
/// than inspecting an opaque `anyhow::Error`, so the kind itself is part
/// of the public contract.
#[derive(Debug, Error)]
pub enum TwineError {
    /// Missing or malformed configuration. Fatal at startup.
    #[error("bad configuration: {0}")]
    BadConfig(String),

    /// No handler registered for a MIME type or processor/update name.
    /// Per-message failure; the dispatch loop rejects the message.
    #[error("no handler registered for '{0}'")]
    NoHandler(String),

    /// An input or bulk handler produced no usable graphs from its input.
    /// Per-message failure; the dispatch loop rejects the message.
    #[error("parse failure: {0}")]
    ParseFailure(String),

    /// SPARQL, S3, or SQL returned a non-success outcome. Per-graph
    /// failure: the pipeline aborts and the message is rejected.
    #[error("upstream failure: {0}")]
    UpstreamFailure(String),

    /// A bulk handler returned a pointer (here: a byte offset) outside
    /// the buffer it was given. Fatal for that bulk job.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// Broker I/O error. Logged; the loop retries or exits according to
    /// the broker client's own semantics.
    #[error("transient broker error: {0}")]
    Transient(String),
}

pub type Result<T> = std::result::Result<T, TwineError>;
