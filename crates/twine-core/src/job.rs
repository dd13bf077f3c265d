use std::sync::atomic::{AtomicUsize, Ordering};

/// Per-message context used for structured logging and progress
/// reporting.
///
/// Created by the dispatch loop (or the bulk-import / update drivers)
/// for each unit of work and dropped once that unit completes.
#[derive(Debug, Clone)]
pub struct Job {
    pub mime_type: String,
    pub subject: Option<String>,
    pub address: Option<String>,
    graphs_processed: std::sync::Arc<AtomicUsize>,
}

impl Job {
    pub fn new(mime_type: impl Into<String>) -> Self {
        Self {
            mime_type: mime_type.into(),
            subject: None,
            address: None,
            graphs_processed: std::sync::Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_subject(mut self, subject: Option<String>) -> Self {
        self.subject = subject;
        self
    }

    pub fn with_address(mut self, address: Option<String>) -> Self {
        self.address = address;
        self
    }

    /// Record that one more named graph has been handed to the
    /// pipeline, and return the new running count (used for the
    /// "progress count increments 1, 2" scenario for multi-graph
    /// messages).
    pub fn graph_processed(&self) -> usize {
        self.graphs_processed.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn graphs_processed(&self) -> usize {
        self.graphs_processed.load(Ordering::SeqCst)
    }
}
