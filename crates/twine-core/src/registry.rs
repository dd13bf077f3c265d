use crate::context::Context;
use crate::error::{Result, TwineError};
use crate::graph::Graph;
use crate::plugin::PluginToken;

/// Status returned by an input handler's body. `Ok(())` acks the
/// message; any `Err` rejects it.
pub type HandlerResult = Result<()>;

pub type InputFn = dyn Fn(&Context, &str, &[u8], Option<&str>) -> HandlerResult + Send + Sync;
pub type ProcessorFn = dyn Fn(&Context, &mut Graph) -> HandlerResult + Send + Sync;
pub type UpdateFn = dyn Fn(&Context, &str, &str) -> HandlerResult + Send + Sync;

/// What a bulk handler reports after being handed a chunk of buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkAdvance {
    /// No progress: the handler needs more bytes before it can parse
    /// anything further.
    NoProgress,
    /// The handler consumed this many bytes from the front of the
    /// buffer; the caller should discard them and keep the rest.
    Consumed(usize),
}

pub type BulkFn = dyn Fn(&Context, &str, &[u8]) -> Result<BulkAdvance> + Send + Sync;

struct InputEntry {
    mime_type: String,
    #[allow(dead_code)]
    description: String,
    owner: PluginToken,
    func: Box<InputFn>,
}

struct BulkEntry {
    mime_type: String,
    #[allow(dead_code)]
    description: String,
    owner: PluginToken,
    func: Box<BulkFn>,
}

struct ProcessorEntry {
    name: String,
    owner: PluginToken,
    func: Box<ProcessorFn>,
}

struct UpdateEntry {
    name: String,
    owner: PluginToken,
    func: Box<UpdateFn>,
}

/// Strips `; charset=...`-style parameters and lower-cases, for MIME
/// comparison that is insensitive to both case and trailing parameters.
fn mime_key(mime_type: &str) -> String {
    mime_type
        .split(';')
        .next()
        .unwrap_or(mime_type)
        .trim()
        .to_ascii_lowercase()
}

/// The four typed handler tables: input, bulk, processor, and update.
/// Registration happens only during a
/// plug-in's attach callback (or with [`PluginToken::INTERNAL`] as the
/// owner, for the workflow engine's own built-in processors); dispatch
/// reads the
/// tables without locking beyond whatever the caller wraps it in, since
/// the registry is mutated only at attach/detach time.
#[derive(Default)]
pub struct Registry {
    input: Vec<InputEntry>,
    bulk: Vec<BulkEntry>,
    processor: Vec<ProcessorEntry>,
    update: Vec<UpdateEntry>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_input(
        &mut self,
        owner: PluginToken,
        mime_type: &str,
        description: &str,
        func: Box<InputFn>,
    ) {
        self.input.push(InputEntry {
            mime_type: mime_key(mime_type),
            description: description.to_string(),
            owner,
            func,
        });
    }

    pub fn register_bulk(
        &mut self,
        owner: PluginToken,
        mime_type: &str,
        description: &str,
        func: Box<BulkFn>,
    ) {
        self.bulk.push(BulkEntry {
            mime_type: mime_key(mime_type),
            description: description.to_string(),
            owner,
            func,
        });
    }

    /// Register a graph processor. `owner == PluginToken::INTERNAL` is
    /// reserved for the workflow engine's own built-ins (`sparql-get`,
    /// `sparql-put`, `s3-get`, `s3-put`, `dump-nquads`) and bypasses the
    /// "must register from an attach callback" rule enforced at the
    /// plug-in-loader layer.
    pub fn register_processor(&mut self, owner: PluginToken, name: &str, func: Box<ProcessorFn>) {
        self.processor.push(ProcessorEntry {
            name: name.to_ascii_lowercase(),
            owner,
            func,
        });
    }

    pub fn register_update(&mut self, owner: PluginToken, name: &str, func: Box<UpdateFn>) {
        self.update.push(UpdateEntry {
            name: name.to_ascii_lowercase(),
            owner,
            func,
        });
    }

    pub fn input_exists(&self, mime_type: &str) -> bool {
        let key = mime_key(mime_type);
        self.input.iter().any(|e| e.mime_type == key)
    }

    pub fn bulk_exists(&self, mime_type: &str) -> bool {
        let key = mime_key(mime_type);
        self.bulk.iter().any(|e| e.mime_type == key)
    }

    pub fn processor_exists(&self, name: &str) -> bool {
        let key = name.to_ascii_lowercase();
        self.processor.iter().any(|e| e.name == key)
    }

    pub fn update_exists(&self, name: &str) -> bool {
        let key = name.to_ascii_lowercase();
        self.update.iter().any(|e| e.name == key)
    }

    pub fn resolve_input(&self, ctx: &Context, mime_type: &str, body: &[u8], subject: Option<&str>) -> HandlerResult {
        let key = mime_key(mime_type);
        let entry = self
            .input
            .iter()
            .find(|e| e.mime_type == key)
            .ok_or_else(|| TwineError::NoHandler(format!("input handler for '{mime_type}'")))?;
        (entry.func)(ctx, mime_type, body, subject)
    }

    pub fn resolve_bulk(&self, ctx: &Context, mime_type: &str, body: &[u8]) -> Result<BulkAdvance> {
        let key = mime_key(mime_type);
        let entry = self
            .bulk
            .iter()
            .find(|e| e.mime_type == key)
            .ok_or_else(|| TwineError::NoHandler(format!("bulk handler for '{mime_type}'")))?;
        (entry.func)(ctx, mime_type, body)
    }

    pub fn resolve_processor(&self, ctx: &Context, name: &str, graph: &mut Graph) -> HandlerResult {
        let key = name.to_ascii_lowercase();
        let entry = self
            .processor
            .iter()
            .find(|e| e.name == key)
            .ok_or_else(|| TwineError::NoHandler(format!("processor '{name}'")))?;
        (entry.func)(ctx, graph)
    }

    pub fn resolve_update(&self, ctx: &Context, name: &str, identifier: &str) -> HandlerResult {
        let key = name.to_ascii_lowercase();
        let entry = self
            .update
            .iter()
            .find(|e| e.name == key)
            .ok_or_else(|| TwineError::NoHandler(format!("update handler '{name}'")))?;
        (entry.func)(ctx, name, identifier)
    }

    /// Every processor name whose registered name begins with `prefix`
    /// (e.g. `"pre:"`/`"post:"`), in registration order.
    pub fn processors_with_prefix(&self, prefix: &str) -> Vec<String> {
        self.processor
            .iter()
            .filter(|e| e.name.starts_with(prefix))
            .map(|e| e.name.clone())
            .collect()
    }

    /// Remove every entry (of any kind) owned by `owner`. O(registrations
    /// of that plug-in) in the sense that each table is scanned once.
    pub fn detach(&mut self, owner: PluginToken) {
        self.input.retain(|e| e.owner != owner);
        self.bulk.retain(|e| e.owner != owner);
        self.processor.retain(|e| e.owner != owner);
        self.update.retain(|e| e.owner != owner);
    }
}
