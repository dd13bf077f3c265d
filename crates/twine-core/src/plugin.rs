use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use crate::error::Result;
use crate::registry::Registry;

/// Identifies the plug-in that owns a set of registry entries, so that
/// `Registry::detach` can remove exactly the entries a given plug-in
/// contributed without affecting any other plug-in's registrations.
///
/// An implicit "current module" global set while a plug-in's init
/// function runs would not be thread-safe, so here the owner is
/// threaded explicitly through every `register_*` call instead of
/// being read from ambient state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PluginToken(u64);

impl PluginToken {
    /// Reserved for registrations made by the workflow engine itself
    /// (the built-in processors), which are never detached.
    pub const INTERNAL: PluginToken = PluginToken(0);

    pub fn new(id: u64) -> Self {
        PluginToken(id)
    }
}

/// Hands out fresh, distinct `PluginToken`s for the lifetime of a
/// process. `0` is reserved for [`PluginToken::INTERNAL`], so the first
/// externally issued token is `1`.
#[derive(Debug, Default)]
pub struct PluginTokenSource {
    next: AtomicU64,
}

impl PluginTokenSource {
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    pub fn issue(&self) -> PluginToken {
        PluginToken(self.next.fetch_add(1, Ordering::SeqCst))
    }
}

/// A plug-in's attach callback. Given a mutable [`Registry`] and the
/// token under which it should register its handlers, it wires itself
/// in and returns `Ok(())`, or fails the whole attach if it cannot
/// initialise (e.g. bad configuration).
pub type AttachFn = dyn Fn(&mut Registry, PluginToken) -> Result<()> + Send + Sync;

/// A plug-in's detach callback. Run once its registry entries have
/// already been removed, for any cleanup that isn't "stop being called"
/// (closing file handles, flushing caches). Most plug-ins need none and
/// can omit this.
pub type DetachFn = dyn Fn(PluginToken) + Send + Sync;

struct LoadedPlugin {
    token: PluginToken,
    detach: Arc<DetachFn>,
}

/// Drives the attach/detach lifecycle of plug-ins against a
/// [`Registry`]. Within one plug-in's own teardown its registry entries
/// are removed first and only afterwards does its detach hook run,
/// mirroring `libtwine/plugin.c`'s `twine_plugin_unload`, which frees a
/// module's `callbacks[]` entries before invoking its cleanup symbol.
/// Across plug-ins, `detach_all` tears them down in reverse attachment
/// order (last attached, first detached), as a context destroy does.
#[derive(Default)]
pub struct PluginManager {
    loaded: Mutex<Vec<LoadedPlugin>>,
}

impl PluginManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `attach` against `registry` under `token`. On success,
    /// records `detach` to run when this plug-in is later torn down. A
    /// failed attach records nothing, since it registered nothing that
    /// would need cleaning up.
    pub fn attach(
        &self,
        registry: &RwLock<Registry>,
        token: PluginToken,
        attach: &AttachFn,
        detach: Arc<DetachFn>,
    ) -> Result<()> {
        {
            let mut reg = registry.write().expect("registry lock poisoned");
            attach(&mut reg, token)?;
        }
        self.loaded
            .lock()
            .expect("plugin manager lock poisoned")
            .push(LoadedPlugin { token, detach });
        Ok(())
    }

    /// Detach one plug-in: its registry entries are removed first, then
    /// its detach hook runs. A no-op if `token` was never attached (or
    /// was already detached) through this manager.
    pub fn detach(&self, registry: &RwLock<Registry>, token: PluginToken) {
        let record = {
            let mut loaded = self.loaded.lock().expect("plugin manager lock poisoned");
            loaded.iter().position(|p| p.token == token).map(|pos| loaded.remove(pos))
        };
        let Some(record) = record else { return };
        registry.write().expect("registry lock poisoned").detach(token);
        (record.detach)(token);
    }

    /// Detach every currently loaded plug-in, in reverse attachment
    /// order (last attached torn down first).
    pub fn detach_all(&self, registry: &RwLock<Registry>) {
        let mut records: Vec<LoadedPlugin> = self.loaded.lock().expect("plugin manager lock poisoned").drain(..).collect();
        records.reverse();
        for record in records {
            registry.write().expect("registry lock poisoned").detach(record.token);
            (record.detach)(record.token);
        }
    }

    pub fn loaded_count(&self) -> usize {
        self.loaded.lock().expect("plugin manager lock poisoned").len()
    }
}
