//! Isolation Contexts
//!
//! Every invocation runs inside its own QuickJS runtime and context. Closing
//! a context drops both synchronously, which releases every module, callback
//! and host binding it holds before control returns to the caller.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use rquickjs::{Context, Ctx, Runtime};

use crate::bindings;
use crate::config::LoaderConfig;
use crate::error::{ScriptError, ScriptResult};
use crate::host::Host;
use crate::modules::{ModuleTable, ScriptModuleLoader, ScriptResolver};

// ─────────────────────────────────────────────────────────────────────────────
// Context Identity
// ─────────────────────────────────────────────────────────────────────────────

/// Process-unique identifier of an isolation context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(u64);

impl ContextId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx-{}", self.0)
    }
}

/// Lifetime class of a context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextKind {
    /// Opened for one EXEC or CHECK and torn down afterwards.
    Transient,
    /// Opened by LOAD and owned by the registry afterwards.
    Persistent,
}

impl ContextKind {
    pub fn is_persistent(&self) -> bool {
        matches!(self, Self::Persistent)
    }
}

/// Diagnostic tag of the context created for a script directory.
pub fn domain_name(script_dir: &Path) -> String {
    format!("ScriptDomain_{}", script_dir.display())
}

// ─────────────────────────────────────────────────────────────────────────────
// Isolation Context
// ─────────────────────────────────────────────────────────────────────────────

/// One QuickJS runtime and context holding the modules of a single script
/// directory.
pub struct IsolationContext {
    id: ContextId,
    name: String,
    kind: ContextKind,
    script_dir: PathBuf,
    modules: Arc<ModuleTable>,
    /// Entry export resolved for this context.
    entry: Option<String>,
    context: Option<Context>,
    runtime: Option<Runtime>,
}

impl IsolationContext {
    /// Create a fresh runtime for the directory of `primary`, with the module
    /// loader and host bindings installed.
    pub fn open(
        primary: &Path,
        kind: ContextKind,
        config: &LoaderConfig,
        host: Arc<dyn Host>,
    ) -> ScriptResult<Self> {
        let script_dir = primary
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| ScriptError::Parse(format!("'{}' has no parent", primary.display())))?;

        let modules = Arc::new(ModuleTable::scan(&script_dir, primary, config)?);

        let runtime = Runtime::new()?;
        if let Some(limit) = config.memory_limit {
            runtime.set_memory_limit(limit);
        }
        if let Some(limit) = config.max_stack_size {
            runtime.set_max_stack_size(limit);
        }
        runtime.set_loader(
            ScriptResolver::new(modules.clone()),
            ScriptModuleLoader::new(modules.clone()),
        );

        let context = Context::full(&runtime)?;
        let id = ContextId::next();
        context.with(|ctx| bindings::install(&ctx, host, id, kind))?;

        let name = domain_name(&script_dir);
        tracing::debug!(
            "Opened {:?} context {} ({}) with {} module(s)",
            kind,
            id,
            name,
            modules.len()
        );

        Ok(Self {
            id,
            name,
            kind,
            script_dir,
            modules,
            entry: None,
            context: Some(context),
            runtime: Some(runtime),
        })
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ContextKind {
        self.kind
    }

    pub fn script_dir(&self) -> &Path {
        &self.script_dir
    }

    pub fn modules(&self) -> &Arc<ModuleTable> {
        &self.modules
    }

    pub fn entry(&self) -> Option<&str> {
        self.entry.as_deref()
    }

    pub(crate) fn set_entry(&mut self, entry: String) {
        self.entry = Some(entry);
    }

    pub fn is_open(&self) -> bool {
        self.context.is_some()
    }

    /// Enter the context.
    pub fn with<F, R>(&self, f: F) -> ScriptResult<R>
    where
        F: FnOnce(Ctx<'_>) -> ScriptResult<R>,
    {
        let context = self
            .context
            .as_ref()
            .ok_or_else(|| ScriptError::Engine(format!("context {} is closed", self.name)))?;
        context.with(f)
    }

    /// Unload a transient context. No-op for persistent contexts, which are
    /// only reclaimed by dropping their registry entry. Never fails.
    pub fn close(&mut self) {
        match self.kind {
            ContextKind::Transient => self.teardown(),
            ContextKind::Persistent => {
                tracing::debug!("Context {} is persistent, keeping it loaded", self.id);
            }
        }
    }

    fn teardown(&mut self) {
        let Some(runtime) = self.runtime.take() else {
            return;
        };

        runtime.run_gc();
        drop(self.context.take());

        let weak = runtime.weak();
        drop(runtime);

        if weak.try_ref().is_some() {
            tracing::warn!(
                "Context {} ({}) still referenced after unload, resources leaked",
                self.id,
                self.name
            );
        } else {
            tracing::debug!("Unloaded context {} ({})", self.id, self.name);
        }
    }
}

impl Drop for IsolationContext {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl fmt::Debug for IsolationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IsolationContext")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("entry", &self.entry)
            .field("open", &self.is_open())
            .finish()
    }
}
