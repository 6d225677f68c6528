//! Script Loader
//!
//! Runs commands through the pipeline
//! `open → dependencies → contract → entry point → dispatch → close` and
//! owns the contexts of persistently loaded scripts.

use std::path::Path;
use std::sync::Arc;

use rquickjs::{Ctx, Function, Value};

use crate::bindings;
use crate::command::{Command, CommandKind};
use crate::config::{LoaderConfig, ReloadPolicy};
use crate::context::{ContextKind, IsolationContext};
use crate::contract;
use crate::entry;
use crate::error::{ResultCode, ScriptError, ScriptResult};
use crate::host::{CallbackHandle, Host};
use crate::invoke::{self, Invocation, InvocationState};
use crate::modules::{self, describe};
use crate::registry::PersistentLoadRegistry;

pub struct ScriptLoader {
    config: LoaderConfig,
    host: Arc<dyn Host>,
    registry: PersistentLoadRegistry,
}

impl ScriptLoader {
    pub fn new(config: LoaderConfig, host: Arc<dyn Host>) -> Self {
        Self {
            config,
            host,
            registry: PersistentLoadRegistry::new(),
        }
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    pub fn registry(&self) -> &PersistentLoadRegistry {
        &self.registry
    }

    pub fn is_loaded(&self, path: &Path) -> bool {
        self.registry.contains(path)
    }

    /// Run a wire command and return its raw result. Never fails; every
    /// error is logged and mapped to a result code.
    pub fn execute(&mut self, wire: &str) -> i32 {
        let command = match Command::parse(wire) {
            Ok(command) => command,
            Err(err) => {
                tracing::error!("Rejected command {:?}: {}", wire, err);
                return err.code().as_i32();
            }
        };

        self.run(&command)
    }

    /// Run a parsed command and return its raw result.
    pub fn run(&mut self, command: &Command) -> i32 {
        match self.dispatch(command) {
            Ok(result) => result,
            Err(err) => {
                tracing::error!(
                    "{} {} of '{}' failed: {}",
                    command.kind,
                    command.method,
                    command.path.display(),
                    err
                );
                err.code().as_i32()
            }
        }
    }

    /// Run a parsed command, surfacing the error behind a failure code.
    pub fn dispatch(&mut self, command: &Command) -> ScriptResult<i32> {
        let mut invocation = Invocation::new(command);
        let result = match command.kind {
            CommandKind::Load => self.load(command, &mut invocation),
            CommandKind::Exec | CommandKind::Check => self.transient(command, &mut invocation),
        };

        match &result {
            Ok(_) => invocation.advance(InvocationState::Done),
            Err(err) => invocation.fail(err.code()),
        }
        result
    }

    fn load(&mut self, command: &Command, invocation: &mut Invocation) -> ScriptResult<i32> {
        if self.registry.contains(&command.path) {
            match self.config.reload_policy {
                ReloadPolicy::Idempotent => {
                    tracing::debug!("'{}' is already loaded", command.path.display());
                    return Ok(ResultCode::Success.as_i32());
                }
                ReloadPolicy::Reinitialize => {
                    tracing::info!("Reloading '{}'", command.path.display());
                }
            }
        }

        // The previous context, if any, stays registered until the new one
        // has made it through the whole pipeline.
        let mut context = self.open(command, ContextKind::Persistent, invocation)?;
        let result = self.pipeline(&mut context, command, invocation)?;

        tracing::info!(
            "Loaded '{}' into {} ({})",
            command.path.display(),
            context.id(),
            context.name()
        );
        if let Some(previous) = self.registry.insert(command.path.clone(), context) {
            tracing::debug!("Replaced context {}", previous.id());
        }
        Ok(result)
    }

    fn transient(&mut self, command: &Command, invocation: &mut Invocation) -> ScriptResult<i32> {
        let mut context = self.open(command, ContextKind::Transient, invocation)?;
        let result = self.pipeline(&mut context, command, invocation);
        context.close();
        invocation.advance(InvocationState::Closed);
        result
    }

    fn open(
        &self,
        command: &Command,
        kind: ContextKind,
        invocation: &mut Invocation,
    ) -> ScriptResult<IsolationContext> {
        let context = IsolationContext::open(&command.path, kind, &self.config, self.host.clone())?;
        invocation.advance(InvocationState::ContextOpen);
        Ok(context)
    }

    fn pipeline(
        &self,
        context: &mut IsolationContext,
        command: &Command,
        invocation: &mut Invocation,
    ) -> ScriptResult<i32> {
        let table = context.modules().clone();
        let config = &self.config;

        let (entry_name, result) = context.with(|ctx| {
            let mut loaded = modules::load_dependencies(&ctx, &table);
            let namespace = modules::load_primary(&ctx, &table)?;
            loaded.insert(table.primary().to_string());
            invocation.advance(InvocationState::DependenciesLoaded);

            let support = contract::validate(&ctx, &loaded, config)?;
            invocation.advance(InvocationState::ContractValidated);

            let entry = entry::resolve(&namespace, Some(&support), config)?;
            invocation.advance(InvocationState::EntryResolved);

            let result = match command.kind {
                CommandKind::Check => invoke::check(&entry, &command.method)?,
                CommandKind::Load if command.method.is_empty() => ResultCode::Success.as_i32(),
                CommandKind::Load | CommandKind::Exec => invoke::invoke(&ctx, &entry, &command.method)?,
            };
            invocation.advance(InvocationState::Dispatched);

            Ok((entry.name().to_string(), result))
        })?;

        context.set_entry(entry_name);
        Ok(result)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Host Callbacks
    // ─────────────────────────────────────────────────────────────────────

    fn with_callback<F, R>(&self, handle: CallbackHandle, f: F) -> ScriptResult<R>
    where
        F: for<'js> FnOnce(&Ctx<'js>, Function<'js>) -> ScriptResult<R>,
    {
        let stale = || ScriptError::StaleCallback {
            context: handle.context.as_u64(),
            slot: handle.slot,
        };
        let context = self.registry.get(handle.context).ok_or_else(stale)?;
        context.with(|ctx| {
            let function = bindings::callback(&ctx, handle.slot)?.ok_or_else(stale)?;
            f(&ctx, function)
        })
    }

    /// Invoke a retained view or menu-item callback.
    pub fn invoke_callback(&self, handle: CallbackHandle) -> ScriptResult<()> {
        self.with_callback(handle, |ctx, function| {
            function
                .call::<_, Value>(())
                .map(|_| ())
                .map_err(|err| ScriptError::Execution(describe(ctx, err)))
        })
    }

    /// Call a provider's read callback.
    pub fn provider_read(&self, handle: CallbackHandle, offset: u64, size: u64) -> ScriptResult<Vec<u8>> {
        self.with_callback(handle, |ctx, function| {
            let value: Value = function
                .call((offset, size))
                .map_err(|err| ScriptError::Execution(describe(ctx, err)))?;
            let type_name = value.type_name();
            bindings::bytes_from_js(ctx, value).map_err(|_| ScriptError::ReturnType {
                method: "read".to_string(),
                type_name: type_name.to_string(),
            })
        })
    }

    /// Call a provider's write callback.
    pub fn provider_write(&self, handle: CallbackHandle, offset: u64, bytes: &[u8]) -> ScriptResult<()> {
        self.with_callback(handle, |ctx, function| {
            function
                .call::<_, Value>((offset, bytes.to_vec()))
                .map(|_| ())
                .map_err(|err| ScriptError::Execution(describe(ctx, err)))
        })
    }

    /// Call a provider's size callback.
    pub fn provider_size(&self, handle: CallbackHandle) -> ScriptResult<u64> {
        self.with_callback(handle, |ctx, function| {
            let value: Value = function
                .call(())
                .map_err(|err| ScriptError::Execution(describe(ctx, err)))?;
            match value.as_number() {
                Some(size) if size >= 0.0 && size.fract() == 0.0 => Ok(size as u64),
                _ => Err(ScriptError::ReturnType {
                    method: "size".to_string(),
                    type_name: value.type_name().to_string(),
                }),
            }
        })
    }

    /// Drop the persistent context of `path`, if loaded.
    pub fn unload(&mut self, path: &Path) -> bool {
        self.registry.remove(path).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::NullHost;
    use std::fs;
    use tempfile::TempDir;

    const LIBRARY: &str = r#"
        export class IScript { static IScript = true; }
        export class Library { static Initialize() {} }
    "#;

    fn script(source: &str) -> (TempDir, String) {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("ImHexLibrary.js"), LIBRARY).unwrap();
        let primary = dir.path().join("script.js");
        fs::write(&primary, source).unwrap();
        let path = primary.display().to_string();
        (dir, path)
    }

    fn loader() -> ScriptLoader {
        ScriptLoader::new(LoaderConfig::default(), Arc::new(NullHost))
    }

    #[test]
    fn test_exec_returns_value() {
        let (_dir, path) = script(
            "import { IScript } from './ImHexLibrary.js'; export class S extends IScript { static Main() { return 5; } }",
        );
        assert_eq!(loader().execute(&format!("EXEC||Main||{path}")), 5);
    }

    #[test]
    fn test_invalid_command() {
        let mut loader = loader();
        assert_eq!(loader.execute("EXEC||Main"), ResultCode::InvalidCommand.as_i32());
        assert_eq!(loader.execute("RUN||Main||/s/a.js"), ResultCode::InvalidCommand.as_i32());
    }

    #[test]
    fn test_missing_script_is_loader_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing.js");
        let code = loader().execute(&format!("EXEC||Main||{}", path.display()));
        assert_eq!(code, ResultCode::LoaderError.as_i32());
    }

    #[test]
    fn test_load_registers_context() {
        let (_dir, path) = script(
            "import { IScript } from 'ImHexLibrary'; export class S extends IScript { static OnLoad() {} }",
        );
        let mut loader = loader();
        assert_eq!(loader.execute(&format!("LOAD||OnLoad||{path}")), 0);
        assert!(loader.is_loaded(Path::new(&path)));

        let context = loader.registry().get_by_path(Path::new(&path)).unwrap();
        assert_eq!(context.entry(), Some("S"));
        assert!(context.is_open());

        assert!(loader.unload(Path::new(&path)));
        assert!(!loader.is_loaded(Path::new(&path)));
    }

    #[test]
    fn test_failed_load_is_not_registered() {
        let (_dir, path) = script(
            "import { IScript } from 'ImHexLibrary'; export class S extends IScript { static OnLoad() { throw new Error('x'); } }",
        );
        let mut loader = loader();
        assert_eq!(
            loader.execute(&format!("LOAD||OnLoad||{path}")),
            ResultCode::GenericError.as_i32()
        );
        assert!(!loader.is_loaded(Path::new(&path)));
    }

    #[test]
    fn test_stale_callback() {
        let loader = loader();
        let handle = CallbackHandle {
            context: crate::context::ContextId::from_raw(u64::MAX),
            slot: 0,
        };
        assert!(matches!(
            loader.invoke_callback(handle),
            Err(ScriptError::StaleCallback { .. })
        ));
    }
}
