//! Host contract validation.
//!
//! A script is only run when its directory ships the host support module and
//! that module's initializer succeeds.

use std::collections::BTreeSet;

use rquickjs::function::This;
use rquickjs::{Ctx, Object, Value};

use crate::config::LoaderConfig;
use crate::error::{ScriptError, ScriptResult};
use crate::modules::{self, describe};

/// Check that the support module is among `loaded` and run its initializer.
///
/// Returns the support module's namespace.
pub fn validate<'js>(
    ctx: &Ctx<'js>,
    loaded: &BTreeSet<String>,
    config: &LoaderConfig,
) -> ScriptResult<Object<'js>> {
    if !loaded.contains(&config.support_module) {
        return Err(ScriptError::ContractValidation(format!(
            "refusing to load non-host script, module '{}' is not loaded",
            config.support_module
        )));
    }

    let namespace = modules::import(ctx, &config.support_module)
        .map_err(ScriptError::ContractValidation)?;

    let library: Object = namespace
        .get::<_, Value>(config.support_type.as_str())?
        .into_object()
        .ok_or_else(|| {
            ScriptError::ContractValidation(format!(
                "'{}' does not export '{}'",
                config.support_module, config.support_type
            ))
        })?;

    let initializer = library
        .get::<_, Value>(config.initializer.as_str())?
        .into_function()
        .ok_or_else(|| {
            ScriptError::ContractValidation(format!(
                "'{}.{}' has no '{}' method",
                config.support_module, config.support_type, config.initializer
            ))
        })?;

    initializer
        .call::<_, Value>((This(library),))
        .map_err(|err| {
            ScriptError::ContractValidation(format!(
                "'{}.{}' threw: {}",
                config.support_type,
                config.initializer,
                describe(ctx, err)
            ))
        })?;

    tracing::debug!("Initialized '{}'", config.support_module);
    Ok(namespace)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::{ModuleTable, ScriptModuleLoader, ScriptResolver, load_dependencies};
    use rquickjs::{Context, Runtime};
    use std::fs;
    use std::path::Path;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn run(library: Option<&str>) -> ScriptResult<i32> {
        let dir = TempDir::new().unwrap();
        if let Some(source) = library {
            fs::write(dir.path().join("ImHexLibrary.js"), source).unwrap();
        }
        let primary = dir.path().join("script.js");
        fs::write(&primary, "export const x = 1;").unwrap();

        let config = LoaderConfig::default();
        let table = Arc::new(ModuleTable::scan(dir.path(), Path::new(&primary), &config).unwrap());
        let runtime = Runtime::new().unwrap();
        runtime.set_loader(
            ScriptResolver::new(table.clone()),
            ScriptModuleLoader::new(table.clone()),
        );
        let context = Context::full(&runtime).unwrap();

        context.with(|ctx| {
            let loaded = load_dependencies(&ctx, &table);
            validate(&ctx, &loaded, &config)?;
            Ok(ctx.globals().get::<_, Option<i32>>("initialized")?.unwrap_or(0))
        })
    }

    #[test]
    fn test_initializer_runs() {
        let calls = run(Some(
            "export class Library { static Initialize() { globalThis.initialized = (globalThis.initialized ?? 0) + 1; } }",
        ))
        .unwrap();
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_missing_support_module() {
        let err = run(None).unwrap_err();
        assert!(matches!(err, ScriptError::ContractValidation(_)));
    }

    #[test]
    fn test_missing_library_export() {
        let err = run(Some("export const Other = {};")).unwrap_err();
        assert!(matches!(err, ScriptError::ContractValidation(_)));
    }

    #[test]
    fn test_missing_initializer() {
        let err = run(Some("export const Library = { Initialise() {} };")).unwrap_err();
        assert!(matches!(err, ScriptError::ContractValidation(_)));
    }

    #[test]
    fn test_initializer_throws() {
        let err = run(Some(
            "export const Library = { Initialize() { throw new Error('no host'); } };",
        ))
        .unwrap_err();
        match err {
            ScriptError::ContractValidation(message) => assert!(message.contains("no host")),
            other => panic!("unexpected error: {other}"),
        }
    }
}
