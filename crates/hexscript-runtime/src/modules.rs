//! Module Table and Dependency Loading
//!
//! A script directory is scanned once when its context opens. Module names
//! are file stems, so `import { Library } from "./ImHexLibrary.js"` and
//! `import { Library } from "ImHexLibrary"` resolve to the same module.
//! Sources are read fully into memory before compilation; no file handle
//! outlives the read.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rquickjs::loader::{Loader, Resolver};
use rquickjs::module::Declared;
use rquickjs::{CaughtError, Ctx, Error as JsError, Module, Object};

use crate::config::LoaderConfig;
use crate::error::{ScriptError, ScriptResult};

// ─────────────────────────────────────────────────────────────────────────────
// Module Table
// ─────────────────────────────────────────────────────────────────────────────

/// Name-to-file table of every module a script directory offers.
#[derive(Debug, Clone)]
pub struct ModuleTable {
    dir: PathBuf,
    modules: BTreeMap<String, PathBuf>,
    primary: String,
    /// Auxiliary modules in file-name order.
    dependencies: Vec<String>,
}

impl ModuleTable {
    /// Scan `dir` for `*.<module_extension>` files. The primary module is
    /// always part of the table, whatever its extension. The host main module
    /// is never listed as a dependency.
    pub fn scan(dir: &Path, primary: &Path, config: &LoaderConfig) -> ScriptResult<Self> {
        let primary_name = module_name(primary).ok_or_else(|| ScriptError::PrimaryLoad {
            path: primary.to_path_buf(),
            message: "not a valid module file name".to_string(),
        })?;
        let primary_file = primary.file_name().map(|f| f.to_os_string());

        let mut files: Vec<PathBuf> = fs::read_dir(dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .filter(|path| {
                path.extension()
                    .is_some_and(|ext| ext == config.module_extension.as_str())
            })
            .collect();
        files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

        let mut modules = BTreeMap::new();
        let mut dependencies = Vec::new();
        modules.insert(primary_name.clone(), primary.to_path_buf());

        for path in files {
            let Some(name) = module_name(&path) else {
                tracing::warn!("Skipping module with unusable name: {}", path.display());
                continue;
            };
            let file_name = path.file_name().map(|f| f.to_os_string());
            if file_name == primary_file || name == primary_name {
                continue;
            }

            modules.insert(name.clone(), path.clone());
            if file_name.is_some_and(|f| f == config.main_module.as_str()) {
                continue;
            }
            dependencies.push(name);
        }

        Ok(Self {
            dir: dir.to_path_buf(),
            modules,
            primary: primary_name,
            dependencies,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn primary(&self) -> &str {
        &self.primary
    }

    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    pub fn path(&self, name: &str) -> Option<&Path> {
        self.modules.get(name).map(PathBuf::as_path)
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Map an import specifier to a module name in this table.
    pub fn normalize(&self, specifier: &str) -> Option<String> {
        let specifier = specifier.strip_prefix("./").unwrap_or(specifier);
        if specifier.contains('/') || specifier.contains('\\') {
            return None;
        }
        if self.modules.contains_key(specifier) {
            return Some(specifier.to_string());
        }
        let stem = Path::new(specifier).file_stem()?.to_str()?;
        self.modules.contains_key(stem).then(|| stem.to_string())
    }
}

fn module_name(path: &Path) -> Option<String> {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .filter(|stem| !stem.is_empty())
        .map(str::to_string)
}

// ─────────────────────────────────────────────────────────────────────────────
// Engine Loader Hooks
// ─────────────────────────────────────────────────────────────────────────────

pub struct ScriptResolver {
    table: Arc<ModuleTable>,
}

impl ScriptResolver {
    pub fn new(table: Arc<ModuleTable>) -> Self {
        Self { table }
    }
}

impl Resolver for ScriptResolver {
    fn resolve<'js>(&mut self, _ctx: &Ctx<'js>, base: &str, name: &str) -> rquickjs::Result<String> {
        self.table
            .normalize(name)
            .ok_or_else(|| JsError::new_resolving(base, name))
    }
}

pub struct ScriptModuleLoader {
    table: Arc<ModuleTable>,
}

impl ScriptModuleLoader {
    pub fn new(table: Arc<ModuleTable>) -> Self {
        Self { table }
    }
}

impl Loader for ScriptModuleLoader {
    fn load<'js>(&mut self, ctx: &Ctx<'js>, name: &str) -> rquickjs::Result<Module<'js, Declared>> {
        let path = self
            .table
            .path(name)
            .ok_or_else(|| JsError::new_loading(name))?;

        let source = fs::read(path)
            .map_err(|e| JsError::new_loading_message(name, format!("{}: {}", path.display(), e)))?;

        tracing::trace!("Compiling module '{}' from {}", name, path.display());
        Module::declare(ctx.clone(), name, source)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Loading
// ─────────────────────────────────────────────────────────────────────────────

/// Import a module by name and return its namespace once evaluated.
///
/// Already evaluated modules come back from the engine's module cache, so a
/// module pulled in through another module's import is never run twice.
pub fn import<'js>(ctx: &Ctx<'js>, name: &str) -> Result<Object<'js>, String> {
    Module::import(ctx, name)
        .and_then(|promise| promise.finish::<Object>())
        .map_err(|err| describe(ctx, err))
}

/// Render an engine error, including a pending exception's message and stack.
pub fn describe(ctx: &Ctx<'_>, err: JsError) -> String {
    match err {
        JsError::WouldBlock => "module evaluation did not settle".to_string(),
        err => CaughtError::from_error(ctx, err).to_string().trim_end().to_string(),
    }
}

/// Load every auxiliary module of the table. Failures are logged and skipped.
///
/// Returns the names of the modules that loaded.
pub fn load_dependencies(ctx: &Ctx<'_>, table: &ModuleTable) -> BTreeSet<String> {
    let mut loaded = BTreeSet::new();

    for name in table.dependencies() {
        match import(ctx, name) {
            Ok(_) => {
                tracing::debug!("Loaded dependency '{}'", name);
                loaded.insert(name.clone());
            }
            Err(message) => {
                let err = ScriptError::DependencyLoad {
                    module: name.clone(),
                    message,
                };
                tracing::warn!("{}", err);
            }
        }
    }

    loaded
}

/// Load the primary module. Failure is fatal to the invocation.
pub fn load_primary<'js>(ctx: &Ctx<'js>, table: &ModuleTable) -> ScriptResult<Object<'js>> {
    let name = table.primary();
    import(ctx, name).map_err(|message| ScriptError::PrimaryLoad {
        path: table
            .path(name)
            .map(Path::to_path_buf)
            .unwrap_or_else(|| table.dir().join(name)),
        message,
    })
}
