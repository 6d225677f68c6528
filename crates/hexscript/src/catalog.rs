//! Script Catalog
//!
//! Discovers scripts in the scripts root and classifies them:
//!
//! ```text
//! scripts/
//! ├── hello/
//! │   ├── Main.js          <- exports an IScript with Main()    → foreground
//! │   └── ImHexLibrary.js
//! └── provider/
//!     ├── Main.js          <- exports an IScript with OnLoad()  → background
//!     ├── ImHexLibrary.js
//!     └── helpers.js
//! ```
//!
//! Foreground scripts run on demand. Background scripts are loaded
//! persistently as soon as they are discovered.

use std::fs;
use std::path::{Path, PathBuf};

use hexscript_runtime::{Command, CommandKind, METHOD_PRESENT, ScriptLoader};

/// Method run on demand for foreground scripts.
pub const MAIN_METHOD: &str = "Main";
/// Method run once at load time for background scripts.
pub const ON_LOAD_METHOD: &str = "OnLoad";

/// A discovered script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Script {
    /// Directory name.
    pub name: String,
    /// Path to the script's main module.
    pub path: PathBuf,
    /// Loaded persistently through `OnLoad`.
    pub background: bool,
}

#[derive(Debug, Default)]
pub struct ScriptCatalog {
    scripts: Vec<Script>,
}

impl ScriptCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scripts(&self) -> &[Script] {
        &self.scripts
    }

    pub fn get(&self, name: &str) -> Option<&Script> {
        self.scripts.iter().find(|s| s.name == name)
    }

    pub fn foreground(&self) -> impl Iterator<Item = &Script> {
        self.scripts.iter().filter(|s| !s.background)
    }

    pub fn background(&self) -> impl Iterator<Item = &Script> {
        self.scripts.iter().filter(|s| s.background)
    }

    /// Forget foreground scripts. Background scripts stay, their contexts
    /// are still loaded.
    pub fn clear(&mut self) {
        self.scripts.retain(|s| s.background);
    }

    /// Discover scripts under `root`, returning how many were added.
    ///
    /// Foreground scripts are forgotten first, so removed scripts disappear;
    /// scripts already known are skipped.
    pub fn load_all(&mut self, loader: &mut ScriptLoader, root: &Path) -> std::io::Result<usize> {
        self.clear();

        if !root.exists() {
            tracing::debug!("Scripts directory does not exist: {}", root.display());
            return Ok(0);
        }

        let main_module = loader.config().main_module.clone();
        let mut entries: Vec<PathBuf> = fs::read_dir(root)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_dir())
            .collect();
        entries.sort();

        let mut added = 0;
        for dir in entries {
            let path = dir.join(&main_module);
            if !path.is_file() {
                continue;
            }
            if self.scripts.iter().any(|s| s.path == path) {
                continue;
            }

            let name = dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();

            let has_main = method_exists(loader, MAIN_METHOD, &path);
            let has_on_load = method_exists(loader, ON_LOAD_METHOD, &path);

            match (has_main, has_on_load) {
                (true, true) => {
                    tracing::error!(
                        "Script '{}' has both a {}() and an {}() function, only one is allowed",
                        name,
                        MAIN_METHOD,
                        ON_LOAD_METHOD
                    );
                }
                (false, false) => {
                    tracing::error!(
                        "Script '{}' has neither a {}() nor an {}() function",
                        name,
                        MAIN_METHOD,
                        ON_LOAD_METHOD
                    );
                }
                (true, false) => {
                    tracing::debug!("Discovered script '{}'", name);
                    self.scripts.push(Script {
                        name,
                        path,
                        background: false,
                    });
                    added += 1;
                }
                (false, true) => {
                    let result =
                        loader.run(&Command::new(CommandKind::Load, ON_LOAD_METHOD, path.clone()));
                    if result != 0 {
                        tracing::error!("Script '{}' loading failed with code {:#x}", name, result);
                    } else {
                        tracing::info!("Loaded background script '{}'", name);
                    }
                    self.scripts.push(Script {
                        name,
                        path,
                        background: true,
                    });
                    added += 1;
                }
            }
        }

        Ok(added)
    }

    /// Run a foreground script's `Main`.
    pub fn run(&self, loader: &mut ScriptLoader, name: &str) -> Option<i32> {
        let script = self.foreground().find(|s| s.name == name)?;
        let result = loader.run(&Command::new(CommandKind::Exec, MAIN_METHOD, script.path.clone()));
        if result != 0 {
            tracing::error!("Script '{}' running failed with code {:#x}", name, result);
        }
        Some(result)
    }

    /// LOAD the background script living in `dir` again. Only does work
    /// under the `reinitialize` reload policy.
    pub fn reload(&self, loader: &mut ScriptLoader, dir: &Path) -> Option<i32> {
        let script = self.background().find(|s| s.path.parent() == Some(dir))?;
        let result = loader.run(&Command::new(CommandKind::Load, ON_LOAD_METHOD, script.path.clone()));
        if result != 0 {
            tracing::error!("Script '{}' reloading failed with code {:#x}", script.name, result);
        }
        Some(result)
    }
}

fn method_exists(loader: &mut ScriptLoader, method: &str, path: &Path) -> bool {
    loader.run(&Command::new(CommandKind::Check, method, path.to_path_buf())) == METHOD_PRESENT
}

#[cfg(test)]
mod tests {
    use super::*;
    use hexscript_runtime::{LoaderConfig, NullHost, ReloadPolicy};
    use std::sync::Arc;
    use tempfile::TempDir;

    const LIBRARY: &str = r#"
        export class IScript { static IScript = true; }
        export class Library { static Initialize() {} }
    "#;

    fn add_script(root: &Path, name: &str, body: &str) -> PathBuf {
        let dir = root.join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("ImHexLibrary.js"), LIBRARY).unwrap();
        let main = dir.join("Main.js");
        fs::write(
            &main,
            format!("import {{ IScript }} from 'ImHexLibrary'; export class S extends IScript {{ {body} }}"),
        )
        .unwrap();
        main
    }

    fn loader() -> ScriptLoader {
        ScriptLoader::new(LoaderConfig::default(), Arc::new(NullHost))
    }

    #[test]
    fn test_classification() {
        let root = TempDir::new().unwrap();
        add_script(root.path(), "hello", "static Main() { return 0; }");
        let background = add_script(root.path(), "provider", "static OnLoad() {}");
        add_script(root.path(), "both", "static Main() {} static OnLoad() {}");
        add_script(root.path(), "neither", "static Other() {}");
        fs::create_dir_all(root.path().join("empty")).unwrap();

        let mut loader = loader();
        let mut catalog = ScriptCatalog::new();
        let added = catalog.load_all(&mut loader, root.path()).unwrap();

        assert_eq!(added, 2);
        assert_eq!(catalog.foreground().map(|s| s.name.as_str()).collect::<Vec<_>>(), ["hello"]);
        assert_eq!(catalog.background().map(|s| s.name.as_str()).collect::<Vec<_>>(), ["provider"]);
        assert!(loader.is_loaded(&background));
    }

    #[test]
    fn test_reload_keeps_background_scripts() {
        let root = TempDir::new().unwrap();
        add_script(root.path(), "hello", "static Main() {}");
        add_script(root.path(), "provider", "static OnLoad() {}");

        let mut loader = loader();
        let mut catalog = ScriptCatalog::new();
        catalog.load_all(&mut loader, root.path()).unwrap();

        fs::remove_dir_all(root.path().join("hello")).unwrap();
        let added = catalog.load_all(&mut loader, root.path()).unwrap();

        assert_eq!(added, 0);
        assert!(catalog.get("hello").is_none());
        assert!(catalog.get("provider").is_some_and(|s| s.background));
    }

    #[test]
    fn test_run() {
        let root = TempDir::new().unwrap();
        add_script(root.path(), "hello", "static Main() { return 3; }");
        add_script(root.path(), "provider", "static OnLoad() {}");

        let mut loader = loader();
        let mut catalog = ScriptCatalog::new();
        catalog.load_all(&mut loader, root.path()).unwrap();

        assert_eq!(catalog.run(&mut loader, "hello"), Some(3));
        assert_eq!(catalog.run(&mut loader, "provider"), None);
        assert_eq!(catalog.run(&mut loader, "missing"), None);
    }

    #[test]
    fn test_reload_background() {
        let root = TempDir::new().unwrap();
        add_script(root.path(), "hello", "static Main() {}");
        add_script(
            root.path(),
            "provider",
            "static OnLoad() { globalThis.loads = (globalThis.loads ?? 0) + 1; return globalThis.loads === 1 ? 0 : 9; }",
        );

        let config = LoaderConfig::default().with_reload_policy(ReloadPolicy::Reinitialize);
        let mut loader = ScriptLoader::new(config, Arc::new(NullHost));
        let mut catalog = ScriptCatalog::new();
        catalog.load_all(&mut loader, root.path()).unwrap();

        // Fresh context on reload, so the counter starts over.
        assert_eq!(catalog.reload(&mut loader, &root.path().join("provider")), Some(0));
        assert_eq!(catalog.reload(&mut loader, &root.path().join("hello")), None);
    }

    #[test]
    fn test_missing_root() {
        let mut loader = loader();
        let mut catalog = ScriptCatalog::new();
        let added = catalog
            .load_all(&mut loader, Path::new("/no/such/scripts/root"))
            .unwrap();
        assert_eq!(added, 0);
    }
}
