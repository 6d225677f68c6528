//! Application Configuration
//!
//! Loaded from `hexscript.toml` (when present) with `HEXSCRIPT_` environment
//! overrides on top; nested keys use `__`, e.g.
//! `HEXSCRIPT_LOADER__RELOAD_POLICY=reinitialize`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};

use hexscript_runtime::LoaderConfig;

pub const DEFAULT_CONFIG_FILE: &str = "hexscript.toml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Root containing one subdirectory per script.
    pub scripts_dir: PathBuf,
    pub loader: LoaderConfig,
    pub watch: WatchConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            scripts_dir: PathBuf::from("scripts"),
            loader: LoaderConfig::default(),
            watch: WatchConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Quiet period before a burst of file events triggers a rescan.
    pub debounce_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self { debounce_ms: 200 }
    }
}

impl AppConfig {
    /// Load configuration.
    ///
    /// An explicit `path` must exist. Without one, `hexscript.toml` in the
    /// working directory is used if present.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(AppConfig::default()));

        match path {
            Some(path) => {
                if !path.is_file() {
                    anyhow::bail!("Config file not found: {}", path.display());
                }
                figment = figment.merge(Toml::file(path));
            }
            None => {
                figment = figment.merge(Toml::file(DEFAULT_CONFIG_FILE));
            }
        }

        figment
            .merge(Env::prefixed("HEXSCRIPT_").split("__"))
            .extract()
            .context("Failed to load configuration")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hexscript_runtime::ReloadPolicy;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.scripts_dir, PathBuf::from("scripts"));
        assert_eq!(config.watch.debounce_ms, 200);
        assert_eq!(config.loader, LoaderConfig::default());
    }

    #[test]
    fn test_load_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("hexscript.toml");
        fs::write(
            &path,
            r#"
            scripts_dir = "/opt/scripts"

            [loader]
            reload_policy = "reinitialize"

            [watch]
            debounce_ms = 50
            "#,
        )
        .unwrap();

        let config = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(config.scripts_dir, PathBuf::from("/opt/scripts"));
        assert_eq!(config.loader.reload_policy, ReloadPolicy::Reinitialize);
        assert_eq!(config.loader.support_module, "ImHexLibrary");
        assert_eq!(config.watch.debounce_ms, 50);
    }

    #[test]
    fn test_missing_explicit_file() {
        let dir = TempDir::new().unwrap();
        let err = AppConfig::load(Some(&dir.path().join("absent.toml"))).unwrap_err();
        assert!(err.to_string().contains("Config file not found"));
    }
}
