//! Loader Configuration
//!
//! Every field has a default, so an empty table deserializes to the
//! conventional script layout (`ImHexLibrary.Library.Initialize`, `IScript`
//! marker, `Main.js` host module).

use serde::{Deserialize, Serialize};

/// How the entry unit of a primary module is found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryPointPolicy {
    /// The export literally named [`LoaderConfig::entry_name`].
    Name,
    /// The unique export carrying a truthy [`LoaderConfig::marker`] property.
    #[default]
    Marker,
}

/// What a LOAD of an already loaded path does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReloadPolicy {
    /// Registry hit, no work.
    #[default]
    Idempotent,
    /// Drop the previous persistent context and load again.
    Reinitialize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    pub entry_point: EntryPointPolicy,
    pub entry_name: String,
    pub marker: String,
    pub support_module: String,
    pub support_type: String,
    pub initializer: String,
    /// Host main module, never loaded into a script context.
    pub main_module: String,
    /// Extension of auxiliary modules, without the dot.
    pub module_extension: String,
    pub reload_policy: ReloadPolicy,
    /// Heap limit per context in bytes.
    pub memory_limit: Option<usize>,
    /// Stack limit per context in bytes.
    pub max_stack_size: Option<usize>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            entry_point: EntryPointPolicy::default(),
            entry_name: "Script".to_string(),
            marker: "IScript".to_string(),
            support_module: "ImHexLibrary".to_string(),
            support_type: "Library".to_string(),
            initializer: "Initialize".to_string(),
            main_module: "Main.js".to_string(),
            module_extension: "js".to_string(),
            reload_policy: ReloadPolicy::default(),
            memory_limit: None,
            max_stack_size: None,
        }
    }
}

impl LoaderConfig {
    pub fn with_entry_point(mut self, policy: EntryPointPolicy) -> Self {
        self.entry_point = policy;
        self
    }

    pub fn with_reload_policy(mut self, policy: ReloadPolicy) -> Self {
        self.reload_policy = policy;
        self
    }
}
