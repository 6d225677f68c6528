//! hexscript
//!
//! Host-side tooling around the script runtime: discovery of script
//! directories, live reload, a console host and the configuration file.

pub mod catalog;
pub mod config;
pub mod console;
pub mod outcome;
pub mod watcher;

pub use catalog::{Script, ScriptCatalog};
pub use config::{AppConfig, WatchConfig};
pub use console::{ConsoleHost, parse_selection};
pub use watcher::{ScriptChange, ScriptWatcher};
