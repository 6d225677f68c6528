//! Host Capability Surface
//!
//! The embedding application implements [`Host`] to expose memory access,
//! bookmarks, logging, UI and data providers to scripts. Only the
//! callback-registering methods are required; everything else defaults to a
//! no-op so a host implements just what it supports.

use std::fmt;

use crate::context::ContextId;

/// Log level of a script-originated message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
            Self::Fatal => "fatal",
        }
    }
}

/// Severity of a toast notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ToastSeverity {
    #[default]
    Info,
    Warning,
    Error,
}

impl ToastSeverity {
    /// Parse the severity name a script passes, falling back to `Info`.
    pub fn from_name(name: &str) -> Self {
        match name {
            "warning" | "warn" => Self::Warning,
            "error" => Self::Error,
            _ => Self::Info,
        }
    }
}

/// Address of a script callback retained in a persistent context.
///
/// Handles stay valid while the owning context is loaded; afterwards the
/// loader reports them as stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackHandle {
    pub context: ContextId,
    pub slot: u32,
}

impl fmt::Display for CallbackHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.context, self.slot)
    }
}

/// A custom data provider registered by a script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderRegistration {
    pub type_name: String,
    pub name: String,
    /// `(offset, size) -> bytes`
    pub read: CallbackHandle,
    /// `(offset, bytes)`
    pub write: CallbackHandle,
    /// `() -> size`
    pub size: CallbackHandle,
}

pub trait Host: Send + Sync {
    // Memory

    fn read(&self, _address: u64, _size: u64) -> Vec<u8> {
        Vec::new()
    }

    fn write(&self, _address: u64, _bytes: &[u8]) {}

    /// Current selection as `(start, end)`.
    fn selection(&self) -> Option<(u64, u64)> {
        None
    }

    // Bookmarks

    fn create_bookmark(
        &self,
        _address: u64,
        _size: u64,
        _color_argb: u32,
        _name: &str,
        _description: &str,
    ) {
    }

    // Logging

    fn log(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Debug => tracing::debug!(target: "hexscript.script", "{}", message),
            LogLevel::Info => tracing::info!(target: "hexscript.script", "{}", message),
            LogLevel::Warn => tracing::warn!(target: "hexscript.script", "{}", message),
            LogLevel::Error | LogLevel::Fatal => {
                tracing::error!(target: "hexscript.script", level = level.as_str(), "{}", message)
            }
        }
    }

    fn print(&self, text: &str) {
        tracing::info!(target: "hexscript.script", "{}", text);
    }

    fn println(&self, text: &str) {
        tracing::info!(target: "hexscript.script", "{}", text);
    }

    // UI

    fn show_message_box(&self, _message: &str) {}

    fn show_yes_no_question(&self, _message: &str) -> bool {
        false
    }

    fn show_input_text_box(&self, _title: &str, _message: &str) -> Option<String> {
        None
    }

    fn show_toast(&self, _message: &str, _severity: ToastSeverity) {}

    fn register_view(&self, icon: &str, name: &str, draw: CallbackHandle);

    fn add_menu_item(&self, icon: &str, menu: &str, item: &str, callback: CallbackHandle);

    // Providers

    fn register_provider(&self, provider: ProviderRegistration);
}

/// Host that accepts every call and retains nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullHost;

impl Host for NullHost {
    fn register_view(&self, _icon: &str, name: &str, draw: CallbackHandle) {
        tracing::debug!("Ignoring view '{}' ({})", name, draw);
    }

    fn add_menu_item(&self, _icon: &str, menu: &str, item: &str, callback: CallbackHandle) {
        tracing::debug!("Ignoring menu item '{}/{}' ({})", menu, item, callback);
    }

    fn register_provider(&self, provider: ProviderRegistration) {
        tracing::debug!("Ignoring provider '{}' ({})", provider.name, provider.type_name);
    }
}
