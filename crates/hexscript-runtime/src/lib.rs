//! hexscript runtime
//!
//! Loads user scripts (JavaScript ES modules) into isolated QuickJS contexts,
//! validates them against the host support library, resolves their entry
//! point and dispatches `LOAD`, `EXEC` and `CHECK` commands against it.
//!
//! ```text
//! "EXEC||Main||/scripts/hello/Main.js"
//!   → Command::parse
//!   → IsolationContext::open          (fresh runtime per invocation)
//!   → modules::load_dependencies      (failures logged and skipped)
//!   → modules::load_primary
//!   → contract::validate              (ImHexLibrary.Library.Initialize)
//!   → entry::resolve                  (unique IScript export)
//!   → invoke::invoke                  (return value → i32)
//!   → IsolationContext::close         (unless LOAD)
//! ```

pub mod bindings;
pub mod command;
pub mod config;
pub mod context;
pub mod contract;
pub mod entry;
pub mod error;
pub mod ffi;
pub mod host;
pub mod invoke;
pub mod loader;
pub mod modules;
pub mod registry;

pub use command::{Command, CommandKind};
pub use config::{EntryPointPolicy, LoaderConfig, ReloadPolicy};
pub use context::{ContextId, ContextKind, IsolationContext};
pub use error::{ResultCode, ScriptError, ScriptResult};
pub use ffi::{
    HostVTable, execute_global, hexscript_execute, hexscript_init, hexscript_invoke_callback,
    hexscript_provider_read, hexscript_provider_size, hexscript_provider_write, hexscript_shutdown,
    install_global_loader, uninstall_global_loader,
};
pub use host::{CallbackHandle, Host, LogLevel, NullHost, ProviderRegistration, ToastSeverity};
pub use invoke::{METHOD_ABSENT, METHOD_PRESENT};
pub use loader::ScriptLoader;
pub use registry::PersistentLoadRegistry;
