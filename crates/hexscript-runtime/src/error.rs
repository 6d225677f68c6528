//! Result codes and the script error taxonomy.

use std::fmt;
use std::path::PathBuf;

// ─────────────────────────────────────────────────────────────────────────────
// Result Codes
// ─────────────────────────────────────────────────────────────────────────────

/// Closed set of codes returned across the public entry point.
///
/// Scripts and hosts depend on these values; they must never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ResultCode {
    Success = 0x0000_0000,
    GenericError = 0x1000_0001,
    MethodNotFound = 0x1000_0002,
    LoaderError = 0x1000_0003,
    InvalidCommand = 0x1000_0004,
}

impl ResultCode {
    pub const fn as_i32(self) -> i32 {
        self as i32
    }

    /// Map a raw value back to a known code, if it is one.
    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            0x0000_0000 => Some(Self::Success),
            0x1000_0001 => Some(Self::GenericError),
            0x1000_0002 => Some(Self::MethodNotFound),
            0x1000_0003 => Some(Self::LoaderError),
            0x1000_0004 => Some(Self::InvalidCommand),
            _ => None,
        }
    }
}

impl From<ResultCode> for i32 {
    fn from(code: ResultCode) -> Self {
        code.as_i32()
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Success => "Success",
            Self::GenericError => "GenericError",
            Self::MethodNotFound => "MethodNotFound",
            Self::LoaderError => "LoaderError",
            Self::InvalidCommand => "InvalidCommand",
        };
        write!(f, "{} ({:#010x})", name, self.as_i32())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Script Error
// ─────────────────────────────────────────────────────────────────────────────

/// Errors raised while loading or dispatching a script.
#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    #[error("Malformed command: {0}")]
    Parse(String),

    #[error("Unknown command kind: {0}")]
    InvalidCommandKind(String),

    #[error("Failed to load dependency '{module}': {message}")]
    DependencyLoad { module: String, message: String },

    #[error("Failed to load script '{}': {message}", path.display())]
    PrimaryLoad { path: PathBuf, message: String },

    #[error("Contract validation failed: {0}")]
    ContractValidation(String),

    #[error("Entry point resolution failed: {0}")]
    Resolution(String),

    #[error("Method not found: {0}")]
    MethodNotFound(String),

    #[error("Script threw an exception: {0}")]
    Execution(String),

    #[error("Unsupported return type '{type_name}' from '{method}'")]
    ReturnType { method: String, type_name: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Callback {slot} of context {context} is no longer loaded")]
    StaleCallback { context: u64, slot: u32 },

    #[error("Engine error: {0}")]
    Engine(String),
}

impl ScriptError {
    /// The result code this error resolves to at the public boundary.
    pub fn code(&self) -> ResultCode {
        match self {
            Self::Parse(_) | Self::InvalidCommandKind(_) => ResultCode::InvalidCommand,
            Self::DependencyLoad { .. }
            | Self::PrimaryLoad { .. }
            | Self::ContractValidation(_)
            | Self::Io(_)
            | Self::Engine(_) => ResultCode::LoaderError,
            Self::MethodNotFound(_) => ResultCode::MethodNotFound,
            Self::Resolution(_)
            | Self::Execution(_)
            | Self::ReturnType { .. }
            | Self::StaleCallback { .. } => ResultCode::GenericError,
        }
    }
}

impl From<rquickjs::Error> for ScriptError {
    fn from(err: rquickjs::Error) -> Self {
        Self::Engine(err.to_string())
    }
}

pub type ScriptResult<T> = Result<T, ScriptError>;
