//! Wire command parsing.
//!
//! A command arrives as `"<KIND>||<METHOD>||<PATH>"`, for example
//! `"EXEC||Main||/scripts/hello/Main.js"`.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::ScriptError;

/// Field delimiter of the wire format.
pub const DELIMITER: &str = "||";

/// What the caller wants done with the script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    /// Load into a persistent context, optionally invoking a method.
    Load,
    /// Load into a fresh context, invoke a method, unload.
    Exec,
    /// Report whether a method exists without invoking it.
    Check,
}

impl CommandKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Load => "LOAD",
            Self::Exec => "EXEC",
            Self::Check => "CHECK",
        }
    }
}

impl FromStr for CommandKind {
    type Err = ScriptError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LOAD" => Ok(Self::Load),
            "EXEC" => Ok(Self::Exec),
            "CHECK" => Ok(Self::Check),
            other => Err(ScriptError::InvalidCommandKind(other.to_string())),
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed invocation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub kind: CommandKind,
    /// Method to invoke or check; may be empty for a plain LOAD.
    pub method: String,
    /// Primary script module.
    pub path: PathBuf,
}

impl Command {
    pub fn new(kind: CommandKind, method: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            method: method.into(),
            path: path.into(),
        }
    }

    /// Parse a wire string. Performs no I/O.
    pub fn parse(wire: &str) -> Result<Self, ScriptError> {
        let fields: Vec<&str> = wire.split(DELIMITER).collect();
        let [kind, method, path] = fields.as_slice() else {
            return Err(ScriptError::Parse(format!(
                "expected 3 fields separated by '{}', got {}",
                DELIMITER,
                fields.len()
            )));
        };

        let kind: CommandKind = kind.parse()?;

        if path.is_empty() {
            return Err(ScriptError::Parse("empty script path".to_string()));
        }
        let path = PathBuf::from(path);
        match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => {}
            _ => {
                return Err(ScriptError::Parse(format!(
                    "script path '{}' has no parent directory",
                    path.display()
                )));
            }
        }

        Ok(Self::new(kind, *method, path))
    }

    /// Directory holding the primary module and its dependencies.
    pub fn script_dir(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new("."))
    }

    /// Render back to the wire format.
    pub fn to_wire(&self) -> String {
        format!(
            "{}{}{}{}{}",
            self.kind,
            DELIMITER,
            self.method,
            DELIMITER,
            self.path.display()
        )
    }
}

impl FromStr for Command {
    type Err = ScriptError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
