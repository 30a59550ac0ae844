//! Error types for bbmod-core
//!
//! Two layers live here. [`BridgeError`] is what a single script-facing call
//! can fail with; it is always delivered to Lua as an error value and never
//! terminates the host. [`Error`] covers the lifecycle around the bridge
//! (configuration, logging, entry-script loading), where a failure is
//! reported to the host instead.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using the library's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Failure of one bridge operation invoked from script code.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Requested length is outside what the bridge supports; no copy was attempted.
    #[error("length {requested} is out of range: {reason}")]
    Bounds { requested: i64, reason: &'static str },

    /// Source memory could not be read.
    #[error("invalid memory at {address:#x} ({length} bytes)")]
    Fault { address: usize, length: usize },

    /// Bytes were read but do not form valid text in the expected encoding.
    #[error("invalid encoding: {0}")]
    Encoding(String),

    /// Filesystem or environment access failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Failure surfaced by the Lua runtime while servicing the call.
    #[error("{0}")]
    Script(#[from] mlua::Error),

    /// Anything else, typically a panic caught at the bridge boundary.
    #[error("caught unknown fault: {0}")]
    Unknown(String),
}

impl BridgeError {
    pub(crate) fn bounds(requested: i64, reason: &'static str) -> Self {
        Self::Bounds { requested, reason }
    }

    pub(crate) fn fault(address: usize, length: usize) -> Self {
        Self::Fault { address, length }
    }

    /// Whether the failure was rejected up front rather than during the copy.
    pub fn is_bounds(&self) -> bool {
        matches!(self, Self::Bounds { .. })
    }

    /// Whether the failure happened while touching host memory or decoding it.
    pub fn is_fault(&self) -> bool {
        matches!(self, Self::Fault { .. } | Self::Encoding(_))
    }
}

/// Main error type for bbmod-core
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration errors
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Logging setup errors
    #[error("Logging error: {0}")]
    Log(#[from] crate::logging::LogError),

    /// Lua runtime errors outside of a script call (state creation, install)
    #[error("Lua error: {0}")]
    Lua(#[from] mlua::Error),

    /// The entry script failed to load or run. Not recoverable.
    #[error("failed to load entry script {}: {message}", path.display())]
    EntryScript { path: PathBuf, message: String },

    /// Applying a staged reconfiguration failed at the safe point
    #[error("Reconfiguration error: {0}")]
    Reconfigure(String),
}

impl Error {
    /// One-line remediation hint suitable for a dialog or CLI output.
    #[must_use]
    pub fn hint(&self) -> &'static str {
        match self {
            Self::Config(_) => "Check bbmod.toml for typos or remove it to use defaults.",
            Self::Log(_) => "Check that the log file directory is writable.",
            Self::Lua(_) => "The Lua runtime could not be created; reinstall the plugin.",
            Self::EntryScript { .. } => {
                "Fix the error in the entry script (see the log) and restart the host."
            }
            Self::Reconfigure(_) => "Check that the requested font file exists in addons/fonts.",
        }
    }
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}
