//! Errors raised while opening a programmer

use thiserror::Error;

/// Failure to open a programmer or detect its cartridge
#[derive(Debug, Error)]
pub enum OpenError {
    /// A programmer option was not of the form `key=value`
    #[error("Invalid parameter format: '{0}' (expected key=value)")]
    MalformedParameter(String),

    /// A programmer option had a value that could not be used
    #[error("Invalid value for '{key}': '{value}'")]
    InvalidParameter { key: String, value: String },

    /// No programmer with this name was compiled in
    #[error("Unknown programmer: {0}")]
    UnknownProgrammer(String),

    /// A file named in the programmer options could not be read
    #[error("Failed to read '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Detection or geometry setup failed
    #[error(transparent)]
    Cartridge(#[from] cartflash_core::Error),
}
