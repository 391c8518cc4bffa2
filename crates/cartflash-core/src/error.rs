//! Error types for cartflash-core
//!
//! This module provides a no_std compatible error type that can be used
//! throughout the crate. Errors fall into four families:
//!
//! - caller mistakes (`IllegalState`, `OutOfRange`, `InvalidLength`,
//!   `Protected`) which are never retried
//! - transport failures, which always carry the number of units that
//!   completed before the failure
//! - save container format errors
//! - operational outcomes such as a verify mismatch or an erase timeout

use core::fmt;

use crate::flash::ChipMode;

/// What went wrong inside the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// USB transfer or other I/O failure
    Io,
    /// The programmer went away
    Disconnected,
    /// The programmer answered with something we could not decode
    MalformedReply,
    /// A single round-trip took too long
    Timeout,
    /// The programmer refused the request
    Rejected,
}

/// A transport failure together with the progress made before it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportFailure {
    /// Failure classification
    pub kind: TransportErrorKind,
    /// Units (bytes) successfully transferred before the failure
    pub completed: usize,
}

/// Structural problems found in a save container
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatError {
    /// The data ends before a header or payload is complete
    Truncated,
    /// Unrecognised version field
    BadVersion(u16),
    /// `total_length` disagrees with the data
    LengthMismatch {
        /// Length declared in the header
        declared: u32,
        /// Length computed from the data
        actual: u32,
    },
    /// Too many blocks to fit the 16-bit block count
    TooManyBlocks,
}

/// Core error type - no_std compatible, Copy for efficiency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The chip is in a mode that does not allow the operation
    IllegalState {
        /// Mode the chip was in
        mode: ChipMode,
    },
    /// An address or index does not resolve inside the cartridge, chip or
    /// block table
    OutOfRange {
        /// The offending address or index
        value: u32,
        /// The exclusive upper bound it was checked against
        limit: u32,
    },
    /// The transport round-trip failed
    Transport(TransportFailure),
    /// Save container failed a structural check
    Format(FormatError),
    /// The transport does not provide the requested capability
    Unsupported,
    /// Data length violates a precondition (word programming needs an
    /// even number of bytes)
    InvalidLength {
        /// The rejected length
        len: usize,
    },
    /// No known flash chip answered at this chip index
    ChipNotFound {
        /// Chip index that was probed
        chip: u8,
    },
    /// The operation would touch a protected block
    Protected {
        /// Flat cartridge address of the protected block
        address: u32,
    },
    /// Read-back data differs from what was expected
    VerifyMismatch {
        /// Flat cartridge address of the first differing byte
        address: u32,
        /// Expected byte
        expected: u8,
        /// Byte found on the cartridge
        found: u8,
    },
    /// Polling for completion gave up
    Timeout,
}

impl Error {
    /// Create a transport error with no completed units
    pub const fn transport(kind: TransportErrorKind) -> Self {
        Self::Transport(TransportFailure { kind, completed: 0 })
    }

    /// Replace the completed count of a transport error
    ///
    /// Other variants are returned unchanged.
    pub fn with_completed(self, completed: usize) -> Self {
        match self {
            Self::Transport(failure) => Self::Transport(TransportFailure {
                kind: failure.kind,
                completed,
            }),
            other => other,
        }
    }

    /// Units completed before a transport failure
    pub fn completed(&self) -> Option<usize> {
        match self {
            Self::Transport(failure) => Some(failure.completed),
            _ => None,
        }
    }
}

impl From<FormatError> for Error {
    fn from(e: FormatError) -> Self {
        Error::Format(e)
    }
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io => write!(f, "I/O failure"),
            Self::Disconnected => write!(f, "device disconnected"),
            Self::MalformedReply => write!(f, "malformed reply"),
            Self::Timeout => write!(f, "round-trip timed out"),
            Self::Rejected => write!(f, "request rejected"),
        }
    }
}

impl fmt::Display for FormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncated => write!(f, "save file is truncated"),
            Self::BadVersion(v) => write!(f, "unsupported save file version 0x{:04X}", v),
            Self::LengthMismatch { declared, actual } => write!(
                f,
                "save file length mismatch: header says {} bytes, found {}",
                declared, actual
            ),
            Self::TooManyBlocks => write!(f, "too many blocks for a save file"),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IllegalState { mode } => {
                write!(f, "operation not allowed while chip is in {} mode", mode)
            }
            Self::OutOfRange { value, limit } => {
                write!(f, "0x{:08X} out of range (limit 0x{:08X})", value, limit)
            }
            Self::Transport(failure) => write!(
                f,
                "transport error: {} after {} units",
                failure.kind, failure.completed
            ),
            Self::Format(e) => write!(f, "{}", e),
            Self::Unsupported => write!(f, "operation not supported by transport"),
            Self::InvalidLength { len } => write!(f, "invalid data length {}", len),
            Self::ChipNotFound { chip } => write!(f, "no flash chip found at index {}", chip),
            Self::Protected { address } => {
                write!(f, "block at 0x{:08X} is protected", address)
            }
            Self::VerifyMismatch {
                address,
                expected,
                found,
            } => write!(
                f,
                "verify failed at 0x{:08X}: expected 0x{:02X}, found 0x{:02X}",
                address, expected, found
            ),
            Self::Timeout => write!(f, "operation timed out"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

/// Result type alias using the core Error type
pub type Result<T> = core::result::Result<T, Error>;
