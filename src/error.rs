//! Error types for the mmdb-reader library
use serde::de::{Expected, Unexpected};
use std::fmt;
use thiserror::Error;

/// Result type alias for reader operations
pub type Result<T> = std::result::Result<T, MmdbError>;

/// Main error type for reader operations
///
/// Errors are `Clone` so that a failed lookup can report the same error
/// from both [`LookupResult::err`](crate::LookupResult::err) and
/// [`LookupResult::decode`](crate::LookupResult::decode).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MmdbError {
    /// The file is not a well-formed MaxMind DB: missing marker, bad
    /// metadata, corrupt search tree or bad data section contents
    #[error("{0}")]
    InvalidDatabase(String),

    /// An IPv6 address or network was used with an IPv4-only database
    #[error("{0}")]
    IpVersionMismatch(String),

    /// The reader was closed before the call
    #[error("{0}")]
    Closed(&'static str),

    /// A decoded value could not be bound into the requested type
    #[error("{message}{}", fmt_offset(.offset))]
    Decoding {
        /// What went wrong
        message: String,
        /// Data-section offset of the value being bound, when known
        offset: Option<usize>,
    },

    /// A GeoIP2 record accessor was called on an incompatible database
    #[error("{0}")]
    UnsupportedMethod(String),

    /// A network prefix could not be parsed or was out of range
    #[error("{0}")]
    InvalidPrefix(String),

    /// I/O errors while opening or mapping the file
    #[error("{0}")]
    Io(String),
}

fn fmt_offset(offset: &Option<usize>) -> String {
    match offset {
        Some(offset) => format!(" at offset {}", offset),
        None => String::new(),
    }
}

impl MmdbError {
    pub(crate) fn invalid_database(msg: impl Into<String>) -> Self {
        MmdbError::InvalidDatabase(msg.into())
    }

    /// Errors found while reading values out of the data section.
    pub(crate) fn bad_data(msg: impl fmt::Display) -> Self {
        MmdbError::InvalidDatabase(format!(
            "the MaxMind DB file's data section contains bad data ({})",
            msg
        ))
    }

    pub(crate) fn decoding(msg: impl Into<String>, offset: usize) -> Self {
        MmdbError::Decoding {
            message: msg.into(),
            offset: Some(offset),
        }
    }

    /// Attaches `offset` to a binding error that does not carry one yet.
    pub(crate) fn at_offset(self, offset: usize) -> Self {
        match self {
            MmdbError::Decoding {
                message,
                offset: None,
            } => MmdbError::Decoding {
                message,
                offset: Some(offset),
            },
            other => other,
        }
    }
}

impl serde::de::Error for MmdbError {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        MmdbError::Decoding {
            message: msg.to_string(),
            offset: None,
        }
    }

    fn invalid_type(unexp: Unexpected<'_>, exp: &dyn Expected) -> Self {
        MmdbError::Decoding {
            message: format!("cannot unmarshal {} into {}", unexp, exp),
            offset: None,
        }
    }

    fn invalid_value(unexp: Unexpected<'_>, exp: &dyn Expected) -> Self {
        MmdbError::Decoding {
            message: format!("cannot unmarshal {} into {}", unexp, exp),
            offset: None,
        }
    }
}

impl From<std::io::Error> for MmdbError {
    fn from(err: std::io::Error) -> Self {
        MmdbError::Io(err.to_string())
    }
}
