//! Unified error type.

use std::fmt;

/// The error type returned by neve-web's fallible operations.
///
/// Application-level failures (404, 500, panics inside handlers) are expressed
/// as HTTP responses, not as `Error`s. This type surfaces infrastructure
/// failures: binding to a port, accepting a connection, or a configuration
/// value that cannot be used.
#[derive(Debug)]
pub enum Error {
    Io(std::io::Error),
    Config { key: String, message: String },
}

impl Error {
    pub(crate) fn config(key: &str, message: impl Into<String>) -> Self {
        Self::Config { key: key.to_owned(), message: message.into() }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "io: {e}"),
            Self::Config { key, message } => write!(f, "config `{key}`: {message}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Config { .. } => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}
