//! # Error Handling
//!
//! Error types for the Tokaido TLS provisioning engine, built on `thiserror`.
//! [`TlsError`] carries the certificate lifecycle taxonomy; [`Error`] wraps it
//! together with configuration and I/O failures for callers of the crate.

pub mod tls;

pub use tls::{ErrorKind, TlsError};

/// Custom result type for crate-level operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the TLS provisioning engine
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Certificate lifecycle errors
    #[error(transparent)]
    Tls(#[from] TlsError),
}

impl Error {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config(message.into())
    }

    /// The TLS error kind, if this error originated in the certificate lifecycle.
    pub fn tls_kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Tls(err) => Some(err.kind()),
            _ => None,
        }
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(errors: validator::ValidationErrors) -> Self {
        Self::Config(errors.to_string())
    }
}
