use std::path::PathBuf;

use thiserror::Error;

/// Classification of [`TlsError`] used for propagation decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    CaGeneration,
    CaCorrupt,
    Signing,
    TrustInstall,
    Cleanup,
}

impl ErrorKind {
    /// Returns the string representation of the error kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::CaGeneration => "ca_generation",
            Self::CaCorrupt => "ca_corrupt",
            Self::Signing => "signing",
            Self::TrustInstall => "trust_install",
            Self::Cleanup => "cleanup",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Errors surfaced by the certificate authority, signer, trust installer and
/// legacy cleanup.
#[derive(Debug, Error)]
pub enum TlsError {
    /// A common name or subject alternative name was malformed.
    #[error("Invalid {field} '{value}': {reason}")]
    Validation { field: &'static str, value: String, reason: String },

    /// Key generation, certificate construction or persistence of a new CA failed.
    #[error("Failed to generate certificate authority: {message}")]
    CaGeneration {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// CA material exists on disk but cannot be used.
    #[error("Certificate authority material at {path} is corrupt: {reason}")]
    CaCorrupt { path: PathBuf, reason: String },

    /// A leaf certificate could not be issued.
    #[error("Failed to sign certificate for '{common_name}': {message}")]
    Signing {
        common_name: String,
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// The OS trust store could not be updated or queried.
    #[error("Trust store '{store}' operation failed: {message}")]
    TrustInstall { store: String, message: String },

    /// A legacy artifact could not be retired.
    #[error("Legacy cleanup of {target} failed: {message}")]
    Cleanup { target: String, message: String },
}

impl TlsError {
    pub fn validation(
        field: &'static str,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Validation { field, value: value.into(), reason: reason.into() }
    }

    pub fn ca_generation(message: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        Self::CaGeneration { message: message.into(), source: Some(source.into()) }
    }

    pub fn ca_corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::CaCorrupt { path: path.into(), reason: reason.into() }
    }

    pub fn signing(common_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Signing { common_name: common_name.into(), message: message.into(), source: None }
    }

    pub fn signing_with_source(
        common_name: impl Into<String>,
        message: impl Into<String>,
        source: impl Into<anyhow::Error>,
    ) -> Self {
        Self::Signing {
            common_name: common_name.into(),
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub fn trust_install(store: impl Into<String>, message: impl Into<String>) -> Self {
        Self::TrustInstall { store: store.into(), message: message.into() }
    }

    pub fn cleanup(target: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Cleanup { target: target.into(), message: message.into() }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation { .. } => ErrorKind::Validation,
            Self::CaGeneration { .. } => ErrorKind::CaGeneration,
            Self::CaCorrupt { .. } => ErrorKind::CaCorrupt,
            Self::Signing { .. } => ErrorKind::Signing,
            Self::TrustInstall { .. } => ErrorKind::TrustInstall,
            Self::Cleanup { .. } => ErrorKind::Cleanup,
        }
    }

    /// Recoverable errors are reported as warnings; the workflow carries on.
    pub fn is_recoverable(&self) -> bool {
        matches!(self.kind(), ErrorKind::TrustInstall | ErrorKind::Cleanup)
    }
}
