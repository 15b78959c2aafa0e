use std::path::PathBuf;

use crate::errors::TlsError;

use super::{TrustStore, TrustedCertificate};

/// Fallback for platforms without an automated trust store (e.g. Windows).
///
/// Queries report nothing installed; `install` fails with instructions so the
/// caller can surface them as a warning.
#[derive(Debug, Clone)]
pub struct ManualTrustStore {
    ca_cert_path: PathBuf,
}

impl ManualTrustStore {
    pub fn new(ca_cert_path: impl Into<PathBuf>) -> Self {
        Self { ca_cert_path: ca_cert_path.into() }
    }
}

impl TrustStore for ManualTrustStore {
    fn name(&self) -> &'static str {
        "manual"
    }

    fn install(&self, label: &str, _cert_pem: &str) -> Result<(), TlsError> {
        Err(TlsError::trust_install(
            self.name(),
            format!(
                "automatic trust is not supported on this platform; import {} as a trusted root CA named '{label}'",
                self.ca_cert_path.display()
            ),
        ))
    }

    fn uninstall(&self, _fingerprint: &str) -> Result<bool, TlsError> {
        Ok(false)
    }

    fn is_installed(&self, _fingerprint: &str) -> Result<bool, TlsError> {
        Ok(false)
    }

    fn entries(&self, _label: &str) -> Result<Vec<TrustedCertificate>, TlsError> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_install_explains_manual_steps() {
        let store = ManualTrustStore::new("/home/dev/.tok/tls/ca.crt");
        let err = store.install("Tokaido Development CA", "").unwrap_err();
        assert!(err.is_recoverable());
        assert!(err.to_string().contains("/home/dev/.tok/tls/ca.crt"));
        assert!(!store.is_installed("ab").unwrap());
    }
}
