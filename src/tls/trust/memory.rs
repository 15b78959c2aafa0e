use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};

use crate::errors::TlsError;
use crate::utils::certificates::fingerprint_pem;

use super::{TrustStore, TrustedCertificate};

/// In-process trust store for tests.
///
/// Clones share state, so a test can keep a handle after boxing one into a
/// [`TrustInstaller`](super::TrustInstaller). `set_fail_next(true)` makes the
/// next `install` fail as if permission had been denied;
/// `set_fail_uninstall(true)` refuses every `uninstall` until cleared.
#[derive(Debug, Clone, Default)]
pub struct MemoryTrustStore {
    entries: Arc<Mutex<Vec<TrustedCertificate>>>,
    fail_next: Arc<AtomicBool>,
    fail_uninstall: Arc<AtomicBool>,
}

impl MemoryTrustStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Trust `cert_pem` under `label` without going through `install`.
    pub fn preload(&self, label: &str, cert_pem: &str) {
        if let Ok(fingerprint) = fingerprint_pem(cert_pem.as_bytes()) {
            self.lock().push(TrustedCertificate { fingerprint, label: label.to_string() });
        }
    }

    pub fn set_fail_next(&self, fail: bool) {
        self.fail_next.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_uninstall(&self, fail: bool) {
        self.fail_uninstall.store(fail, Ordering::SeqCst);
    }

    pub fn contains(&self, fingerprint: &str) -> bool {
        self.lock().iter().any(|entry| entry.fingerprint == fingerprint)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<TrustedCertificate>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl TrustStore for MemoryTrustStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn install(&self, label: &str, cert_pem: &str) -> Result<(), TlsError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(TlsError::trust_install(self.name(), "permission denied"));
        }
        let fingerprint = fingerprint_pem(cert_pem.as_bytes())
            .map_err(|e| TlsError::trust_install(self.name(), e.to_string()))?;

        let mut entries = self.lock();
        if !entries.iter().any(|entry| entry.fingerprint == fingerprint) {
            entries.push(TrustedCertificate { fingerprint, label: label.to_string() });
        }
        Ok(())
    }

    fn uninstall(&self, fingerprint: &str) -> Result<bool, TlsError> {
        if self.fail_uninstall.load(Ordering::SeqCst) {
            return Err(TlsError::trust_install(self.name(), "permission denied"));
        }
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|entry| entry.fingerprint != fingerprint);
        Ok(entries.len() != before)
    }

    fn is_installed(&self, fingerprint: &str) -> Result<bool, TlsError> {
        Ok(self.contains(fingerprint))
    }

    fn entries(&self, label: &str) -> Result<Vec<TrustedCertificate>, TlsError> {
        Ok(self.lock().iter().filter(|entry| entry.label == label).cloned().collect())
    }
}
