use std::path::Path;

use tempfile::TempDir;
use tokaido_tls::tls::{
    trust::MemoryTrustStore, CertificateAuthority, CertificateAuthorityManager, KeyMaterialStore,
    TrustInstaller,
};
use tokaido_tls::utils::certificates::{inspect_certificate_pem, CertificateInfo};
use tokaido_tls::TlsSettings;

/// Isolated configuration root with an in-memory trust store.
pub struct TestEnvironment {
    _dir: TempDir,
    pub settings: TlsSettings,
    pub store: KeyMaterialStore,
    pub trust: MemoryTrustStore,
}

impl TestEnvironment {
    pub fn new() -> Self {
        Self::with_settings(|_| {})
    }

    /// Start from defaults rooted in a temp dir, then adjust.
    pub fn with_settings(adjust: impl FnOnce(&mut TlsSettings)) -> Self {
        let dir = TempDir::new().expect("create temp dir");
        let mut settings = TlsSettings::with_root(dir.path());
        adjust(&mut settings);
        let store = KeyMaterialStore::from_settings(&settings);
        Self { _dir: dir, settings, store, trust: MemoryTrustStore::new() }
    }

    pub fn root(&self) -> &Path {
        &self.settings.config_root
    }

    pub fn manager(&self) -> CertificateAuthorityManager {
        CertificateAuthorityManager::new(self.store.clone(), &self.settings)
    }

    pub fn installer(&self) -> TrustInstaller {
        TrustInstaller::new(Box::new(self.trust.clone()), self.settings.trust_label.clone())
    }

    /// Write a CA with subject `common_name` to the current CA location, as an
    /// earlier version of the tool would have.
    pub fn seed_ca_with_identity(&self, common_name: &str) -> CertificateAuthority {
        let previous = TlsSettings { ca_common_name: common_name.to_string(), ..self.settings.clone() };
        CertificateAuthorityManager::new(self.store.clone(), &previous)
            .ensure_ca()
            .expect("seed CA")
            .ca
    }
}

impl Default for TestEnvironment {
    fn default() -> Self {
        Self::new()
    }
}

pub fn inspect(pem: &str) -> CertificateInfo {
    inspect_certificate_pem(pem.as_bytes()).expect("parse certificate")
}

pub fn sans(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}
