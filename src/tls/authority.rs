//! Root CA creation, loading and rotation.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rand::RngCore;
use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, DnType, IsCa, KeyPair,
    KeyUsagePurpose, SerialNumber,
};
use time::{Duration, OffsetDateTime};
use tracing::{debug, info, instrument, warn};
use zeroize::Zeroizing;

use crate::config::TlsSettings;
use crate::errors::TlsError;
use crate::tls::store::KeyMaterialStore;
use crate::utils::certificates::{inspect_certificate_pem, verify_issued_by, CertificateInfo};
use crate::utils::short_fingerprint;

/// The active root CA. The private key has no accessor outside this crate.
pub struct CertificateAuthority {
    cert_pem: String,
    key: KeyPair,
    info: CertificateInfo,
}

impl std::fmt::Debug for CertificateAuthority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificateAuthority")
            .field("common_name", &self.info.subject_common_name)
            .field("fingerprint", &self.info.fingerprint)
            .field("not_after", &self.info.not_after)
            .finish_non_exhaustive()
    }
}

impl CertificateAuthority {
    pub fn certificate_pem(&self) -> &str {
        &self.cert_pem
    }

    /// Lowercase hex SHA-256 of the certificate DER.
    pub fn fingerprint(&self) -> &str {
        &self.info.fingerprint
    }

    pub fn serial_number(&self) -> &str {
        &self.info.serial
    }

    pub fn common_name(&self) -> Option<&str> {
        self.info.subject_common_name.as_deref()
    }

    pub fn not_after(&self) -> DateTime<Utc> {
        self.info.not_after
    }

    pub fn info(&self) -> &CertificateInfo {
        &self.info
    }

    /// Check that `leaf_pem` was signed by this CA.
    pub fn verify(&self, leaf_pem: &[u8]) -> anyhow::Result<()> {
        verify_issued_by(leaf_pem, self.cert_pem.as_bytes())
    }

    /// Issuer handle for rcgen, rebuilt from the stored certificate.
    pub(crate) fn issuer(&self) -> Result<rcgen::Certificate, rcgen::Error> {
        CertificateParams::from_ca_cert_pem(&self.cert_pem)?.self_signed(&self.key)
    }

    pub(crate) fn signing_key(&self) -> &KeyPair {
        &self.key
    }
}

/// Why an existing, parseable CA is being replaced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplacementReason {
    /// Expired, or expiring inside the renewal window.
    Expired { not_after: DateTime<Utc> },
    /// Missing `CA:true`, keyCertSign or cRLSign.
    NotSigningCa,
    /// `notBefore` lies in the future, usually after a clock change.
    NotYetValid { not_before: DateTime<Utc> },
}

impl std::fmt::Display for ReplacementReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Expired { not_after } => write!(f, "expires at {not_after}"),
            Self::NotSigningCa => write!(f, "certificate lacks CA extensions"),
            Self::NotYetValid { not_before } => write!(f, "not valid before {not_before}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaStatus {
    Loaded,
    Created,
    Replaced { previous_fingerprint: String, reason: ReplacementReason },
}

/// Result of [`CertificateAuthorityManager::ensure_ca`].
#[derive(Debug)]
pub struct EnsuredCa {
    pub ca: CertificateAuthority,
    pub status: CaStatus,
}

/// Creates, loads and rotates the root CA held in the [`KeyMaterialStore`].
#[derive(Debug, Clone)]
pub struct CertificateAuthorityManager {
    store: KeyMaterialStore,
    common_name: String,
    organization: String,
    validity_days: i64,
    renewal_window_days: i64,
}

impl CertificateAuthorityManager {
    pub fn new(store: KeyMaterialStore, settings: &TlsSettings) -> Self {
        Self {
            store,
            common_name: settings.ca_common_name.clone(),
            organization: settings.ca_organization.clone(),
            validity_days: settings.ca_validity_days,
            renewal_window_days: settings.renewal_window_days,
        }
    }

    pub fn store(&self) -> &KeyMaterialStore {
        &self.store
    }

    /// Return a usable CA, creating or replacing it when needed.
    ///
    /// Runs under the CA lock; a concurrent caller waits, then sees the CA
    /// this call persisted and loads it instead of generating another.
    #[instrument(skip(self), fields(dir = %self.store.tls_dir().display()))]
    pub fn ensure_ca(&self) -> Result<EnsuredCa, TlsError> {
        let _lock = self
            .store
            .lock()
            .map_err(|e| TlsError::ca_generation("failed to acquire CA lock", e))?;

        let Some(existing) = self.load()? else {
            let ca = self.generate()?;
            info!(fingerprint = %short_fingerprint(ca.fingerprint()), "Created certificate authority");
            return Ok(EnsuredCa { ca, status: CaStatus::Created });
        };

        match self.replacement_reason(&existing, Utc::now()) {
            None => {
                debug!(fingerprint = %short_fingerprint(existing.fingerprint()), "Reusing certificate authority");
                Ok(EnsuredCa { ca: existing, status: CaStatus::Loaded })
            }
            Some(reason) => {
                warn!(
                    fingerprint = %short_fingerprint(existing.fingerprint()),
                    %reason,
                    "Replacing certificate authority"
                );
                let previous_fingerprint = existing.fingerprint().to_string();
                let ca = self.generate()?;
                info!(fingerprint = %short_fingerprint(ca.fingerprint()), "Created replacement certificate authority");
                Ok(EnsuredCa { ca, status: CaStatus::Replaced { previous_fingerprint, reason } })
            }
        }
    }

    /// Load the CA on disk without creating one. Expired CAs are returned as is.
    ///
    /// Present but unusable material is [`TlsError::CaCorrupt`]; it is never deleted here.
    pub fn load(&self) -> Result<Option<CertificateAuthority>, TlsError> {
        let cert_path = self.store.ca_cert_path();
        let key_path = self.store.ca_key_path();

        let files = self
            .store
            .read_ca()
            .map_err(|e| TlsError::ca_corrupt(self.store.tls_dir(), format!("unreadable: {e}")))?;

        let (cert_pem, key_pem) = match (files.cert_pem, files.key_pem) {
            (None, None) => return Ok(None),
            (Some(_), None) => {
                return Err(TlsError::ca_corrupt(&key_path, "private key is missing"));
            }
            (None, Some(_)) => {
                return Err(TlsError::ca_corrupt(&cert_path, "certificate is missing"));
            }
            (Some(cert), Some(key)) => (cert, key),
        };

        let cert_pem = String::from_utf8(cert_pem)
            .map_err(|_| TlsError::ca_corrupt(&cert_path, "certificate is not valid UTF-8"))?;
        let info = inspect_certificate_pem(cert_pem.as_bytes())
            .map_err(|e| TlsError::ca_corrupt(&cert_path, e.to_string()))?;

        let key_text = Zeroizing::new(
            std::str::from_utf8(&key_pem)
                .map_err(|_| TlsError::ca_corrupt(&key_path, "private key is not valid UTF-8"))?
                .to_string(),
        );
        let key = KeyPair::from_pem(&key_text)
            .map_err(|e| TlsError::ca_corrupt(&key_path, e.to_string()))?;

        if key.public_key_raw() != info.public_key.as_slice() {
            return Err(TlsError::ca_corrupt(&key_path, "private key does not match certificate"));
        }

        Ok(Some(CertificateAuthority { cert_pem, key, info }))
    }

    /// Explicitly delete the CA material, e.g. after a [`TlsError::CaCorrupt`].
    pub fn reset(&self) -> Result<bool, TlsError> {
        let _lock = self
            .store
            .lock()
            .map_err(|e| TlsError::ca_generation("failed to acquire CA lock", e))?;
        let removed = self
            .store
            .remove_ca()
            .map_err(|e| TlsError::ca_generation("failed to remove CA material", e))?;
        if removed {
            warn!(dir = %self.store.tls_dir().display(), "Removed certificate authority material");
        }
        Ok(removed)
    }

    pub fn replacement_reason(
        &self,
        ca: &CertificateAuthority,
        now: DateTime<Utc>,
    ) -> Option<ReplacementReason> {
        if !ca.info.is_signing_ca() {
            return Some(ReplacementReason::NotSigningCa);
        }
        if now < ca.info.not_before {
            return Some(ReplacementReason::NotYetValid { not_before: ca.info.not_before });
        }
        if !ca.info.is_valid_at(now) {
            return Some(ReplacementReason::Expired { not_after: ca.info.not_after });
        }
        let renew_at = ca.info.not_after - ChronoDuration::days(self.renewal_window_days);
        if now >= renew_at {
            return Some(ReplacementReason::Expired { not_after: ca.info.not_after });
        }
        None
    }

    fn generate(&self) -> Result<CertificateAuthority, TlsError> {
        let mut params = CertificateParams::new(Vec::<String>::new())
            .map_err(|e| TlsError::ca_generation("failed to build CA parameters", e))?;

        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, self.common_name.as_str());
        dn.push(DnType::OrganizationName, self.organization.as_str());
        params.distinguished_name = dn;

        // Leaves only; no intermediates below this root.
        params.is_ca = IsCa::Ca(BasicConstraints::Constrained(0));
        params.key_usages = vec![
            KeyUsagePurpose::KeyCertSign,
            KeyUsagePurpose::CrlSign,
            KeyUsagePurpose::DigitalSignature,
        ];

        let now = OffsetDateTime::now_utc();
        params.not_before = now - Duration::days(1);
        params.not_after = now + Duration::days(self.validity_days);

        let mut serial = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut serial);
        serial[0] &= 0x7f;
        params.serial_number = Some(SerialNumber::from_slice(&serial));

        // ECDSA P-256
        let key = KeyPair::generate()
            .map_err(|e| TlsError::ca_generation("failed to generate CA key pair", e))?;
        let cert = params
            .self_signed(&key)
            .map_err(|e| TlsError::ca_generation("failed to self-sign CA certificate", e))?;

        let cert_pem = cert.pem();
        let key_pem = Zeroizing::new(key.serialize_pem());
        self.store
            .write_ca(&cert_pem, &key_pem)
            .map_err(|e| TlsError::ca_generation("failed to persist CA material", e))?;

        let info = inspect_certificate_pem(cert_pem.as_bytes())
            .map_err(|e| TlsError::ca_generation("generated CA certificate is unreadable", e))?;

        Ok(CertificateAuthority { cert_pem, key, info })
    }
}
