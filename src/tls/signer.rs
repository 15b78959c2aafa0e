//! Leaf certificate issuance against the active CA.

use std::collections::BTreeSet;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rcgen::{
    CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose, IsCa, KeyPair,
    KeyUsagePurpose, SanType, SerialNumber,
};
use time::OffsetDateTime;
use tracing::{debug, info, instrument};
use zeroize::Zeroizing;

use crate::config::TlsSettings;
use crate::errors::TlsError;
use crate::tls::authority::CertificateAuthority;
use crate::tls::store::{IdentityPaths, IdentityRecord, KeyMaterialStore, StoredIdentity};
use crate::tls::validation::{validate_common_name, validate_subject_names, SubjectName};
use crate::utils::certificates::{inspect_certificate_pem, CertificateInfo};

/// A signed leaf certificate and its key, as persisted.
#[derive(Clone)]
pub struct SignedIdentity {
    pub common_name: String,
    pub sans: Vec<String>,
    pub cert_pem: String,
    pub key_pem: Zeroizing<String>,
    pub serial: String,
    pub ca_fingerprint: String,
    pub not_after: DateTime<Utc>,
    pub paths: IdentityPaths,
    /// True when an existing current pair was returned instead of a new one.
    pub reused: bool,
}

impl std::fmt::Debug for SignedIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignedIdentity")
            .field("common_name", &self.common_name)
            .field("sans", &self.sans)
            .field("serial", &self.serial)
            .field("ca_fingerprint", &self.ca_fingerprint)
            .field("not_after", &self.not_after)
            .field("reused", &self.reused)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StaleReason {
    MissingRecord,
    CaChanged { issued_by: String },
    SignatureInvalid,
    Unreadable(String),
    CommonNameChanged,
    SansChanged,
    Expiring { not_after: DateTime<Utc> },
}

impl std::fmt::Display for StaleReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingRecord => write!(f, "identity record is missing"),
            Self::CaChanged { issued_by } => write!(f, "issued by a previous CA ({issued_by})"),
            Self::SignatureInvalid => write!(f, "signature does not verify against the active CA"),
            Self::Unreadable(reason) => write!(f, "certificate is unreadable: {reason}"),
            Self::CommonNameChanged => write!(f, "certificate common name differs"),
            Self::SansChanged => write!(f, "subject alternative names changed"),
            Self::Expiring { not_after } => write!(f, "expires at {not_after}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityStatus {
    Missing,
    Current,
    Stale(StaleReason),
}

enum Existing {
    Missing,
    Current { stored: StoredIdentity, record: IdentityRecord, info: CertificateInfo },
    Stale(StaleReason),
}

/// Signs leaf certificates for one project with the active CA.
pub struct CertificateSigner<'a> {
    store: KeyMaterialStore,
    ca: &'a CertificateAuthority,
    project: String,
    leaf_validity_days: i64,
    renewal_window_days: i64,
}

impl<'a> CertificateSigner<'a> {
    pub fn new(store: KeyMaterialStore, ca: &'a CertificateAuthority, settings: &TlsSettings) -> Self {
        Self {
            store,
            ca,
            project: settings.project.clone(),
            leaf_validity_days: settings.leaf_validity_days,
            renewal_window_days: settings.renewal_window_days,
        }
    }

    /// Sign `cn` for `sans`, reusing a current pair with the same SAN set.
    pub fn sign(&self, cn: &str, sans: &[String]) -> Result<SignedIdentity, TlsError> {
        self.sign_with(cn, sans, false)
    }

    /// Like [`sign`](Self::sign); `force` re-issues even when the existing pair is current.
    #[instrument(skip(self, sans), fields(project = %self.project, san_count = sans.len()))]
    pub fn sign_with(&self, cn: &str, sans: &[String], force: bool) -> Result<SignedIdentity, TlsError> {
        validate_common_name(cn)?;
        let names = validate_subject_names(sans)?;
        let paths = self.identity_paths(cn)?;

        if !force {
            match self.existing(&paths, cn, Some(names.as_slice()))? {
                Existing::Current { stored, record, info } => {
                    debug!(cn, serial = %info.serial, "Reusing current identity");
                    return self.reuse(cn, paths, stored, record, info);
                }
                Existing::Stale(reason) => info!(cn, %reason, "Re-issuing stale identity"),
                Existing::Missing => {}
            }
        }

        self.issue(cn, sans, &names, paths)
    }

    /// Current state of the identity stored for `cn`, judged against the active CA.
    pub fn status(&self, cn: &str) -> Result<IdentityStatus, TlsError> {
        validate_common_name(cn)?;
        let paths = self.identity_paths(cn)?;
        Ok(match self.existing(&paths, cn, None)? {
            Existing::Missing => IdentityStatus::Missing,
            Existing::Current { .. } => IdentityStatus::Current,
            Existing::Stale(reason) => IdentityStatus::Stale(reason),
        })
    }

    fn identity_paths(&self, cn: &str) -> Result<IdentityPaths, TlsError> {
        self.store
            .identity_paths(&self.project, cn)
            .map_err(|e| TlsError::signing_with_source(cn, "invalid identity location", e))
    }

    fn existing(
        &self,
        paths: &IdentityPaths,
        cn: &str,
        requested: Option<&[SubjectName]>,
    ) -> Result<Existing, TlsError> {
        let stored = self.store.read_identity(paths).map_err(|e| {
            TlsError::signing_with_source(cn, "failed to read existing identity", e)
        })?;
        let Some(stored) = stored else {
            return Ok(Existing::Missing);
        };
        let Some(record) = stored.record.clone() else {
            return Ok(Existing::Stale(StaleReason::MissingRecord));
        };

        if record.ca_fingerprint != self.ca.fingerprint() {
            return Ok(Existing::Stale(StaleReason::CaChanged {
                issued_by: record.ca_fingerprint,
            }));
        }
        if self.ca.verify(&stored.cert_pem).is_err() {
            return Ok(Existing::Stale(StaleReason::SignatureInvalid));
        }
        let info = match inspect_certificate_pem(&stored.cert_pem) {
            Ok(info) => info,
            Err(e) => return Ok(Existing::Stale(StaleReason::Unreadable(e.to_string()))),
        };
        if info.subject_common_name.as_deref() != Some(cn) {
            return Ok(Existing::Stale(StaleReason::CommonNameChanged));
        }
        if Utc::now() >= info.not_after - ChronoDuration::days(self.renewal_window_days) {
            return Ok(Existing::Stale(StaleReason::Expiring { not_after: info.not_after }));
        }
        if let Some(requested) = requested {
            if san_set(requested) != issued_san_set(&info) {
                return Ok(Existing::Stale(StaleReason::SansChanged));
            }
        }

        Ok(Existing::Current { stored, record, info })
    }

    fn reuse(
        &self,
        cn: &str,
        paths: IdentityPaths,
        stored: StoredIdentity,
        record: IdentityRecord,
        info: CertificateInfo,
    ) -> Result<SignedIdentity, TlsError> {
        let cert_pem = String::from_utf8(stored.cert_pem)
            .map_err(|_| TlsError::signing(cn, "stored certificate is not valid UTF-8"))?;
        let key_pem = std::str::from_utf8(&stored.key_pem)
            .map_err(|_| TlsError::signing(cn, "stored key is not valid UTF-8"))?
            .to_string();

        Ok(SignedIdentity {
            common_name: cn.to_string(),
            sans: record.sans,
            cert_pem,
            key_pem: Zeroizing::new(key_pem),
            serial: info.serial,
            ca_fingerprint: record.ca_fingerprint,
            not_after: info.not_after,
            paths,
            reused: true,
        })
    }

    fn issue(
        &self,
        cn: &str,
        sans: &[String],
        names: &[SubjectName],
        paths: IdentityPaths,
    ) -> Result<SignedIdentity, TlsError> {
        // Held until the identity is on disk so concurrent issuers never share a serial.
        let lock = self
            .store
            .lock()
            .map_err(|e| TlsError::signing_with_source(cn, "failed to acquire CA lock", e))?;
        let serial = self
            .store
            .next_serial(&lock)
            .map_err(|e| TlsError::signing_with_source(cn, "failed to allocate serial number", e))?;

        let now = Utc::now();
        let not_after = (now + ChronoDuration::days(self.leaf_validity_days)).min(self.ca.not_after());

        let mut params = CertificateParams::default();
        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, cn);
        params.distinguished_name = dn;
        params.subject_alt_names = names
            .iter()
            .map(|name| to_san_type(cn, name))
            .collect::<Result<Vec<_>, _>>()?;
        params.is_ca = IsCa::ExplicitNoCa;
        params.key_usages = vec![KeyUsagePurpose::DigitalSignature, KeyUsagePurpose::KeyEncipherment];
        params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];
        params.use_authority_key_identifier_extension = true;
        params.serial_number = Some(SerialNumber::from_slice(&serial));
        params.not_before = to_offset(cn, now - ChronoDuration::hours(1))?;
        params.not_after = to_offset(cn, not_after)?;

        let leaf_key = KeyPair::generate()
            .map_err(|e| TlsError::signing_with_source(cn, "failed to generate key pair", e))?;
        let issuer = self
            .ca
            .issuer()
            .map_err(|e| TlsError::signing_with_source(cn, "CA is unavailable for signing", e))?;
        let cert = params
            .signed_by(&leaf_key, &issuer, self.ca.signing_key())
            .map_err(|e| TlsError::signing_with_source(cn, "failed to sign certificate", e))?;

        let cert_pem = cert.pem();
        let key_pem = Zeroizing::new(leaf_key.serialize_pem());
        let record = IdentityRecord {
            common_name: cn.to_string(),
            sans: sans.to_vec(),
            serial: hex::encode(&serial),
            ca_fingerprint: self.ca.fingerprint().to_string(),
            issued_at: now,
            not_after,
        };

        self.store
            .write_identity(&paths, &cert_pem, &key_pem, &record)
            .map_err(|e| TlsError::signing_with_source(cn, "failed to persist identity", e))?;
        drop(lock);

        info!(cn, serial = %record.serial, not_after = %not_after, "Issued certificate");

        Ok(SignedIdentity {
            common_name: record.common_name,
            sans: record.sans,
            cert_pem,
            key_pem,
            serial: record.serial,
            ca_fingerprint: record.ca_fingerprint,
            not_after,
            paths,
            reused: false,
        })
    }
}

fn to_san_type(cn: &str, name: &SubjectName) -> Result<SanType, TlsError> {
    match name {
        SubjectName::Dns(dns) => dns
            .clone()
            .try_into()
            .map(SanType::DnsName)
            .map_err(|e| TlsError::signing_with_source(cn, format!("invalid DNS name '{dns}'"), e)),
        SubjectName::Ip(ip) => Ok(SanType::IpAddress(*ip)),
    }
}

fn to_offset(cn: &str, at: DateTime<Utc>) -> Result<OffsetDateTime, TlsError> {
    OffsetDateTime::from_unix_timestamp(at.timestamp())
        .map_err(|e| TlsError::signing_with_source(cn, "validity timestamp out of range", e))
}

fn san_set(names: &[SubjectName]) -> BTreeSet<String> {
    names.iter().map(SubjectName::normalized).collect()
}

fn issued_san_set(info: &CertificateInfo) -> BTreeSet<String> {
    info.dns_names
        .iter()
        .map(|dns| dns.to_ascii_lowercase())
        .chain(info.ip_addresses.iter().map(|ip| ip.to_string()))
        .collect()
}
