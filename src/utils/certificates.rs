use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use anyhow::{anyhow, bail, Context};
use chrono::{DateTime, TimeZone, Utc};
use sha2::{Digest, Sha256};
use x509_parser::{
    certificate::X509Certificate, extensions::GeneralName, pem::parse_x509_pem,
    prelude::FromDer, time::ASN1Time,
};

/// Metadata extracted from a PEM certificate for validation and reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateInfo {
    pub subject_common_name: Option<String>,
    pub issuer_common_name: Option<String>,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    /// Lowercase hex of the raw serial number bytes.
    pub serial: String,
    /// Lowercase hex SHA-256 of the certificate DER.
    pub fingerprint: String,
    pub is_ca: bool,
    pub key_cert_sign: bool,
    pub crl_sign: bool,
    pub server_auth: bool,
    pub dns_names: Vec<String>,
    pub ip_addresses: Vec<IpAddr>,
    /// Raw subject public key bits (uncompressed point for EC keys).
    pub public_key: Vec<u8>,
}

impl CertificateInfo {
    /// A CA certificate usable for issuing leaves: `CA:true` plus keyCertSign and cRLSign.
    pub fn is_signing_ca(&self) -> bool {
        self.is_ca && self.key_cert_sign && self.crl_sign
    }

    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.not_before <= now && now < self.not_after
    }
}

/// Decode the first `CERTIFICATE` block of a PEM document into DER.
pub fn pem_to_der(pem: &[u8]) -> anyhow::Result<Vec<u8>> {
    let (_, block) = parse_x509_pem(pem).map_err(|err| anyhow!("invalid PEM: {err}"))?;
    if block.label != "CERTIFICATE" {
        bail!("expected a CERTIFICATE block, found '{}'", block.label);
    }
    Ok(block.contents)
}

/// Lowercase hex SHA-256 digest of DER bytes.
pub fn fingerprint_der(der: &[u8]) -> String {
    hex::encode(Sha256::digest(der))
}

pub fn fingerprint_pem(pem: &[u8]) -> anyhow::Result<String> {
    Ok(fingerprint_der(&pem_to_der(pem)?))
}

/// Parse a PEM certificate and extract the fields the CA and signer rely on.
pub fn inspect_certificate_pem(pem: &[u8]) -> anyhow::Result<CertificateInfo> {
    let der = pem_to_der(pem)?;
    inspect_certificate_der(&der)
}

pub fn inspect_certificate_der(der: &[u8]) -> anyhow::Result<CertificateInfo> {
    let (_, cert) =
        X509Certificate::from_der(der).map_err(|err| anyhow!("invalid certificate: {err}"))?;

    let key_usage = cert.key_usage().map_err(|err| anyhow!("invalid key usage: {err}"))?;
    let (key_cert_sign, crl_sign) = key_usage
        .map(|ext| (ext.value.key_cert_sign(), ext.value.crl_sign()))
        .unwrap_or((false, false));

    let server_auth = cert
        .extended_key_usage()
        .map_err(|err| anyhow!("invalid extended key usage: {err}"))?
        .map(|ext| ext.value.server_auth)
        .unwrap_or(false);

    let mut dns_names = Vec::new();
    let mut ip_addresses = Vec::new();
    if let Some(san) = cert
        .subject_alternative_name()
        .map_err(|err| anyhow!("invalid subject alternative name: {err}"))?
    {
        for name in &san.value.general_names {
            match name {
                GeneralName::DNSName(dns) => dns_names.push((*dns).to_string()),
                GeneralName::IPAddress(raw) => ip_addresses.push(ip_from_bytes(raw)?),
                _ => {}
            }
        }
    }

    Ok(CertificateInfo {
        subject_common_name: first_common_name(cert.subject()),
        issuer_common_name: first_common_name(cert.issuer()),
        not_before: asn1_to_chrono(&cert.validity().not_before)?,
        not_after: asn1_to_chrono(&cert.validity().not_after)?,
        serial: hex::encode(cert.raw_serial()),
        fingerprint: fingerprint_der(der),
        is_ca: cert.is_ca(),
        key_cert_sign,
        crl_sign,
        server_auth,
        dns_names,
        ip_addresses,
        public_key: cert.public_key().subject_public_key.data.to_vec(),
    })
}

/// Verify that `leaf_pem` carries a valid signature from the key in `ca_pem`.
pub fn verify_issued_by(leaf_pem: &[u8], ca_pem: &[u8]) -> anyhow::Result<()> {
    let leaf_der = pem_to_der(leaf_pem).context("decode leaf certificate")?;
    let ca_der = pem_to_der(ca_pem).context("decode CA certificate")?;

    let (_, leaf) = X509Certificate::from_der(&leaf_der)
        .map_err(|err| anyhow!("invalid leaf certificate: {err}"))?;
    let (_, ca) = X509Certificate::from_der(&ca_der)
        .map_err(|err| anyhow!("invalid CA certificate: {err}"))?;

    leaf.verify_signature(Some(ca.public_key()))
        .map_err(|err| anyhow!("signature verification failed: {err}"))
}

fn first_common_name(name: &x509_parser::x509::X509Name<'_>) -> Option<String> {
    name.iter_common_name().next().and_then(|cn| cn.as_str().ok()).map(str::to_string)
}

fn asn1_to_chrono(time: &ASN1Time) -> anyhow::Result<DateTime<Utc>> {
    Utc.timestamp_opt(time.timestamp(), 0)
        .single()
        .ok_or_else(|| anyhow!("failed to convert certificate time"))
}

fn ip_from_bytes(raw: &[u8]) -> anyhow::Result<IpAddr> {
    match raw.len() {
        4 => Ok(IpAddr::V4(Ipv4Addr::new(raw[0], raw[1], raw[2], raw[3]))),
        16 => {
            let mut octets = [0u8; 16];
            octets.copy_from_slice(raw);
            Ok(IpAddr::V6(Ipv6Addr::from(octets)))
        }
        len => Err(anyhow!("IP address SAN has unexpected length {len}")),
    }
}
