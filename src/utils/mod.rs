//! Utility functions and helpers

pub mod certificates;
pub mod files;

pub use certificates::{
    fingerprint_der, fingerprint_pem, inspect_certificate_pem, verify_issued_by, CertificateInfo,
};

/// Generate a new UUID v4 as a string
pub fn generate_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Abbreviated fingerprint for log lines and file names.
pub fn short_fingerprint(fingerprint: &str) -> &str {
    let end = fingerprint.len().min(16);
    &fingerprint[..end]
}
