use std::path::PathBuf;

use crate::errors::TlsError;
use crate::utils::certificates::{fingerprint_pem, inspect_certificate_pem};
use crate::utils::files::{write_atomic, FILE_MODE_PRIVATE};
use crate::utils::generate_id;

use super::{run_checked, run_command, TrustStore, TrustedCertificate};

const SYSTEM_KEYCHAIN: &str = "/Library/Keychains/System.keychain";

/// macOS keychain via the `security` tool.
///
/// The keychain has no free-form label; certificates are looked up by their
/// subject common name, so the trust label is the CA common name.
#[derive(Debug, Clone)]
pub struct MacosKeychain {
    keychain: PathBuf,
    use_sudo: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct KeychainCertificate {
    sha1: Option<String>,
    pem: String,
    fingerprint: String,
}

impl MacosKeychain {
    pub fn new(keychain: impl Into<PathBuf>, use_sudo: bool) -> Self {
        Self { keychain: keychain.into(), use_sudo }
    }

    pub fn system(use_sudo: bool) -> Self {
        Self::new(SYSTEM_KEYCHAIN, use_sudo)
    }

    fn find(&self, common_name: Option<&str>) -> Result<Vec<KeychainCertificate>, TlsError> {
        let keychain = self.keychain.to_string_lossy();
        let mut args = vec!["find-certificate", "-a"];
        if let Some(cn) = common_name {
            args.extend(["-c", cn]);
        }
        args.extend(["-Z", "-p", &*keychain]);

        let output = run_command(self.name(), false, "security", &args, None)?;
        // No match is a non-zero exit, not an error.
        if !output.status.success() {
            return Ok(Vec::new());
        }
        Ok(parse_find_output(&String::from_utf8_lossy(&output.stdout)))
    }
}

impl TrustStore for MacosKeychain {
    fn name(&self) -> &'static str {
        "macos-keychain"
    }

    fn install(&self, _label: &str, cert_pem: &str) -> Result<(), TlsError> {
        // add-trusted-cert only takes a path.
        let staging = std::env::temp_dir().join(format!("tok-tls-{}.crt", generate_id()));
        write_atomic(&staging, cert_pem.as_bytes(), FILE_MODE_PRIVATE).map_err(|e| {
            TlsError::trust_install(self.name(), format!("cannot stage certificate: {e}"))
        })?;

        let keychain = self.keychain.to_string_lossy();
        let staging_str = staging.to_string_lossy();
        let result = run_checked(
            self.name(),
            self.use_sudo,
            "security",
            &["add-trusted-cert", "-d", "-r", "trustRoot", "-k", &*keychain, &*staging_str],
            None,
        );
        let _ = std::fs::remove_file(&staging);
        result.map(|_| ())
    }

    fn uninstall(&self, fingerprint: &str) -> Result<bool, TlsError> {
        let Some(found) = self.find(None)?.into_iter().find(|c| c.fingerprint == fingerprint) else {
            return Ok(false);
        };
        let Some(sha1) = found.sha1 else {
            return Err(TlsError::trust_install(self.name(), "keychain entry has no SHA-1 hash"));
        };

        let keychain = self.keychain.to_string_lossy();
        run_checked(
            self.name(),
            self.use_sudo,
            "security",
            &["delete-certificate", "-Z", sha1.as_str(), "-t", &*keychain],
            None,
        )?;
        Ok(true)
    }

    fn is_installed(&self, fingerprint: &str) -> Result<bool, TlsError> {
        Ok(self.find(None)?.iter().any(|c| c.fingerprint == fingerprint))
    }

    fn entries(&self, label: &str) -> Result<Vec<TrustedCertificate>, TlsError> {
        // -c matches substrings; keep exact common names only.
        Ok(self
            .find(Some(label))?
            .into_iter()
            .filter(|c| {
                inspect_certificate_pem(c.pem.as_bytes())
                    .map(|info| info.subject_common_name.as_deref() == Some(label))
                    .unwrap_or(false)
            })
            .map(|c| TrustedCertificate { fingerprint: c.fingerprint, label: label.to_string() })
            .collect())
    }
}

/// Parse `security find-certificate -Z -p` output into hash + PEM pairs.
fn parse_find_output(output: &str) -> Vec<KeychainCertificate> {
    let mut found = Vec::new();
    let mut sha1 = None;
    let mut pem: Option<String> = None;

    for line in output.lines() {
        let line = line.trim_end();
        if let Some(hash) = line.strip_prefix("SHA-1 hash:") {
            sha1 = Some(hash.trim().to_string());
        } else if line == "-----BEGIN CERTIFICATE-----" {
            pem = Some(format!("{line}\n"));
        } else if let Some(block) = pem.as_mut() {
            block.push_str(line);
            block.push('\n');
            if line == "-----END CERTIFICATE-----" {
                let block = pem.take().unwrap_or_default();
                if let Ok(fingerprint) = fingerprint_pem(block.as_bytes()) {
                    found.push(KeychainCertificate { sha1: sha1.take(), pem: block, fingerprint });
                }
            }
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use rcgen::{CertificateParams, KeyPair};

    #[test]
    fn test_parse_find_output() {
        let key = KeyPair::generate().unwrap();
        let pem = CertificateParams::new(vec!["ca.local".to_string()])
            .unwrap()
            .self_signed(&key)
            .unwrap()
            .pem();
        let output = format!(
            "SHA-256 hash: 00\nSHA-1 hash: ABCDEF0123\nkeychain: \"{SYSTEM_KEYCHAIN}\"\nversion: 512\n{pem}\nSHA-1 hash: 99\nkeychain: \"x\"\n"
        );

        let parsed = parse_find_output(&output);
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].sha1.as_deref(), Some("ABCDEF0123"));
        assert_eq!(parsed[0].fingerprint, fingerprint_pem(pem.as_bytes()).unwrap());
    }

    #[test]
    fn test_parse_empty_output() {
        assert!(parse_find_output("").is_empty());
    }
}
