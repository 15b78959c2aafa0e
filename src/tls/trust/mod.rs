//! OS trust store integration for the root CA.
//!
//! # Architecture
//!
//! - [`TrustStore`] is the capability interface: install, uninstall, query.
//! - One implementation per mechanism: [`MacosKeychain`], [`LinuxAnchors`],
//!   [`ManualTrustStore`] for platforms without automation, and
//!   [`MemoryTrustStore`] for tests.
//! - [`TrustInstaller`] applies the install policy on top of any store:
//!   installing the same fingerprint twice is a no-op, and any other
//!   certificate trusted under the tool's label is removed first.
//!
//! The implementation is selected once by [`platform_trust_store`].
//!
//! Every failure here is a [`TlsError::TrustInstall`], which callers treat as
//! recoverable.

mod linux;
mod macos;
mod manual;
mod memory;

use std::{
    io::Write,
    process::{Command, Output, Stdio},
};

use tracing::{info, instrument, warn};

pub use linux::LinuxAnchors;
pub use macos::MacosKeychain;
pub use manual::ManualTrustStore;
pub use memory::MemoryTrustStore;

use crate::config::TlsSettings;
use crate::errors::TlsError;
use crate::tls::authority::CertificateAuthority;
use crate::tls::store::KeyMaterialStore;
use crate::utils::short_fingerprint;

/// A certificate currently trusted by the OS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustedCertificate {
    /// Lowercase hex SHA-256 of the certificate DER.
    pub fingerprint: String,
    pub label: String,
}

/// Host trust store capability.
pub trait TrustStore: Send + Sync {
    /// Short name used in errors and logs.
    fn name(&self) -> &'static str;

    /// Trust `cert_pem` as a root under `label`.
    fn install(&self, label: &str, cert_pem: &str) -> Result<(), TlsError>;

    /// Remove the certificate with `fingerprint`. Returns false when it was not trusted.
    fn uninstall(&self, fingerprint: &str) -> Result<bool, TlsError>;

    fn is_installed(&self, fingerprint: &str) -> Result<bool, TlsError>;

    /// Certificates trusted under `label`.
    fn entries(&self, label: &str) -> Result<Vec<TrustedCertificate>, TlsError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    AlreadyTrusted,
    Installed { replaced: Vec<String> },
}

/// Idempotent install and label hygiene over a [`TrustStore`].
pub struct TrustInstaller {
    store: Box<dyn TrustStore>,
    label: String,
}

impl TrustInstaller {
    pub fn new(store: Box<dyn TrustStore>, label: impl Into<String>) -> Self {
        Self { store, label: label.into() }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn store(&self) -> &dyn TrustStore {
        self.store.as_ref()
    }

    #[instrument(skip(self, ca), fields(store = self.store.name(), label = %self.label))]
    pub fn install(&self, ca: &CertificateAuthority) -> Result<InstallOutcome, TlsError> {
        let fingerprint = ca.fingerprint();
        let stale = self.retire_label_except(&self.label, Some(fingerprint))?;

        if self.store.is_installed(fingerprint)? {
            info!(fingerprint = %short_fingerprint(fingerprint), "CA already trusted");
            return Ok(InstallOutcome::AlreadyTrusted);
        }

        self.store.install(&self.label, ca.certificate_pem())?;
        info!(
            fingerprint = %short_fingerprint(fingerprint),
            replaced = stale.len(),
            "Installed CA into trust store"
        );
        Ok(InstallOutcome::Installed { replaced: stale })
    }

    pub fn uninstall(&self, fingerprint: &str) -> Result<bool, TlsError> {
        let removed = self.store.uninstall(fingerprint)?;
        if removed {
            info!(store = self.store.name(), fingerprint = %short_fingerprint(fingerprint), "Removed CA from trust store");
        }
        Ok(removed)
    }

    pub fn is_installed(&self, fingerprint: &str) -> Result<bool, TlsError> {
        self.store.is_installed(fingerprint)
    }

    /// Remove every certificate trusted under `label`. Returns the removed fingerprints.
    pub fn retire_label(&self, label: &str) -> Result<Vec<String>, TlsError> {
        self.retire_label_except(label, None)
    }

    fn retire_label_except(&self, label: &str, keep: Option<&str>) -> Result<Vec<String>, TlsError> {
        let mut removed = Vec::new();
        for entry in self.store.entries(label)? {
            if Some(entry.fingerprint.as_str()) == keep {
                continue;
            }
            warn!(
                store = self.store.name(),
                label,
                fingerprint = %short_fingerprint(&entry.fingerprint),
                "Removing stale trusted certificate"
            );
            if self.store.uninstall(&entry.fingerprint)? {
                removed.push(entry.fingerprint);
            }
        }
        Ok(removed)
    }
}

/// Pick the trust store implementation for the running platform.
pub fn platform_trust_store(settings: &TlsSettings) -> Box<dyn TrustStore> {
    let ca_cert_path = KeyMaterialStore::from_settings(settings).ca_cert_path();

    if cfg!(target_os = "macos") {
        return Box::new(MacosKeychain::system(settings.use_sudo));
    }
    if cfg!(target_os = "linux") {
        if let Some(anchors) = LinuxAnchors::detect(settings.use_sudo) {
            return Box::new(anchors);
        }
    }
    Box::new(ManualTrustStore::new(ca_cert_path))
}

/// Run `program` (through `sudo` when asked), feeding `stdin` if given.
pub(crate) fn run_command(
    store: &str,
    use_sudo: bool,
    program: &str,
    args: &[&str],
    stdin: Option<&[u8]>,
) -> Result<Output, TlsError> {
    let mut command = if use_sudo {
        let mut command = Command::new("sudo");
        command.arg(program);
        command
    } else {
        Command::new(program)
    };
    command.args(args).stdout(Stdio::piped()).stderr(Stdio::piped());
    if stdin.is_some() {
        command.stdin(Stdio::piped());
    }

    let mut child = command
        .spawn()
        .map_err(|e| TlsError::trust_install(store, format!("failed to run {program}: {e}")))?;

    if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
        pipe.write_all(input)
            .map_err(|e| TlsError::trust_install(store, format!("failed to write to {program}: {e}")))?;
    }

    child
        .wait_with_output()
        .map_err(|e| TlsError::trust_install(store, format!("failed to wait for {program}: {e}")))
}

/// Like [`run_command`], but a non-zero exit status is an error.
pub(crate) fn run_checked(
    store: &str,
    use_sudo: bool,
    program: &str,
    args: &[&str],
    stdin: Option<&[u8]>,
) -> Result<Output, TlsError> {
    let output = run_command(store, use_sudo, program, args, stdin)?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(TlsError::trust_install(
            store,
            format!("{program} exited with {}: {}", output.status, stderr.trim()),
        ));
    }
    Ok(output)
}
