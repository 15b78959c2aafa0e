//! Retirement of certificate artifacts left behind by earlier versions.

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use tracing::{debug, info, instrument, warn};

use crate::config::TlsSettings;
use crate::errors::TlsError;
use crate::tls::store::KeyMaterialStore;
use crate::tls::trust::TrustInstaller;
use crate::utils::certificates::{fingerprint_pem, inspect_certificate_pem};
use crate::utils::short_fingerprint;

/// What [`LegacyCleanup::cleanup`] found and removed.
#[derive(Debug, Default)]
pub struct CleanupReport {
    pub removed_paths: Vec<PathBuf>,
    /// Fingerprints removed from the OS trust store.
    pub untrusted: Vec<String>,
    /// Fingerprint of a CA in the current location that carried a previous identity.
    pub retired_ca: Option<String>,
    pub warnings: Vec<TlsError>,
}

impl CleanupReport {
    /// True when nothing was found.
    pub fn is_clean(&self) -> bool {
        self.removed_paths.is_empty()
            && self.untrusted.is_empty()
            && self.retired_ca.is_none()
            && self.warnings.is_empty()
    }

    fn warn(&mut self, target: impl Into<String>, message: impl Into<String>) {
        let err = TlsError::cleanup(target, message);
        warn!(error = %err, "Legacy cleanup problem");
        self.warnings.push(err);
    }
}

pub struct LegacyCleanup<'a> {
    store: KeyMaterialStore,
    installer: &'a TrustInstaller,
    ca_common_name: String,
    legacy_labels: Vec<String>,
    legacy_paths: Vec<PathBuf>,
}

impl<'a> LegacyCleanup<'a> {
    pub fn new(store: KeyMaterialStore, installer: &'a TrustInstaller, settings: &TlsSettings) -> Self {
        Self {
            store,
            installer,
            ca_common_name: settings.ca_common_name.clone(),
            legacy_labels: settings.legacy_trust_labels.clone(),
            legacy_paths: settings
                .legacy_paths
                .iter()
                .map(|path| settings.resolve_legacy_path(path))
                .collect(),
        }
    }

    /// Remove legacy trust entries and files. Problems are reported, never returned.
    #[instrument(skip(self), fields(labels = self.legacy_labels.len(), paths = self.legacy_paths.len()))]
    pub fn cleanup(&self) -> CleanupReport {
        let mut report = CleanupReport::default();

        for label in &self.legacy_labels {
            match self.installer.retire_label(label) {
                Ok(removed) => report.untrusted.extend(removed),
                Err(e) => report.warn(format!("trust label '{label}'"), e.to_string()),
            }
        }

        // CAs whose untrust failed on an earlier run.
        self.retire_path(&self.store.retired_dir(), &mut report);
        for path in &self.legacy_paths {
            self.retire_path(path, &mut report);
        }

        self.retire_previous_ca(&mut report);

        if report.is_clean() {
            debug!("No legacy certificate artifacts found");
        } else {
            info!(
                removed_paths = report.removed_paths.len(),
                untrusted = report.untrusted.len(),
                warnings = report.warnings.len(),
                "Retired legacy certificate artifacts"
            );
        }
        report
    }

    fn retire_path(&self, path: &Path, report: &mut CleanupReport) {
        let metadata = match fs::symlink_metadata(path) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return,
            Err(e) => return report.warn(path.display().to_string(), e.to_string()),
        };

        let certificates = if metadata.is_dir() {
            match certificate_files(path) {
                Ok(files) => files,
                Err(e) => return report.warn(path.display().to_string(), e.to_string()),
            }
        } else {
            vec![path.to_path_buf()]
        };

        let mut untrusted_all = true;
        for file in certificates {
            let Ok(fingerprint) = fs::read(&file).map_err(anyhow::Error::from).and_then(|pem| fingerprint_pem(&pem))
            else {
                continue;
            };
            untrusted_all &= self.untrust(&fingerprint, report);
        }
        // The files are the only record of what is still trusted.
        if !untrusted_all {
            return report.warn(path.display().to_string(), "kept until its certificates are untrusted");
        }

        let removed = if metadata.is_dir() { fs::remove_dir_all(path) } else { fs::remove_file(path) };
        match removed {
            Ok(()) => {
                info!(path = %path.display(), "Removed legacy certificate material");
                report.removed_paths.push(path.to_path_buf());
            }
            Err(e) => report.warn(path.display().to_string(), e.to_string()),
        }
    }

    /// A CA at the current location whose subject is not the current identity is retired.
    fn retire_previous_ca(&self, report: &mut CleanupReport) {
        let lock = match self.store.lock() {
            Ok(lock) => lock,
            Err(e) => return report.warn("CA lock", e.to_string()),
        };

        let cert_path = self.store.ca_cert_path();
        let pem = match fs::read(&cert_path) {
            Ok(pem) => pem,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return,
            Err(e) => return report.warn(cert_path.display().to_string(), e.to_string()),
        };
        // Unparsable material is left for the CA manager to report as corrupt.
        let Ok(info) = inspect_certificate_pem(&pem) else {
            return;
        };
        if info.subject_common_name.as_deref() == Some(self.ca_common_name.as_str()) {
            return;
        }

        warn!(
            subject = info.subject_common_name.as_deref().unwrap_or("<none>"),
            fingerprint = %short_fingerprint(&info.fingerprint),
            "Retiring CA issued under a previous identity"
        );
        if self.untrust(&info.fingerprint, report) {
            match self.store.remove_ca() {
                Ok(_) => report.removed_paths.push(cert_path),
                Err(e) => return report.warn(self.store.tls_dir().display().to_string(), e.to_string()),
            }
        } else {
            match self.store.retire_ca(&info.fingerprint) {
                Ok(parked) => report.warn(
                    parked.display().to_string(),
                    "previous CA kept until it is untrusted",
                ),
                Err(e) => return report.warn(self.store.tls_dir().display().to_string(), e.to_string()),
            }
        }
        report.retired_ca = Some(info.fingerprint);
        drop(lock);
    }

    /// False when the trust store refused; the caller keeps the certificate.
    fn untrust(&self, fingerprint: &str, report: &mut CleanupReport) -> bool {
        if report.untrusted.iter().any(|fp| fp == fingerprint) {
            return true;
        }
        match self.installer.uninstall(fingerprint) {
            Ok(true) => {
                report.untrusted.push(fingerprint.to_string());
                true
            }
            Ok(false) => true,
            Err(e) => {
                report.warn(format!("trusted certificate {}", short_fingerprint(fingerprint)), e.to_string());
                false
            }
        }
    }
}

/// `.crt` and `.pem` files below `dir`.
fn certificate_files(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            files.extend(certificate_files(&path)?);
        } else if matches!(path.extension().and_then(|ext| ext.to_str()), Some("crt" | "pem")) {
            files.push(path);
        }
    }
    Ok(files)
}
