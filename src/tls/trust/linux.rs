use std::{
    fs, io,
    path::{Path, PathBuf},
};

use tracing::debug;

use crate::errors::TlsError;
use crate::utils::certificates::fingerprint_pem;
use crate::utils::files::{write_atomic, FILE_MODE_PUBLIC};

use super::{run_checked, TrustStore, TrustedCertificate};

const DEBIAN_ANCHORS: &str = "/usr/local/share/ca-certificates";
const FEDORA_ANCHORS: &str = "/etc/pki/ca-trust/source/anchors";
const FINGERPRINT_PREFIX_LEN: usize = 16;

/// Distribution anchor directory plus its refresh command.
///
/// Anchors are named `<label-slug>-<fingerprint prefix>.crt`, which lets
/// entries be found by label and by fingerprint without a local index.
#[derive(Debug, Clone)]
pub struct LinuxAnchors {
    anchor_dir: PathBuf,
    refresh: Vec<String>,
    use_sudo: bool,
}

struct Anchor {
    path: PathBuf,
    slug: String,
    fingerprint: String,
}

impl LinuxAnchors {
    pub fn new(anchor_dir: impl Into<PathBuf>, refresh: Vec<String>, use_sudo: bool) -> Self {
        Self { anchor_dir: anchor_dir.into(), refresh, use_sudo }
    }

    /// Debian/Ubuntu or Fedora/RHEL layout, whichever exists.
    pub fn detect(use_sudo: bool) -> Option<Self> {
        if Path::new(DEBIAN_ANCHORS).is_dir() {
            return Some(Self::new(DEBIAN_ANCHORS, vec!["update-ca-certificates".to_string()], use_sudo));
        }
        if Path::new(FEDORA_ANCHORS).is_dir() {
            return Some(Self::new(
                FEDORA_ANCHORS,
                vec!["update-ca-trust".to_string(), "extract".to_string()],
                use_sudo,
            ));
        }
        None
    }

    pub fn anchor_dir(&self) -> &Path {
        &self.anchor_dir
    }

    pub fn anchor_file_name(label: &str, fingerprint: &str) -> String {
        let prefix = fingerprint.get(..FINGERPRINT_PREFIX_LEN).unwrap_or(fingerprint);
        format!("{}-{prefix}.crt", slug(label))
    }

    fn anchors(&self) -> Result<Vec<Anchor>, TlsError> {
        let entries = match fs::read_dir(&self.anchor_dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(self.error(format!("cannot read {}: {err}", self.anchor_dir.display()))),
        };

        let mut anchors = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            let Some((slug, prefix)) = path
                .file_name()
                .and_then(|name| name.to_str())
                .and_then(|name| name.strip_suffix(".crt"))
                .and_then(|stem| stem.rsplit_once('-'))
            else {
                continue;
            };
            if prefix.len() != FINGERPRINT_PREFIX_LEN {
                continue;
            }
            let Ok(fingerprint) = fs::read(&path).map_err(anyhow::Error::from).and_then(|pem| fingerprint_pem(&pem))
            else {
                continue;
            };
            if !fingerprint.starts_with(prefix) {
                continue;
            }
            anchors.push(Anchor { slug: slug.to_string(), fingerprint, path: path.clone() });
        }
        Ok(anchors)
    }

    fn refresh(&self) -> Result<(), TlsError> {
        let Some((program, args)) = self.refresh.split_first() else {
            return Ok(());
        };
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        run_checked(self.name(), self.use_sudo, program, &args, None)?;
        Ok(())
    }

    fn error(&self, message: impl Into<String>) -> TlsError {
        TlsError::trust_install(self.name(), message)
    }
}

impl TrustStore for LinuxAnchors {
    fn name(&self) -> &'static str {
        "linux-anchors"
    }

    fn install(&self, label: &str, cert_pem: &str) -> Result<(), TlsError> {
        let fingerprint =
            fingerprint_pem(cert_pem.as_bytes()).map_err(|e| self.error(e.to_string()))?;
        let dest = self.anchor_dir.join(Self::anchor_file_name(label, &fingerprint));
        let dest_str = dest.to_string_lossy();

        if self.use_sudo {
            run_checked(self.name(), true, "tee", &[&*dest_str], Some(cert_pem.as_bytes()))?;
        } else {
            write_atomic(&dest, cert_pem.as_bytes(), FILE_MODE_PUBLIC)
                .map_err(|e| self.error(format!("cannot write {}: {e}", dest.display())))?;
        }
        debug!(path = %dest.display(), "Wrote trust anchor");
        self.refresh()
    }

    fn uninstall(&self, fingerprint: &str) -> Result<bool, TlsError> {
        let mut removed = false;
        for anchor in self.anchors()?.into_iter().filter(|a| a.fingerprint == fingerprint) {
            if self.use_sudo {
                let path = anchor.path.to_string_lossy();
                run_checked(self.name(), true, "rm", &["-f", &*path], None)?;
            } else {
                fs::remove_file(&anchor.path)
                    .map_err(|e| self.error(format!("cannot remove {}: {e}", anchor.path.display())))?;
            }
            debug!(path = %anchor.path.display(), "Removed trust anchor");
            removed = true;
        }
        if removed {
            self.refresh()?;
        }
        Ok(removed)
    }

    fn is_installed(&self, fingerprint: &str) -> Result<bool, TlsError> {
        Ok(self.anchors()?.iter().any(|anchor| anchor.fingerprint == fingerprint))
    }

    fn entries(&self, label: &str) -> Result<Vec<TrustedCertificate>, TlsError> {
        let wanted = slug(label);
        Ok(self
            .anchors()?
            .into_iter()
            .filter(|anchor| anchor.slug == wanted)
            .map(|anchor| TrustedCertificate { fingerprint: anchor.fingerprint, label: label.to_string() })
            .collect())
    }
}

/// `Tokaido Development CA` becomes `tokaido-development-ca`.
fn slug(label: &str) -> String {
    label
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(str::to_ascii_lowercase)
        .collect::<Vec<_>>()
        .join("-")
}
