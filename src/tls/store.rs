//! On-disk layout for CA and identity key material.
//!
//! ```text
//! <config_root>/tls/ca.key            CA private key (0600)
//! <config_root>/tls/ca.crt            CA certificate (0644)
//! <config_root>/tls/ca.srl            serial counter
//! <config_root>/tls/.ca.lock          exclusive lock for CA mutation and issuance
//! <config_root>/tls/.retired/         retired CA certificates still awaiting untrust
//! <config_root>/tls/<project>/<cn>.{key,crt,json}
//! ```

use std::{
    fs,
    io,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tracing::debug;
use zeroize::Zeroizing;

use crate::config::TlsSettings;
use crate::tls::validation::{validate_project_name, WILDCARD_FILE_TOKEN};
use crate::utils::files::{
    ensure_private_dir, read_optional, remove_if_exists, write_atomic, FILE_MODE_PRIVATE,
    FILE_MODE_PUBLIC,
};

pub const CA_KEY_FILE: &str = "ca.key";
pub const CA_CERT_FILE: &str = "ca.crt";
pub const CA_SERIAL_FILE: &str = "ca.srl";
const CA_LOCK_FILE: &str = ".ca.lock";
const RETIRED_DIR: &str = ".retired";

/// Raw CA files as found on disk. Either half may be missing.
pub struct CaFiles {
    pub cert_pem: Option<Vec<u8>>,
    pub key_pem: Option<Zeroizing<Vec<u8>>>,
}

impl CaFiles {
    pub fn is_empty(&self) -> bool {
        self.cert_pem.is_none() && self.key_pem.is_none()
    }
}

/// Persisted serial counter. Leaf serials are `prefix || next` (16 bytes).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
struct SerialState {
    prefix: String,
    next: u64,
}

impl SerialState {
    fn fresh() -> Self {
        let mut prefix = [0u8; 8];
        rand::thread_rng().fill_bytes(&mut prefix);
        // Positive, and never a leading zero byte.
        prefix[0] = (prefix[0] & 0x7f) | 0x10;
        Self { prefix: hex::encode(prefix), next: 1 }
    }
}

/// Metadata written next to each issued identity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IdentityRecord {
    pub common_name: String,
    pub sans: Vec<String>,
    pub serial: String,
    pub ca_fingerprint: String,
    pub issued_at: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
}

/// File locations for one identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityPaths {
    pub cert: PathBuf,
    pub key: PathBuf,
    pub record: PathBuf,
}

/// An identity read back from disk.
pub struct StoredIdentity {
    pub cert_pem: Vec<u8>,
    pub key_pem: Zeroizing<Vec<u8>>,
    pub record: Option<IdentityRecord>,
}

/// Exclusive lock over the CA directory, released on drop.
#[derive(Debug)]
pub struct CaLock {
    file: fs::File,
}

impl Drop for CaLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

/// Access to the key material rooted at `<config_root>/tls`.
#[derive(Debug, Clone)]
pub struct KeyMaterialStore {
    tls_dir: PathBuf,
}

impl KeyMaterialStore {
    pub fn new(tls_dir: impl Into<PathBuf>) -> Self {
        Self { tls_dir: tls_dir.into() }
    }

    pub fn from_settings(settings: &TlsSettings) -> Self {
        Self::new(settings.tls_dir())
    }

    pub fn tls_dir(&self) -> &Path {
        &self.tls_dir
    }

    pub fn ca_key_path(&self) -> PathBuf {
        self.tls_dir.join(CA_KEY_FILE)
    }

    pub fn ca_cert_path(&self) -> PathBuf {
        self.tls_dir.join(CA_CERT_FILE)
    }

    pub fn serial_path(&self) -> PathBuf {
        self.tls_dir.join(CA_SERIAL_FILE)
    }

    /// Block until the CA lock is held.
    pub fn lock(&self) -> io::Result<CaLock> {
        ensure_private_dir(&self.tls_dir)?;
        let file = fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(self.tls_dir.join(CA_LOCK_FILE))?;
        file.lock()?;
        debug!(dir = %self.tls_dir.display(), "Acquired CA lock");
        Ok(CaLock { file })
    }

    pub fn read_ca(&self) -> io::Result<CaFiles> {
        Ok(CaFiles {
            cert_pem: read_optional(&self.ca_cert_path())?,
            key_pem: read_optional(&self.ca_key_path())?.map(Zeroizing::new),
        })
    }

    /// Persist a new CA and reset the serial counter for it.
    pub fn write_ca(&self, cert_pem: &str, key_pem: &str) -> io::Result<()> {
        ensure_private_dir(&self.tls_dir)?;
        write_atomic(&self.ca_key_path(), key_pem.as_bytes(), FILE_MODE_PRIVATE)?;
        write_atomic(&self.ca_cert_path(), cert_pem.as_bytes(), FILE_MODE_PUBLIC)?;
        self.write_serial(&SerialState::fresh())
    }

    /// Remove the CA key, certificate and serial counter.
    pub fn remove_ca(&self) -> io::Result<bool> {
        let mut removed = remove_if_exists(&self.ca_key_path())?;
        removed |= remove_if_exists(&self.ca_cert_path())?;
        removed |= remove_if_exists(&self.serial_path())?;
        Ok(removed)
    }

    pub fn retired_dir(&self) -> PathBuf {
        self.tls_dir.join(RETIRED_DIR)
    }

    /// Move the CA certificate to [`retired_dir`](Self::retired_dir) and drop
    /// the key and serial counter. The certificate is kept so its trust entry
    /// can still be found.
    pub fn retire_ca(&self, fingerprint: &str) -> io::Result<PathBuf> {
        let retired = self.retired_dir();
        ensure_private_dir(&retired)?;
        let dest = retired.join(format!("{fingerprint}.crt"));
        fs::rename(self.ca_cert_path(), &dest)?;
        remove_if_exists(&self.ca_key_path())?;
        remove_if_exists(&self.serial_path())?;
        Ok(dest)
    }

    /// Allocate the next leaf serial number. Callers must hold the CA lock.
    pub fn next_serial(&self, _lock: &CaLock) -> io::Result<Vec<u8>> {
        let mut state = match read_optional(&self.serial_path())? {
            Some(bytes) => serde_json::from_slice::<SerialState>(&bytes)
                .ok()
                .filter(|state| hex::decode(&state.prefix).map(|p| p.len() == 8).unwrap_or(false))
                .unwrap_or_else(SerialState::fresh),
            None => SerialState::fresh(),
        };

        let mut serial = hex::decode(&state.prefix)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        serial.extend_from_slice(&state.next.to_be_bytes());

        state.next = state
            .next
            .checked_add(1)
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "serial counter exhausted"))?;
        self.write_serial(&state)?;

        Ok(serial)
    }

    fn write_serial(&self, state: &SerialState) -> io::Result<()> {
        let bytes = serde_json::to_vec(state)?;
        write_atomic(&self.serial_path(), &bytes, FILE_MODE_PRIVATE)
    }

    /// `tls/<project>`. Anything that would not be a direct child of `tls/` is refused.
    pub fn project_dir(&self, project: &str) -> io::Result<PathBuf> {
        validate_project_name(project).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let dir = self.tls_dir.join(project);
        if dir.parent() != Some(self.tls_dir.as_path()) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("project '{project}' does not resolve below {}", self.tls_dir.display()),
            ));
        }
        Ok(dir)
    }

    pub fn identity_paths(&self, project: &str, common_name: &str) -> io::Result<IdentityPaths> {
        let dir = self.project_dir(project)?;
        let stem = identity_file_stem(common_name);
        let paths = IdentityPaths {
            cert: dir.join(format!("{stem}.crt")),
            key: dir.join(format!("{stem}.key")),
            record: dir.join(format!("{stem}.json")),
        };
        if paths.cert.parent() != Some(dir.as_path()) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("common name '{common_name}' does not resolve inside {}", dir.display()),
            ));
        }
        Ok(paths)
    }

    pub fn read_identity(&self, paths: &IdentityPaths) -> io::Result<Option<StoredIdentity>> {
        let (Some(cert_pem), Some(key_pem)) = (read_optional(&paths.cert)?, read_optional(&paths.key)?)
        else {
            return Ok(None);
        };

        // An unreadable record only makes the identity stale.
        let record = read_optional(&paths.record)?
            .and_then(|bytes| serde_json::from_slice::<IdentityRecord>(&bytes).ok());

        Ok(Some(StoredIdentity { cert_pem, key_pem: Zeroizing::new(key_pem), record }))
    }

    pub fn write_identity(
        &self,
        paths: &IdentityPaths,
        cert_pem: &str,
        key_pem: &str,
        record: &IdentityRecord,
    ) -> io::Result<()> {
        if let Some(dir) = paths.cert.parent() {
            ensure_private_dir(dir)?;
        }
        write_atomic(&paths.key, key_pem.as_bytes(), FILE_MODE_PRIVATE)?;
        write_atomic(&paths.cert, cert_pem.as_bytes(), FILE_MODE_PRIVATE)?;
        // The record goes last: a missing record marks an interrupted write as stale.
        let record_bytes = serde_json::to_vec_pretty(record)?;
        write_atomic(&paths.record, &record_bytes, FILE_MODE_PRIVATE)
    }

    pub fn remove_identity(&self, paths: &IdentityPaths) -> io::Result<bool> {
        let mut removed = remove_if_exists(&paths.record)?;
        removed |= remove_if_exists(&paths.cert)?;
        removed |= remove_if_exists(&paths.key)?;
        Ok(removed)
    }

    /// Records of every identity issued for `project`.
    pub fn list_identities(&self, project: &str) -> io::Result<Vec<IdentityRecord>> {
        let dir = self.project_dir(project)?;
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err),
        };

        let mut records = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            let bytes = fs::read(&path)?;
            if let Ok(record) = serde_json::from_slice::<IdentityRecord>(&bytes) {
                records.push(record);
            }
        }
        records.sort_by(|a, b| a.common_name.cmp(&b.common_name));
        Ok(records)
    }
}

/// `*` is not portable in file names; `*.local.tokaido.io` is stored as `_wildcard.local.tokaido.io`.
pub fn identity_file_stem(common_name: &str) -> String {
    common_name.replace('*', WILDCARD_FILE_TOKEN)
}
