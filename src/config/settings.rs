//! # Configuration Settings
//!
//! Defines the settings every TLS component is constructed from. Nothing in
//! the crate reads configuration globally; a `TlsSettings` value is passed in.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::errors::{Error, Result};
use crate::tls::validation::{validate_hostname, validate_project_name};

pub const DEFAULT_DOMAIN: &str = "*.local.tokaido.io";
pub const DEFAULT_CA_COMMON_NAME: &str = "Tokaido Development CA";
pub const DEFAULT_CA_ORGANIZATION: &str = "Tokaido";

/// TLS provisioning settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct TlsSettings {
    /// Per-user configuration root (`~/.tok`); key material lives in `<root>/tls`
    pub config_root: PathBuf,

    /// Project whose identities are issued (`tls/<project>/`)
    #[validate(length(min = 1, max = 128, message = "Project name must be 1-128 characters"))]
    pub project: String,

    /// Development wildcard domain served by the proxy
    #[validate(length(min = 1, message = "Domain cannot be empty"))]
    pub domain: String,

    /// Additional service CNs that need their own certificate (e.g. `haproxy`)
    pub service_cns: Vec<String>,

    /// Subject CN of the root CA; also identifies the current CA generation
    #[validate(length(min = 1, max = 64, message = "CA common name must be 1-64 characters"))]
    pub ca_common_name: String,

    pub ca_organization: String,

    /// Label the CA is trusted under in the OS trust store
    #[validate(length(min = 1, message = "Trust label cannot be empty"))]
    pub trust_label: String,

    /// Trust-store labels used by earlier versions of the tool
    pub legacy_trust_labels: Vec<String>,

    /// Files or directories (relative to `config_root`) written by earlier versions
    pub legacy_paths: Vec<PathBuf>,

    #[validate(range(min = 1, max = 36500, message = "CA validity must be 1-36500 days"))]
    pub ca_validity_days: i64,

    #[validate(range(min = 1, max = 3650, message = "Leaf validity must be 1-3650 days"))]
    pub leaf_validity_days: i64,

    /// Certificates expiring within this window are treated as expired
    #[validate(range(min = 0, max = 365, message = "Renewal window must be 0-365 days"))]
    pub renewal_window_days: i64,

    /// Run trust-store mutations through `sudo` where the platform needs it
    pub use_sudo: bool,
}

impl Default for TlsSettings {
    fn default() -> Self {
        Self {
            config_root: default_config_root(),
            project: "default".to_string(),
            domain: DEFAULT_DOMAIN.to_string(),
            service_cns: vec!["haproxy".to_string()],
            ca_common_name: DEFAULT_CA_COMMON_NAME.to_string(),
            ca_organization: DEFAULT_CA_ORGANIZATION.to_string(),
            trust_label: DEFAULT_CA_COMMON_NAME.to_string(),
            legacy_trust_labels: vec![
                "tokaido-old".to_string(),
                "Tokaido Local Development".to_string(),
            ],
            legacy_paths: vec![
                PathBuf::from("proxy/client/tls"),
                PathBuf::from("tls/tokaido-ca.crt"),
                PathBuf::from("tls/tokaido-ca.key"),
            ],
            ca_validity_days: 3650,
            leaf_validity_days: 730,
            renewal_window_days: 30,
            use_sudo: true,
        }
    }
}

impl TlsSettings {
    /// Settings rooted at `config_root` with every other value defaulted.
    pub fn with_root(config_root: impl Into<PathBuf>) -> Self {
        Self { config_root: config_root.into(), ..Self::default() }
    }

    /// Directory holding all key material (`<config_root>/tls`).
    pub fn tls_dir(&self) -> PathBuf {
        self.config_root.join("tls")
    }

    /// Resolve a legacy path entry against the config root.
    pub fn resolve_legacy_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.config_root.join(path)
        }
    }

    /// Validate the settings
    pub fn validate(&self) -> Result<()> {
        Validate::validate(self).map_err(Error::from)?;
        self.validate_custom()
    }

    fn validate_custom(&self) -> Result<()> {
        if self.leaf_validity_days >= self.ca_validity_days {
            return Err(Error::config("Leaf validity must be shorter than CA validity"));
        }

        if self.renewal_window_days >= self.leaf_validity_days {
            return Err(Error::config("Renewal window must be shorter than leaf validity"));
        }

        validate_hostname(&self.domain)
            .map_err(|reason| Error::config(format!("Invalid domain '{}': {reason}", self.domain)))?;

        validate_project_name(&self.project).map_err(|e| Error::config(e.to_string()))?;

        if self.legacy_trust_labels.iter().any(|label| label == &self.trust_label) {
            return Err(Error::config("Trust label must differ from the legacy trust labels"));
        }

        Ok(())
    }

    /// Look up a setting by its dotted path, e.g. `tls.domain`.
    ///
    /// Only the keys listed here exist; there is no reflective lookup.
    pub fn value_for(&self, path: &str) -> Option<String> {
        let join = |values: &[String]| values.join(",");
        let value = match path {
            "tls.config_root" => self.config_root.display().to_string(),
            "tls.project" => self.project.clone(),
            "tls.domain" => self.domain.clone(),
            "tls.service_cns" => join(&self.service_cns),
            "tls.ca.common_name" => self.ca_common_name.clone(),
            "tls.ca.organization" => self.ca_organization.clone(),
            "tls.ca.validity_days" => self.ca_validity_days.to_string(),
            "tls.leaf.validity_days" => self.leaf_validity_days.to_string(),
            "tls.renewal_window_days" => self.renewal_window_days.to_string(),
            "tls.trust.label" => self.trust_label.clone(),
            "tls.trust.legacy_labels" => join(&self.legacy_trust_labels),
            "tls.trust.use_sudo" => self.use_sudo.to_string(),
            _ => return None,
        };
        Some(value)
    }
}

/// `~/.tok`, falling back to a relative `.tok` when no home directory is known.
pub fn default_config_root() -> PathBuf {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .map(|home| PathBuf::from(home).join(".tok"))
        .unwrap_or_else(|_| PathBuf::from(".tok"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings_are_valid() {
        let settings = TlsSettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.domain, "*.local.tokaido.io");
        assert_eq!(settings.service_cns, vec!["haproxy".to_string()]);
    }

    #[test]
    fn test_tls_dir() {
        let settings = TlsSettings::with_root("/home/dev/.tok");
        assert_eq!(settings.tls_dir(), PathBuf::from("/home/dev/.tok/tls"));
        assert_eq!(
            settings.resolve_legacy_path(Path::new("proxy/client/tls")),
            PathBuf::from("/home/dev/.tok/proxy/client/tls")
        );
    }

    #[test]
    fn test_leaf_must_be_shorter_than_ca() {
        let settings =
            TlsSettings { ca_validity_days: 365, leaf_validity_days: 365, ..Default::default() };
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("shorter than CA validity"));
    }

    #[test]
    fn test_rejects_bad_domain_and_project() {
        let settings = TlsSettings { domain: "bad..domain".to_string(), ..Default::default() };
        assert!(settings.validate().is_err());

        let settings = TlsSettings { project: "../escape".to_string(), ..Default::default() };
        assert!(settings.validate().is_err());

        let settings = TlsSettings { project: String::new(), ..Default::default() };
        assert!(settings.validate().is_err());

        for project in [".", ".hidden"] {
            let settings = TlsSettings { project: project.to_string(), ..Default::default() };
            assert!(settings.validate().is_err(), "{project:?} should be rejected");
        }
    }

    #[test]
    fn test_trust_label_must_not_be_legacy() {
        let settings = TlsSettings { trust_label: "tokaido-old".to_string(), ..Default::default() };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_value_for_known_paths() {
        let settings = TlsSettings::default();
        assert_eq!(settings.value_for("tls.domain").as_deref(), Some("*.local.tokaido.io"));
        assert_eq!(settings.value_for("tls.service_cns").as_deref(), Some("haproxy"));
        assert_eq!(settings.value_for("tls.ca.validity_days").as_deref(), Some("3650"));
        assert!(settings.value_for("tls.nope").is_none());
        assert!(settings.value_for("tls").is_none());
    }
}
