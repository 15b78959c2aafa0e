//! # Configuration Management
//!
//! Settings are layered: defaults, then an optional TOML file
//! (`~/.tok/tls.toml`), then `TOK_TLS_*` environment variables. The result is
//! validated once and handed to each component explicitly.

pub mod settings;

use std::path::{Path, PathBuf};

use tracing::debug;

pub use settings::{default_config_root, TlsSettings};

use crate::{Error, Result};

pub const ENV_CONFIG_ROOT: &str = "TOK_TLS_CONFIG_ROOT";
pub const ENV_PROJECT: &str = "TOK_TLS_PROJECT";
pub const ENV_DOMAIN: &str = "TOK_TLS_DOMAIN";
pub const ENV_SERVICES: &str = "TOK_TLS_SERVICES";
pub const ENV_TRUST_LABEL: &str = "TOK_TLS_TRUST_LABEL";
pub const ENV_CA_VALIDITY_DAYS: &str = "TOK_TLS_CA_VALIDITY_DAYS";
pub const ENV_LEAF_VALIDITY_DAYS: &str = "TOK_TLS_LEAF_VALIDITY_DAYS";
pub const ENV_USE_SUDO: &str = "TOK_TLS_USE_SUDO";

impl TlsSettings {
    /// Default settings file (`~/.tok/tls.toml`)
    pub fn default_file_path() -> PathBuf {
        default_config_root().join("tls.toml")
    }

    /// Load settings from `path` (or the default file), apply the environment and validate.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default_path = Self::default_file_path();
                if default_path.exists() {
                    Self::from_file(&default_path)?
                } else {
                    Self::default()
                }
            }
        };

        settings.apply_env()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from a TOML file; missing keys keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;

        debug!(path = %path.display(), "Loaded TLS settings file");

        toml::from_str(&contents).map_err(|e| {
            Error::config(format!("Failed to parse config file {}: {}", path.display(), e))
        })
    }

    /// Apply `TOK_TLS_*` overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let value = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(root) = value(ENV_CONFIG_ROOT) {
            self.config_root = PathBuf::from(root);
        }
        if let Some(project) = value(ENV_PROJECT) {
            self.project = project;
        }
        if let Some(domain) = value(ENV_DOMAIN) {
            self.domain = domain;
        }
        if let Some(services) = value(ENV_SERVICES) {
            self.service_cns = services
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Some(label) = value(ENV_TRUST_LABEL) {
            self.trust_label = label;
        }
        if let Some(days) = value(ENV_CA_VALIDITY_DAYS) {
            self.ca_validity_days = parse_days(ENV_CA_VALIDITY_DAYS, &days)?;
        }
        if let Some(days) = value(ENV_LEAF_VALIDITY_DAYS) {
            self.leaf_validity_days = parse_days(ENV_LEAF_VALIDITY_DAYS, &days)?;
        }
        if let Some(flag) = value(ENV_USE_SUDO) {
            self.use_sudo = matches!(flag.to_lowercase().as_str(), "1" | "true" | "yes" | "on");
        }

        Ok(())
    }
}

fn parse_days(key: &str, value: &str) -> Result<i64> {
    value.parse().map_err(|e| Error::config(format!("Invalid {key} '{value}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_overrides_apply() {
        let mut settings = TlsSettings::default();
        settings
            .apply_overrides(lookup(&[
                (ENV_CONFIG_ROOT, "/tmp/tok"),
                (ENV_PROJECT, "shop"),
                (ENV_SERVICES, "haproxy, varnish ,"),
                (ENV_LEAF_VALIDITY_DAYS, "365"),
                (ENV_USE_SUDO, "no"),
            ]))
            .unwrap();

        assert_eq!(settings.config_root, PathBuf::from("/tmp/tok"));
        assert_eq!(settings.project, "shop");
        assert_eq!(settings.service_cns, vec!["haproxy".to_string(), "varnish".to_string()]);
        assert_eq!(settings.leaf_validity_days, 365);
        assert!(!settings.use_sudo);
    }

    #[test]
    fn test_blank_overrides_are_ignored() {
        let mut settings = TlsSettings::default();
        settings.apply_overrides(lookup(&[(ENV_PROJECT, "   ")])).unwrap();
        assert_eq!(settings.project, "default");
    }

    #[test]
    fn test_invalid_days_override() {
        let mut settings = TlsSettings::default();
        let err = settings.apply_overrides(lookup(&[(ENV_CA_VALIDITY_DAYS, "ten")])).unwrap_err();
        assert!(err.to_string().contains(ENV_CA_VALIDITY_DAYS));
    }

    #[test]
    fn test_from_file_keeps_defaults_for_missing_keys() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tls.toml");
        std::fs::write(&path, "project = \"shop\"\nservice_cns = []\n").unwrap();

        let settings = TlsSettings::from_file(&path).unwrap();
        assert_eq!(settings.project, "shop");
        assert!(settings.service_cns.is_empty());
        assert_eq!(settings.domain, "*.local.tokaido.io");
    }

    #[test]
    fn test_from_file_reports_parse_errors() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tls.toml");
        std::fs::write(&path, "project = [").unwrap();

        let err = TlsSettings::from_file(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }
}
