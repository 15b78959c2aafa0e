use std::sync::Mutex;

use tempfile::TempDir;
use tokaido_tls::config::{ENV_DOMAIN, ENV_PROJECT, ENV_SERVICES};
use tokaido_tls::TlsSettings;

static ENV_MUTEX: Mutex<()> = Mutex::new(());

fn clear_env() {
    std::env::remove_var(ENV_PROJECT);
    std::env::remove_var(ENV_DOMAIN);
    std::env::remove_var(ENV_SERVICES);
}

#[test]
fn environment_overrides_file() {
    let _guard = ENV_MUTEX.lock().unwrap();
    clear_env();

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("tls.toml");
    std::fs::write(&path, "project = \"from-file\"\ndomain = \"*.file.test\"\n").unwrap();

    std::env::set_var(ENV_PROJECT, "from-env");
    std::env::set_var(ENV_SERVICES, "haproxy,varnish");

    let settings = TlsSettings::load(Some(&path)).expect("load settings");
    assert_eq!(settings.project, "from-env");
    assert_eq!(settings.domain, "*.file.test");
    assert_eq!(settings.service_cns, vec!["haproxy".to_string(), "varnish".to_string()]);

    clear_env();
}

#[test]
fn invalid_domain_from_environment_fails_validation() {
    let _guard = ENV_MUTEX.lock().unwrap();
    clear_env();

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("tls.toml");
    std::fs::write(&path, "").unwrap();
    std::env::set_var(ENV_DOMAIN, "*.*.bad");

    let err = TlsSettings::load(Some(&path)).unwrap_err();
    assert!(err.to_string().contains("Invalid domain"));

    clear_env();
}

#[test]
fn missing_file_is_an_error() {
    let _guard = ENV_MUTEX.lock().unwrap();
    let dir = TempDir::new().unwrap();
    let err = TlsSettings::load(Some(&dir.path().join("absent.toml"))).unwrap_err();
    assert!(err.to_string().contains("Failed to read config file"));
}
