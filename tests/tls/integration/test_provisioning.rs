use tokaido_tls::tls::{
    CaStatus, CertificateSigner, InstallOutcome, LegacyCleanup, ProvisionState, Provisioner,
    ReplacementReason,
};
use tokaido_tls::TlsSettings;
use tokaido_tls::utils::verify_issued_by;
use tokaido_tls::ErrorKind;
use tracing_test::traced_test;

use crate::tls::support::{inspect, sans, TestEnvironment};

#[test]
#[traced_test]
fn legacy_ca_is_retired_before_new_ca_is_trusted() {
    let env = TestEnvironment::new();

    // An earlier version left a CA labeled "tokaido-old" on disk and in the trust store.
    let legacy = env.seed_ca_with_identity("tokaido-old");
    env.trust.preload("tokaido-old", legacy.certificate_pem());
    assert!(env.trust.contains(legacy.fingerprint()));

    let installer = env.installer();
    let report = LegacyCleanup::new(env.store.clone(), &installer, &env.settings).cleanup();
    assert!(report.warnings.is_empty());
    assert_eq!(report.retired_ca.as_deref(), Some(legacy.fingerprint()));
    assert!(!env.trust.contains(legacy.fingerprint()));
    assert!(!env.store.ca_cert_path().exists());
    assert!(!env.store.ca_key_path().exists());

    let ensured = env.manager().ensure_ca().unwrap();
    assert_eq!(ensured.status, CaStatus::Created);
    let ca = ensured.ca;
    assert_ne!(ca.fingerprint(), legacy.fingerprint());

    assert_eq!(installer.install(&ca).unwrap(), InstallOutcome::Installed { replaced: Vec::new() });
    assert!(installer.is_installed(ca.fingerprint()).unwrap());

    let identity = CertificateSigner::new(env.store.clone(), &ca, &env.settings)
        .sign("*.local.tok.io", &[])
        .unwrap();
    verify_issued_by(identity.cert_pem.as_bytes(), ca.certificate_pem().as_bytes()).unwrap();
    assert_eq!(inspect(&identity.cert_pem).subject_common_name.as_deref(), Some("*.local.tok.io"));

    assert!(logs_contain("Retiring CA issued under a previous identity"));
}

#[test]
fn trust_failure_still_reaches_done_with_one_warning() {
    let env = TestEnvironment::new();
    env.trust.set_fail_next(true);

    let report = Provisioner::new(&env.settings, Box::new(env.trust.clone())).run().unwrap();

    assert_eq!(report.states.last(), Some(&ProvisionState::Done));
    assert!(report.states.contains(&ProvisionState::IssueWildcard));
    assert_eq!(report.warnings.len(), 1);
    assert_eq!(report.warnings[0].kind(), ErrorKind::TrustInstall);
    assert!(report.trust.is_none());
    assert!(!env.trust.contains(report.ca.fingerprint()));

    let wildcard = inspect(&report.wildcard.cert_pem);
    assert_eq!(wildcard.subject_common_name.as_deref(), Some("*.local.tokaido.io"));
    assert_eq!(wildcard.dns_names, sans(&["*.local.tokaido.io"]));
    assert!(report.wildcard.paths.cert.exists());
}

#[test]
fn rerun_after_trust_failure_installs_trust() {
    let env = TestEnvironment::new();
    env.trust.set_fail_next(true);
    let first = Provisioner::new(&env.settings, Box::new(env.trust.clone())).run().unwrap();
    assert_eq!(first.warnings.len(), 1);

    let second = Provisioner::new(&env.settings, Box::new(env.trust.clone())).run().unwrap();
    assert!(second.warnings.is_empty());
    assert_eq!(second.ca.fingerprint(), first.ca.fingerprint());
    assert!(env.trust.contains(second.ca.fingerprint()));
    assert!(second.wildcard.reused);
}

#[test]
fn provisioning_replaces_legacy_ca_and_reissues_wildcard() {
    let env = TestEnvironment::new();
    let legacy = env.seed_ca_with_identity("Tokaido Local Development");
    env.trust.preload("Tokaido Local Development", legacy.certificate_pem());

    let report = Provisioner::new(&env.settings, Box::new(env.trust.clone())).run().unwrap();

    assert_eq!(report.ca_status, CaStatus::Created);
    assert_eq!(report.cleanup.retired_ca.as_deref(), Some(legacy.fingerprint()));
    assert!(!env.trust.contains(legacy.fingerprint()));
    assert!(env.trust.contains(report.ca.fingerprint()));
    assert_eq!(env.trust.len(), 1);
    report.ca.verify(report.wildcard.cert_pem.as_bytes()).unwrap();
    for service in &report.services {
        report.ca.verify(service.cert_pem.as_bytes()).unwrap();
    }
}

#[test]
fn services_are_issued_per_project() {
    let env = TestEnvironment::with_settings(|settings| {
        settings.project = "shop".to_string();
        settings.service_cns = vec!["haproxy".to_string(), "varnish".to_string()];
    });

    let report = Provisioner::new(&env.settings, Box::new(env.trust.clone())).run().unwrap();
    let names: Vec<_> = report.services.iter().map(|s| s.common_name.as_str()).collect();
    assert_eq!(names, vec!["haproxy", "varnish"]);

    let dir = env.root().join("tls").join("shop");
    assert!(dir.join("haproxy.crt").exists());
    assert!(dir.join("varnish.key").exists());
    assert!(dir.join("_wildcard.local.tokaido.io.crt").exists());
}

#[test]
fn expiring_ca_is_untrusted_replaced_and_wildcard_reissued() {
    let env = TestEnvironment::new();

    // A short-lived CA that the default 30-day renewal window already covers.
    let short_lived = TlsSettings {
        ca_validity_days: 20,
        leaf_validity_days: 10,
        renewal_window_days: 5,
        ..env.settings.clone()
    };
    let first = Provisioner::new(&short_lived, Box::new(env.trust.clone())).run().unwrap();
    let old_fingerprint = first.ca.fingerprint().to_string();
    assert!(env.trust.contains(&old_fingerprint));

    let report = Provisioner::new(&env.settings, Box::new(env.trust.clone())).run().unwrap();

    match &report.ca_status {
        CaStatus::Replaced { previous_fingerprint, reason } => {
            assert_eq!(previous_fingerprint, &old_fingerprint);
            assert!(matches!(reason, ReplacementReason::Expired { .. }));
        }
        other => panic!("expected a replaced CA, got {other:?}"),
    }
    assert!(report.warnings.is_empty());
    assert!(!env.trust.contains(&old_fingerprint));
    assert!(env.trust.contains(report.ca.fingerprint()));
    assert_eq!(env.trust.len(), 1);

    assert!(!report.wildcard.reused);
    assert_ne!(report.wildcard.serial, first.wildcard.serial);
    report.ca.verify(report.wildcard.cert_pem.as_bytes()).unwrap();
    assert!(first.ca.verify(report.wildcard.cert_pem.as_bytes()).is_err());
}
