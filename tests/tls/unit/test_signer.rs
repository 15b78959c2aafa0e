use tokaido_tls::tls::{CertificateSigner, IdentityStatus, StaleReason};
use tokaido_tls::utils::verify_issued_by;
use tokaido_tls::ErrorKind;

use crate::tls::support::{inspect, sans, TestEnvironment};

#[test]
fn signed_certificate_matches_inputs_and_active_ca() {
    let env = TestEnvironment::new();
    let ca = env.manager().ensure_ca().unwrap().ca;
    let signer = CertificateSigner::new(env.store.clone(), &ca, &env.settings);

    let names = sans(&["shop.local.tokaido.io", "api.shop.local.tokaido.io"]);
    let identity = signer.sign("shop.local.tokaido.io", &names).unwrap();
    let info = inspect(&identity.cert_pem);

    assert_eq!(info.subject_common_name.as_deref(), Some("shop.local.tokaido.io"));
    assert_eq!(info.dns_names, names);
    assert_eq!(info.issuer_common_name.as_deref(), ca.common_name());
    assert_eq!(identity.ca_fingerprint, ca.fingerprint());
    assert!(info.not_after <= ca.not_after());
    verify_issued_by(identity.cert_pem.as_bytes(), ca.certificate_pem().as_bytes()).unwrap();
}

#[test]
fn serials_are_unique_per_ca() {
    let env = TestEnvironment::new();
    let ca = env.manager().ensure_ca().unwrap().ca;
    let signer = CertificateSigner::new(env.store.clone(), &ca, &env.settings);

    let mut serials = std::collections::HashSet::new();
    for index in 0..5 {
        let cn = format!("svc{index}.local");
        let identity = signer.sign(&cn, &[cn.clone()]).unwrap();
        assert!(serials.insert(inspect(&identity.cert_pem).serial));
    }
}

#[test]
fn identity_from_replaced_ca_is_stale() {
    let env = TestEnvironment::new();
    let manager = env.manager();

    let ca1 = manager.ensure_ca().unwrap().ca;
    let issued = CertificateSigner::new(env.store.clone(), &ca1, &env.settings)
        .sign("app.local", &sans(&["app.local"]))
        .unwrap();

    manager.reset().unwrap();
    let ca2 = manager.ensure_ca().unwrap().ca;
    assert!(verify_issued_by(issued.cert_pem.as_bytes(), ca2.certificate_pem().as_bytes()).is_err());

    let signer = CertificateSigner::new(env.store.clone(), &ca2, &env.settings);
    match signer.status("app.local").unwrap() {
        IdentityStatus::Stale(StaleReason::CaChanged { issued_by }) => {
            assert_eq!(issued_by, ca1.fingerprint());
        }
        other => panic!("expected stale identity, got {other:?}"),
    }

    let renewed = signer.sign("app.local", &sans(&["app.local"])).unwrap();
    assert!(!renewed.reused);
    assert_eq!(renewed.ca_fingerprint, ca2.fingerprint());
}

#[test]
fn case_insensitive_duplicate_sans_fail_validation() {
    let env = TestEnvironment::new();
    let ca = env.manager().ensure_ca().unwrap().ca;
    let signer = CertificateSigner::new(env.store.clone(), &ca, &env.settings);

    let err = signer.sign("foo.local", &sans(&["foo.local", "FOO.local"])).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[test]
fn empty_common_name_fails_validation() {
    let env = TestEnvironment::new();
    let ca = env.manager().ensure_ca().unwrap().ca;
    let signer = CertificateSigner::new(env.store.clone(), &ca, &env.settings);

    let err = signer.sign("", &sans(&["foo.local"])).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[test]
fn identities_are_listed_per_project() {
    let env = TestEnvironment::new();
    let ca = env.manager().ensure_ca().unwrap().ca;
    CertificateSigner::new(env.store.clone(), &ca, &env.settings)
        .sign("haproxy", &sans(&["haproxy"]))
        .unwrap();

    let other = tokaido_tls::TlsSettings { project: "other".to_string(), ..env.settings.clone() };
    CertificateSigner::new(env.store.clone(), &ca, &other).sign("web", &sans(&["web"])).unwrap();

    let records = env.store.list_identities("default").unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].common_name, "haproxy");
    assert_eq!(env.store.list_identities("other").unwrap().len(), 1);
}
