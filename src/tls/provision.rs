//! # TLS Provisioning
//!
//! Single entry point for setting up TLS for a development environment:
//!
//! ```text
//! Init → CleanupLegacy → EnsureCA → InstallTrust → IssueWildcard → IssueServices → Done
//!                            ↓                          ↓
//!                          Failed                     Failed
//! ```
//!
//! Legacy cleanup, trust installation and service certificates degrade to
//! warnings. A missing CA or wildcard certificate is fatal.

use tracing::{error, info, warn};

use crate::config::TlsSettings;
use crate::errors::{ErrorKind, TlsError};
use crate::tls::authority::{CaStatus, CertificateAuthority, CertificateAuthorityManager};
use crate::tls::legacy::{CleanupReport, LegacyCleanup};
use crate::tls::signer::{CertificateSigner, SignedIdentity};
use crate::tls::store::KeyMaterialStore;
use crate::tls::trust::{platform_trust_store, InstallOutcome, TrustInstaller, TrustStore};
use crate::tls_span;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProvisionState {
    Init,
    CleanupLegacy,
    EnsureCa,
    InstallTrust,
    IssueWildcard,
    IssueServices,
    Done,
    Failed,
}

impl ProvisionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::CleanupLegacy => "cleanup_legacy",
            Self::EnsureCa => "ensure_ca",
            Self::InstallTrust => "install_trust",
            Self::IssueWildcard => "issue_wildcard",
            Self::IssueServices => "issue_services",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for ProvisionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a successful run.
#[derive(Debug)]
pub struct ProvisionReport {
    /// States visited, ending with [`ProvisionState::Done`].
    pub states: Vec<ProvisionState>,
    pub cleanup: CleanupReport,
    pub ca: CertificateAuthority,
    pub ca_status: CaStatus,
    /// `None` when trust installation failed.
    pub trust: Option<InstallOutcome>,
    pub wildcard: SignedIdentity,
    pub services: Vec<SignedIdentity>,
    /// Recoverable problems, in the order they happened.
    pub warnings: Vec<TlsError>,
}

/// A fatal failure, with the state it happened in.
#[derive(Debug, thiserror::Error)]
#[error("TLS provisioning failed during {state}: {source}")]
pub struct ProvisionError {
    pub state: ProvisionState,
    /// States visited, ending with [`ProvisionState::Failed`].
    pub states: Vec<ProvisionState>,
    pub warnings: Vec<TlsError>,
    #[source]
    pub source: TlsError,
}

impl ProvisionError {
    pub fn kind(&self) -> ErrorKind {
        self.source.kind()
    }
}

pub struct Provisioner<'a> {
    settings: &'a TlsSettings,
    store: KeyMaterialStore,
    installer: TrustInstaller,
}

impl<'a> Provisioner<'a> {
    pub fn new(settings: &'a TlsSettings, trust_store: Box<dyn TrustStore>) -> Self {
        Self {
            settings,
            store: KeyMaterialStore::from_settings(settings),
            installer: TrustInstaller::new(trust_store, settings.trust_label.clone()),
        }
    }

    /// Provisioner using the trust store of the running platform.
    pub fn for_platform(settings: &'a TlsSettings) -> Self {
        Self::new(settings, platform_trust_store(settings))
    }

    pub fn installer(&self) -> &TrustInstaller {
        &self.installer
    }

    pub fn run(&self) -> Result<ProvisionReport, ProvisionError> {
        let span = tls_span!("provision", project = %self.settings.project, domain = %self.settings.domain);
        let _guard = span.enter();

        let mut run = Run { states: vec![ProvisionState::Init], warnings: Vec::new() };

        run.enter(ProvisionState::CleanupLegacy);
        let mut cleanup = LegacyCleanup::new(self.store.clone(), &self.installer, self.settings).cleanup();
        run.warnings.append(&mut cleanup.warnings);

        run.enter(ProvisionState::EnsureCa);
        let manager = CertificateAuthorityManager::new(self.store.clone(), self.settings);
        let ensured = match manager.ensure_ca() {
            Ok(ensured) => ensured,
            Err(e) => return Err(run.fail(ProvisionState::EnsureCa, e)),
        };
        let ca = ensured.ca;

        run.enter(ProvisionState::InstallTrust);
        if let CaStatus::Replaced { previous_fingerprint, .. } = &ensured.status {
            if let Err(e) = self.installer.uninstall(previous_fingerprint) {
                run.warn(e);
            }
        }
        let trust = match self.installer.install(&ca) {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                run.warn(e);
                None
            }
        };

        run.enter(ProvisionState::IssueWildcard);
        let signer = CertificateSigner::new(self.store.clone(), &ca, self.settings);
        let domain = self.settings.domain.as_str();
        let wildcard = match signer.sign(domain, &[domain.to_string()]) {
            Ok(identity) => identity,
            Err(e) => return Err(run.fail(ProvisionState::IssueWildcard, e)),
        };

        run.enter(ProvisionState::IssueServices);
        let mut services = Vec::with_capacity(self.settings.service_cns.len());
        for cn in &self.settings.service_cns {
            match signer.sign(cn, std::slice::from_ref(cn)) {
                Ok(identity) => services.push(identity),
                Err(e) => run.warn(e),
            }
        }

        run.enter(ProvisionState::Done);
        info!(
            ca_status = ?ensured.status,
            trusted = trust.is_some(),
            services = services.len(),
            warnings = run.warnings.len(),
            "TLS provisioning complete"
        );

        Ok(ProvisionReport {
            states: run.states,
            cleanup,
            ca,
            ca_status: ensured.status,
            trust,
            wildcard,
            services,
            warnings: run.warnings,
        })
    }
}

struct Run {
    states: Vec<ProvisionState>,
    warnings: Vec<TlsError>,
}

impl Run {
    fn enter(&mut self, state: ProvisionState) {
        tracing::debug!(%state, "Entering provisioning state");
        self.states.push(state);
    }

    fn warn(&mut self, err: TlsError) {
        warn!(error = %err, kind = %err.kind(), "Continuing after recoverable error");
        self.warnings.push(err);
    }

    fn fail(mut self, state: ProvisionState, source: TlsError) -> ProvisionError {
        error!(%state, error = %source, "TLS provisioning failed");
        self.states.push(ProvisionState::Failed);
        ProvisionError { state, states: self.states, warnings: self.warnings, source }
    }
}
