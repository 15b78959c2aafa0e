//! # Local Development TLS
//!
//! A private root CA for the development environment, its installation into
//! the host trust store, and leaf certificates signed by it.
//!
//! Components, leaves first:
//!
//! - [`store`]: on-disk layout of CA and identity key material, and the CA lock
//! - [`authority`]: create, load and rotate the root CA
//! - [`trust`]: OS trust store capability and install policy
//! - [`signer`]: leaf certificate issuance
//! - [`legacy`]: retirement of artifacts from earlier versions
//! - [`provision`]: the end-to-end setup workflow
//!
//! Every component is constructed from an explicit [`TlsSettings`](crate::config::TlsSettings).

pub mod authority;
pub mod legacy;
pub mod provision;
pub mod signer;
pub mod store;
pub mod trust;
pub mod validation;

pub use authority::{CaStatus, CertificateAuthority, CertificateAuthorityManager, EnsuredCa, ReplacementReason};
pub use legacy::{CleanupReport, LegacyCleanup};
pub use provision::{ProvisionError, ProvisionReport, ProvisionState, Provisioner};
pub use signer::{CertificateSigner, IdentityStatus, SignedIdentity, StaleReason};
pub use store::{IdentityRecord, KeyMaterialStore};
pub use trust::{platform_trust_store, InstallOutcome, TrustInstaller, TrustStore, TrustedCertificate};
