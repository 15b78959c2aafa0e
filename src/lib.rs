//! # Tokaido TLS
//!
//! Local development certificate authority and TLS provisioning for Tokaido
//! environments. It creates a private root CA, trusts it on the host, and
//! signs leaf certificates for the development wildcard domain and for
//! individual services.
//!
//! ## Architecture
//!
//! ```text
//! Provisioner → LegacyCleanup → CertificateAuthorityManager → TrustInstaller → CertificateSigner
//!                                          ↓                        ↓                 ↓
//!                                  KeyMaterialStore            TrustStore      KeyMaterialStore
//! ```
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use tokaido_tls::{tls::Provisioner, TlsSettings};
//!
//! fn main() -> anyhow::Result<()> {
//!     let settings = TlsSettings::load(None)?;
//!     let report = Provisioner::for_platform(&settings).run()?;
//!     println!("wildcard certificate: {}", report.wildcard.paths.cert.display());
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod errors;
pub mod observability;
pub mod tls;
pub mod utils;

// Re-export commonly used types
pub use config::TlsSettings;
pub use errors::{Error, ErrorKind, Result, TlsError};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
