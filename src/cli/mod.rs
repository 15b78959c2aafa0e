//! # Command Line Interface
//!
//! `tok-tls` wires the provisioning engine to a command line. Each command
//! builds its components from the loaded [`TlsSettings`] and calls straight
//! into the library.

pub mod output;

use std::path::PathBuf;

use anyhow::{bail, Context};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;

use crate::config::TlsSettings;
use crate::observability::{init_logging, log_settings};
use crate::tls::{
    platform_trust_store, CertificateAuthorityManager, CertificateSigner, IdentityStatus,
    KeyMaterialStore, LegacyCleanup, ProvisionReport, Provisioner, TrustInstaller,
};
use crate::utils::short_fingerprint;
use output::{print_json, print_table_header, print_table_row, OutputFormat};

#[derive(Parser)]
#[command(name = "tok-tls")]
#[command(about = "Local development CA and TLS provisioning for Tokaido")]
#[command(version = crate::VERSION)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Settings file (defaults to ~/.tok/tls.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Configuration root override (defaults to ~/.tok)
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    /// Project name override
    #[arg(long, global = true)]
    pub project: Option<String>,

    /// Never run trust store commands through sudo
    #[arg(long, global = true)]
    pub no_sudo: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create or reuse the CA, trust it, and issue the wildcard and service certificates
    Setup {
        /// Development wildcard domain override
        #[arg(long)]
        domain: Option<String>,

        /// Service common names (replaces the configured list)
        #[arg(long = "service")]
        services: Vec<String>,
    },

    /// Sign a certificate for a common name
    Sign {
        common_name: String,

        /// Subject alternative name (repeatable)
        #[arg(long = "san")]
        sans: Vec<String>,

        /// Re-issue even if the current certificate is still valid
        #[arg(long)]
        force: bool,
    },

    /// Show the CA, its trust state and issued certificates
    Status {
        #[arg(long, value_enum, default_value = "table")]
        output: OutputFormat,
    },

    /// Remove certificate artifacts from earlier versions
    Cleanup,

    /// Remove the current CA from the OS trust store
    Untrust,

    /// Delete the CA key and certificate (required after a corrupt CA)
    ResetCa {
        /// Confirm deletion
        #[arg(long)]
        yes: bool,
    },

    /// Print a setting by its dotted path (e.g. tls.domain)
    ConfigGet { path: String },
}

pub fn run_cli() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let mut settings = TlsSettings::load(cli.config.as_deref())?;
    if let Some(root) = cli.root {
        settings.config_root = root;
    }
    if let Some(project) = cli.project {
        settings.project = project;
    }
    if cli.no_sudo {
        settings.use_sudo = false;
    }

    if let Commands::Setup { domain, services } = &cli.command {
        if let Some(domain) = domain {
            settings.domain = domain.clone();
        }
        if !services.is_empty() {
            settings.service_cns = services.clone();
        }
    }
    settings.validate()?;
    log_settings(&settings);

    match cli.command {
        Commands::Setup { .. } => handle_setup(&settings),
        Commands::Sign { common_name, sans, force } => {
            handle_sign(&settings, &common_name, &sans, force)
        }
        Commands::Status { output } => handle_status(&settings, output),
        Commands::Cleanup => handle_cleanup(&settings),
        Commands::Untrust => handle_untrust(&settings),
        Commands::ResetCa { yes } => handle_reset(&settings, yes),
        Commands::ConfigGet { path } => handle_config_get(&settings, &path),
    }
}

fn handle_setup(settings: &TlsSettings) -> anyhow::Result<()> {
    let report = Provisioner::for_platform(settings).run()?;
    print_setup_report(settings, &report);
    Ok(())
}

fn print_setup_report(settings: &TlsSettings, report: &ProvisionReport) {
    println!("CA:       {} ({:?})", short_fingerprint(report.ca.fingerprint()), report.ca_status);
    println!("Trusted:  {}", if report.trust.is_some() { "yes" } else { "no" });
    println!("Wildcard: {}", report.wildcard.paths.cert.display());
    for service in &report.services {
        println!("Service:  {}", service.paths.cert.display());
    }

    if !report.warnings.is_empty() {
        println!();
        println!("Completed with {} warning(s):", report.warnings.len());
        for warning in &report.warnings {
            println!("  - {warning}");
        }
        if report.trust.is_none() {
            println!(
                "Browsers will show certificate warnings until {} is trusted manually.",
                KeyMaterialStore::from_settings(settings).ca_cert_path().display()
            );
        }
    }
}

fn handle_sign(
    settings: &TlsSettings,
    common_name: &str,
    sans: &[String],
    force: bool,
) -> anyhow::Result<()> {
    let store = KeyMaterialStore::from_settings(settings);
    let Some(ca) = CertificateAuthorityManager::new(store.clone(), settings).load()? else {
        bail!("No certificate authority found; run `tok-tls setup` first");
    };

    let identity = CertificateSigner::new(store, &ca, settings).sign_with(common_name, sans, force)?;
    let action = if identity.reused { "Reused" } else { "Issued" };
    println!("{action} certificate for {}", identity.common_name);
    println!("  certificate: {}", identity.paths.cert.display());
    println!("  key:         {}", identity.paths.key.display());
    println!("  expires:     {}", identity.not_after);
    Ok(())
}

#[derive(Serialize)]
struct StatusView {
    ca: Option<CaView>,
    identities: Vec<IdentityView>,
}

#[derive(Serialize)]
struct CaView {
    common_name: Option<String>,
    fingerprint: String,
    not_after: DateTime<Utc>,
    trusted: Option<bool>,
}

#[derive(Serialize)]
struct IdentityView {
    common_name: String,
    sans: Vec<String>,
    not_after: DateTime<Utc>,
    status: String,
}

fn handle_status(settings: &TlsSettings, output: OutputFormat) -> anyhow::Result<()> {
    let store = KeyMaterialStore::from_settings(settings);
    let ca = CertificateAuthorityManager::new(store.clone(), settings).load()?;
    let records = store
        .list_identities(&settings.project)
        .with_context(|| format!("Failed to list identities for project '{}'", settings.project))?;

    let mut view = StatusView { ca: None, identities: Vec::new() };
    if let Some(ca) = &ca {
        let installer = TrustInstaller::new(platform_trust_store(settings), settings.trust_label.clone());
        view.ca = Some(CaView {
            common_name: ca.common_name().map(str::to_string),
            fingerprint: ca.fingerprint().to_string(),
            not_after: ca.not_after(),
            trusted: installer.is_installed(ca.fingerprint()).ok(),
        });

        let signer = CertificateSigner::new(store.clone(), ca, settings);
        for record in records {
            let status = match signer.status(&record.common_name)? {
                IdentityStatus::Missing => "missing".to_string(),
                IdentityStatus::Current => "current".to_string(),
                IdentityStatus::Stale(reason) => format!("stale: {reason}"),
            };
            view.identities.push(IdentityView {
                common_name: record.common_name,
                sans: record.sans,
                not_after: record.not_after,
                status,
            });
        }
    }

    match output {
        OutputFormat::Json => print_json(&view),
        OutputFormat::Table => {
            print_status_table(&view);
            Ok(())
        }
    }
}

fn print_status_table(view: &StatusView) {
    let Some(ca) = &view.ca else {
        println!("No certificate authority. Run `tok-tls setup`.");
        return;
    };
    let trusted = match ca.trusted {
        Some(true) => "yes",
        Some(false) => "no",
        None => "unknown",
    };
    println!("CA {} ({})", ca.common_name.as_deref().unwrap_or("<no CN>"), short_fingerprint(&ca.fingerprint));
    println!("   expires {}, trusted: {trusted}", ca.not_after);
    println!();

    if view.identities.is_empty() {
        println!("No certificates issued for this project.");
        return;
    }
    print_table_header(&[("COMMON NAME", 32), ("EXPIRES", 20), ("STATUS", 40)]);
    for identity in &view.identities {
        let expires = identity.not_after.format("%Y-%m-%d %H:%M").to_string();
        print_table_row(&[
            (identity.common_name.as_str(), 32),
            (expires.as_str(), 20),
            (identity.status.as_str(), 40),
        ]);
    }
}

fn handle_cleanup(settings: &TlsSettings) -> anyhow::Result<()> {
    let installer = TrustInstaller::new(platform_trust_store(settings), settings.trust_label.clone());
    let report =
        LegacyCleanup::new(KeyMaterialStore::from_settings(settings), &installer, settings).cleanup();

    if report.is_clean() {
        println!("No legacy certificate artifacts found.");
        return Ok(());
    }
    for path in &report.removed_paths {
        println!("Removed {}", path.display());
    }
    for fingerprint in &report.untrusted {
        println!("Untrusted {}", short_fingerprint(fingerprint));
    }
    for warning in &report.warnings {
        println!("Warning: {warning}");
    }
    Ok(())
}

fn handle_untrust(settings: &TlsSettings) -> anyhow::Result<()> {
    let store = KeyMaterialStore::from_settings(settings);
    let Some(ca) = CertificateAuthorityManager::new(store, settings).load()? else {
        println!("No certificate authority found.");
        return Ok(());
    };

    let installer = TrustInstaller::new(platform_trust_store(settings), settings.trust_label.clone());
    if installer.uninstall(ca.fingerprint())? {
        println!("Removed {} from the trust store.", short_fingerprint(ca.fingerprint()));
    } else {
        println!("CA was not trusted.");
    }
    Ok(())
}

fn handle_reset(settings: &TlsSettings, yes: bool) -> anyhow::Result<()> {
    if !yes {
        bail!("Refusing to delete the CA without --yes; every issued certificate becomes stale");
    }
    let manager = CertificateAuthorityManager::new(KeyMaterialStore::from_settings(settings), settings);
    if manager.reset()? {
        println!("Removed CA material from {}", manager.store().tls_dir().display());
    } else {
        println!("No CA material found.");
    }
    Ok(())
}

fn handle_config_get(settings: &TlsSettings, path: &str) -> anyhow::Result<()> {
    match settings.value_for(path) {
        Some(value) => {
            println!("{value}");
            Ok(())
        }
        None => bail!("Unknown setting '{path}'"),
    }
}
