//! # Structured Logging
//!
//! Span macros and subscriber setup on top of the tracing ecosystem.

use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Create a tracing span for a certificate lifecycle operation.
///
/// Every span carries a fresh `operation_id` so log lines from one run can be
/// grouped.
///
/// ```rust,ignore
/// let span = tls_span!("provision", project = %settings.project);
/// ```
#[macro_export]
macro_rules! tls_span {
    ($operation:expr) => {
        tracing::info_span!(
            "tls_operation",
            operation = %$operation,
            operation_id = %uuid::Uuid::new_v4()
        )
    };
    ($operation:expr, $($field:tt)*) => {
        tracing::info_span!(
            "tls_operation",
            operation = %$operation,
            operation_id = %uuid::Uuid::new_v4(),
            $($field)*
        )
    };
}

/// Install the global fmt subscriber.
///
/// `RUST_LOG` wins when set; otherwise `info`, or `debug` when `verbose`.
/// An already installed subscriber is left in place.
pub fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    if tracing::subscriber::set_global_default(
        FmtSubscriber::builder().with_env_filter(filter).with_target(false).finish(),
    )
    .is_err()
    {
        // Subscriber already set elsewhere (e.g. integration tests); ignore.
    }
}

/// Log the effective settings at startup.
pub fn log_settings(settings: &crate::config::TlsSettings) {
    tracing::debug!(
        config_root = %settings.config_root.display(),
        project = %settings.project,
        domain = %settings.domain,
        services = %settings.service_cns.join(","),
        trust_label = %settings.trust_label,
        use_sudo = settings.use_sudo,
        "Tokaido TLS settings"
    );
}
