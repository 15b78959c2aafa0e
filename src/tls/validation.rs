//! Common name and subject alternative name validation.

use std::{collections::HashSet, net::IpAddr};

use crate::errors::TlsError;

/// X.509 upper bound for the CommonName attribute.
const MAX_COMMON_NAME_LEN: usize = 64;
const MAX_HOSTNAME_LEN: usize = 253;
const MAX_LABEL_LEN: usize = 63;
/// File-name spelling of a leading `*` label.
pub const WILDCARD_FILE_TOKEN: &str = "_wildcard";

/// A validated subject alternative name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubjectName {
    Dns(String),
    Ip(IpAddr),
}

impl SubjectName {
    /// Key used for duplicate detection and SAN-set comparison.
    pub fn normalized(&self) -> String {
        match self {
            Self::Dns(name) => name.to_ascii_lowercase(),
            Self::Ip(ip) => ip.to_string(),
        }
    }
}

/// The CN must be non-empty and usable as a file name inside the project directory.
pub fn validate_common_name(cn: &str) -> Result<(), TlsError> {
    let reject = |reason: &str| Err(TlsError::validation("common name", cn, reason));

    if cn.trim().is_empty() {
        return reject("must not be empty");
    }
    if cn.len() > MAX_COMMON_NAME_LEN {
        return reject("must be at most 64 characters");
    }
    if cn != cn.trim() {
        return reject("must not have leading or trailing whitespace");
    }
    if cn.contains(['/', '\\']) || cn.chars().any(char::is_control) {
        return reject("must not contain path separators or control characters");
    }
    if cn == "." || cn == ".." || cn.contains("..") {
        return reject("must not contain '..'");
    }
    // Reserved for the on-disk spelling of `*`.
    if cn.contains(WILDCARD_FILE_TOKEN) {
        return reject("must not contain '_wildcard'");
    }
    Ok(())
}

/// Project names become a directory below `tls/`: a slug that cannot be `.`,
/// hidden, or escape the directory.
pub fn validate_project_name(project: &str) -> Result<(), TlsError> {
    let reject = |reason: &str| Err(TlsError::validation("project", project, reason));

    if project.is_empty() {
        return reject("must not be empty");
    }
    if project.len() > MAX_LABEL_LEN {
        return reject("must be at most 63 characters");
    }
    if !project.starts_with(|c: char| c.is_ascii_alphanumeric()) {
        return reject("must start with a letter or digit");
    }
    if !project.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')) {
        return reject("may only contain letters, digits, '-', '_' and '.'");
    }
    if project.contains("..") {
        return reject("must not contain '..'");
    }
    Ok(())
}

/// Parse one SAN as an IP literal or a hostname (optionally with a leading `*.` label).
pub fn parse_subject_name(value: &str) -> Result<SubjectName, TlsError> {
    if let Ok(ip) = value.parse::<IpAddr>() {
        return Ok(SubjectName::Ip(ip));
    }
    validate_hostname(value)
        .map(|()| SubjectName::Dns(value.to_string()))
        .map_err(|reason| TlsError::validation("subject alternative name", value, reason))
}

/// Validate the full SAN list, rejecting duplicates after case-folding.
pub fn validate_subject_names(sans: &[String]) -> Result<Vec<SubjectName>, TlsError> {
    let mut seen = HashSet::with_capacity(sans.len());
    let mut parsed = Vec::with_capacity(sans.len());

    for san in sans {
        let name = parse_subject_name(san)?;
        if !seen.insert(name.normalized()) {
            return Err(TlsError::validation(
                "subject alternative name",
                san.as_str(),
                "duplicate entry (names are compared case-insensitively)",
            ));
        }
        parsed.push(name);
    }

    Ok(parsed)
}

/// Check hostname syntax. Returns the reason on failure.
pub fn validate_hostname(value: &str) -> Result<(), String> {
    if value.is_empty() {
        return Err("must not be empty".to_string());
    }
    if value.len() > MAX_HOSTNAME_LEN {
        return Err(format!("must be at most {MAX_HOSTNAME_LEN} characters"));
    }
    if value.ends_with('.') {
        return Err("must not end with '.'".to_string());
    }

    let labels: Vec<&str> = value.split('.').collect();
    for (index, label) in labels.iter().enumerate() {
        if *label == "*" {
            if index != 0 {
                return Err("wildcard is only allowed as the first label".to_string());
            }
            if labels.len() < 2 {
                return Err("wildcard needs at least one further label".to_string());
            }
            continue;
        }
        validate_label(label)?;
    }

    Ok(())
}

fn validate_label(label: &str) -> Result<(), String> {
    if label.is_empty() {
        return Err("contains an empty label".to_string());
    }
    if label.len() > MAX_LABEL_LEN {
        return Err(format!("label '{label}' exceeds {MAX_LABEL_LEN} characters"));
    }
    if !label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(format!("label '{label}' contains invalid characters"));
    }
    if label.starts_with('-') || label.ends_with('-') {
        return Err(format!("label '{label}' must not start or end with '-'"));
    }
    Ok(())
}
