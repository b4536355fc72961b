//! Hostname patterns

use std::fmt;

/// A hostname-matching pattern.
///
/// Three forms are accepted:
/// - `example.com` matches exactly that host
/// - `*.example.com` matches any host with one or more labels in front
/// - `www.example.*` matches the prefix followed by exactly one label
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HostPattern {
    Exact(String),
    AnySubdomain(String),
    AnyTopLevel(String),
}

impl HostPattern {
    /// Parse a pattern, returning the reason it is malformed on failure
    pub fn parse(raw: &str) -> Result<Self, &'static str> {
        let pattern = raw.trim().to_ascii_lowercase();
        if pattern.is_empty() {
            return Err("empty pattern");
        }

        match pattern.matches('*').count() {
            0 => {
                validate_literal(&pattern)?;
                Ok(Self::Exact(pattern))
            }
            1 => {
                if let Some(rest) = pattern.strip_prefix("*.") {
                    validate_literal(rest)?;
                    Ok(Self::AnySubdomain(rest.to_string()))
                } else if let Some(rest) = pattern.strip_suffix(".*") {
                    validate_literal(rest)?;
                    Ok(Self::AnyTopLevel(rest.to_string()))
                } else {
                    Err("wildcard must be a whole leading or trailing label")
                }
            }
            _ => Err("at most one wildcard is allowed"),
        }
    }

    /// Check whether a (normalized) host matches
    pub fn matches(&self, host: &str) -> bool {
        match self {
            Self::Exact(literal) => host == literal,
            Self::AnySubdomain(literal) => host
                .strip_suffix(literal.as_str())
                .and_then(|front| front.strip_suffix('.'))
                .is_some_and(|front| !front.is_empty()),
            Self::AnyTopLevel(literal) => host
                .strip_prefix(literal.as_str())
                .and_then(|rest| rest.strip_prefix('.'))
                .is_some_and(|label| !label.is_empty() && !label.contains('.')),
        }
    }

    /// Number of literal (non-wildcard) characters, used for specificity
    pub fn literal_len(&self) -> usize {
        match self {
            Self::Exact(literal) => literal.len(),
            // The separating dot is literal too.
            Self::AnySubdomain(literal) | Self::AnyTopLevel(literal) => literal.len() + 1,
        }
    }
}

impl fmt::Display for HostPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(literal) => write!(f, "{literal}"),
            Self::AnySubdomain(literal) => write!(f, "*.{literal}"),
            Self::AnyTopLevel(literal) => write!(f, "{literal}.*"),
        }
    }
}

/// Lowercase a host and strip a trailing root dot
pub fn normalize_host(host: &str) -> String {
    host.trim_end_matches('.').to_ascii_lowercase()
}

/// Check that a string is a plain dotted hostname
pub fn is_valid_hostname(host: &str) -> bool {
    validate_literal(&host.to_ascii_lowercase()).is_ok()
}

fn validate_literal(literal: &str) -> Result<(), &'static str> {
    if literal.is_empty() {
        return Err("missing literal part");
    }
    for label in literal.split('.') {
        if label.is_empty() {
            return Err("empty label");
        }
        if !label
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
        {
            return Err("invalid character in label");
        }
        if label.starts_with('-') || label.ends_with('-') {
            return Err("label may not start or end with '-'");
        }
    }
    Ok(())
}
