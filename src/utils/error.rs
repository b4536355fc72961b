//! Error types for the session core

use thiserror::Error;

/// Main error type for session operations
#[derive(Debug, Error)]
pub enum SessionError {
    /// The HTTPS-upgrade ruleset could not be loaded
    #[error("ruleset error: {0}")]
    RuleLoad(#[from] RuleLoadError),

    /// Certificate validation failed; the navigation was aborted
    #[error("certificate validation failed for {host}: {reason}")]
    CertificateValidationFailed { host: String, reason: String },

    /// An opener was already recorded for this tab
    #[error("opener already recorded for tab {child}")]
    AlreadySet { child: String },

    /// Recording this opener would make a tab its own ancestor
    #[error("tab {child} cannot be opened by its own descendant {parent}")]
    LineageCycle { child: String, parent: String },

    /// No live tab is registered under this identifier
    #[error("unknown tab: {0}")]
    UnknownTab(String),

    /// A URL could not be parsed or is not navigable
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// A script-bridge message was malformed
    #[error("malformed bridge message: {0}")]
    Bridge(String),

    /// The system random source failed
    #[error("system random source unavailable")]
    RandomUnavailable,

    /// The session has already been torn down
    #[error("session has been torn down")]
    TornDown,
}

/// Ruleset loading errors. Always fatal at startup.
#[derive(Debug, Error)]
pub enum RuleLoadError {
    /// The resource is not valid ruleset JSON
    #[error("unparsable ruleset: {0}")]
    Parse(#[from] serde_json::Error),

    /// A host pattern is malformed
    #[error("rule #{index} ({name}): invalid host pattern {pattern:?}: {reason}")]
    InvalidPattern {
        index: usize,
        name: String,
        pattern: String,
        reason: &'static str,
    },

    /// A redirect target is not a hostname
    #[error("rule #{index} ({name}): invalid redirect host {host:?}")]
    InvalidRedirect {
        index: usize,
        name: String,
        host: String,
    },

    /// A path exclusion does not start with '/'
    #[error("rule #{index} ({name}): invalid excluded path {path:?}")]
    InvalidExclusion {
        index: usize,
        name: String,
        path: String,
    },

    /// The resource contains no rules at all
    #[error("ruleset contains no rules")]
    Empty,

    /// The resource could not be read
    #[error("cannot read ruleset {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl From<url::ParseError> for SessionError {
    fn from(err: url::ParseError) -> Self {
        Self::InvalidUrl(err.to_string())
    }
}

/// Convenience Result type for session operations
pub type Result<T> = std::result::Result<T, SessionError>;
