//! # Endless Session - per-tab browsing session core
//!
//! The parts of a mobile browser tab that carry real invariants, kept apart
//! from the rendering engine and the UI around it.
//!
//! ## Architecture
//!
//! - **rules**: HTTPS-upgrade ruleset and the engine that rewrites URLs
//! - **security**: connection-security classification per navigation
//! - **bridge**: tab registry, opener lineage and the script message channel
//! - **tab**: one rendering surface tying the above together
//! - **session**: the set of open tabs and script action handling
//! - **config**: JSON session settings
//! - **utils**: shared error types

pub mod bridge;
pub mod config;
pub mod rules;
pub mod security;
pub mod session;
pub mod tab;
pub mod utils;

// Re-export main types for convenience
pub use config::SessionConfig;
pub use rules::{RuleEngine, RuleSet};
pub use security::SecurityLevel;
pub use session::Session;
pub use tab::{SharedTab, Tab};
pub use utils::error::{Result, RuleLoadError, SessionError};

/// Library version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = "Endless";
