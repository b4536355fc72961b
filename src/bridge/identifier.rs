//! Opaque per-tab identifiers

use std::borrow::Borrow;
use std::fmt;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use ring::rand::{SecureRandom, SystemRandom};

use crate::utils::{Result, SessionError};

/// Default entropy of a minted identifier, in bytes
pub const DEFAULT_IDENTIFIER_BYTES: usize = 16;

/// Opaque random token addressing one tab for its whole lifetime
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TabIdentifier(String);

impl TabIdentifier {
    /// Wrap an already-minted token (e.g. one received from page script)
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for TabIdentifier {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TabIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Source of fresh identifier candidates
pub trait IdentifierSource: Send + Sync {
    fn next_identifier(&self) -> Result<TabIdentifier>;
}

/// Identifiers drawn from the system CSPRNG, URL-safe base64 encoded
pub struct RandomIdentifiers {
    rng: SystemRandom,
    bytes: usize,
}

impl RandomIdentifiers {
    pub fn new(bytes: usize) -> Self {
        Self {
            rng: SystemRandom::new(),
            bytes,
        }
    }
}

impl Default for RandomIdentifiers {
    fn default() -> Self {
        Self::new(DEFAULT_IDENTIFIER_BYTES)
    }
}

impl IdentifierSource for RandomIdentifiers {
    fn next_identifier(&self) -> Result<TabIdentifier> {
        let mut buf = vec![0u8; self.bytes];
        self.rng
            .fill(&mut buf)
            .map_err(|_| SessionError::RandomUnavailable)?;
        Ok(TabIdentifier(URL_SAFE_NO_PAD.encode(&buf)))
    }
}
