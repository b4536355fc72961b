//! Published connection-security levels

use std::fmt;

use url::Url;

/// Trust level of the page currently shown in a tab.
///
/// The EV organization name lives inside [`SecurityLevel::SecureEv`], so no
/// other level can carry one.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SecurityLevel {
    /// Plain transport, or trust not (yet) established
    #[default]
    Insecure,
    /// Secure page that loaded at least one insecure subresource
    Mixed,
    /// Valid certificate, all subresources secure so far
    Secure,
    /// Valid extended-validation certificate
    SecureEv { organization: String },
}

impl SecurityLevel {
    /// Whether the level vouches for the whole page
    pub fn is_secure(&self) -> bool {
        matches!(self, Self::Secure | Self::SecureEv { .. })
    }

    /// Organization name from the EV certificate, if any
    pub fn ev_organization(&self) -> Option<&str> {
        match self {
            Self::SecureEv { organization } => Some(organization),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Insecure => "insecure",
            Self::Mixed => "mixed",
            Self::Secure => "secure",
            Self::SecureEv { .. } => "secure-ev",
        }
    }
}

impl fmt::Display for SecurityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SecureEv { organization } => write!(f, "secure-ev ({organization})"),
            other => f.write_str(other.as_str()),
        }
    }
}

/// How a fetched URL's transport counts toward page trust
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    /// Encrypted and authenticated (`https`, `wss`)
    Secure,
    /// Never touches the network (`data`, `about`, `blob` without an origin)
    Local,
    /// Anything else
    Insecure,
}

impl Transport {
    pub fn of(url: &Url) -> Self {
        match url.scheme() {
            "https" | "wss" => Self::Secure,
            // blob: URLs carry their creator's origin, e.g. `blob:http://a.com/<uuid>`
            "blob" => match Url::parse(url.path()) {
                Ok(origin) => Self::of(&origin),
                Err(_) => Self::Local,
            },
            "data" | "about" => Self::Local,
            _ => Self::Insecure,
        }
    }
}
