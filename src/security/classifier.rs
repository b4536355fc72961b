//! Connection-security state machine
//!
//! ```text
//! NavigationStarted(http)  ──► Insecure   (absorbing for the load)
//! NavigationStarted(https) ──► provisional ──cert ok──► Secure / SecureEv
//!                                  │                        │
//!                              cert failed           http subresource
//!                                  ▼                        ▼
//!                               aborted                   Mixed (sticky)
//! ```
//!
//! Every load gets a fresh [`Generation`]; events stamped with an older one
//! belong to a superseded load and are ignored.

use url::Url;

use super::level::{SecurityLevel, Transport};
use crate::utils::{Result, SessionError};

/// Stamp identifying one top-level load
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Generation(u64);

impl Generation {
    pub fn value(self) -> u64 {
        self.0
    }

    fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

/// Result of validating the main document's certificate chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CertificateResult {
    Valid { ev_organization: Option<String> },
    Invalid { reason: String },
}

impl CertificateResult {
    /// A valid domain-validated certificate
    pub fn valid() -> Self {
        Self::Valid {
            ev_organization: None,
        }
    }

    /// A valid extended-validation certificate
    pub fn extended_validation(organization: impl Into<String>) -> Self {
        Self::Valid {
            ev_organization: Some(organization.into()),
        }
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::Invalid {
            reason: reason.into(),
        }
    }
}

/// In-load events reported by the renderer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecurityEvent {
    CertificateValidated(CertificateResult),
    SubresourceLoaded(Url),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Phase {
    Insecure,
    /// https load waiting for its certificate; `tainted` records an insecure
    /// subresource seen before validation finished
    Provisional { tainted: bool },
    Secure,
    SecureEv(String),
    Mixed,
    /// certificate failed, the load was cancelled
    Aborted,
}

/// Per-tab security classifier
#[derive(Debug, Clone)]
pub struct SecurityClassifier {
    generation: Generation,
    phase: Phase,
    host: String,
}

impl SecurityClassifier {
    /// A classifier for a fresh tab: `Insecure`, nothing loaded
    pub fn new() -> Self {
        Self {
            generation: Generation::default(),
            phase: Phase::Insecure,
            host: String::new(),
        }
    }

    /// Published level. Provisional and aborted loads publish `Insecure`.
    pub fn level(&self) -> SecurityLevel {
        match &self.phase {
            Phase::Insecure | Phase::Provisional { .. } | Phase::Aborted => SecurityLevel::Insecure,
            Phase::Mixed => SecurityLevel::Mixed,
            Phase::Secure => SecurityLevel::Secure,
            Phase::SecureEv(organization) => SecurityLevel::SecureEv {
                organization: organization.clone(),
            },
        }
    }

    /// Generation of the current load
    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Whether an https load is still waiting for its certificate
    pub fn is_provisional(&self) -> bool {
        matches!(self.phase, Phase::Provisional { .. })
    }

    /// Whether the current load was cancelled by a certificate failure
    pub fn is_aborted(&self) -> bool {
        self.phase == Phase::Aborted
    }

    /// Start a new top-level load, superseding whatever was in flight
    pub fn navigation_started(&mut self, url: &Url) -> Generation {
        self.generation = self.generation.next();
        self.host = url.host_str().unwrap_or_default().to_string();
        self.phase = if url.scheme() == "https" {
            Phase::Provisional { tainted: false }
        } else {
            Phase::Insecure
        };
        log::debug!(
            "Load {} started for {} ({:?})",
            self.generation.0,
            url,
            self.phase
        );
        self.generation
    }

    /// Feed one event of load `generation`.
    ///
    /// Returns the new published level when it changed. A failed certificate
    /// aborts the load and is returned as
    /// [`SessionError::CertificateValidationFailed`].
    pub fn apply(
        &mut self,
        generation: Generation,
        event: SecurityEvent,
    ) -> Result<Option<SecurityLevel>> {
        if generation != self.generation {
            log::debug!(
                "Ignoring {:?} from superseded load {} (current {})",
                event,
                generation.0,
                self.generation.0
            );
            return Ok(None);
        }

        let before = self.level();
        let next = match (self.phase.clone(), event) {
            (Phase::Insecure | Phase::Aborted | Phase::Mixed, _) => None,

            (Phase::Provisional { tainted }, SecurityEvent::CertificateValidated(result)) => {
                match result {
                    CertificateResult::Invalid { reason } => {
                        self.phase = Phase::Aborted;
                        log::warn!("Certificate for {} rejected: {}", self.host, reason);
                        return Err(SessionError::CertificateValidationFailed {
                            host: self.host.clone(),
                            reason,
                        });
                    }
                    CertificateResult::Valid { .. } if tainted => Some(Phase::Mixed),
                    CertificateResult::Valid {
                        ev_organization: Some(organization),
                    } if !organization.trim().is_empty() => Some(Phase::SecureEv(organization)),
                    CertificateResult::Valid { .. } => Some(Phase::Secure),
                }
            }

            (Phase::Provisional { .. }, SecurityEvent::SubresourceLoaded(url)) => {
                (Transport::of(&url) == Transport::Insecure)
                    .then_some(Phase::Provisional { tainted: true })
            }

            (Phase::Secure | Phase::SecureEv(_), SecurityEvent::SubresourceLoaded(url)) => {
                if Transport::of(&url) == Transport::Insecure {
                    log::info!("Mixed content on {}: {}", self.host, url);
                    Some(Phase::Mixed)
                } else {
                    None
                }
            }

            // A second certificate report for an established page changes nothing.
            (Phase::Secure | Phase::SecureEv(_), SecurityEvent::CertificateValidated(_)) => None,
        };

        if let Some(phase) = next {
            self.phase = phase;
        }

        let after = self.level();
        if after == before {
            return Ok(None);
        }
        log::info!("Security level for {}: {} -> {}", self.host, before, after);
        Ok(Some(after))
    }
}

impl Default for SecurityClassifier {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    fn subresource(s: &str) -> SecurityEvent {
        SecurityEvent::SubresourceLoaded(url(s))
    }

    fn cert(result: CertificateResult) -> SecurityEvent {
        SecurityEvent::CertificateValidated(result)
    }

    #[test]
    fn test_initial_state() {
        let classifier = SecurityClassifier::new();
        assert_eq!(classifier.level(), SecurityLevel::Insecure);
        assert_eq!(classifier.generation().value(), 0);
    }

    #[test]
    fn test_https_valid_certificate_is_secure() {
        let mut c = SecurityClassifier::new();
        let g = c.navigation_started(&url("https://example.com/"));
        assert!(c.is_provisional());
        assert_eq!(c.level(), SecurityLevel::Insecure);

        let changed = c.apply(g, cert(CertificateResult::valid())).unwrap();
        assert_eq!(changed, Some(SecurityLevel::Secure));
        assert!(!c.is_provisional());
    }

    #[test]
    fn test_ev_certificate() {
        let mut c = SecurityClassifier::new();
        let g = c.navigation_started(&url("https://bank.example/"));
        c.apply(g, cert(CertificateResult::extended_validation("Example Bank")))
            .unwrap();
        assert_eq!(c.level().ev_organization(), Some("Example Bank"));
    }

    #[test]
    fn test_blank_ev_organization_is_plain_secure() {
        let mut c = SecurityClassifier::new();
        let g = c.navigation_started(&url("https://example.com/"));
        c.apply(g, cert(CertificateResult::extended_validation("  ")))
            .unwrap();
        assert_eq!(c.level(), SecurityLevel::Secure);
    }

    #[test]
    fn test_mixed_is_sticky() {
        let mut c = SecurityClassifier::new();
        let g = c.navigation_started(&url("https://example.com/"));
        c.apply(g, cert(CertificateResult::valid())).unwrap();

        let changed = c.apply(g, subresource("http://ads.example.net/x.png")).unwrap();
        assert_eq!(changed, Some(SecurityLevel::Mixed));

        c.apply(g, subresource("https://cdn.example.com/a.js")).unwrap();
        c.apply(g, cert(CertificateResult::extended_validation("Example Inc")))
            .unwrap();
        assert_eq!(c.level(), SecurityLevel::Mixed);

        // Only a new navigation clears it
        c.navigation_started(&url("https://example.com/next"));
        assert_eq!(c.level(), SecurityLevel::Insecure);
        assert!(c.is_provisional());
    }

    #[test]
    fn test_http_navigation_is_absorbing() {
        let mut c = SecurityClassifier::new();
        let g = c.navigation_started(&url("http://example.com/"));
        assert_eq!(c.apply(g, cert(CertificateResult::valid())).unwrap(), None);
        assert_eq!(c.apply(g, subresource("https://x.com/a.js")).unwrap(), None);
        assert_eq!(c.level(), SecurityLevel::Insecure);
    }

    #[test]
    fn test_certificate_failure_aborts_without_transition() {
        let mut c = SecurityClassifier::new();
        let g = c.navigation_started(&url("https://expired.example/"));
        let err = c
            .apply(g, cert(CertificateResult::invalid("certificate expired")))
            .unwrap_err();
        match err {
            SessionError::CertificateValidationFailed { host, reason } => {
                assert_eq!(host, "expired.example");
                assert_eq!(reason, "certificate expired");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(c.is_aborted());
        assert_eq!(c.level(), SecurityLevel::Insecure);

        // The aborted load cannot be revived
        assert_eq!(c.apply(g, cert(CertificateResult::valid())).unwrap(), None);
        assert_eq!(c.level(), SecurityLevel::Insecure);
    }

    #[test]
    fn test_stale_generation_is_ignored() {
        let mut c = SecurityClassifier::new();
        let old = c.navigation_started(&url("https://old.example/"));
        c.apply(old, cert(CertificateResult::valid())).unwrap();

        let new = c.navigation_started(&url("https://new.example/"));
        assert!(new > old);
        c.apply(new, cert(CertificateResult::valid())).unwrap();

        // A late subresource from the previous page must not taint this one
        assert_eq!(c.apply(old, subresource("http://old.example/x.png")).unwrap(), None);
        assert_eq!(c.level(), SecurityLevel::Secure);
    }

    #[test]
    fn test_insecure_subresource_before_certificate_taints_load() {
        let mut c = SecurityClassifier::new();
        let g = c.navigation_started(&url("https://example.com/"));
        assert_eq!(c.apply(g, subresource("http://example.com/early.css")).unwrap(), None);
        assert_eq!(
            c.apply(g, cert(CertificateResult::valid())).unwrap(),
            Some(SecurityLevel::Mixed)
        );
    }

    #[test]
    fn test_local_subresources_do_not_degrade() {
        let mut c = SecurityClassifier::new();
        let g = c.navigation_started(&url("https://example.com/"));
        c.apply(g, cert(CertificateResult::valid())).unwrap();
        c.apply(g, subresource("data:image/gif;base64,R0lGOD")).unwrap();
        c.apply(g, subresource("wss://example.com/live")).unwrap();
        assert_eq!(c.level(), SecurityLevel::Secure);
    }

    #[test]
    fn test_blob_from_insecure_origin_is_mixed() {
        let mut c = SecurityClassifier::new();
        let g = c.navigation_started(&url("https://example.com/"));
        c.apply(g, cert(CertificateResult::valid())).unwrap();
        c.apply(g, subresource("blob:https://example.com/5a1e")).unwrap();
        assert_eq!(c.level(), SecurityLevel::Secure);
        c.apply(g, subresource("blob:http://cdn.example.net/5a1e")).unwrap();
        assert_eq!(c.level(), SecurityLevel::Mixed);
    }
}
