//! Connection-security classification
//!
//! Derives a tab's trust level from navigation, certificate and
//! mixed-content signals:
//! - [`SecurityLevel`]: the published four-valued level
//! - [`SecurityClassifier`]: the per-tab state machine producing it

mod classifier;
mod level;

pub use classifier::{CertificateResult, Generation, SecurityClassifier, SecurityEvent};
pub use level::{SecurityLevel, Transport};

/// Callback notified synchronously whenever a tab's published level changes
pub type SecurityObserver = Box<dyn Fn(&SecurityLevel) + Send + Sync>;
