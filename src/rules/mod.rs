//! HTTPS-upgrade rules
//!
//! - [`RuleSet`]: the immutable table loaded once at startup
//! - [`RuleEngine`]: pure per-URL rewrite decisions over a ruleset
//! - [`ApplicableRules`]: a tab's snapshot of the rules matched for its host

mod engine;
mod pattern;
mod ruleset;

pub use engine::{ApplicableRules, Evaluation, RuleEngine};
pub use pattern::{HostPattern, normalize_host};
pub use ruleset::{Rule, RuleDirective, RuleId, RuleSet};
