//! Loading of the packaged HTTPS-upgrade ruleset
//!
//! The resource is a JSON document:
//!
//! ```json
//! {
//!   "rules": [
//!     { "name": "Example", "host": "example.com", "directive": "force-https" },
//!     { "name": "Example CDN", "host": "*.cdn.example.com",
//!       "directive": { "redirect": "cdn.example.net" },
//!       "exclusions": ["/legacy/"] },
//!     { "name": "Example downloads", "host": "dl.example.com",
//!       "directive": { "exclude": ["/mirror"] } }
//!   ]
//! }
//! ```

use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;

use super::pattern::{self, HostPattern};
use crate::utils::RuleLoadError;

/// Position of a rule in load order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RuleId(usize);

impl RuleId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// What a rule does to a matching request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleDirective {
    /// Rewrite `http://` to `https://` on the same host
    ForceHttps,
    /// Rewrite to `https://` on an alternate host, keeping path and query
    Redirect { host: String },
    /// Never rewrite the listed sub-paths
    Exclude,
}

impl RuleDirective {
    /// Whether this directive can produce a rewrite
    pub fn is_upgrade(&self) -> bool {
        !matches!(self, Self::Exclude)
    }
}

/// A single loaded rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    id: RuleId,
    name: String,
    pattern: HostPattern,
    directive: RuleDirective,
    exclusions: Vec<String>,
}

impl Rule {
    pub fn id(&self) -> RuleId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pattern(&self) -> &HostPattern {
        &self.pattern
    }

    pub fn directive(&self) -> &RuleDirective {
        &self.directive
    }

    /// Path prefixes this rule keeps on their original scheme
    pub fn exclusions(&self) -> &[String] {
        &self.exclusions
    }

    /// Check whether `path` falls under one of this rule's exclusions.
    ///
    /// Matching is case-sensitive and stops at path-segment boundaries, so
    /// `/docs` excludes `/docs` and `/docs/a` but not `/docsearch`.
    pub fn excludes_path(&self, path: &str) -> bool {
        self.exclusions.iter().any(|excluded| {
            path.strip_prefix(excluded.as_str()).is_some_and(|rest| {
                rest.is_empty() || excluded.ends_with('/') || rest.starts_with('/')
            })
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRuleSet {
    rules: Vec<RawRule>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRule {
    #[serde(default)]
    name: Option<String>,
    host: String,
    directive: RawDirective,
    #[serde(default)]
    exclusions: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum RawDirective {
    ForceHttps,
    Redirect(String),
    Exclude(Vec<String>),
}

/// Immutable table of HTTPS-upgrade rules, in load order
#[derive(Debug, Clone)]
pub struct RuleSet {
    rules: Vec<Arc<Rule>>,
}

impl RuleSet {
    /// Parse a ruleset from its JSON source
    pub fn from_json(source: &str) -> Result<Self, RuleLoadError> {
        let raw: RawRuleSet = serde_json::from_str(source)?;
        if raw.rules.is_empty() {
            return Err(RuleLoadError::Empty);
        }

        let rules = raw
            .rules
            .into_iter()
            .enumerate()
            .map(|(index, raw)| compile_rule(index, raw).map(Arc::new))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { rules })
    }

    /// Read and parse the ruleset resource at `path`
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RuleLoadError> {
        let path = path.as_ref();
        let source = fs::read_to_string(path).map_err(|source| RuleLoadError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let ruleset = Self::from_json(&source)?;
        log::info!(
            "Loaded {} HTTPS-upgrade rule(s) from {}",
            ruleset.len(),
            path.display()
        );
        Ok(ruleset)
    }

    /// Rules whose pattern matches a normalized host, in load order
    pub fn matching<'a>(&'a self, host: &'a str) -> impl Iterator<Item = &'a Arc<Rule>> + 'a {
        self.rules.iter().filter(move |rule| rule.pattern.matches(host))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Rule>> {
        self.rules.iter()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

fn compile_rule(index: usize, raw: RawRule) -> Result<Rule, RuleLoadError> {
    let name = raw.name.unwrap_or_else(|| raw.host.clone());

    let pattern = HostPattern::parse(&raw.host).map_err(|reason| RuleLoadError::InvalidPattern {
        index,
        name: name.clone(),
        pattern: raw.host.clone(),
        reason,
    })?;

    let mut exclusions = raw.exclusions;
    let directive = match raw.directive {
        RawDirective::ForceHttps => RuleDirective::ForceHttps,
        RawDirective::Redirect(host) => {
            if !pattern::is_valid_hostname(&host) {
                return Err(RuleLoadError::InvalidRedirect { index, name, host });
            }
            RuleDirective::Redirect {
                host: pattern::normalize_host(&host),
            }
        }
        RawDirective::Exclude(paths) => {
            exclusions.extend(paths);
            RuleDirective::Exclude
        }
    };

    if let Some(path) = exclusions.iter().find(|path| !path.starts_with('/')) {
        return Err(RuleLoadError::InvalidExclusion {
            index,
            name,
            path: path.clone(),
        });
    }

    Ok(Rule {
        id: RuleId(index),
        name,
        pattern,
        directive,
        exclusions,
    })
}
