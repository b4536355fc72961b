//! Per-request rewrite decisions

use std::collections::BTreeMap;
use std::sync::Arc;

use url::Url;

use super::pattern::normalize_host;
use super::ruleset::{Rule, RuleDirective, RuleSet};

/// Outcome of evaluating one URL against a ruleset
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Evaluation {
    /// The rewritten URL, or `None` when the original is used unmodified
    pub rewritten: Option<Url>,
    /// Every rule whose pattern matched the request host, in load order
    pub matched: Vec<Arc<Rule>>,
}

impl Evaluation {
    /// The URL to actually request
    pub fn effective_url(&self, original: &Url) -> Url {
        self.rewritten.clone().unwrap_or_else(|| original.clone())
    }

    /// Group the matched rules by host pattern
    pub fn applicable_rules(&self) -> ApplicableRules {
        ApplicableRules::from_matched(&self.matched)
    }
}

/// Rewrite engine over an immutable [`RuleSet`]. Pure: no I/O, no mutation.
pub struct RuleEngine;

impl RuleEngine {
    /// Decide whether and how to rewrite `url`.
    ///
    /// Precedence:
    /// 1. any matched rule excluding the request path blocks rewriting
    /// 2. otherwise the upgrade rule with the longest literal pattern applies
    /// 3. ties go to the rule loaded first
    pub fn evaluate(rules: &RuleSet, url: &Url) -> Evaluation {
        if !matches!(url.scheme(), "http" | "https") {
            return Evaluation::default();
        }
        let Some(host) = url.host_str() else {
            return Evaluation::default();
        };
        let host = normalize_host(host);

        let matched: Vec<Arc<Rule>> = rules.matching(&host).cloned().collect();
        if matched.is_empty() {
            return Evaluation::default();
        }

        let path = url.path();
        if let Some(rule) = matched.iter().find(|rule| rule.excludes_path(path)) {
            log::debug!("{} excluded from rewriting by rule {:?}", url, rule.name());
            return Evaluation {
                rewritten: None,
                matched,
            };
        }

        let rewritten = Self::most_specific_upgrade(&matched).and_then(|rule| {
            let target = apply_directive(rule.directive(), url)?;
            log::debug!("Rule {:?} rewrote {} -> {}", rule.name(), url, target);
            Some(target)
        });

        Evaluation { rewritten, matched }
    }

    fn most_specific_upgrade(matched: &[Arc<Rule>]) -> Option<&Arc<Rule>> {
        matched
            .iter()
            .filter(|rule| rule.directive().is_upgrade())
            .fold(None, |best: Option<&Arc<Rule>>, rule| match best {
                // Strictly longer only, so the first-loaded rule keeps ties.
                Some(current) if rule.pattern().literal_len() <= current.pattern().literal_len() => {
                    Some(current)
                }
                _ => Some(rule),
            })
    }
}

fn apply_directive(directive: &RuleDirective, url: &Url) -> Option<Url> {
    let mut target = url.clone();
    match directive {
        RuleDirective::ForceHttps => {
            if url.scheme() == "https" {
                return None;
            }
            target.set_scheme("https").ok()?;
        }
        RuleDirective::Redirect { host } => {
            target.set_scheme("https").ok()?;
            if let Err(e) = target.set_host(Some(host)) {
                log::warn!("Cannot redirect {} to host {}: {}", url, host, e);
                return None;
            }
        }
        RuleDirective::Exclude => return None,
    }

    (target != *url).then_some(target)
}

/// A tab's snapshot of the rules matched for its current host, keyed by
/// host pattern
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApplicableRules {
    by_pattern: BTreeMap<String, Vec<Arc<Rule>>>,
}

impl ApplicableRules {
    pub fn from_matched(matched: &[Arc<Rule>]) -> Self {
        let mut by_pattern: BTreeMap<String, Vec<Arc<Rule>>> = BTreeMap::new();
        for rule in matched {
            by_pattern
                .entry(rule.pattern().to_string())
                .or_default()
                .push(Arc::clone(rule));
        }
        Self { by_pattern }
    }

    /// Rules registered under a host pattern
    pub fn get(&self, pattern: &str) -> Option<&[Arc<Rule>]> {
        self.by_pattern.get(pattern).map(Vec::as_slice)
    }

    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.by_pattern.keys().map(String::as_str)
    }

    pub fn rules(&self) -> impl Iterator<Item = &Arc<Rule>> {
        self.by_pattern.values().flatten()
    }

    pub fn contains_rule(&self, name: &str) -> bool {
        self.rules().any(|rule| rule.name() == name)
    }

    /// Number of rules (not patterns)
    pub fn len(&self) -> usize {
        self.by_pattern.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_pattern.is_empty()
    }
}
