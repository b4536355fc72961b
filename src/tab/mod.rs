//! Tab: one rendering surface with its navigation and security state
//!
//! A [`Tab`] evaluates every navigation against the HTTPS-upgrade rules,
//! commits the (possibly rewritten) URL and the rules that applied, resets
//! its [`SecurityClassifier`], and hands the load to its
//! [`RenderingBackend`]. Renderer events flow back in through
//! [`Tab::handle_event`].

mod backend;

pub use backend::{RenderingBackend, RendererEvent};
#[cfg(test)]
pub use backend::MockRenderingBackend;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use url::Url;

use crate::bridge::{Registration, TabHandle, TabIdentifier, TabRegistry, bootstrap_script};
use crate::config::NORMAL_ZOOM_SCALE;
use crate::rules::{ApplicableRules, RuleEngine, RuleSet};
use crate::security::{Generation, SecurityClassifier, SecurityEvent, SecurityLevel, SecurityObserver};
use crate::utils::Result;

/// Owning handle on a tab, shared between the tab strip and message delivery
pub type SharedTab = Arc<Mutex<Tab>>;

/// The registry type tabs register themselves in
pub type TabDirectory = TabRegistry<Mutex<Tab>>;

/// Schemes typed input is taken to name explicitly
const INPUT_SCHEMES: &[&str] = &["http", "https", "about", "data", "file"];

/// Lock a tab, recovering the state if a previous holder panicked
pub fn lock_tab(tab: &SharedTab) -> MutexGuard<'_, Tab> {
    tab.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Services every tab of a session shares
#[derive(Clone)]
pub struct TabContext {
    pub rules: Arc<RuleSet>,
    pub registry: Arc<TabDirectory>,
    pub zoom_out_scale: f32,
}

/// A browser tab
pub struct Tab {
    identifier: TabIdentifier,
    handle: TabHandle,
    opened_by: Option<TabIdentifier>,
    context: TabContext,
    backend: Box<dyn RenderingBackend>,
    classifier: SecurityClassifier,
    applicable_rules: ApplicableRules,
    url: Option<Url>,
    progress: f32,
    zoom_scale: f32,
    load_error: Option<String>,
    observers: Vec<SecurityObserver>,
}

impl Tab {
    /// Create a tab, register it, and record its opener if it has one.
    ///
    /// The opener is fixed here and can never be changed afterwards.
    pub fn open(
        context: TabContext,
        backend: Box<dyn RenderingBackend>,
        opened_by: Option<TabIdentifier>,
    ) -> Result<SharedTab> {
        let registry = Arc::clone(&context.registry);
        let opener = opened_by.clone();
        let tab = registry.register_with(move |registration| {
            Mutex::new(Tab::new(registration, opener, context, backend))
        })?;

        if let Some(parent) = &opened_by {
            let identifier = lock_tab(&tab).identifier.clone();
            registry.record_opener(&identifier, parent)?;
        }
        Ok(tab)
    }

    fn new(
        registration: &Registration,
        opened_by: Option<TabIdentifier>,
        context: TabContext,
        mut backend: Box<dyn RenderingBackend>,
    ) -> Self {
        // The bridge is bound once, independently of any navigation.
        backend.inject_script(&bootstrap_script(&registration.identifier));
        log::info!(
            "Opened tab #{}{}",
            registration.handle.value(),
            if opened_by.is_some() { " (opened by script)" } else { "" }
        );

        Self {
            identifier: registration.identifier.clone(),
            handle: registration.handle,
            opened_by,
            context,
            backend,
            classifier: SecurityClassifier::new(),
            applicable_rules: ApplicableRules::default(),
            url: None,
            progress: 0.0,
            zoom_scale: NORMAL_ZOOM_SCALE,
            load_error: None,
            observers: Vec::new(),
        }
    }

    pub fn identifier(&self) -> &TabIdentifier {
        &self.identifier
    }

    pub fn handle(&self) -> TabHandle {
        self.handle
    }

    /// The tab whose script opened this one
    pub fn opened_by(&self) -> Option<&TabIdentifier> {
        self.opened_by.as_ref()
    }

    /// The committed (post-rewrite) URL
    pub fn url(&self) -> Option<&Url> {
        self.url.as_ref()
    }

    pub fn security_level(&self) -> SecurityLevel {
        self.classifier.level()
    }

    pub fn ev_organization_name(&self) -> Option<String> {
        self.classifier.level().ev_organization().map(str::to_string)
    }

    pub fn applicable_rules(&self) -> &ApplicableRules {
        &self.applicable_rules
    }

    /// Whether the current load is still waiting for certificate validation
    pub fn is_provisional(&self) -> bool {
        self.classifier.is_provisional()
    }

    /// Generation of the load in progress
    pub fn generation(&self) -> Generation {
        self.classifier.generation()
    }

    /// Load progress in `0.0..=1.0`
    pub fn progress(&self) -> f32 {
        self.progress
    }

    /// Why the current load was aborted, if it was
    pub fn load_error(&self) -> Option<&str> {
        self.load_error.as_deref()
    }

    /// Subscribe to security level changes; called synchronously on change
    pub fn on_security_change(&mut self, observer: SecurityObserver) {
        self.observers.push(observer);
    }

    /// Navigate to `url`, rewriting it first if a rule says so.
    ///
    /// Returns the generation the renderer must stamp this load's events with.
    pub fn load(&mut self, url: &Url) -> Generation {
        let evaluation = RuleEngine::evaluate(&self.context.rules, url);
        self.applicable_rules = evaluation.applicable_rules();
        let target = evaluation.effective_url(url);
        if evaluation.rewritten.is_some() {
            log::info!("Tab #{}: upgraded {} -> {}", self.handle.value(), url, target);
        }
        self.begin(target, true)
    }

    /// Navigate to user input, assuming `http://` when no scheme is given
    pub fn load_input(&mut self, input: &str) -> Result<Generation> {
        let input = input.trim();
        let url = match Url::parse(input) {
            Ok(url) if INPUT_SCHEMES.contains(&url.scheme()) => url,
            // `host:port/path` parses with the host as its scheme
            Ok(_) | Err(url::ParseError::RelativeUrlWithoutBase) => {
                Url::parse(&format!("http://{input}"))?
            }
            Err(e) => return Err(e.into()),
        };
        Ok(self.load(&url))
    }

    /// The renderer began a navigation on its own (link, form, redirect).
    ///
    /// If a rule rewrites the URL the tab re-issues the load itself.
    pub fn navigation_started(&mut self, url: &Url) -> Generation {
        let evaluation = RuleEngine::evaluate(&self.context.rules, url);
        self.applicable_rules = evaluation.applicable_rules();
        match evaluation.rewritten {
            Some(target) => self.begin(target, true),
            None => self.begin(url.clone(), false),
        }
    }

    fn begin(&mut self, target: Url, dispatch: bool) -> Generation {
        let before = self.classifier.level();
        let generation = self.classifier.navigation_started(&target);
        self.url = Some(target.clone());
        self.progress = 0.0;
        self.load_error = None;

        let after = self.classifier.level();
        if after != before {
            self.publish(&after);
        }
        if dispatch {
            self.backend.load(&target, generation);
        }
        generation
    }

    /// Rewrite an outgoing subresource request. Does not touch the tab's
    /// applicable rules.
    pub fn intercept_request(&self, url: &Url) -> Url {
        RuleEngine::evaluate(&self.context.rules, url).effective_url(url)
    }

    /// Feed one renderer event.
    ///
    /// A certificate failure aborts the load, stops the renderer, and is
    /// returned so the caller can show it as a load failure.
    pub fn handle_event(&mut self, event: RendererEvent) -> Result<()> {
        match event {
            RendererEvent::CertificateValidated { generation, result } => {
                self.apply_security(generation, SecurityEvent::CertificateValidated(result))
            }
            RendererEvent::SubresourceLoaded { generation, url } => {
                self.apply_security(generation, SecurityEvent::SubresourceLoaded(url))
            }
            RendererEvent::ProgressChanged {
                generation,
                fraction,
            } => {
                if generation == self.classifier.generation()
                    && !self.classifier.is_aborted()
                    && !fraction.is_nan()
                {
                    self.progress = fraction.clamp(0.0, 1.0);
                }
                Ok(())
            }
            RendererEvent::HistoryChanged => {
                log::debug!(
                    "Tab #{} history changed (back: {}, forward: {})",
                    self.handle.value(),
                    self.backend.can_go_back(),
                    self.backend.can_go_forward()
                );
                Ok(())
            }
        }
    }

    fn apply_security(&mut self, generation: Generation, event: SecurityEvent) -> Result<()> {
        match self.classifier.apply(generation, event) {
            Ok(Some(level)) => {
                self.publish(&level);
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(err) => {
                self.load_error = Some(err.to_string());
                self.progress = 0.0;
                self.backend.stop_loading();
                Err(err)
            }
        }
    }

    fn publish(&self, level: &SecurityLevel) {
        for observer in &self.observers {
            observer(level);
        }
    }

    pub fn can_go_back(&self) -> bool {
        self.backend.can_go_back()
    }

    pub fn can_go_forward(&self) -> bool {
        self.backend.can_go_forward()
    }

    pub fn go_back(&mut self) {
        self.backend.go_back();
    }

    pub fn go_forward(&mut self) {
        self.backend.go_forward();
    }

    pub fn reload(&mut self) {
        self.backend.reload();
    }

    /// Shrink the page to the fixed reduced scale
    pub fn zoom_out(&mut self) {
        self.set_zoom(self.context.zoom_out_scale);
    }

    /// Restore the natural 1.0 scale
    pub fn zoom_normal(&mut self) {
        self.set_zoom(NORMAL_ZOOM_SCALE);
    }

    fn set_zoom(&mut self, scale: f32) {
        self.zoom_scale = scale;
        self.backend.set_zoom_scale(scale);
    }

    pub fn zoom_scale(&self) -> f32 {
        self.zoom_scale
    }

    pub fn is_zoomed_out(&self) -> bool {
        self.zoom_scale < NORMAL_ZOOM_SCALE
    }
}

impl Drop for Tab {
    // Tabs dropped without going through `Session::close_tab`
    fn drop(&mut self) {
        self.context.registry.remove(self.identifier.as_str());
    }
}
