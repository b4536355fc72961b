//! Browsing session: the set of open tabs and the services they share
//!
//! A [`Session`] is created once at application start with [`Session::init`]
//! and dismantled with [`Session::teardown`]. It owns the tabs, shares the
//! ruleset and the [`TabDirectory`] with them, and turns script bridge
//! messages into tab operations.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;
use tokio::task::JoinHandle;
use url::Url;

use crate::bridge::{
    self, BridgeMessage, BridgeSender, RandomIdentifiers, ScriptAction, TabIdentifier, TabRegistry,
};
use crate::config::SessionConfig;
use crate::rules::RuleSet;
use crate::tab::{RenderingBackend, SharedTab, Tab, TabContext, TabDirectory, lock_tab};
use crate::utils::{Result, SessionError};

/// Creates the renderer for each new tab
pub type BackendFactory = Box<dyn Fn() -> Box<dyn RenderingBackend> + Send + Sync>;

/// Receives script payloads the session does not interpret itself
pub type ScriptHandler = Box<dyn Fn(&TabIdentifier, &Value) + Send + Sync>;

pub struct Session {
    config: SessionConfig,
    context: TabContext,
    backends: BackendFactory,
    tabs: Mutex<HashMap<TabIdentifier, SharedTab>>,
    script_handler: Option<ScriptHandler>,
}

impl Session {
    /// Load the ruleset named by `config` and start an empty session.
    ///
    /// A ruleset that cannot be loaded is fatal.
    pub fn init(config: SessionConfig, backends: BackendFactory) -> Result<Self> {
        let rules = RuleSet::load(&config.ruleset_path)?;
        Ok(Self::with_rules(config, rules, backends))
    }

    /// Start a session over an already loaded ruleset
    pub fn with_rules(config: SessionConfig, rules: RuleSet, backends: BackendFactory) -> Self {
        let registry = TabRegistry::with_source(Box::new(RandomIdentifiers::new(config.identifier_bytes)));
        log::info!("Session started with {} HTTPS rule(s)", rules.len());

        Self {
            context: TabContext {
                rules: Arc::new(rules),
                registry: Arc::new(registry),
                zoom_out_scale: config.zoom_out_scale,
            },
            config,
            backends,
            tabs: Mutex::new(HashMap::new()),
            script_handler: None,
        }
    }

    pub fn set_script_handler(&mut self, handler: ScriptHandler) {
        self.script_handler = Some(handler);
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn rules(&self) -> &Arc<RuleSet> {
        &self.context.rules
    }

    pub fn registry(&self) -> &Arc<TabDirectory> {
        &self.context.registry
    }

    fn tabs(&self) -> MutexGuard<'_, HashMap<TabIdentifier, SharedTab>> {
        self.tabs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn insert(&self, opened_by: Option<TabIdentifier>) -> Result<SharedTab> {
        let tab = Tab::open(self.context.clone(), (self.backends)(), opened_by)?;
        let identifier = lock_tab(&tab).identifier().clone();
        self.tabs().insert(identifier, Arc::clone(&tab));
        Ok(tab)
    }

    /// Open a blank tab
    pub fn open_tab(&self) -> Result<SharedTab> {
        self.insert(None)
    }

    /// Open a tab and start loading `url` in it
    pub fn open_tab_at(&self, url: &Url) -> Result<SharedTab> {
        let tab = self.open_tab()?;
        lock_tab(&tab).load(url);
        Ok(tab)
    }

    /// Open a tab on behalf of script running in `opener`
    pub fn open_child(&self, opener: &TabIdentifier) -> Result<SharedTab> {
        self.insert(Some(opener.clone()))
    }

    /// Close a tab. Returns whether it was open.
    ///
    /// The tab stops resolving for script messages immediately, even while
    /// other handles to it are still held.
    pub fn close_tab(&self, identifier: &str) -> bool {
        let removed = self.tabs().remove(identifier);
        match removed {
            Some(tab) => {
                self.context.registry.remove(identifier);
                log::info!("Closing tab #{}", lock_tab(&tab).handle().value());
                drop(tab);
                true
            }
            None => false,
        }
    }

    pub fn tab(&self, identifier: &str) -> Option<SharedTab> {
        self.tabs().get(identifier).cloned()
    }

    pub fn tab_count(&self) -> usize {
        self.tabs().len()
    }

    /// Open tabs ordered by handle
    pub fn identifiers(&self) -> Vec<TabIdentifier> {
        self.context.registry.identifiers()
    }

    /// Entry point for raw JSON posted by the bootstrap script
    pub fn deliver(&self, raw: &str) {
        let message = match BridgeMessage::parse(raw) {
            Ok(message) => message,
            Err(e) => {
                log::warn!("Malformed script message: {}", e);
                return;
            }
        };
        if let Err(e) = self.dispatch(&message) {
            log::warn!("Script message failed: {}", e);
        }
    }

    /// Route a message to its tab and act on it. Messages for unknown or
    /// closed tabs are dropped without error.
    pub fn dispatch(&self, message: &BridgeMessage) -> Result<()> {
        let Some(tab) = bridge::resolve(&self.context.registry, message) else {
            return Ok(());
        };
        let (sender, script_opened) = {
            let tab = lock_tab(&tab);
            (tab.identifier().clone(), tab.opened_by().is_some())
        };
        drop(tab);

        match message.action() {
            ScriptAction::Open { url } => {
                let url = match Url::parse(&url) {
                    Ok(parsed) if is_openable(&parsed) => parsed,
                    _ => {
                        log::warn!("Refusing window.open() of {:?} from tab {}", url, sender);
                        return Err(SessionError::InvalidUrl(url));
                    }
                };
                let child = self.open_child(&sender)?;
                lock_tab(&child).load(&url);
                Ok(())
            }
            ScriptAction::Close => {
                if script_opened {
                    self.close_tab(sender.as_str());
                } else {
                    log::debug!("Ignoring window.close() from a tab the user opened");
                }
                Ok(())
            }
            ScriptAction::Log { level, message } => {
                log::debug!("[console.{}] {}", level, message);
                Ok(())
            }
            ScriptAction::Other(payload) => {
                match &self.script_handler {
                    Some(handler) => handler(&sender, &payload),
                    None => log::debug!("No handler for script payload from {}", sender),
                }
                Ok(())
            }
        }
    }

    /// Start the background task that delivers queued script messages.
    /// Must be called from inside a tokio runtime.
    pub fn spawn_bridge(self: &Arc<Self>) -> (BridgeSender, JoinHandle<usize>) {
        let session = Arc::clone(self);
        bridge::spawn_listener(self.config.bridge_queue_capacity, move |raw| session.deliver(raw))
    }

    /// Close every tab and retire the registry. Returns how many tabs were
    /// open.
    pub fn teardown(&self) -> usize {
        let tabs: Vec<SharedTab> = self.tabs().drain().map(|(_, tab)| tab).collect();
        self.context.registry.teardown();
        let count = tabs.len();
        drop(tabs);
        log::info!("Session torn down, {} tab(s) closed", count);
        count
    }
}

/// Page script may only open web pages or a blank tab
fn is_openable(url: &Url) -> bool {
    matches!(url.scheme(), "http" | "https") || url.as_str() == "about:blank"
}
