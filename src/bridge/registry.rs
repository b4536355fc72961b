//! Process-wide tab directory
//!
//! Maps opaque [`TabIdentifier`]s to live tabs without owning them, hands
//! out small numeric handles for UI ordering, and records which tab opened
//! which. All state sits behind one mutex so a lookup racing a removal sees
//! either the whole entry or nothing.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use super::identifier::{IdentifierSource, RandomIdentifiers, TabIdentifier};
use crate::utils::{Result, SessionError};

/// Upper bound on identifier draws before giving up on a broken source
const MAX_MINT_ATTEMPTS: usize = 16;

/// Small ordinal unique among live tabs; reused after a tab closes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TabHandle(u32);

impl TabHandle {
    pub fn value(self) -> u32 {
        self.0
    }
}

/// What a tab receives when it is registered
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub identifier: TabIdentifier,
    pub handle: TabHandle,
}

struct Entry<T> {
    tab: Weak<T>,
    handle: TabHandle,
    /// False while the tab is still being built
    attached: bool,
}

impl<T> Entry<T> {
    fn is_dead(&self) -> bool {
        self.attached && self.tab.strong_count() == 0
    }
}

struct Inner<T> {
    live: HashMap<TabIdentifier, Entry<T>>,
    /// Every identifier ever issued, so none is reused
    minted: HashSet<TabIdentifier>,
    /// child -> opener, kept after either side closes
    openers: HashMap<TabIdentifier, TabIdentifier>,
    torn_down: bool,
}

impl<T> Inner<T> {
    /// Drop entries whose tab went away without being removed
    fn prune(&mut self) {
        let before = self.live.len();
        self.live.retain(|_, entry| !entry.is_dead());
        let pruned = before - self.live.len();
        if pruned > 0 {
            log::debug!("Pruned {} dead registry entries", pruned);
        }
    }

    fn free_handle(&self) -> TabHandle {
        let used: BTreeSet<u32> = self.live.values().map(|e| e.handle.0).collect();
        let mut candidate = 1;
        for value in used {
            if value != candidate {
                break;
            }
            candidate += 1;
        }
        TabHandle(candidate)
    }

    fn ancestors(&self, identifier: &str) -> Vec<TabIdentifier> {
        let mut chain = Vec::new();
        let mut current = self.openers.get(identifier);
        while let Some(opener) = current {
            chain.push(opener.clone());
            current = self.openers.get(opener.as_str());
        }
        chain
    }
}

/// Non-owning directory of live tabs
pub struct TabRegistry<T> {
    source: Box<dyn IdentifierSource>,
    inner: Mutex<Inner<T>>,
}

impl<T> TabRegistry<T> {
    /// Registry minting identifiers from the system CSPRNG
    pub fn new() -> Self {
        Self::with_source(Box::new(RandomIdentifiers::default()))
    }

    pub fn with_source(source: Box<dyn IdentifierSource>) -> Self {
        Self {
            source,
            inner: Mutex::new(Inner {
                live: HashMap::new(),
                minted: HashSet::new(),
                openers: HashMap::new(),
                torn_down: false,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mint an identifier and reserve a handle for a tab not built yet.
    /// The entry resolves to nothing until [`Self::attach`] is called.
    fn reserve(&self) -> Result<Registration> {
        let mut inner = self.lock();
        if inner.torn_down {
            return Err(SessionError::TornDown);
        }
        inner.prune();

        for _ in 0..MAX_MINT_ATTEMPTS {
            let identifier = self.source.next_identifier()?;
            if inner.minted.contains(&identifier) {
                log::warn!("Tab identifier collision, drawing again");
                continue;
            }

            let handle = inner.free_handle();
            inner.minted.insert(identifier.clone());
            inner.live.insert(
                identifier.clone(),
                Entry {
                    tab: Weak::new(),
                    handle,
                    attached: false,
                },
            );
            return Ok(Registration { identifier, handle });
        }

        log::error!("Identifier source keeps repeating itself");
        Err(SessionError::RandomUnavailable)
    }

    fn attach(&self, identifier: &TabIdentifier, tab: &Arc<T>) {
        if let Some(entry) = self.lock().live.get_mut(identifier.as_str()) {
            entry.tab = Arc::downgrade(tab);
            entry.attached = true;
        }
    }

    /// Register an existing tab under a freshly minted identifier
    pub fn register(&self, tab: &Arc<T>) -> Result<Registration> {
        let registration = self.reserve()?;
        self.attach(&registration.identifier, tab);
        log::debug!(
            "Registered tab #{} as {}",
            registration.handle.0,
            registration.identifier
        );
        Ok(registration)
    }

    /// Build and register a tab that needs its own identifier at construction.
    pub fn register_with<F>(&self, build: F) -> Result<Arc<T>>
    where
        F: FnOnce(&Registration) -> T,
    {
        let registration = self.reserve()?;
        // Built outside the lock: construction may call into the renderer.
        let tab = Arc::new(build(&registration));
        self.attach(&registration.identifier, &tab);
        log::debug!(
            "Registered tab #{} as {}",
            registration.handle.0,
            registration.identifier
        );
        Ok(tab)
    }

    /// Resolve an identifier to its live tab. `None` means the tab closed.
    pub fn lookup(&self, identifier: &str) -> Option<Arc<T>> {
        self.lock().live.get(identifier)?.tab.upgrade()
    }

    /// Remove a tab's entry. Returns whether it was live.
    pub fn remove(&self, identifier: &str) -> bool {
        let removed = self.lock().live.remove(identifier).is_some();
        if removed {
            log::debug!("Removed tab {} from registry", identifier);
        }
        removed
    }

    /// Record that `parent` opened `child`. Write-once per child.
    pub fn record_opener(&self, child: &TabIdentifier, parent: &TabIdentifier) -> Result<()> {
        let mut inner = self.lock();

        if !inner.live.contains_key(child.as_str()) {
            return Err(SessionError::UnknownTab(child.to_string()));
        }
        if !inner.minted.contains(parent.as_str()) {
            return Err(SessionError::UnknownTab(parent.to_string()));
        }
        if inner.openers.contains_key(child.as_str()) {
            log::error!("Refusing to overwrite opener of tab {}", child);
            return Err(SessionError::AlreadySet {
                child: child.to_string(),
            });
        }
        if child == parent || inner.ancestors(parent.as_str()).contains(child) {
            log::error!("Refusing opener {} for its own ancestor {}", parent, child);
            return Err(SessionError::LineageCycle {
                child: child.to_string(),
                parent: parent.to_string(),
            });
        }

        inner.openers.insert(child.clone(), parent.clone());
        Ok(())
    }

    /// The tab that opened `identifier`, even if it has since closed
    pub fn opener_of(&self, identifier: &str) -> Option<TabIdentifier> {
        self.lock().openers.get(identifier).cloned()
    }

    /// Openers from the direct one up to the root
    pub fn ancestors(&self, identifier: &str) -> Vec<TabIdentifier> {
        self.lock().ancestors(identifier)
    }

    /// Tabs opened by `identifier`, live or not
    pub fn children_of(&self, identifier: &str) -> Vec<TabIdentifier> {
        let inner = self.lock();
        let mut children: Vec<_> = inner
            .openers
            .iter()
            .filter(|(_, opener)| opener.as_str() == identifier)
            .map(|(child, _)| child.clone())
            .collect();
        children.sort();
        children
    }

    /// Identifiers of live tabs, ordered by handle
    pub fn identifiers(&self) -> Vec<TabIdentifier> {
        let inner = self.lock();
        let mut entries: Vec<_> = inner
            .live
            .iter()
            .filter(|(_, entry)| entry.tab.strong_count() > 0)
            .map(|(id, entry)| (entry.handle, id.clone()))
            .collect();
        entries.sort();
        entries.into_iter().map(|(_, id)| id).collect()
    }

    pub fn live_count(&self) -> usize {
        self.lock()
            .live
            .values()
            .filter(|entry| entry.tab.strong_count() > 0)
            .count()
    }

    /// Drop every entry and refuse further registrations. Returns how many
    /// entries were live.
    pub fn teardown(&self) -> usize {
        let mut inner = self.lock();
        inner.torn_down = true;
        let count = inner.live.len();
        inner.live.clear();
        log::info!("Tab registry torn down ({} entries)", count);
        count
    }
}

impl<T> Default for TabRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    /// Fabricated tab for registry tests
    #[derive(Debug, PartialEq)]
    struct FakeTab(&'static str);

    /// Yields a fixed script of identifiers
    struct Scripted {
        ids: Vec<&'static str>,
        next: AtomicUsize,
    }

    impl IdentifierSource for Scripted {
        fn next_identifier(&self) -> Result<TabIdentifier> {
            let i = self.next.fetch_add(1, Ordering::SeqCst);
            Ok(TabIdentifier::new(self.ids[i % self.ids.len()]))
        }
    }

    fn scripted(ids: Vec<&'static str>) -> TabRegistry<FakeTab> {
        TabRegistry::with_source(Box::new(Scripted {
            ids,
            next: AtomicUsize::new(0),
        }))
    }

    #[test]
    fn test_lookup_after_register() {
        let registry = TabRegistry::new();
        let tab = Arc::new(FakeTab("a"));
        let reg = registry.register(&tab).unwrap();

        let found = registry.lookup(reg.identifier.as_str()).unwrap();
        assert!(Arc::ptr_eq(&found, &tab));
        assert_eq!(registry.live_count(), 1);
    }

    #[test]
    fn test_lookup_after_remove_is_none() {
        let registry = TabRegistry::new();
        let tab = Arc::new(FakeTab("a"));
        let reg = registry.register(&tab).unwrap();

        assert!(registry.remove(reg.identifier.as_str()));
        assert!(registry.lookup(reg.identifier.as_str()).is_none());
        assert!(!registry.remove(reg.identifier.as_str()));
    }

    #[test]
    fn test_registry_does_not_own_tabs() {
        let registry = TabRegistry::new();
        let reg = {
            let tab = Arc::new(FakeTab("short-lived"));
            registry.register(&tab).unwrap()
        };
        assert!(registry.lookup(reg.identifier.as_str()).is_none());
        assert_eq!(registry.live_count(), 0);
    }

    #[test]
    fn test_dead_entry_releases_its_handle() {
        let registry = TabRegistry::new();
        let kept = Arc::new(FakeTab("kept"));
        assert_eq!(registry.register(&kept).unwrap().handle.value(), 1);
        {
            let dropped = Arc::new(FakeTab("dropped"));
            assert_eq!(registry.register(&dropped).unwrap().handle.value(), 2);
        }

        let next = Arc::new(FakeTab("next"));
        assert_eq!(registry.register(&next).unwrap().handle.value(), 2);
        assert_eq!(registry.identifiers().len(), 2);
    }

    #[test]
    fn test_unknown_identifier() {
        let registry: TabRegistry<FakeTab> = TabRegistry::new();
        assert!(registry.lookup("no-such-tab").is_none());
    }

    #[test]
    fn test_collision_retries() {
        let registry = scripted(vec!["dup", "dup", "fresh"]);
        let a = Arc::new(FakeTab("a"));
        let b = Arc::new(FakeTab("b"));
        assert_eq!(registry.register(&a).unwrap().identifier.as_str(), "dup");
        assert_eq!(registry.register(&b).unwrap().identifier.as_str(), "fresh");
    }

    #[test]
    fn test_identifiers_never_reused_after_close() {
        let registry = scripted(vec!["one", "one", "two"]);
        let a = Arc::new(FakeTab("a"));
        let reg = registry.register(&a).unwrap();
        registry.remove(reg.identifier.as_str());

        let b = Arc::new(FakeTab("b"));
        assert_eq!(registry.register(&b).unwrap().identifier.as_str(), "two");
    }

    #[test]
    fn test_broken_source_gives_up() {
        let registry = scripted(vec!["same"]);
        let a = Arc::new(FakeTab("a"));
        registry.register(&a).unwrap();
        let b = Arc::new(FakeTab("b"));
        assert!(matches!(
            registry.register(&b),
            Err(SessionError::RandomUnavailable)
        ));
    }

    #[test]
    fn test_handles_are_smallest_free() {
        let registry = TabRegistry::new();
        let tabs: Vec<_> = (0..3).map(|_| Arc::new(FakeTab("t"))).collect();
        let regs: Vec<_> = tabs.iter().map(|t| registry.register(t).unwrap()).collect();
        assert_eq!(
            regs.iter().map(|r| r.handle.value()).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );

        registry.remove(regs[1].identifier.as_str());
        let extra = Arc::new(FakeTab("extra"));
        assert_eq!(registry.register(&extra).unwrap().handle.value(), 2);
    }

    #[test]
    fn test_register_with_builds_from_registration() {
        let registry: TabRegistry<(String, u32)> = TabRegistry::new();
        let tab = registry
            .register_with(|reg| (reg.identifier.to_string(), reg.handle.value()))
            .unwrap();
        let found = registry.lookup(&tab.0).unwrap();
        assert_eq!(found.1, 1);
    }

    #[test]
    fn test_record_opener_is_write_once() {
        let registry = TabRegistry::new();
        let tabs: Vec<_> = (0..3).map(|_| Arc::new(FakeTab("t"))).collect();
        let ids: Vec<_> = tabs
            .iter()
            .map(|t| registry.register(t).unwrap().identifier)
            .collect();

        registry.record_opener(&ids[1], &ids[0]).unwrap();
        assert!(matches!(
            registry.record_opener(&ids[1], &ids[2]),
            Err(SessionError::AlreadySet { .. })
        ));
        assert_eq!(registry.opener_of(ids[1].as_str()), Some(ids[0].clone()));
    }

    #[test]
    fn test_record_opener_rejects_cycles() {
        let registry = TabRegistry::new();
        let tabs: Vec<_> = (0..2).map(|_| Arc::new(FakeTab("t"))).collect();
        let ids: Vec<_> = tabs
            .iter()
            .map(|t| registry.register(t).unwrap().identifier)
            .collect();

        assert!(matches!(
            registry.record_opener(&ids[0], &ids[0]),
            Err(SessionError::LineageCycle { .. })
        ));
        registry.record_opener(&ids[1], &ids[0]).unwrap();
        assert!(matches!(
            registry.record_opener(&ids[0], &ids[1]),
            Err(SessionError::LineageCycle { .. })
        ));
    }

    #[test]
    fn test_lineage_survives_opener_close() {
        let registry = TabRegistry::new();
        let root = Arc::new(FakeTab("root"));
        let child = Arc::new(FakeTab("child"));
        let grandchild = Arc::new(FakeTab("grandchild"));
        let r = registry.register(&root).unwrap().identifier;
        let c = registry.register(&child).unwrap().identifier;
        let g = registry.register(&grandchild).unwrap().identifier;
        registry.record_opener(&c, &r).unwrap();
        registry.record_opener(&g, &c).unwrap();

        registry.remove(r.as_str());
        assert_eq!(registry.opener_of(c.as_str()), Some(r.clone()));
        assert_eq!(registry.ancestors(g.as_str()), vec![c.clone(), r.clone()]);
        assert_eq!(registry.children_of(r.as_str()), vec![c]);
    }

    #[test]
    fn test_record_opener_requires_live_child() {
        let registry = TabRegistry::new();
        let parent = Arc::new(FakeTab("p"));
        let p = registry.register(&parent).unwrap().identifier;
        assert!(matches!(
            registry.record_opener(&TabIdentifier::new("ghost"), &p),
            Err(SessionError::UnknownTab(_))
        ));
    }

    #[test]
    fn test_teardown_refuses_new_tabs() {
        let registry = TabRegistry::new();
        let tab = Arc::new(FakeTab("a"));
        let reg = registry.register(&tab).unwrap();
        assert_eq!(registry.teardown(), 1);
        assert!(registry.lookup(reg.identifier.as_str()).is_none());
        assert!(matches!(
            registry.register(&tab),
            Err(SessionError::TornDown)
        ));
    }

    #[test]
    fn test_concurrent_lookup_and_remove() {
        let registry = Arc::new(TabRegistry::new());
        let tabs: Vec<_> = (0..64).map(|_| Arc::new(FakeTab("t"))).collect();
        let ids: Vec<_> = tabs
            .iter()
            .map(|t| registry.register(t).unwrap().identifier)
            .collect();

        let remover = {
            let registry = Arc::clone(&registry);
            let ids = ids.clone();
            thread::spawn(move || {
                for id in &ids {
                    registry.remove(id.as_str());
                }
            })
        };
        for id in &ids {
            // Either the whole tab or nothing
            if let Some(tab) = registry.lookup(id.as_str()) {
                assert_eq!(*tab, FakeTab("t"));
            }
        }
        remover.join().unwrap();
        assert_eq!(registry.live_count(), 0);
    }
}
