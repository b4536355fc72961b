//! Script bridge between injected page script and native tabs
//!
//! - [`TabRegistry`]: non-owning directory from identifier to live tab,
//!   plus opener lineage
//! - [`BridgeMessage`] / [`ScriptAction`]: the wire message and its known
//!   payloads
//! - [`bootstrap_script`]: the one script injected into every page
//! - [`spawn_listener`]: tokio task delivering queued messages

mod identifier;
mod listener;
mod message;
mod registry;
mod script;

pub use identifier::{
    DEFAULT_IDENTIFIER_BYTES, IdentifierSource, RandomIdentifiers, TabIdentifier,
};
pub use listener::{BridgeSender, spawn_listener};
pub use message::{BridgeMessage, ScriptAction};
pub use registry::{Registration, TabHandle, TabRegistry};
pub use script::{MESSAGE_HANDLER, bootstrap_script};

use std::sync::Arc;

/// Resolve the addressee of a message. Unknown or closed tabs yield `None`;
/// the message is then dropped without telling the page.
pub fn resolve<T>(registry: &TabRegistry<T>, message: &BridgeMessage) -> Option<Arc<T>> {
    let tab = registry.lookup(&message.tab_identifier);
    if tab.is_none() {
        log::debug!("Dropping script message for a closed or unknown tab");
    }
    tab
}
