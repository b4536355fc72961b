//! Bootstrap script injected into every page
//!
//! The script is fixed; its only per-tab content is the tab's own
//! identifier, embedded as a JSON string literal. It installs
//! `window.__endless` and routes `window.open`, `window.close` and console
//! output through the native message handler.

use serde_json::Value;

use super::identifier::TabIdentifier;

/// Name of the native message handler the script posts to
pub const MESSAGE_HANDLER: &str = "endless";

const IDENTIFIER_PLACEHOLDER: &str = "__ENDLESS_TAB_IDENTIFIER__";

const BOOTSTRAP_TEMPLATE: &str = r#"(function () {
  "use strict";
  if (window.__endless) { return; }

  var tabIdentifier = __ENDLESS_TAB_IDENTIFIER__;
  var handler = window.webkit && window.webkit.messageHandlers &&
    window.webkit.messageHandlers.endless;

  function post(payload) {
    if (!handler) { return; }
    handler.postMessage(JSON.stringify({ tabIdentifier: tabIdentifier, payload: payload }));
  }

  Object.defineProperty(window, "__endless", {
    value: Object.freeze({ tabIdentifier: tabIdentifier, send: post }),
    writable: false,
    configurable: false
  });

  window.open = function (url) {
    post({ action: "open", url: String(new URL(url, document.baseURI)) });
    return null;
  };

  window.close = function () {
    post({ action: "close" });
  };

  ["log", "info", "warn", "error", "debug"].forEach(function (level) {
    var original = console[level];
    console[level] = function () {
      var parts = Array.prototype.map.call(arguments, String);
      post({ action: "log", level: level, message: parts.join(" ") });
      if (original) { original.apply(console, arguments); }
    };
  });
})();
"#;

/// Render the bootstrap script for one tab
pub fn bootstrap_script(identifier: &TabIdentifier) -> String {
    let literal = Value::from(identifier.as_str()).to_string();
    BOOTSTRAP_TEMPLATE.replace(IDENTIFIER_PLACEHOLDER, &literal)
}
