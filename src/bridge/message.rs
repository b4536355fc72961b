//! Script-to-native messages

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::utils::{Result, SessionError};

/// One message posted by injected page script
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeMessage {
    /// Address of the sending tab
    pub tab_identifier: String,
    /// Opaque to the bridge; see [`ScriptAction`] for the known shapes
    #[serde(default)]
    pub payload: Value,
}

impl BridgeMessage {
    pub fn new(tab_identifier: impl Into<String>, payload: Value) -> Self {
        Self {
            tab_identifier: tab_identifier.into(),
            payload,
        }
    }

    /// Parse the JSON text posted by the bootstrap script
    pub fn parse(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| SessionError::Bridge(e.to_string()))
    }

    /// Interpret the payload
    pub fn action(&self) -> ScriptAction {
        match serde_json::from_value::<KnownAction>(self.payload.clone()) {
            Ok(KnownAction::Open { url }) => ScriptAction::Open { url },
            Ok(KnownAction::Close) => ScriptAction::Close,
            Ok(KnownAction::Log { level, message }) => ScriptAction::Log { level, message },
            Err(_) => ScriptAction::Other(self.payload.clone()),
        }
    }
}

/// Requests page script can make of its tab
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptAction {
    /// `window.open(url)`: open a child tab
    Open { url: String },
    /// `window.close()`: close the sending tab if script opened it
    Close,
    /// `console.*` output
    Log { level: String, message: String },
    /// Anything else, left to the application
    Other(Value),
}

#[derive(Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
enum KnownAction {
    Open {
        url: String,
    },
    Close,
    Log {
        #[serde(default = "default_log_level")]
        level: String,
        message: String,
    },
}

fn default_log_level() -> String {
    "log".to_string()
}
