//! Session configuration
//!
//! Loaded from a JSON file. Every field has a default, so a missing or
//! partial file behaves like the built-in settings. Loading never fails:
//! problems are logged and the defaults are used instead.
//!
//! Search order: `ENDLESS_CONFIG` environment variable, then
//! `./endless.json`, then defaults.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::bridge::DEFAULT_IDENTIFIER_BYTES;

/// Natural page scale
pub const NORMAL_ZOOM_SCALE: f32 = 1.0;

/// Reduced scale used by `zoom_out`
pub const DEFAULT_ZOOM_OUT_SCALE: f32 = 0.8;

/// Below this the identifiers become guessable across origins
pub const MIN_IDENTIFIER_BYTES: usize = 8;

pub const DEFAULT_BRIDGE_QUEUE_CAPACITY: usize = 64;

const CONFIG_ENV: &str = "ENDLESS_CONFIG";
const CONFIG_FILE: &str = "endless.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// HTTPS-upgrade ruleset resource
    pub ruleset_path: PathBuf,
    pub zoom_out_scale: f32,
    /// Random bytes per tab identifier before encoding
    pub identifier_bytes: usize,
    pub bridge_queue_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ruleset_path: PathBuf::from("resources/https-rules.json"),
            zoom_out_scale: DEFAULT_ZOOM_OUT_SCALE,
            identifier_bytes: DEFAULT_IDENTIFIER_BYTES,
            bridge_queue_capacity: DEFAULT_BRIDGE_QUEUE_CAPACITY,
        }
    }
}

impl SessionConfig {
    /// Load from the standard locations
    pub fn load() -> Self {
        match find_config_path() {
            Some(path) => Self::load_from(&path),
            None => {
                log::info!("No session config found, using defaults");
                Self::default()
            }
        }
    }

    /// Load from an explicit path
    pub fn load_from(path: &Path) -> Self {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::info!("No session config at {}, using defaults", path.display());
                return Self::default();
            }
            Err(e) => {
                log::warn!("Cannot read {}: {}, using defaults", path.display(), e);
                return Self::default();
            }
        };

        match Self::from_json(&content) {
            Ok(config) => {
                log::info!("Session config loaded from {}", path.display());
                config
            }
            Err(e) => {
                log::warn!("Invalid session config {}: {}, using defaults", path.display(), e);
                Self::default()
            }
        }
    }

    /// Parse and validate
    pub fn from_json(source: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str::<Self>(source).map(Self::validated)
    }

    /// Replace out-of-range values with their defaults
    pub fn validated(mut self) -> Self {
        let defaults = Self::default();

        if !(self.zoom_out_scale > 0.0 && self.zoom_out_scale <= NORMAL_ZOOM_SCALE) {
            log::warn!(
                "zoom_out_scale {} outside (0, 1], using {}",
                self.zoom_out_scale,
                defaults.zoom_out_scale
            );
            self.zoom_out_scale = defaults.zoom_out_scale;
        }
        if self.identifier_bytes < MIN_IDENTIFIER_BYTES {
            log::warn!(
                "identifier_bytes {} below {}, using {}",
                self.identifier_bytes,
                MIN_IDENTIFIER_BYTES,
                defaults.identifier_bytes
            );
            self.identifier_bytes = defaults.identifier_bytes;
        }
        if self.bridge_queue_capacity == 0 {
            log::warn!("bridge_queue_capacity must be positive, using {}", defaults.bridge_queue_capacity);
            self.bridge_queue_capacity = defaults.bridge_queue_capacity;
        }
        self
    }
}

fn find_config_path() -> Option<PathBuf> {
    locate(std::env::var(CONFIG_ENV).ok(), Path::new(CONFIG_FILE))
}

/// First existing file of the explicit override and the fallback
fn locate(explicit: Option<String>, fallback: &Path) -> Option<PathBuf> {
    if let Some(path) = explicit {
        let p = PathBuf::from(path);
        if p.is_file() {
            return Some(p);
        }
        log::warn!("{} points at {}, which is not a file", CONFIG_ENV, p.display());
    }

    fallback.is_file().then(|| fallback.to_path_buf())
}
