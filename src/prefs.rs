//! Remembered user preferences (the last selected viewport width)

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use log::debug;
use serde_json::Value;

use crate::{CaptureError, Result};

pub const SELECTED_VIEWPORT_KEY: &str = "selectedViewport";

/// Viewport width used when nothing has been remembered yet
pub const DEFAULT_VIEWPORT_WIDTH: u32 = 1440;

/// Simple key/value store for preferences
pub trait PreferenceStore: Send + Sync {
    fn load(&self, key: &str) -> Result<Option<Value>>;
    fn persist(&self, key: &str, value: Value) -> Result<()>;
}

/// In-memory store, mostly for tests
#[derive(Debug, Default)]
pub struct MemoryPreferenceStore {
    values: Mutex<HashMap<String, Value>>,
}

impl MemoryPreferenceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PreferenceStore for MemoryPreferenceStore {
    fn load(&self, key: &str) -> Result<Option<Value>> {
        let values = self
            .values
            .lock()
            .map_err(|e| CaptureError::Preference(e.to_string()))?;
        Ok(values.get(key).cloned())
    }

    fn persist(&self, key: &str, value: Value) -> Result<()> {
        let mut values = self
            .values
            .lock()
            .map_err(|e| CaptureError::Preference(e.to_string()))?;
        values.insert(key.to_string(), value);
        Ok(())
    }
}

/// Preferences kept as a JSON object in a single file
#[derive(Debug)]
pub struct JsonFilePreferenceStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFilePreferenceStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    fn read_all(&self) -> Result<serde_json::Map<String, Value>> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Default::default()),
            Err(e) => return Err(CaptureError::Preference(format!("{}: {}", self.path.display(), e))),
        };
        match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) | Err(_) => {
                debug!("ignoring malformed preferences file {}", self.path.display());
                Ok(Default::default())
            }
        }
    }
}

impl PreferenceStore for JsonFilePreferenceStore {
    fn load(&self, key: &str) -> Result<Option<Value>> {
        let _g = self.lock.lock().map_err(|e| CaptureError::Preference(e.to_string()))?;
        Ok(self.read_all()?.remove(key))
    }

    fn persist(&self, key: &str, value: Value) -> Result<()> {
        let _g = self.lock.lock().map_err(|e| CaptureError::Preference(e.to_string()))?;
        let mut map = self.read_all()?;
        map.insert(key.to_string(), value);
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| CaptureError::Preference(format!("{}: {}", parent.display(), e)))?;
            }
        }
        let json = serde_json::to_string_pretty(&Value::Object(map))
            .map_err(|e| CaptureError::Preference(e.to_string()))?;
        std::fs::write(&self.path, json)
            .map_err(|e| CaptureError::Preference(format!("{}: {}", self.path.display(), e)))
    }
}

/// Last selected viewport width, or [`DEFAULT_VIEWPORT_WIDTH`]
pub fn load_viewport_width(store: &dyn PreferenceStore) -> u32 {
    match store.load(SELECTED_VIEWPORT_KEY) {
        Ok(Some(v)) => v
            .as_u64()
            .and_then(|w| u32::try_from(w).ok())
            .filter(|w| *w > 0)
            .unwrap_or(DEFAULT_VIEWPORT_WIDTH),
        Ok(None) => DEFAULT_VIEWPORT_WIDTH,
        Err(e) => {
            debug!("No saved settings found: {}", e);
            DEFAULT_VIEWPORT_WIDTH
        }
    }
}

pub fn save_viewport_width(store: &dyn PreferenceStore, width: u32) -> Result<()> {
    store.persist(SELECTED_VIEWPORT_KEY, Value::from(width))
}
