use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("mission store {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("mission store is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("mission store root is not an object")]
    NotObject,
    #[error("mission store unavailable")]
    Unavailable,
}

/// Opaque JSON document store.
pub trait KeyValueStore {
    /// Makes sure a document exists; a missing one is created empty.
    fn begin(&mut self) -> Result<(), ConfigError>;
    fn load(&self) -> Result<Value, ConfigError>;
    fn save(&mut self, doc: &Value) -> Result<(), ConfigError>;
}

#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_err(&self, source: std::io::Error) -> ConfigError {
        ConfigError::Io { path: self.path.display().to_string(), source }
    }
}

impl KeyValueStore for JsonFileStore {
    fn begin(&mut self) -> Result<(), ConfigError> {
        if !self.path.exists() {
            fs::write(&self.path, "{}").map_err(|e| self.io_err(e))?;
            info!("mission: created empty store {}", self.path.display());
        }
        Ok(())
    }

    fn load(&self) -> Result<Value, ConfigError> {
        let text = fs::read_to_string(&self.path).map_err(|e| self.io_err(e))?;
        Ok(serde_json::from_str(&text)?)
    }

    fn save(&mut self, doc: &Value) -> Result<(), ConfigError> {
        let text = serde_json::to_string_pretty(doc)?;
        fs::write(&self.path, text).map_err(|e| self.io_err(e))
    }
}

/// In-memory store. `None` behaves like an unreadable document.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    doc: Option<Value>,
}

impl MemoryStore {
    pub fn new(doc: Value) -> Self {
        Self { doc: Some(doc) }
    }

    pub fn unreadable() -> Self {
        Self { doc: None }
    }

    pub fn set(&mut self, doc: Option<Value>) {
        self.doc = doc;
    }
}

impl KeyValueStore for MemoryStore {
    fn begin(&mut self) -> Result<(), ConfigError> {
        Ok(())
    }

    fn load(&self) -> Result<Value, ConfigError> {
        self.doc.clone().ok_or(ConfigError::Unavailable)
    }

    fn save(&mut self, doc: &Value) -> Result<(), ConfigError> {
        self.doc = Some(doc.clone());
        Ok(())
    }
}

/// Mission settings the controller reads through the store. Serializes
/// with the store's key names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MissionConfig {
    pub time_kill_min: u32,
    pub satcom_verified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callsign: Option<String>,
    #[serde(rename = "balloonType", skip_serializing_if = "Option::is_none")]
    pub balloon_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub telemetry_interval_s: Option<u32>,
}

impl MissionConfig {
    /// Reads known keys out of a store document. Missing or mistyped keys
    /// fall back to their defaults; only a non-object root is an error.
    pub fn from_doc(doc: &Value) -> Result<Self, ConfigError> {
        let obj = doc.as_object().ok_or(ConfigError::NotObject)?;
        let u32_key = |k: &str| {
            obj.get(k)
                .and_then(Value::as_u64)
                .map(|v| v.min(u32::MAX as u64) as u32)
        };
        let str_key = |k: &str| obj.get(k).and_then(Value::as_str).map(str::to_string);
        // `link_verified` is accepted when the portal key is absent
        let verified = obj.get("satcom_verified").or_else(|| obj.get("link_verified"));

        Ok(Self {
            time_kill_min: u32_key("time_kill_min").unwrap_or(0),
            satcom_verified: verified.and_then(Value::as_bool).unwrap_or(false),
            callsign: str_key("callsign"),
            balloon_type: str_key("balloonType"),
            telemetry_interval_s: u32_key("telemetry_interval_s"),
        })
    }

    pub fn time_kill_ms(&self) -> u32 {
        self.time_kill_min.saturating_mul(60_000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn begin_creates_empty_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mission_active.json");
        let mut store = JsonFileStore::new(&path);
        store.begin().unwrap();
        assert_eq!(store.load().unwrap(), json!({}));

        // existing content survives a second begin
        store.save(&json!({"time_kill_min": 90})).unwrap();
        store.begin().unwrap();
        assert_eq!(store.load().unwrap()["time_kill_min"], 90);
    }

    #[test]
    fn corrupt_file_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.json");
        std::fs::write(&path, "{ not json").unwrap();
        let store = JsonFileStore::new(&path);
        assert!(matches!(store.load(), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("absent.json"));
        assert!(matches!(store.load(), Err(ConfigError::Io { .. })));
    }

    #[test]
    fn reads_known_keys() {
        let doc = json!({
            "time_kill_min": 120,
            "satcom_verified": true,
            "callsign": "KD0XYZ",
            "balloonType": "SABER-ZP",
            "unrelated": [1, 2, 3]
        });
        let cfg = MissionConfig::from_doc(&doc).unwrap();
        assert_eq!(cfg.time_kill_min, 120);
        assert_eq!(cfg.time_kill_ms(), 7_200_000);
        assert!(cfg.satcom_verified);
        assert_eq!(cfg.callsign.as_deref(), Some("KD0XYZ"));
        assert_eq!(cfg.balloon_type.as_deref(), Some("SABER-ZP"));
        assert_eq!(cfg.telemetry_interval_s, None);
    }

    #[test]
    fn mistyped_keys_default() {
        let cfg = MissionConfig::from_doc(&json!({"time_kill_min": "ten", "satcom_verified": 1})).unwrap();
        assert_eq!(cfg, MissionConfig::default());
        assert!(matches!(MissionConfig::from_doc(&json!([1])), Err(ConfigError::NotObject)));
    }

    #[test]
    fn link_verified_is_read_as_fallback() {
        let cfg = MissionConfig::from_doc(&json!({"link_verified": true})).unwrap();
        assert!(cfg.satcom_verified);
        // the portal key wins when both are present
        let cfg = MissionConfig::from_doc(&json!({"satcom_verified": false, "link_verified": true})).unwrap();
        assert!(!cfg.satcom_verified);
    }

    #[test]
    fn serializes_with_store_key_names() {
        let cfg = MissionConfig { balloon_type: Some("ZP".into()), satcom_verified: true, ..Default::default() };
        let v = serde_json::to_value(&cfg).unwrap();
        assert_eq!(v["balloonType"], "ZP");
        assert_eq!(v["satcom_verified"], true);
        assert_eq!(MissionConfig::from_doc(&v).unwrap(), cfg);
    }
}
