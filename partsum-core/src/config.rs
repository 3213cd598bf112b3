use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::Path;

/// Where the part's files live. Selects which optional per-file fields are
/// present on the wire.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    #[default]
    Local,
    /// Several logical files packed into one remote object; entries carry
    /// their offset and the mutation that produced them.
    RemoteObjectStore,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct DecodeLimits {
    pub max_files: u64,
    pub max_name_len: usize,
}

impl Default for DecodeLimits {
    fn default() -> Self {
        Self { max_files: 5_000_000, max_name_len: 64 * 1024 }
    }
}

/// Immutable settings a manifest is built or decoded with.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(default)]
pub struct ManifestConfig {
    pub storage: StorageBackend,
    /// Compact map-column layout: implicit map-key files share one physical
    /// file and are addressed by offset.
    pub compact_map_layout: bool,
    pub limits: DecodeLimits,
}

impl ManifestConfig {
    pub fn local() -> Self {
        Self::default()
    }

    pub fn remote() -> Self {
        Self { storage: StorageBackend::RemoteObjectStore, ..Self::default() }
    }

    pub fn with_compact_map_layout(mut self, on: bool) -> Self {
        self.compact_map_layout = on;
        self
    }

    pub fn is_remote(&self) -> bool {
        self.storage == StorageBackend::RemoteObjectStore
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let f = File::open(path).with_context(|| format!("open {:?}", path))?;
        serde_json::from_reader(f).with_context(|| format!("parse config {:?}", path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_fills_defaults() {
        let cfg: ManifestConfig =
            serde_json::from_str(r#"{"storage":"remote_object_store"}"#).unwrap();
        assert!(cfg.is_remote());
        assert!(!cfg.compact_map_layout);
        assert_eq!(cfg.limits, DecodeLimits::default());
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("cfg.json");
        std::fs::write(&p, r#"{"compact_map_layout":true,"limits":{"max_files":10}}"#).unwrap();
        let cfg = ManifestConfig::from_json_file(&p).unwrap();
        assert!(cfg.compact_map_layout);
        assert_eq!(cfg.limits.max_files, 10);
        assert_eq!(cfg.limits.max_name_len, 64 * 1024);
        assert_eq!(cfg.storage, StorageBackend::Local);
    }
}
