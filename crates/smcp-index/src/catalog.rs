//! Durable mapping from vector id back to the owning entity.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use smcp_core::{EntityKind, Result, SmcpError};

use crate::persist::write_atomic;

/// Owner of one vector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    #[serde(rename = "type")]
    pub kind: EntityKind,
    pub entity_id: String,
}

/// `vector_id -> (type, entity_id)`, persisted as a JSON object keyed by
/// the decimal vector id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VectorCatalog {
    entries: BTreeMap<u64, CatalogEntry>,
}

impl VectorCatalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite the owner of `vector_id`.
    pub fn put(&mut self, vector_id: u64, kind: EntityKind, entity_id: impl Into<String>) {
        self.entries.insert(
            vector_id,
            CatalogEntry {
                kind,
                entity_id: entity_id.into(),
            },
        );
    }

    /// Drop the entry for `vector_id`. Returns whether one existed.
    pub fn remove(&mut self, vector_id: u64) -> bool {
        self.entries.remove(&vector_id).is_some()
    }

    #[must_use]
    pub fn get(&self, vector_id: u64) -> Option<&CatalogEntry> {
        self.entries.get(&vector_id)
    }

    #[must_use]
    pub fn contains(&self, vector_id: u64) -> bool {
        self.entries.contains_key(&vector_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u64, &CatalogEntry)> {
        self.entries.iter().map(|(id, entry)| (*id, entry))
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Rewrite the catalog file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`SmcpError::Io`] or [`SmcpError::Serialization`] on failure.
    pub fn persist(&self, path: &Path) -> Result<()> {
        let keyed: BTreeMap<String, &CatalogEntry> = self
            .entries
            .iter()
            .map(|(id, entry)| (id.to_string(), entry))
            .collect();
        let bytes = serde_json::to_vec_pretty(&keyed)?;
        write_atomic(path, &bytes)?;
        tracing::debug!(path = %path.display(), entries = self.len(), "persisted vector catalog");
        Ok(())
    }

    /// Read a catalog file written by [`VectorCatalog::persist`].
    ///
    /// # Errors
    ///
    /// Returns [`SmcpError::Io`] if the file cannot be read and
    /// [`SmcpError::IndexCorruption`] if it is not a valid catalog.
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)?;
        let keyed: BTreeMap<String, CatalogEntry> = serde_json::from_slice(&bytes)
            .map_err(|e| SmcpError::corruption(path, format!("invalid catalog json: {e}")))?;

        let mut entries = BTreeMap::new();
        for (key, entry) in keyed {
            let id = key.parse::<u64>().map_err(|_| {
                SmcpError::corruption(path, format!("catalog key '{key}' is not a vector id"))
            })?;
            entries.insert(id, entry);
        }
        tracing::info!(path = %path.display(), entries = entries.len(), "loaded vector catalog");
        Ok(Self { entries })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn put_get_remove() {
        let mut catalog = VectorCatalog::new();
        catalog.put(7, EntityKind::Tool, "tool_1");
        assert_eq!(
            catalog.get(7),
            Some(&CatalogEntry {
                kind: EntityKind::Tool,
                entity_id: "tool_1".to_string()
            })
        );
        assert!(catalog.remove(7));
        assert!(!catalog.remove(7));
        assert!(catalog.get(7).is_none());
    }

    #[test]
    fn put_overwrites_existing_owner() {
        let mut catalog = VectorCatalog::new();
        catalog.put(7, EntityKind::Tool, "tool_1");
        catalog.put(7, EntityKind::Resource, "resource_1");
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.get(7).unwrap().kind, EntityKind::Resource);
    }

    #[test]
    fn persisted_json_is_keyed_by_string_vector_id() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("vectors.meta.json");
        let mut catalog = VectorCatalog::new();
        catalog.put(42, EntityKind::Resource, "resource_ab12cd34");
        catalog.persist(&path).unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["42"]["type"], "resource");
        assert_eq!(json["42"]["entity_id"], "resource_ab12cd34");

        assert_eq!(VectorCatalog::load(&path).unwrap(), catalog);
    }

    #[test]
    fn non_numeric_key_is_corruption() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("vectors.meta.json");
        fs::write(&path, r#"{"abc": {"type": "tool", "entity_id": "t"}}"#).unwrap();
        assert!(matches!(
            VectorCatalog::load(&path),
            Err(SmcpError::IndexCorruption { .. })
        ));
    }

    #[test]
    fn malformed_json_is_corruption() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("vectors.meta.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            VectorCatalog::load(&path),
            Err(SmcpError::IndexCorruption { .. })
        ));
    }
}
