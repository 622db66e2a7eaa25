//! Semantic store: embedder + vector index + catalog, kept in lockstep.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Serialize;
use smcp_core::config::catalog_path_for;
use smcp_core::{EmbeddableItem, EntityKind, Result, SmcpError};

use crate::catalog::VectorCatalog;
use crate::embedder::SharedEmbedder;
use crate::index::VectorIndex;
use crate::vector_id::vector_id;

/// Candidates fetched per requested hit before stale/filtered drops.
const CANDIDATE_MULTIPLIER: usize = 4;

/// One semantic search hit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VectorHit {
    pub entity_id: String,
    #[serde(rename = "type")]
    pub kind: EntityKind,
    pub score: f32,
}

/// Lockstep report between index and catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreHealth {
    pub model_id: String,
    pub dimension: usize,
    pub vectors: usize,
    pub catalog_entries: usize,
    /// Index ids with no catalog entry. Never returned by search.
    pub orphaned_vectors: usize,
    /// Catalog entries whose vector is missing from the index.
    pub dangling_entries: usize,
}

impl StoreHealth {
    #[must_use]
    pub fn in_lockstep(&self) -> bool {
        self.orphaned_vectors == 0 && self.dangling_entries == 0
    }
}

/// Persistent semantic index over `(type, entity_id, text)` items.
///
/// Index and catalog are held in memory and rewritten to disk after every
/// mutation: index first, then catalog. Mutations take `&mut self`; callers
/// sharing a store across threads must serialize writers themselves.
pub struct SemanticStore {
    embedder: SharedEmbedder,
    index: VectorIndex,
    catalog: VectorCatalog,
    index_path: PathBuf,
    catalog_path: PathBuf,
}

impl std::fmt::Debug for SemanticStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SemanticStore")
            .field("model_id", &self.embedder.model_id())
            .field("vectors", &self.index.len())
            .field("catalog_entries", &self.catalog.len())
            .field("index_path", &self.index_path)
            .finish()
    }
}

impl SemanticStore {
    /// Open the store whose index lives at `index_path`.
    ///
    /// Existing index and catalog files are loaded; missing ones start empty
    /// and are written immediately.
    ///
    /// # Errors
    ///
    /// Returns [`SmcpError::IndexCorruption`] if either file is unreadable or the
    /// index dimension differs from the embedder's.
    pub fn open(index_path: impl AsRef<Path>, embedder: SharedEmbedder) -> Result<Self> {
        let index_path = index_path.as_ref().to_path_buf();
        let catalog_path = catalog_path_for(&index_path);
        let dimension = embedder.dimension();

        let (index, fresh_index) = if index_path.exists() {
            (VectorIndex::load(&index_path)?, false)
        } else {
            (VectorIndex::new(dimension), true)
        };
        if index.dimension() != dimension {
            return Err(SmcpError::corruption(
                &index_path,
                format!(
                    "index dimension {} does not match embedder {} ({dimension}); reindex required",
                    index.dimension(),
                    embedder.model_id()
                ),
            ));
        }

        let (catalog, fresh_catalog) = if catalog_path.exists() {
            (VectorCatalog::load(&catalog_path)?, false)
        } else {
            (VectorCatalog::new(), true)
        };

        let store = Self {
            embedder,
            index,
            catalog,
            index_path,
            catalog_path,
        };
        if fresh_index {
            store.index.persist(&store.index_path)?;
        }
        if fresh_catalog {
            store.catalog.persist(&store.catalog_path)?;
        }

        let health = store.health();
        if !health.in_lockstep() {
            tracing::warn!(
                orphaned_vectors = health.orphaned_vectors,
                dangling_entries = health.dangling_entries,
                "vector index and catalog are out of lockstep; stale hits will be dropped"
            );
        }
        tracing::info!(
            path = %store.index_path.display(),
            vectors = health.vectors,
            model = %health.model_id,
            "semantic store ready"
        );
        Ok(store)
    }

    #[must_use]
    pub fn embedder(&self) -> &SharedEmbedder {
        &self.embedder
    }

    #[must_use]
    pub fn index_path(&self) -> &Path {
        &self.index_path
    }

    #[must_use]
    pub fn catalog_path(&self) -> &Path {
        &self.catalog_path
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Embed `text` and store it as the single vector for `(kind, entity_id)`.
    ///
    /// Any previous vector for the same key is replaced. Returns the vector id.
    ///
    /// # Errors
    ///
    /// Returns [`SmcpError::Embedding`] if embedding fails or an I/O error if
    /// persisting fails. Either way the store keeps its previous contents.
    pub fn upsert(&mut self, kind: EntityKind, entity_id: &str, text: &str) -> Result<u64> {
        let id = vector_id(kind, entity_id);
        let vector = self.embedder.embed(text)?;

        self.commit(|index, catalog| {
            index.remove(&[id]);
            index.add(&[id], &[vector])?;
            catalog.put(id, kind, entity_id);
            Ok(())
        })?;

        tracing::debug!(%kind, entity_id, vector_id = id, "upserted vector");
        Ok(id)
    }

    /// Remove the vector for `(kind, entity_id)`. Idempotent.
    ///
    /// Returns whether anything was removed.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if persisting fails; the vector is then kept.
    pub fn delete(&mut self, kind: EntityKind, entity_id: &str) -> Result<bool> {
        let id = vector_id(kind, entity_id);
        let removed = self.commit(|index, catalog| {
            let removed_vectors = index.remove(&[id]);
            let removed_entry = catalog.remove(id);
            Ok(removed_vectors > 0 || removed_entry)
        })?;
        tracing::debug!(%kind, entity_id, vector_id = id, removed, "deleted vector");
        Ok(removed)
    }

    /// Top `k` hits for `query`, optionally restricted to one kind.
    ///
    /// Index ids without a catalog entry are dropped silently. Hits are sorted
    /// by descending score; equal scores keep the index's order.
    ///
    /// # Errors
    ///
    /// Returns [`SmcpError::Embedding`] if the query cannot be embedded.
    pub fn search(
        &self,
        query: &str,
        k: usize,
        type_filter: Option<EntityKind>,
    ) -> Result<Vec<VectorHit>> {
        if k == 0 || self.index.is_empty() {
            return Ok(Vec::new());
        }
        let query_vector = self.embedder.embed(query)?;

        let total = self.index.len();
        let mut fetch = k.saturating_mul(CANDIDATE_MULTIPLIER).min(total);
        loop {
            let candidates = self.index.search(&query_vector, fetch)?;
            let hits = self.resolve(&candidates, k, type_filter);
            if hits.len() >= k || fetch >= total {
                tracing::debug!(query, k, candidates = candidates.len(), hits = hits.len(), "semantic search");
                return Ok(hits);
            }
            fetch = fetch.saturating_mul(2).min(total);
        }
    }

    fn resolve(
        &self,
        candidates: &[(u64, f32)],
        k: usize,
        type_filter: Option<EntityKind>,
    ) -> Vec<VectorHit> {
        let mut seen = HashSet::new();
        let mut hits = Vec::with_capacity(k);
        for &(id, score) in candidates {
            if !seen.insert(id) {
                continue;
            }
            let Some(entry) = self.catalog.get(id) else {
                tracing::debug!(vector_id = id, "dropping hit with no catalog entry");
                continue;
            };
            if type_filter.is_some_and(|kind| kind != entry.kind) {
                continue;
            }
            hits.push(VectorHit {
                entity_id: entry.entity_id.clone(),
                kind: entry.kind,
                score,
            });
            if hits.len() == k {
                break;
            }
        }
        hits
    }

    /// Replace the whole store with `items`, embedding them in one batch.
    ///
    /// # Errors
    ///
    /// Returns [`SmcpError::Embedding`] if embedding fails or an I/O error if
    /// persisting fails. Either way the store keeps its previous contents.
    pub fn rebuild(&mut self, items: &[EmbeddableItem]) -> Result<()> {
        let texts: Vec<&str> = items.iter().map(|i| i.text.as_str()).collect();
        let vectors = self.embedder.embed_batch(&texts)?;
        if vectors.len() != items.len() {
            return Err(SmcpError::Embedding(format!(
                "embedder returned {} vectors for {} texts",
                vectors.len(),
                items.len()
            )));
        }

        let mut index = VectorIndex::new(self.embedder.dimension());
        let mut catalog = VectorCatalog::new();
        let mut ids = Vec::with_capacity(items.len());
        let mut kept = Vec::with_capacity(items.len());
        for (item, vector) in items.iter().zip(vectors) {
            let id = vector_id(item.kind, &item.entity_id);
            if catalog.contains(id) {
                tracing::warn!(kind = %item.kind, entity_id = %item.entity_id, "duplicate item in rebuild; keeping the first");
                continue;
            }
            catalog.put(id, item.kind, item.entity_id.clone());
            ids.push(id);
            kept.push(vector);
        }
        index.add(&ids, &kept)?;

        self.commit(|current_index, current_catalog| {
            *current_index = index;
            *current_catalog = catalog;
            Ok(())
        })?;
        tracing::info!(vectors = self.index.len(), "rebuilt semantic store");
        Ok(())
    }

    /// Compare index and catalog membership.
    #[must_use]
    pub fn health(&self) -> StoreHealth {
        let index_ids: HashSet<u64> = self.index.ids().collect();
        let orphaned_vectors = index_ids
            .iter()
            .filter(|id| !self.catalog.contains(**id))
            .count();
        let dangling_entries = self
            .catalog
            .iter()
            .filter(|(id, _)| !index_ids.contains(id))
            .count();
        StoreHealth {
            model_id: self.embedder.model_id().to_string(),
            dimension: self.index.dimension(),
            vectors: self.index.len(),
            catalog_entries: self.catalog.len(),
            orphaned_vectors,
            dangling_entries,
        }
    }

    /// Apply `mutate` to the in-memory index and catalog, then persist both.
    ///
    /// On any error the in-memory state is rolled back, so memory never holds
    /// a mutation the caller was told failed.
    fn commit<T>(
        &mut self,
        mutate: impl FnOnce(&mut VectorIndex, &mut VectorCatalog) -> Result<T>,
    ) -> Result<T> {
        let previous = (self.index.clone(), self.catalog.clone());
        let outcome = mutate(&mut self.index, &mut self.catalog)
            .and_then(|value| self.persist().map(|()| value));
        if let Err(e) = &outcome {
            tracing::warn!(error = %e, "semantic store write failed; in-memory state restored");
            (self.index, self.catalog) = previous;
        }
        outcome
    }

    /// Write the index, then the catalog.
    ///
    /// A crash between the two writes leaves at worst an index vector without
    /// a catalog entry, which search ignores.
    fn persist(&self) -> Result<()> {
        self.index.persist(&self.index_path)?;
        self.catalog.persist(&self.catalog_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedder::{Embedder, HashEmbedder};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn open_store(dir: &TempDir) -> SemanticStore {
        let embedder: SharedEmbedder = Arc::new(HashEmbedder::new(384));
        SemanticStore::open(dir.path().join("vectors.index"), embedder).unwrap()
    }

    fn ids(hits: &[VectorHit]) -> Vec<(&str, EntityKind)> {
        hits.iter().map(|h| (h.entity_id.as_str(), h.kind)).collect()
    }

    /// Embedder that fails every call.
    struct Broken;

    impl Embedder for Broken {
        fn dimension(&self) -> usize {
            384
        }
        fn model_id(&self) -> &str {
            "broken"
        }
        fn embed_batch(&self, _texts: &[&str]) -> Result<Vec<Vec<f32>>> {
            Err(SmcpError::Embedding("model unavailable".to_string()))
        }
    }

    #[test]
    fn open_creates_both_files() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        assert!(store.index_path().exists());
        assert!(store.catalog_path().exists());
        assert_eq!(
            store.catalog_path(),
            dir.path().join("vectors.meta.json").as_path()
        );
    }

    #[test]
    fn search_against_empty_index_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        assert!(store.search("anything", 5, None).unwrap().is_empty());
    }

    #[test]
    fn upsert_twice_keeps_exactly_one_slot() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir);
        store
            .upsert(EntityKind::Resource, "r1", "kubernetes deployment manifests")
            .unwrap();
        store
            .upsert(EntityKind::Resource, "r1", "sourdough bread baking")
            .unwrap();

        assert_eq!(store.len(), 1);
        let hits = store.search("sourdough baking", 5, None).unwrap();
        assert_eq!(ids(&hits), vec![("r1", EntityKind::Resource)]);
        assert!(hits[0].score > 0.5);

        let stale = store.search("kubernetes manifests", 5, None).unwrap();
        assert_eq!(stale.len(), 1);
        assert!(stale[0].score.abs() < 1e-6);
    }

    #[test]
    fn delete_is_idempotent_and_removes_from_search() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir);
        store
            .upsert(EntityKind::Tool, "t1", "rebuild embeddings index")
            .unwrap();

        assert!(store.delete(EntityKind::Tool, "t1").unwrap());
        assert!(!store.delete(EntityKind::Tool, "t1").unwrap());
        assert!(store.search("rebuild index", 5, None).unwrap().is_empty());
        assert!(store.health().in_lockstep());
    }

    #[test]
    fn type_filter_excludes_other_kind() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir);
        store
            .upsert(EntityKind::Resource, "r1", "vector search guide")
            .unwrap();
        store
            .upsert(EntityKind::Tool, "t1", "vector search tool")
            .unwrap();

        let resources = store
            .search("vector search", 5, Some(EntityKind::Resource))
            .unwrap();
        assert_eq!(ids(&resources), vec![("r1", EntityKind::Resource)]);

        let tools = store
            .search("vector search", 5, Some(EntityKind::Tool))
            .unwrap();
        assert_eq!(ids(&tools), vec![("t1", EntityKind::Tool)]);
    }

    #[test]
    fn type_filter_widens_candidate_pool() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir);
        for i in 0..12 {
            store
                .upsert(EntityKind::Resource, &format!("r{i}"), "alpha beta gamma")
                .unwrap();
        }
        store.upsert(EntityKind::Tool, "t1", "delta").unwrap();

        let hits = store.search("alpha beta", 1, Some(EntityKind::Tool)).unwrap();
        assert_eq!(ids(&hits), vec![("t1", EntityKind::Tool)]);
    }

    #[test]
    fn same_textual_id_in_two_kinds_is_independent() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir);
        store
            .upsert(EntityKind::Resource, "x", "shared identifier text")
            .unwrap();
        store
            .upsert(EntityKind::Tool, "x", "shared identifier text")
            .unwrap();
        assert_eq!(store.len(), 2);

        store.delete(EntityKind::Resource, "x").unwrap();
        let hits = store.search("shared identifier", 5, None).unwrap();
        assert_eq!(ids(&hits), vec![("x", EntityKind::Tool)]);
    }

    #[test]
    fn scenario_similarity_search_ranks_resource_first() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir);
        store
            .upsert(EntityKind::Resource, "A", "FAISS enables similarity search")
            .unwrap();
        store
            .upsert(EntityKind::Tool, "B", "rebuild embeddings index")
            .unwrap();

        let hits = store.search("similarity search", 5, None).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].entity_id, "A");
        assert!(hits[0].score >= hits[1].score);
    }

    #[test]
    fn reopen_reproduces_search_results() {
        let dir = TempDir::new().unwrap();
        let before = {
            let mut store = open_store(&dir);
            store
                .upsert(EntityKind::Resource, "r1", "rust async runtime")
                .unwrap();
            store
                .upsert(EntityKind::Tool, "t1", "python packaging tool")
                .unwrap();
            store.search("async rust", 5, None).unwrap()
        };

        let reopened = open_store(&dir);
        assert_eq!(reopened.search("async rust", 5, None).unwrap(), before);
    }

    #[test]
    fn orphaned_index_vector_is_dropped_at_query_time() {
        let dir = TempDir::new().unwrap();
        {
            let mut store = open_store(&dir);
            store
                .upsert(EntityKind::Resource, "r1", "orphan candidate")
                .unwrap();
        }
        // Simulate a crash after the index write but before the catalog write.
        VectorCatalog::new()
            .persist(&dir.path().join("vectors.meta.json"))
            .unwrap();

        let store = open_store(&dir);
        assert_eq!(store.health().orphaned_vectors, 1);
        assert!(store.search("orphan candidate", 5, None).unwrap().is_empty());
    }

    #[test]
    fn embedding_failure_leaves_store_untouched() {
        let dir = TempDir::new().unwrap();
        {
            let mut store = open_store(&dir);
            store.upsert(EntityKind::Tool, "t1", "first text").unwrap();
        }
        let mut store =
            SemanticStore::open(dir.path().join("vectors.index"), Arc::new(Broken)).unwrap();
        let err = store.upsert(EntityKind::Tool, "t1", "new text").unwrap_err();
        assert!(matches!(err, SmcpError::Embedding(_)));
        assert_eq!(store.len(), 1);
        assert!(store.search("first", 1, None).is_err());
    }

    #[test]
    fn dimension_mismatch_on_open_is_corruption() {
        let dir = TempDir::new().unwrap();
        drop(open_store(&dir));
        let err = SemanticStore::open(
            dir.path().join("vectors.index"),
            Arc::new(HashEmbedder::new(16)),
        )
        .unwrap_err();
        assert!(matches!(err, SmcpError::IndexCorruption { .. }));
    }

    #[test]
    fn corrupt_index_file_fails_open() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("vectors.index"), b"garbage").unwrap();
        let embedder: SharedEmbedder = Arc::new(HashEmbedder::new(384));
        assert!(matches!(
            SemanticStore::open(dir.path().join("vectors.index"), embedder),
            Err(SmcpError::IndexCorruption { .. })
        ));
    }

    #[test]
    fn rebuild_replaces_contents_and_skips_duplicates() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir);
        store.upsert(EntityKind::Tool, "gone", "stale tool").unwrap();

        let items = vec![
            EmbeddableItem {
                kind: EntityKind::Resource,
                entity_id: "r1".to_string(),
                text: "fresh resource".to_string(),
            },
            EmbeddableItem {
                kind: EntityKind::Resource,
                entity_id: "r1".to_string(),
                text: "duplicate resource".to_string(),
            },
            EmbeddableItem {
                kind: EntityKind::Tool,
                entity_id: "t1".to_string(),
                text: "fresh tool".to_string(),
            },
        ];
        store.rebuild(&items).unwrap();

        assert_eq!(store.len(), 2);
        assert!(store.health().in_lockstep());
        assert!(store.search("stale", 5, None).unwrap().iter().all(|h| h.entity_id != "gone"));
    }

    #[test]
    fn failed_write_keeps_previous_in_memory_state() {
        let dir = TempDir::new().unwrap();
        let data = dir.path().join("data");
        let embedder: SharedEmbedder = Arc::new(HashEmbedder::new(384));
        let mut store = SemanticStore::open(data.join("vectors.index"), embedder).unwrap();
        store
            .upsert(EntityKind::Resource, "resource_1", "first text")
            .unwrap();

        // A plain file where the data directory was makes every write fail.
        std::fs::remove_dir_all(&data).unwrap();
        std::fs::write(&data, b"not a directory").unwrap();

        assert!(store.upsert(EntityKind::Tool, "tool_1", "second text").is_err());
        assert!(store
            .upsert(EntityKind::Resource, "resource_1", "replacement words")
            .is_err());
        assert!(store.delete(EntityKind::Resource, "resource_1").is_err());
        assert!(store.rebuild(&[]).is_err());

        assert_eq!(store.len(), 1);
        let health = store.health();
        assert_eq!(health.catalog_entries, 1);
        assert!(health.in_lockstep());
        let hits = store.search("first text", 5, None).unwrap();
        assert_eq!(ids(&hits), vec![("resource_1", EntityKind::Resource)]);
        assert!(hits[0].score > 0.99);
    }
}
