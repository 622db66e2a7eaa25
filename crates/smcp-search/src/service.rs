//! Entity services: the single writer over SQLite and the semantic store.

use serde::Serialize;
use smcp_core::{
    EmbeddableItem, EntityKind, EntityPayload, Prompt, PromptCreate, PromptUpdate, Resource,
    ResourceCreate, ResourceUpdate, Result, Settings, Tool, ToolCreate, ToolUpdate,
};
use smcp_index::{build_embedder, SemanticStore, StoreHealth};
use smcp_store::Database;

use crate::orchestrator::{SearchHit, SearchOrchestrator, DEFAULT_KEYWORD_SCORE};

/// Per-kind entity counts plus the index lockstep report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceStatus {
    pub prompts: u64,
    pub resources: u64,
    pub tools: u64,
    pub index: StoreHealth,
}

/// Outcome of [`EntityService::reindex`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReindexReport {
    pub resources: usize,
    pub tools: usize,
    pub vectors: usize,
}

/// Owns the entity database and the semantic store and keeps them in sync.
///
/// Every create/update of a resource or tool is followed by an upsert of its
/// embeddable text; every delete by a vector delete. Prompts stay out of the
/// index and are served by keyword match.
pub struct EntityService {
    db: Database,
    store: SemanticStore,
    top_k: usize,
    keyword_score: f32,
}

impl EntityService {
    #[must_use]
    pub fn new(db: Database, store: SemanticStore) -> Self {
        Self {
            db,
            store,
            top_k: Settings::default().top_k,
            keyword_score: DEFAULT_KEYWORD_SCORE,
        }
    }

    /// Open the database and semantic store named by `settings`.
    ///
    /// # Errors
    ///
    /// Fails if the embedder cannot be built, the database cannot be opened,
    /// or the index files are corrupt.
    pub fn open(settings: &Settings) -> Result<Self> {
        let embedder = build_embedder(settings)?;
        let db = Database::open(&settings.database_path)?;
        let store = SemanticStore::open(&settings.index_path, embedder)?;
        tracing::info!(
            app = %settings.app_name,
            database = %settings.database_path.display(),
            "entity service ready"
        );
        Ok(Self {
            db,
            store,
            top_k: settings.top_k,
            keyword_score: settings.keyword_score,
        })
    }

    #[must_use]
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    #[must_use]
    pub fn database(&self) -> &Database {
        &self.db
    }

    #[must_use]
    pub fn store(&self) -> &SemanticStore {
        &self.store
    }

    // === Generic access ===

    /// # Errors
    ///
    /// Returns a storage error if the database cannot be read.
    pub fn get(&self, kind: EntityKind, id: &str) -> Result<Option<EntityPayload>> {
        Ok(match kind {
            EntityKind::Prompt => self.db.get_prompt(id)?.map(EntityPayload::Prompt),
            EntityKind::Resource => self.db.get_resource(id)?.map(EntityPayload::Resource),
            EntityKind::Tool => self.db.get_tool(id)?.map(EntityPayload::Tool),
        })
    }

    /// # Errors
    ///
    /// Returns a storage error if the database cannot be read.
    pub fn list(&self, kind: EntityKind) -> Result<Vec<EntityPayload>> {
        Ok(match kind {
            EntityKind::Prompt => self
                .db
                .list_prompts()?
                .into_iter()
                .map(EntityPayload::Prompt)
                .collect(),
            EntityKind::Resource => self
                .db
                .list_resources()?
                .into_iter()
                .map(EntityPayload::Resource)
                .collect(),
            EntityKind::Tool => self
                .db
                .list_tools()?
                .into_iter()
                .map(EntityPayload::Tool)
                .collect(),
        })
    }

    /// Delete an entity and, for embedded kinds, its vector.
    ///
    /// Returns whether the entity existed. Deleting twice is not an error.
    /// The vector goes first, so a failed index write leaves the entity
    /// intact and searchable.
    ///
    /// # Errors
    ///
    /// Returns a storage or I/O error if either write fails.
    pub fn delete(&mut self, kind: EntityKind, id: &str) -> Result<bool> {
        if kind.is_embedded() {
            if let Err(e) = self.store.delete(kind, id) {
                tracing::warn!(%kind, id, error = %e, "failed to delete vector; entity kept");
                return Err(e);
            }
        }
        let deleted = match kind {
            EntityKind::Prompt => self.db.delete_prompt(id),
            EntityKind::Resource => self.db.delete_resource(id),
            EntityKind::Tool => self.db.delete_tool(id),
        };
        let existed = match deleted {
            Ok(existed) => existed,
            Err(e) => {
                tracing::warn!(%kind, id, error = %e, "failed to delete entity row; vector already removed until reindex");
                return Err(e);
            }
        };
        tracing::debug!(%kind, id, existed, "deleted entity");
        Ok(existed)
    }

    // === Prompts ===

    /// # Errors
    ///
    /// Returns a storage error if the insert fails.
    pub fn create_prompt(&mut self, data: PromptCreate) -> Result<Prompt> {
        self.db.create_prompt(data)
    }

    /// # Errors
    ///
    /// Returns a storage error if the update fails.
    pub fn update_prompt(&mut self, id: &str, data: PromptUpdate) -> Result<Option<Prompt>> {
        self.db.update_prompt(id, data)
    }

    // === Resources ===

    /// Create a resource and index its embeddable text.
    ///
    /// If embedding fails the row is removed again and the error returned.
    ///
    /// # Errors
    ///
    /// Returns a storage, embedding, or I/O error.
    pub fn create_resource(&mut self, data: ResourceCreate) -> Result<Resource> {
        let resource = self.db.create_resource(data)?;
        if let Err(e) = self.index(&resource.embeddable()) {
            self.db.delete_resource(&resource.id)?;
            return Err(e);
        }
        Ok(resource)
    }

    /// # Errors
    ///
    /// Returns a storage, embedding, or I/O error. On an embedding failure the
    /// row keeps the new values and the old vector stays until `reindex`.
    pub fn update_resource(&mut self, id: &str, data: ResourceUpdate) -> Result<Option<Resource>> {
        let Some(resource) = self.db.update_resource(id, data)? else {
            return Ok(None);
        };
        self.index(&resource.embeddable())?;
        Ok(Some(resource))
    }

    // === Tools ===

    /// Create a tool and index its embeddable text.
    ///
    /// If embedding fails the row is removed again and the error returned.
    ///
    /// # Errors
    ///
    /// Returns a storage, embedding, or I/O error.
    pub fn create_tool(&mut self, data: ToolCreate) -> Result<Tool> {
        let tool = self.db.create_tool(data)?;
        if let Err(e) = self.index(&tool.embeddable()) {
            self.db.delete_tool(&tool.id)?;
            return Err(e);
        }
        Ok(tool)
    }

    /// # Errors
    ///
    /// Returns a storage, embedding, or I/O error.
    pub fn update_tool(&mut self, id: &str, data: ToolUpdate) -> Result<Option<Tool>> {
        let Some(tool) = self.db.update_tool(id, data)? else {
            return Ok(None);
        };
        self.index(&tool.embeddable())?;
        Ok(Some(tool))
    }

    fn index(&mut self, item: &EmbeddableItem) -> Result<()> {
        if let Err(e) = self.store.upsert(item.kind, &item.entity_id, &item.text) {
            tracing::warn!(kind = %item.kind, entity_id = %item.entity_id, error = %e, "failed to index entity");
            return Err(e);
        }
        Ok(())
    }

    // === Search and maintenance ===

    /// Merged semantic + keyword search. `limit` defaults to the configured
    /// `top_k`.
    ///
    /// # Errors
    ///
    /// Returns an embedding or storage error.
    pub fn search(
        &self,
        query: &str,
        target: Option<EntityKind>,
        limit: Option<usize>,
    ) -> Result<Vec<SearchHit>> {
        SearchOrchestrator::new(&self.store, &self.db, &self.db, &self.db)
            .with_keyword_score(self.keyword_score)
            .search(query, target, limit.unwrap_or(self.top_k))
    }

    /// Rebuild the semantic store from every resource and tool in the
    /// database.
    ///
    /// # Errors
    ///
    /// Returns a storage, embedding, or I/O error. The old index is kept on
    /// embedding failure.
    pub fn reindex(&mut self) -> Result<ReindexReport> {
        let resources = self.db.list_resources()?;
        let tools = self.db.list_tools()?;
        let items: Vec<EmbeddableItem> = resources
            .iter()
            .map(Resource::embeddable)
            .chain(tools.iter().map(Tool::embeddable))
            .collect();
        self.store.rebuild(&items)?;

        let report = ReindexReport {
            resources: resources.len(),
            tools: tools.len(),
            vectors: self.store.len(),
        };
        tracing::info!(
            resources = report.resources,
            tools = report.tools,
            "reindexed entities"
        );
        Ok(report)
    }

    /// # Errors
    ///
    /// Returns a storage error if the counts cannot be read.
    pub fn status(&self) -> Result<ServiceStatus> {
        Ok(ServiceStatus {
            prompts: self.db.count(EntityKind::Prompt)?,
            resources: self.db.count(EntityKind::Resource)?,
            tools: self.db.count(EntityKind::Tool)?,
            index: self.store.health(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smcp_core::{PromptRole, SmcpError};
    use smcp_index::{Embedder, SharedEmbedder};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn settings(dir: &TempDir) -> Settings {
        Settings {
            data_dir: dir.path().to_path_buf(),
            database_path: dir.path().join("mcp.db"),
            index_path: dir.path().join("vectors.index"),
            ..Settings::default()
        }
    }

    fn service(dir: &TempDir) -> EntityService {
        EntityService::open(&settings(dir)).unwrap()
    }

    fn resource(name: &str, content: &str) -> ResourceCreate {
        ResourceCreate {
            name: name.to_string(),
            description: String::new(),
            content: content.to_string(),
            category: "docs".to_string(),
            tags: vec![],
        }
    }

    fn tool(name: &str, code: &str) -> ToolCreate {
        ToolCreate {
            name: name.to_string(),
            description: String::new(),
            code: code.to_string(),
            tags: vec![],
        }
    }

    fn ids(hits: &[SearchHit]) -> Vec<&str> {
        hits.iter().map(|h| h.id.as_str()).collect()
    }

    #[test]
    fn created_resource_is_searchable() {
        let dir = TempDir::new().unwrap();
        let mut svc = service(&dir);
        let r = svc
            .create_resource(resource("guide", "FAISS enables similarity search"))
            .unwrap();

        let hits = svc.search("similarity search", None, None).unwrap();
        assert_eq!(ids(&hits), vec![r.id.as_str()]);
        assert_eq!(svc.store().len(), 1);
    }

    #[test]
    fn update_replaces_the_only_vector() {
        let dir = TempDir::new().unwrap();
        let mut svc = service(&dir);
        let t = svc.create_tool(tool("", "alpha beta gamma")).unwrap();
        svc.update_tool(
            &t.id,
            ToolUpdate {
                code: Some("delta epsilon zeta".to_string()),
                ..Default::default()
            },
        )
        .unwrap()
        .unwrap();

        assert_eq!(svc.store().len(), 1);
        let hits = svc.search("delta epsilon", None, None).unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].score > 0.5);
        match &hits[0].payload {
            EntityPayload::Tool(tool) => assert_eq!(tool.code, "delta epsilon zeta"),
            other => panic!("expected tool payload, got {other:?}"),
        }
        let stale = svc.search("alpha beta gamma", None, None).unwrap();
        assert!(stale.iter().all(|h| h.score < 0.5));
    }

    #[test]
    fn delete_is_idempotent_and_removes_vector() {
        let dir = TempDir::new().unwrap();
        let mut svc = service(&dir);
        let r = svc.create_resource(resource("guide", "vector search")).unwrap();

        assert!(svc.delete(EntityKind::Resource, &r.id).unwrap());
        assert!(!svc.delete(EntityKind::Resource, &r.id).unwrap());
        assert!(svc.store().is_empty());
        assert!(svc.search("vector search", None, None).unwrap().is_empty());
    }

    #[test]
    fn prompts_are_never_embedded() {
        let dir = TempDir::new().unwrap();
        let mut svc = service(&dir);
        let p = svc
            .create_prompt(PromptCreate {
                name: "Reviewer".to_string(),
                role: PromptRole::System,
                content: "Review the similarity search code".to_string(),
                tags: vec![],
            })
            .unwrap();

        assert!(svc.store().is_empty());
        let hits = svc.search("similarity", None, None).unwrap();
        assert_eq!(ids(&hits), vec![p.id.as_str()]);
        assert!((hits[0].score - DEFAULT_KEYWORD_SCORE).abs() < f32::EPSILON);

        assert!(svc.delete(EntityKind::Prompt, &p.id).unwrap());
        assert!(svc.search("similarity", None, None).unwrap().is_empty());
    }

    #[test]
    fn search_limit_defaults_to_top_k() {
        let dir = TempDir::new().unwrap();
        let mut svc = service(&dir).with_top_k(2);
        for i in 0..4 {
            svc.create_resource(resource(&format!("r{i}"), "shared words"))
                .unwrap();
        }
        assert_eq!(svc.search("shared words", None, None).unwrap().len(), 2);
        assert_eq!(svc.search("shared words", None, Some(3)).unwrap().len(), 3);
    }

    #[test]
    fn reindex_recovers_from_deleted_index_files() {
        let dir = TempDir::new().unwrap();
        let cfg = settings(&dir);
        let (r_id, t_id) = {
            let mut svc = EntityService::open(&cfg).unwrap();
            let r = svc.create_resource(resource("guide", "FAISS docs")).unwrap();
            let t = svc.create_tool(tool("rebuild", "reindex all")).unwrap();
            (r.id, t.id)
        };
        std::fs::remove_file(&cfg.index_path).unwrap();
        std::fs::remove_file(cfg.catalog_path()).unwrap();

        let mut svc = EntityService::open(&cfg).unwrap();
        assert!(svc.store().is_empty());
        let report = svc.reindex().unwrap();
        assert_eq!(
            report,
            ReindexReport {
                resources: 1,
                tools: 1,
                vectors: 2
            }
        );

        let hits = svc.search("FAISS docs", Some(EntityKind::Resource), None).unwrap();
        assert_eq!(ids(&hits), vec![r_id.as_str()]);
        let hits = svc.search("reindex all", Some(EntityKind::Tool), None).unwrap();
        assert_eq!(ids(&hits), vec![t_id.as_str()]);
    }

    #[test]
    fn status_reports_counts_and_lockstep() {
        let dir = TempDir::new().unwrap();
        let mut svc = service(&dir);
        svc.create_resource(resource("guide", "docs")).unwrap();
        svc.create_tool(tool("t", "code")).unwrap();
        svc.create_prompt(PromptCreate {
            name: "p".to_string(),
            role: PromptRole::User,
            content: "hi".to_string(),
            tags: vec![],
        })
        .unwrap();

        let status = svc.status().unwrap();
        assert_eq!((status.prompts, status.resources, status.tools), (1, 1, 1));
        assert_eq!(status.index.vectors, 2);
        assert!(status.index.in_lockstep());
    }

    #[test]
    fn state_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let cfg = settings(&dir);
        let id = {
            let mut svc = EntityService::open(&cfg).unwrap();
            svc.create_resource(resource("guide", "persistent vectors"))
                .unwrap()
                .id
        };
        let svc = EntityService::open(&cfg).unwrap();
        let hits = svc.search("persistent vectors", None, None).unwrap();
        assert_eq!(ids(&hits), vec![id.as_str()]);
    }

    struct Broken;

    impl Embedder for Broken {
        fn dimension(&self) -> usize {
            8
        }

        fn model_id(&self) -> &str {
            "broken"
        }

        fn embed_batch(&self, _texts: &[&str]) -> Result<Vec<Vec<f32>>> {
            Err(SmcpError::Embedding("model unavailable".to_string()))
        }
    }

    #[test]
    fn failed_embedding_rolls_back_create() {
        let dir = TempDir::new().unwrap();
        let embedder: SharedEmbedder = Arc::new(Broken);
        let store = SemanticStore::open(dir.path().join("vectors.index"), embedder).unwrap();
        let mut svc = EntityService::new(Database::in_memory().unwrap(), store);

        let err = svc.create_resource(resource("guide", "docs")).unwrap_err();
        assert!(matches!(err, SmcpError::Embedding(_)));
        assert_eq!(svc.database().count(EntityKind::Resource).unwrap(), 0);
        assert!(svc.store().is_empty());
    }

    #[test]
    fn failed_vector_delete_keeps_the_entity() {
        let dir = TempDir::new().unwrap();
        let index_dir = dir.path().join("index");
        let settings = Settings {
            index_path: index_dir.join("vectors.index"),
            ..settings(&dir)
        };
        let mut service = EntityService::open(&settings).unwrap();
        let created = service
            .create_resource(resource("guide", "FAISS enables similarity search"))
            .unwrap();

        std::fs::remove_dir_all(&index_dir).unwrap();
        std::fs::write(&index_dir, b"not a directory").unwrap();

        assert!(service.delete(EntityKind::Resource, &created.id).is_err());
        assert!(service
            .get(EntityKind::Resource, &created.id)
            .unwrap()
            .is_some());
        let hits = service.search("similarity search", None, None).unwrap();
        assert_eq!(ids(&hits), vec![created.id.as_str()]);
        assert_eq!(service.status().unwrap().index.orphaned_vectors, 0);
    }
}
