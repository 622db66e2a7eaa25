//! Merge semantic hits with the prompt keyword fallback into one ranking.

use serde::Serialize;
use smcp_core::{EntityKind, EntityPayload, EntityRepository, Prompt, Resource, Result, Tool};
use smcp_index::SemanticStore;

/// Score assigned to every keyword match. Sits between weak and strong
/// cosine similarities so exact text matches beat weak semantic ones.
pub const DEFAULT_KEYWORD_SCORE: f32 = 0.5;

/// One ranked search result with its resolved entity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: EntityKind,
    pub score: f32,
    pub payload: EntityPayload,
}

/// Read-only view over the semantic store and the entity repositories.
pub struct SearchOrchestrator<'a> {
    store: &'a SemanticStore,
    prompts: &'a dyn EntityRepository<Prompt>,
    resources: &'a dyn EntityRepository<Resource>,
    tools: &'a dyn EntityRepository<Tool>,
    keyword_score: f32,
}

impl<'a> SearchOrchestrator<'a> {
    #[must_use]
    pub fn new(
        store: &'a SemanticStore,
        prompts: &'a dyn EntityRepository<Prompt>,
        resources: &'a dyn EntityRepository<Resource>,
        tools: &'a dyn EntityRepository<Tool>,
    ) -> Self {
        Self {
            store,
            prompts,
            resources,
            tools,
            keyword_score: DEFAULT_KEYWORD_SCORE,
        }
    }

    #[must_use]
    pub fn with_keyword_score(mut self, score: f32) -> Self {
        self.keyword_score = score;
        self
    }

    /// Search `target` (or every kind) for `query`, returning at most `limit`
    /// hits sorted by descending score.
    ///
    /// Vector hits precede keyword hits of equal score.
    ///
    /// # Errors
    ///
    /// Returns [`smcp_core::SmcpError::Embedding`] if the query cannot be
    /// embedded, or a storage error if a repository cannot be read.
    pub fn search(
        &self,
        query: &str,
        target: Option<EntityKind>,
        limit: usize,
    ) -> Result<Vec<SearchHit>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let mut hits = Vec::new();
        if target.map_or(true, EntityKind::is_embedded) {
            hits.extend(self.vector_hits(query, target, limit)?);
        }
        if target.map_or(true, |kind| kind == EntityKind::Prompt) {
            hits.extend(self.keyword_hits(query)?);
        }

        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(limit);
        tracing::debug!(query, ?target, limit, hits = hits.len(), "merged search");
        Ok(hits)
    }

    fn vector_hits(
        &self,
        query: &str,
        target: Option<EntityKind>,
        limit: usize,
    ) -> Result<Vec<SearchHit>> {
        let mut hits = Vec::new();
        for hit in self.store.search(query, limit, target)? {
            let Some(payload) = self.resolve(hit.kind, &hit.entity_id)? else {
                tracing::debug!(kind = %hit.kind, entity_id = %hit.entity_id, "dropping hit for missing entity");
                continue;
            };
            hits.push(SearchHit {
                id: hit.entity_id,
                kind: hit.kind,
                score: hit.score,
                payload,
            });
        }
        Ok(hits)
    }

    fn keyword_hits(&self, query: &str) -> Result<Vec<SearchHit>> {
        let needle = query.to_lowercase();
        Ok(self
            .prompts
            .list()?
            .into_iter()
            .filter(|p| p.matches_keyword(&needle))
            .map(|p| SearchHit {
                id: p.id.clone(),
                kind: EntityKind::Prompt,
                score: self.keyword_score,
                payload: EntityPayload::Prompt(p),
            })
            .collect())
    }

    fn resolve(&self, kind: EntityKind, id: &str) -> Result<Option<EntityPayload>> {
        Ok(match kind {
            EntityKind::Prompt => self.prompts.get(id)?.map(EntityPayload::Prompt),
            EntityKind::Resource => self.resources.get(id)?.map(EntityPayload::Resource),
            EntityKind::Tool => self.tools.get(id)?.map(EntityPayload::Tool),
        })
    }
}
