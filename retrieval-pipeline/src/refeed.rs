use std::{cmp::Ordering, collections::BTreeMap, sync::Arc};

use common::{
    error::AppError,
    storage::{types::content_node::ContentNode, vector::KnowledgeSearch},
    utils::embedding::EmbeddingProvider,
};
use tracing::{debug, instrument};

/// Key used for results of the unnamed vector.
pub const DEFAULT_VECTOR_KEY: &str = "default";

pub type NodesByKey = BTreeMap<String, Vec<ContentNode>>;

#[derive(Debug, Clone)]
pub struct RefeedSettings {
    pub meta_collection: String,
    /// Named vectors searched per collection; empty means the unnamed vector only.
    pub vector_names: Vec<String>,
    pub limit: u64,
}

/// Results of both stages, kept apart for callers that want to inspect them.
#[derive(Debug, Clone, Default)]
pub struct StagedResults {
    pub meta: Option<Vec<ContentNode>>,
    pub target: NodesByKey,
    pub effective_query: String,
}

pub struct RefeedRetriever {
    search: Arc<dyn KnowledgeSearch>,
    embedding: Arc<EmbeddingProvider>,
    settings: RefeedSettings,
}

impl RefeedRetriever {
    pub fn new(
        search: Arc<dyn KnowledgeSearch>,
        embedding: Arc<EmbeddingProvider>,
        settings: RefeedSettings,
    ) -> Self {
        Self {
            search,
            embedding,
            settings,
        }
    }

    /// Target-stage results keyed by vector name.
    pub async fn retrieve(
        &self,
        query: &str,
        target_collection: &str,
        refeed: bool,
    ) -> Result<NodesByKey, AppError> {
        Ok(self
            .retrieve_staged(query, target_collection, refeed)
            .await?
            .target)
    }

    /// Target-stage results merged across vectors, best score first.
    pub async fn retrieve_flat(
        &self,
        query: &str,
        target_collection: &str,
        refeed: bool,
    ) -> Result<Vec<ContentNode>, AppError> {
        let staged = self
            .retrieve_staged(query, target_collection, refeed)
            .await?;
        Ok(merge_by_id(staged.target, self.limit()))
    }

    /// Both stages keyed by collection name. Without refeed only the target appears.
    pub async fn retrieve_raw(
        &self,
        query: &str,
        target_collection: &str,
        refeed: bool,
    ) -> Result<NodesByKey, AppError> {
        let staged = self
            .retrieve_staged(query, target_collection, refeed)
            .await?;

        let mut by_collection = BTreeMap::new();
        if let Some(meta) = staged.meta {
            by_collection.insert(self.settings.meta_collection.clone(), meta);
        }
        by_collection.insert(
            target_collection.to_string(),
            merge_by_id(staged.target, self.limit()),
        );
        Ok(by_collection)
    }

    #[instrument(skip_all, fields(collection = %target_collection, refeed))]
    pub async fn retrieve_staged(
        &self,
        query: &str,
        target_collection: &str,
        refeed: bool,
    ) -> Result<StagedResults, AppError> {
        let refeed = refeed && target_collection != self.settings.meta_collection;

        if !refeed {
            let target = self.search_collection(target_collection, query).await?;
            return Ok(StagedResults {
                meta: None,
                target,
                effective_query: query.to_string(),
            });
        }

        let meta_by_vector = self
            .search_collection(&self.settings.meta_collection, query)
            .await?;
        let meta = merge_by_id(meta_by_vector, self.limit());

        let effective_query = match meta.first().and_then(ContentNode::content) {
            Some(meta_text) => format!("{query} {meta_text}"),
            None => query.to_string(),
        };
        debug!(
            meta_hits = meta.len(),
            enriched_len = effective_query.len(),
            "Meta stage completed"
        );

        let target = self
            .search_collection(target_collection, &effective_query)
            .await?;

        Ok(StagedResults {
            meta: Some(meta),
            target,
            effective_query,
        })
    }

    async fn search_collection(
        &self,
        collection: &str,
        query: &str,
    ) -> Result<NodesByKey, AppError> {
        let vector = self
            .embedding
            .embed(query)
            .await
            .map_err(AppError::Embedding)?;

        let mut results = BTreeMap::new();
        if self.settings.vector_names.is_empty() {
            let nodes = self
                .search
                .search(collection, vector, None, self.settings.limit)
                .await?;
            results.insert(DEFAULT_VECTOR_KEY.to_string(), nodes);
            return Ok(results);
        }

        for name in &self.settings.vector_names {
            let nodes = self
                .search
                .search(collection, vector.clone(), Some(name), self.settings.limit)
                .await?;
            results.insert(name.clone(), nodes);
        }
        Ok(results)
    }

    fn limit(&self) -> usize {
        usize::try_from(self.settings.limit).unwrap_or(usize::MAX)
    }
}

/// Flattens per-vector results, keeping each id once at its best score.
pub fn merge_by_id(results: NodesByKey, limit: usize) -> Vec<ContentNode> {
    let mut best: BTreeMap<String, ContentNode> = BTreeMap::new();
    for node in results.into_values().flatten() {
        match best.get(&node.id) {
            Some(existing) if existing.score >= node.score => {}
            _ => {
                best.insert(node.id.clone(), node);
            }
        }
    }

    let mut merged: Vec<ContentNode> = best.into_values().collect();
    merged.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
    merged.truncate(limit);
    merged
}
