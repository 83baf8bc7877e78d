use std::sync::Arc;

use common::{
    error::AppError,
    storage::{
        types::content_node::{ContentNode, USER_DOCUMENT_SOURCE},
        vector::{CollectionStatus, KnowledgeSearch},
    },
    utils::embedding::EmbeddingProvider,
};
use tracing::{debug, error, instrument, warn};

/// Collection holding a user's documents: `prefix` plus the username with
/// anything outside `[A-Za-z0-9_-]` replaced by `_`.
pub fn user_collection_name(prefix: &str, username: &str) -> String {
    let sanitized: String = username
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("{prefix}{sanitized}")
}

pub struct DocumentAugmenter {
    search: Arc<dyn KnowledgeSearch>,
    embedding: Arc<EmbeddingProvider>,
    collection_prefix: String,
}

impl DocumentAugmenter {
    pub fn new(
        search: Arc<dyn KnowledgeSearch>,
        embedding: Arc<EmbeddingProvider>,
        collection_prefix: impl Into<String>,
    ) -> Self {
        Self {
            search,
            embedding,
            collection_prefix: collection_prefix.into(),
        }
    }

    /// Returns `base_nodes` with the user's matching passages in front.
    ///
    /// Never fails: a missing collection, an unreachable store or a failed
    /// search all yield `base_nodes` unchanged.
    #[instrument(skip_all, fields(username, limit))]
    pub async fn augment(
        &self,
        base_nodes: Vec<ContentNode>,
        username: &str,
        query: &str,
        limit: u64,
    ) -> Vec<ContentNode> {
        let collection = user_collection_name(&self.collection_prefix, username);

        match self.search.collection_status(&collection).await {
            CollectionStatus::Exists => {}
            CollectionStatus::NotFound => {
                debug!(%collection, "User has no document collection");
                return base_nodes;
            }
            CollectionStatus::Unreachable(reason) => {
                error!(%collection, %reason, "Vector store unreachable while checking user documents");
                return base_nodes;
            }
        }

        match self.search_documents(&collection, query, limit).await {
            Ok(mut documents) => {
                debug!(%collection, documents = documents.len(), "Prepending user document passages");
                documents.extend(base_nodes);
                documents
            }
            Err(err) => {
                warn!(%collection, error = %err, "User document search failed; continuing without it");
                base_nodes
            }
        }
    }

    async fn search_documents(
        &self,
        collection: &str,
        query: &str,
        limit: u64,
    ) -> Result<Vec<ContentNode>, AppError> {
        let vector = self
            .embedding
            .embed(query)
            .await
            .map_err(AppError::Embedding)?;

        let mut documents = self.search.search(collection, vector, None, limit).await?;
        for document in &mut documents {
            document.set_source(USER_DOCUMENT_SOURCE);
        }
        Ok(documents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::refeed::tests::{node, FakeSearch};

    fn augmenter(search: Arc<FakeSearch>) -> DocumentAugmenter {
        DocumentAugmenter::new(search, Arc::new(EmbeddingProvider::new_hashed(8)), "user_docs_")
    }

    fn base() -> Vec<ContentNode> {
        vec![node("kb1", 0.9, "Corpus passage")]
    }

    #[test]
    fn test_collection_name_is_sanitized() {
        assert_eq!(user_collection_name("user_docs_", "alice"), "user_docs_alice");
        assert_eq!(
            user_collection_name("user_docs_", "bob.smith@example.com"),
            "user_docs_bob_smith_example_com"
        );
    }

    #[tokio::test]
    async fn test_documents_are_prepended_and_attributed() {
        let search = Arc::new(FakeSearch::default().with(
            "user_docs_alice",
            vec![node("d1", 0.3, "My thesis notes"), node("d2", 0.2, "Reading list")],
        ));
        let augmenter = augmenter(search);

        let merged = augmenter.augment(base(), "alice", "thesis", 5).await;

        let ids: Vec<&str> = merged.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["d1", "d2", "kb1"]);
        assert!(merged[0].is_user_document());
        assert!(merged[1].is_user_document());
        assert!(!merged[2].is_user_document());
    }

    #[tokio::test]
    async fn test_missing_collection_returns_base_without_search() {
        let search = Arc::new(FakeSearch::default());
        let augmenter = augmenter(search.clone());

        let merged = augmenter.augment(base(), "newcomer", "anything", 5).await;

        assert_eq!(merged, base());
        assert!(search.calls().is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_store_returns_base() {
        let search = Arc::new(FakeSearch {
            unreachable: true,
            ..FakeSearch::default()
        });
        let augmenter = augmenter(search.clone());

        let merged = augmenter.augment(base(), "alice", "anything", 5).await;

        assert_eq!(merged, base());
        assert!(search.calls().is_empty());
    }

    #[tokio::test]
    async fn test_search_failure_is_swallowed() {
        let search = Arc::new(FakeSearch {
            fail_search: true,
            ..FakeSearch::default().with("user_docs_alice", vec![node("d1", 0.3, "notes")])
        });
        let augmenter = augmenter(search.clone());

        let merged = augmenter.augment(base(), "alice", "notes", 5).await;

        assert_eq!(merged, base());
        assert_eq!(search.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_limit_is_passed_to_search() {
        let search = Arc::new(FakeSearch::default().with(
            "user_docs_alice",
            vec![node("d1", 0.3, "a"), node("d2", 0.2, "b"), node("d3", 0.1, "c")],
        ));
        let augmenter = augmenter(search);

        let merged = augmenter.augment(Vec::new(), "alice", "a", 2).await;
        assert_eq!(merged.len(), 2);
    }
}
