use std::sync::Arc;

use common::{
    error::AppError,
    storage::{
        chat_store::ChatStore,
        types::{
            chat_message::{ConversationTurn, MessageRole},
            content_node::ContentNode,
        },
        vector::{KnowledgeSearch, MessageIndex},
    },
    utils::{config::AppConfig, embedding::EmbeddingProvider},
};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument};

use crate::{
    budget::{self, ContextBudgetDecision},
    collections::{validate_collection, ResolveError},
    history::HistoryReconciler,
    inference::{ChatRequest, InferenceBackend, TextStream},
    persistence::MessageGateway,
    refeed::{NodesByKey, RefeedRetriever, RefeedSettings},
    user_documents::DocumentAugmenter,
};

#[derive(Debug, Error)]
pub enum AnswerError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error("no relevant content found in collection '{collection}'")]
    NoContent { collection: String },
    #[error(transparent)]
    App(#[from] AppError),
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub meta_collection: String,
    pub message_collection: String,
    pub user_document_prefix: String,
    pub vector_names: Vec<String>,
    pub retrieval_limit: u64,
    pub document_context_limit: u64,
    pub default_context_window: usize,
    pub max_context_window: usize,
    pub history_char_budget: usize,
    pub chat_history_enabled: bool,
    pub pdf_context_enabled: bool,
    pub default_temperature: f32,
}

impl PipelineSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            meta_collection: config.meta_collection.clone(),
            message_collection: config.message_collection.clone(),
            user_document_prefix: config.user_document_collection_prefix.clone(),
            vector_names: config.hybrid_vector_names.clone(),
            retrieval_limit: config.retrieval_limit,
            document_context_limit: config.document_context_limit,
            default_context_window: config.default_context_window,
            max_context_window: config.max_context_window,
            history_char_budget: config.history_char_budget,
            chat_history_enabled: config.chat_history_enabled,
            pdf_context_enabled: config.pdf_context_enabled,
            default_temperature: config.default_temperature,
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

const fn default_refeed() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct AskRequest {
    pub query: String,
    pub collection: String,
    #[serde(default)]
    pub history: Vec<ConversationTurn>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default = "default_refeed")]
    pub refeed: bool,
    /// Answer in the voice of this thinker instead of as a commentator.
    #[serde(default)]
    pub persona: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub include_pdf_context: bool,
    /// Set by the HTTP layer from the authenticated identity.
    #[serde(skip)]
    pub username: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SourceSummary {
    pub id: String,
    pub score: f32,
    pub source: Option<String>,
    pub filename: Option<String>,
}

impl From<&ContentNode> for SourceSummary {
    fn from(node: &ContentNode) -> Self {
        Self {
            id: node.id.clone(),
            score: node.score,
            source: node.source().map(str::to_string),
            filename: node.filename().map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AskResponse {
    pub answer: String,
    pub collection: String,
    pub context_window: usize,
    pub rationale: String,
    pub sources: Vec<SourceSummary>,
}

/// Context assembled for one question, ready for the model.
#[derive(Debug, Clone)]
pub struct PreparedAnswer {
    pub collection: String,
    pub query: String,
    pub nodes: Vec<ContentNode>,
    pub history: Vec<ConversationTurn>,
    pub decision: ContextBudgetDecision,
    pub session_id: Option<String>,
    pub username: Option<String>,
    pub persona: Option<String>,
    pub temperature: f32,
}

impl PreparedAnswer {
    pub fn sources(&self) -> Vec<SourceSummary> {
        self.nodes.iter().map(SourceSummary::from).collect()
    }

    fn chat_request(&self) -> ChatRequest {
        ChatRequest {
            query: self.query.clone(),
            nodes: self.nodes.clone(),
            history: self.history.clone(),
            persona: self.persona.clone(),
            temperature: self.temperature,
            context_window: self.decision.window_size,
        }
    }
}

pub struct AnswerStream {
    pub collection: String,
    pub decision: ContextBudgetDecision,
    pub sources: Vec<SourceSummary>,
    pub chunks: TextStream,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HybridQuery {
    pub query: String,
    pub collection: String,
    #[serde(default = "default_refeed")]
    pub refeed: bool,
    /// Return both retrieval stages keyed by collection.
    #[serde(default)]
    pub raw: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct HybridResponse {
    pub collection: String,
    /// `vector` when keyed by vector name, `collection` in raw mode.
    pub keyed_by: &'static str,
    pub results: NodesByKey,
}

pub struct AnswerPipeline {
    search: Arc<dyn KnowledgeSearch>,
    inference: Arc<dyn InferenceBackend>,
    retriever: RefeedRetriever,
    documents: DocumentAugmenter,
    history: HistoryReconciler,
    gateway: MessageGateway,
    settings: PipelineSettings,
}

impl AnswerPipeline {
    pub fn new(
        search: Arc<dyn KnowledgeSearch>,
        chat_store: Arc<dyn ChatStore>,
        message_index: Arc<dyn MessageIndex>,
        inference: Arc<dyn InferenceBackend>,
        embedding: Arc<EmbeddingProvider>,
        settings: PipelineSettings,
    ) -> Self {
        let retriever = RefeedRetriever::new(
            search.clone(),
            embedding.clone(),
            RefeedSettings {
                meta_collection: settings.meta_collection.clone(),
                vector_names: settings.vector_names.clone(),
                limit: settings.retrieval_limit,
            },
        );
        let documents =
            DocumentAugmenter::new(search.clone(), embedding, settings.user_document_prefix.clone());
        let history = HistoryReconciler::new(
            chat_store.clone(),
            settings.chat_history_enabled,
            settings.history_char_budget,
        );
        let gateway = MessageGateway::new(chat_store, message_index, settings.chat_history_enabled);

        Self {
            search,
            inference,
            retriever,
            documents,
            history,
            gateway,
            settings,
        }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Knowledge-base collections, meta collection included. User document and
    /// chat message collections are left out.
    pub async fn searchable_collections(&self) -> Result<Vec<String>, AppError> {
        let mut names: Vec<String> = self
            .search
            .list_collections()
            .await?
            .into_iter()
            .filter(|name| {
                !name.starts_with(&self.settings.user_document_prefix)
                    && *name != self.settings.message_collection
            })
            .collect();
        names.sort();
        Ok(names)
    }

    /// Collections a user can ask about.
    pub async fn philosopher_collections(&self) -> Result<Vec<String>, AppError> {
        let mut names = self.searchable_collections().await?;
        names.retain(|name| *name != self.settings.meta_collection);
        Ok(names)
    }

    pub async fn resolve_collection(&self, input: &str) -> Result<String, AnswerError> {
        let known = self.searchable_collections().await?;
        Ok(validate_collection(input, &known)?)
    }

    #[instrument(skip_all, fields(collection = %request.collection, session_id = request.session_id.as_deref().unwrap_or_default()))]
    pub async fn prepare(&self, request: AskRequest) -> Result<PreparedAnswer, AnswerError> {
        let query = request.query.trim().to_string();
        if query.is_empty() {
            return Err(AppError::Validation("query must not be empty".to_string()).into());
        }

        let collection = self.resolve_collection(&request.collection).await?;
        let session_id = request.session_id.filter(|id| !id.trim().is_empty());
        let username = request.username.filter(|name| !name.trim().is_empty());

        // Stored before retrieval so concurrent history reads see it.
        let user_message = self
            .gateway
            .persist(
                session_id.as_deref(),
                MessageRole::User,
                &query,
                Some(&collection),
                username.as_deref(),
            )
            .await;

        let mut nodes = self
            .retriever
            .retrieve_flat(&query, &collection, request.refeed)
            .await?;

        if self.settings.pdf_context_enabled && request.include_pdf_context {
            if let Some(username) = username.as_deref() {
                nodes = self
                    .documents
                    .augment(nodes, username, &query, self.settings.document_context_limit)
                    .await;
            }
        }

        if nodes.is_empty() {
            return Err(AnswerError::NoContent { collection });
        }

        let exclude: Vec<String> = user_message.iter().map(|m| m.id.clone()).collect();
        let history = self
            .history
            .reconcile(session_id.as_deref(), request.history, &exclude)
            .await;

        let decision = budget::compute(
            &nodes,
            &history,
            query.chars().count(),
            self.settings.default_context_window,
            self.settings.max_context_window,
        );
        info!(
            window_size = decision.window_size,
            nodes = nodes.len(),
            history = history.len(),
            rationale = %decision.rationale,
            "Context budget decided"
        );

        Ok(PreparedAnswer {
            collection,
            query,
            nodes,
            history,
            decision,
            session_id,
            username,
            persona: request.persona.filter(|p| !p.trim().is_empty()),
            temperature: request
                .temperature
                .unwrap_or(self.settings.default_temperature),
        })
    }

    pub async fn answer(&self, request: AskRequest) -> Result<AskResponse, AnswerError> {
        let prepared = self.prepare(request).await?;
        let answer = self.inference.chat(prepared.chat_request()).await?;

        self.gateway
            .persist(
                prepared.session_id.as_deref(),
                MessageRole::Assistant,
                &answer,
                Some(&prepared.collection),
                prepared.username.as_deref(),
            )
            .await;

        Ok(AskResponse {
            sources: prepared.sources(),
            answer,
            collection: prepared.collection,
            context_window: prepared.decision.window_size,
            rationale: prepared.decision.rationale,
        })
    }

    /// Streams the answer. The assistant turn is stored once the stream is dropped,
    /// with whatever text was produced.
    pub async fn answer_stream(&self, request: AskRequest) -> Result<AnswerStream, AnswerError> {
        let prepared = self.prepare(request).await?;
        let stream = self.inference.chat_stream(prepared.chat_request()).await?;

        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        let gateway = self.gateway.clone();
        let session_id = prepared.session_id.clone();
        let username = prepared.username.clone();
        let collection = prepared.collection.clone();

        tokio::spawn(async move {
            let mut full_answer = String::new();
            while let Some(chunk) = rx.recv().await {
                full_answer.push_str(&chunk);
            }
            if full_answer.trim().is_empty() {
                debug!("Stream produced no text; nothing to store");
                return;
            }
            gateway
                .persist(
                    session_id.as_deref(),
                    MessageRole::Assistant,
                    &full_answer,
                    Some(&collection),
                    username.as_deref(),
                )
                .await;
        });

        let chunks = stream
            .inspect(move |item| {
                if let Ok(chunk) = item {
                    let _ = tx.send(chunk.clone());
                }
            })
            .boxed();

        Ok(AnswerStream {
            sources: prepared.sources(),
            collection: prepared.collection,
            decision: prepared.decision,
            chunks,
        })
    }

    #[instrument(skip_all, fields(collection = %query.collection, raw = query.raw))]
    pub async fn query_hybrid(&self, query: HybridQuery) -> Result<HybridResponse, AnswerError> {
        if query.query.trim().is_empty() {
            return Err(AppError::Validation("query must not be empty".to_string()).into());
        }
        let collection = self.resolve_collection(&query.collection).await?;

        let (keyed_by, results) = if query.raw {
            let results = self
                .retriever
                .retrieve_raw(&query.query, &collection, query.refeed)
                .await?;
            ("collection", results)
        } else {
            let results = self
                .retriever
                .retrieve(&query.query, &collection, query.refeed)
                .await?;
            ("vector", results)
        };

        Ok(HybridResponse {
            collection,
            keyed_by,
            results,
        })
    }
}
