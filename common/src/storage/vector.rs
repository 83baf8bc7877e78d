use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use qdrant_client::{
    qdrant::{
        point_id::PointIdOptions, value::Kind, CreateCollectionBuilder, Distance, PointId,
        PointStruct, SearchPointsBuilder, UpsertPointsBuilder, Value as QValue,
        VectorParamsBuilder,
    },
    Payload, Qdrant,
};
use serde_json::{json, Map, Value};
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    error::AppError,
    storage::types::{chat_message::StoredMessage, content_node::ContentNode},
    utils::{config::AppConfig, embedding::EmbeddingProvider},
};

/// Outcome of a collection existence probe.
///
/// "Absent" and "unreachable" are different situations for callers: the first
/// is a normal state (a user without uploads), the second is an outage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectionStatus {
    Exists,
    NotFound,
    Unreachable(String),
}

#[async_trait]
pub trait KnowledgeSearch: Send + Sync {
    async fn collection_status(&self, collection: &str) -> CollectionStatus;

    async fn list_collections(&self) -> Result<Vec<String>, AppError>;

    /// Similarity search; `vector_name` selects a named vector, `None` the default one.
    async fn search(
        &self,
        collection: &str,
        vector: Vec<f32>,
        vector_name: Option<&str>,
        limit: u64,
    ) -> Result<Vec<ContentNode>, AppError>;
}

#[async_trait]
pub trait MessageIndex: Send + Sync {
    /// Indexes a stored chat message, returning the ids of the points written.
    async fn upload_message(&self, message: &StoredMessage) -> Result<Vec<String>, AppError>;
}

pub struct QdrantStore {
    client: Qdrant,
    embedding: Arc<EmbeddingProvider>,
    message_collection: String,
}

impl QdrantStore {
    /// Builds the client; no connection is made until the first request.
    pub fn new(config: &AppConfig, embedding: Arc<EmbeddingProvider>) -> Result<Self, AppError> {
        if config.qdrant_url.trim().is_empty() {
            return Err(AppError::Validation("qdrant_url is empty".to_string()));
        }

        let mut builder = Qdrant::from_url(&config.qdrant_url);
        if let Some(key) = &config.qdrant_api_key {
            builder = builder.api_key(key.clone());
        }
        let client = builder.build()?;

        Ok(Self {
            client,
            embedding,
            message_collection: config.message_collection.clone(),
        })
    }

    async fn ensure_message_collection(&self) -> Result<(), AppError> {
        if self
            .client
            .collection_exists(self.message_collection.clone())
            .await?
        {
            return Ok(());
        }

        let size = u64::try_from(self.embedding.dimension())
            .map_err(|err| AppError::InternalError(err.to_string()))?;
        self.client
            .create_collection(
                CreateCollectionBuilder::new(&self.message_collection)
                    .vectors_config(VectorParamsBuilder::new(size, Distance::Cosine)),
            )
            .await?;

        info!(collection = %self.message_collection, size, "Created chat message collection");
        Ok(())
    }
}

#[async_trait]
impl KnowledgeSearch for QdrantStore {
    async fn collection_status(&self, collection: &str) -> CollectionStatus {
        match self.client.collection_exists(collection.to_string()).await {
            Ok(true) => CollectionStatus::Exists,
            Ok(false) => CollectionStatus::NotFound,
            Err(err) => CollectionStatus::Unreachable(err.to_string()),
        }
    }

    async fn list_collections(&self) -> Result<Vec<String>, AppError> {
        let response = self.client.list_collections().await?;
        Ok(response
            .collections
            .into_iter()
            .map(|description| description.name)
            .collect())
    }

    async fn search(
        &self,
        collection: &str,
        vector: Vec<f32>,
        vector_name: Option<&str>,
        limit: u64,
    ) -> Result<Vec<ContentNode>, AppError> {
        let mut builder = SearchPointsBuilder::new(collection, vector, limit).with_payload(true);
        if let Some(name) = vector_name {
            builder = builder.vector_name(name);
        }

        let response = self.client.search_points(builder).await?;

        let nodes: Vec<ContentNode> = response
            .result
            .into_iter()
            .map(|point| {
                ContentNode::new(
                    point_id_to_string(point.id),
                    point.score,
                    payload_to_json(point.payload),
                )
            })
            .collect();

        debug!(collection, vector_name, hits = nodes.len(), "Qdrant search completed");
        Ok(nodes)
    }
}

#[async_trait]
impl MessageIndex for QdrantStore {
    async fn upload_message(&self, message: &StoredMessage) -> Result<Vec<String>, AppError> {
        self.ensure_message_collection().await?;

        let vector = self.embedding.embed(&message.content).await?;
        let point_id = Uuid::new_v4().to_string();
        let payload = Payload::try_from(json!({
            "message_id": message.id,
            "session_id": message.session_id,
            "conversation_id": message.conversation_id,
            "username": message.username,
            "role": message.role.to_string(),
            "text": message.content,
            "philosopher_collection": message.philosopher_collection,
            "created_at": message.created_at.to_rfc3339(),
        }))
        .map_err(|err| AppError::VectorStore(err.to_string()))?;

        self.client
            .upsert_points(
                UpsertPointsBuilder::new(
                    &self.message_collection,
                    vec![PointStruct::new(point_id.clone(), vector, payload)],
                )
                .wait(true),
            )
            .await?;

        Ok(vec![point_id])
    }
}

fn point_id_to_string(id: Option<PointId>) -> String {
    match id.and_then(|id| id.point_id_options) {
        Some(PointIdOptions::Num(num)) => num.to_string(),
        Some(PointIdOptions::Uuid(uuid)) => uuid,
        None => String::new(),
    }
}

/// Converts a Qdrant payload into a JSON map, nested structs and lists included.
pub fn payload_to_json(payload: HashMap<String, QValue>) -> Map<String, Value> {
    payload
        .into_iter()
        .map(|(key, value)| (key, qvalue_to_json(value)))
        .collect()
}

fn qvalue_to_json(value: QValue) -> Value {
    match value.kind {
        Some(Kind::StringValue(s)) => Value::String(s),
        Some(Kind::IntegerValue(i)) => Value::Number(i.into()),
        Some(Kind::DoubleValue(f)) => json!(f),
        Some(Kind::BoolValue(b)) => Value::Bool(b),
        Some(Kind::StructValue(s)) => Value::Object(payload_to_json(s.fields)),
        Some(Kind::ListValue(list)) => {
            Value::Array(list.values.into_iter().map(qvalue_to_json).collect())
        }
        Some(Kind::NullValue(_)) | None => Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qdrant_client::qdrant::{ListValue, Struct};

    fn string_value(s: &str) -> QValue {
        QValue {
            kind: Some(Kind::StringValue(s.to_string())),
        }
    }

    #[test]
    fn test_payload_to_json_handles_nested_values() {
        let mut inner = HashMap::new();
        inner.insert("page".to_string(), QValue {
            kind: Some(Kind::IntegerValue(3)),
        });

        let mut payload = HashMap::new();
        payload.insert("text".to_string(), string_value("The unexamined life"));
        payload.insert(
            "meta".to_string(),
            QValue {
                kind: Some(Kind::StructValue(Struct { fields: inner })),
            },
        );
        payload.insert(
            "tags".to_string(),
            QValue {
                kind: Some(Kind::ListValue(ListValue {
                    values: vec![string_value("ethics"), string_value("socratic")],
                })),
            },
        );
        payload.insert("missing".to_string(), QValue { kind: None });

        let json = Value::Object(payload_to_json(payload));
        assert_eq!(json["text"], "The unexamined life");
        assert_eq!(json["meta"]["page"], 3);
        assert_eq!(json["tags"], json!(["ethics", "socratic"]));
        assert!(json["missing"].is_null());
    }

    #[test]
    fn test_point_ids_render_as_strings() {
        let numeric = PointId {
            point_id_options: Some(PointIdOptions::Num(42)),
        };
        assert_eq!(point_id_to_string(Some(numeric)), "42");
        assert_eq!(point_id_to_string(None), "");
    }

    #[test]
    fn test_store_rejects_empty_url() {
        let config = AppConfig {
            qdrant_url: "  ".to_string(),
            ..AppConfig::default()
        };
        let store = QdrantStore::new(&config, Arc::new(EmbeddingProvider::new_hashed(8)));
        assert!(matches!(store, Err(AppError::Validation(_))));
    }
}
