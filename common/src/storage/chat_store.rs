use async_trait::async_trait;
use tracing::debug;

use crate::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        types::{
            chat_message::{MessageRole, StoredMessage},
            StoredObject,
        },
    },
};

/// Parameters for writing one chat turn.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub session_id: String,
    pub role: MessageRole,
    pub content: String,
    pub collection: Option<String>,
    pub conversation_id: Option<String>,
    pub username: Option<String>,
}

/// Relational chat history. Every read and write is scoped to one `session_id`.
#[async_trait]
pub trait ChatStore: Send + Sync {
    async fn store_message(&self, message: NewMessage) -> Result<StoredMessage, AppError>;

    /// Returns messages newest first.
    async fn get_conversation_history(
        &self,
        session_id: &str,
        limit: usize,
        offset: usize,
        conversation_id: Option<&str>,
        username: Option<&str>,
    ) -> Result<Vec<StoredMessage>, AppError>;

    async fn update_message_vector_id(
        &self,
        message_id: &str,
        point_id: &str,
    ) -> Result<(), AppError>;

    /// Removes every message of a session, returning how many were deleted.
    async fn delete_session_messages(&self, session_id: &str) -> Result<usize, AppError>;
}

#[async_trait]
impl ChatStore for SurrealDbClient {
    async fn store_message(&self, message: NewMessage) -> Result<StoredMessage, AppError> {
        if message.session_id.trim().is_empty() {
            return Err(AppError::Validation("session_id is required".to_string()));
        }
        if message.content.trim().is_empty() {
            return Err(AppError::Validation(
                "message content must not be empty".to_string(),
            ));
        }

        let record = StoredMessage::new(
            message.session_id,
            message.conversation_id,
            message.role,
            message.content,
            message.collection,
            message.username,
        );

        let stored = self
            .store_item(record)
            .await?
            .ok_or_else(|| AppError::InternalError("message was not created".to_string()))?;

        debug!(message_id = %stored.id, session_id = %stored.session_id, role = %stored.role, "Stored chat message");
        Ok(stored)
    }

    async fn get_conversation_history(
        &self,
        session_id: &str,
        limit: usize,
        offset: usize,
        conversation_id: Option<&str>,
        username: Option<&str>,
    ) -> Result<Vec<StoredMessage>, AppError> {
        let mut sql =
            String::from("SELECT * FROM type::table($table_name) WHERE session_id = $session_id");
        if conversation_id.is_some() {
            sql.push_str(" AND conversation_id = $conversation_id");
        }
        if username.is_some() {
            sql.push_str(" AND username = $username");
        }
        sql.push_str(" ORDER BY created_at DESC LIMIT $limit START $offset");

        let mut query = self
            .client
            .query(sql)
            .bind(("table_name", StoredMessage::table_name()))
            .bind(("session_id", session_id.to_string()))
            .bind(("limit", limit))
            .bind(("offset", offset));
        if let Some(conversation_id) = conversation_id {
            query = query.bind(("conversation_id", conversation_id.to_string()));
        }
        if let Some(username) = username {
            query = query.bind(("username", username.to_string()));
        }

        let messages: Vec<StoredMessage> = query.await?.take(0)?;
        Ok(messages)
    }

    async fn update_message_vector_id(
        &self,
        message_id: &str,
        point_id: &str,
    ) -> Result<(), AppError> {
        let updated: Vec<StoredMessage> = self
            .client
            .query("UPDATE type::thing($table_name, $id) SET vector_point_id = $point_id RETURN AFTER")
            .bind(("table_name", StoredMessage::table_name()))
            .bind(("id", message_id.to_string()))
            .bind(("point_id", point_id.to_string()))
            .await?
            .take(0)?;

        if updated.is_empty() {
            return Err(AppError::NotFound(format!("message {message_id}")));
        }
        Ok(())
    }

    async fn delete_session_messages(&self, session_id: &str) -> Result<usize, AppError> {
        let deleted: Vec<StoredMessage> = self
            .client
            .query("DELETE type::table($table_name) WHERE session_id = $session_id RETURN BEFORE")
            .bind(("table_name", StoredMessage::table_name()))
            .bind(("session_id", session_id.to_string()))
            .await?
            .take(0)?;

        Ok(deleted.len())
    }
}
