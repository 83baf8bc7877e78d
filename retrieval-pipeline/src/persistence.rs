use std::sync::Arc;

use common::storage::{
    chat_store::{ChatStore, NewMessage},
    types::chat_message::{MessageRole, StoredMessage},
    vector::MessageIndex,
};
use tracing::{debug, error, instrument, warn};

#[derive(Clone)]
pub struct MessageGateway {
    store: Arc<dyn ChatStore>,
    index: Arc<dyn MessageIndex>,
    enabled: bool,
}

impl MessageGateway {
    pub fn new(store: Arc<dyn ChatStore>, index: Arc<dyn MessageIndex>, enabled: bool) -> Self {
        Self {
            store,
            index,
            enabled,
        }
    }

    /// Records one turn. Never fails; the stored message is returned when the
    /// relational write succeeded.
    ///
    /// The relational store is written first and is authoritative. Only after it
    /// succeeds is the turn indexed in the vector store, and the first point id
    /// attached back to the relational record.
    #[instrument(skip_all, fields(role = %role))]
    pub async fn persist(
        &self,
        session_id: Option<&str>,
        role: MessageRole,
        content: &str,
        collection: Option<&str>,
        username: Option<&str>,
    ) -> Option<StoredMessage> {
        if !self.enabled {
            return None;
        }
        let session_id = session_id.filter(|id| !id.trim().is_empty())?;

        let request = NewMessage {
            session_id: session_id.to_string(),
            role,
            content: content.to_string(),
            collection: collection.map(str::to_string),
            conversation_id: None,
            username: username.map(str::to_string),
        };

        let mut stored = match self.store.store_message(request).await {
            Ok(stored) => stored,
            Err(err) => {
                error!(%session_id, error = %err, "Failed to store chat message");
                return None;
            }
        };

        match self.index.upload_message(&stored).await {
            Ok(point_ids) => match point_ids.into_iter().next() {
                Some(point_id) => {
                    match self
                        .store
                        .update_message_vector_id(&stored.id, &point_id)
                        .await
                    {
                        Ok(()) => stored.vector_point_id = Some(point_id),
                        Err(err) => {
                            warn!(message_id = %stored.id, error = %err, "Failed to attach vector point id");
                        }
                    }
                }
                None => warn!(message_id = %stored.id, "Vector upload returned no point ids"),
            },
            Err(err) => {
                warn!(message_id = %stored.id, error = %err, "Failed to index chat message; relational copy kept");
            }
        }

        debug!(message_id = %stored.id, %session_id, "Chat message persisted");
        Some(stored)
    }
}
