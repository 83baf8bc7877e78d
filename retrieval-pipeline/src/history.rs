use std::{collections::HashSet, sync::Arc};

use common::{
    error::AppError,
    storage::{chat_store::ChatStore, types::chat_message::ConversationTurn},
};
use tracing::{debug, instrument, warn};

/// Assumed length of a stored turn when sizing the fetch.
pub const AVERAGE_TURN_CHARS: usize = 200;
/// Fewest stored messages requested whenever a fetch happens.
pub const MIN_FETCH: usize = 10;

pub struct HistoryReconciler {
    store: Arc<dyn ChatStore>,
    enabled: bool,
    char_budget: usize,
}

impl HistoryReconciler {
    pub fn new(store: Arc<dyn ChatStore>, enabled: bool, char_budget: usize) -> Self {
        Self {
            store,
            enabled,
            char_budget,
        }
    }

    /// Stored turns (oldest first) followed by `provided`.
    ///
    /// Stored turns whose text repeats a provided turn, or whose id is in
    /// `exclude_ids`, are skipped. The walk stops at the first stored turn that
    /// would exceed the budget. Any store failure returns `provided` as is.
    #[instrument(skip_all, fields(session_id, provided = provided.len()))]
    pub async fn reconcile(
        &self,
        session_id: Option<&str>,
        provided: Vec<ConversationTurn>,
        exclude_ids: &[String],
    ) -> Vec<ConversationTurn> {
        let Some(session_id) = session_id.filter(|id| !id.trim().is_empty()) else {
            return provided;
        };
        if !self.enabled {
            return provided;
        }

        let used: usize = provided.iter().map(ConversationTurn::text_len).sum();
        if used >= self.char_budget {
            debug!(used, budget = self.char_budget, "Provided history fills the budget");
            return provided;
        }

        match self.stored_turns(session_id, &provided, exclude_ids, used).await {
            Ok(mut merged) => {
                debug!(stored = merged.len(), "Merged stored history");
                merged.extend(provided);
                merged
            }
            Err(err) => {
                warn!(error = %err, "Stored history unavailable; using provided history only");
                provided
            }
        }
    }

    async fn stored_turns(
        &self,
        session_id: &str,
        provided: &[ConversationTurn],
        exclude_ids: &[String],
        mut used: usize,
    ) -> Result<Vec<ConversationTurn>, AppError> {
        let remaining = self.char_budget - used;
        let fetch_limit = remaining
            .div_ceil(AVERAGE_TURN_CHARS)
            .max(MIN_FETCH)
            .saturating_add(exclude_ids.len());

        let newest_first = self
            .store
            .get_conversation_history(session_id, fetch_limit, 0, None, None)
            .await?;

        let provided_texts: HashSet<&str> = provided.iter().map(|turn| turn.text.as_str()).collect();
        let mut accepted = Vec::new();

        for message in newest_first.into_iter().rev() {
            if exclude_ids.contains(&message.id) || provided_texts.contains(message.content.as_str()) {
                continue;
            }

            let turn = ConversationTurn::from(message);
            let length = turn.text_len();
            if used + length > self.char_budget {
                break;
            }
            used += length;
            accepted.push(turn);
        }

        Ok(accepted)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{Duration, Utc};
    use common::storage::{
        chat_store::NewMessage,
        types::chat_message::{MessageRole, StoredMessage},
    };
    use std::sync::Mutex;

    /// Chat store fake holding messages oldest first.
    #[derive(Default)]
    pub(crate) struct FakeChatStore {
        pub messages: Mutex<Vec<StoredMessage>>,
        pub fetches: Mutex<Vec<usize>>,
        pub fail_reads: bool,
        pub fail_writes: bool,
        pub vector_updates: Mutex<Vec<(String, String)>>,
    }

    impl FakeChatStore {
        pub(crate) fn with_turns(session_id: &str, turns: &[(MessageRole, &str)]) -> Self {
            let store = Self::default();
            let start = Utc::now() - Duration::minutes(60);
            {
                let mut messages = store.messages.lock().expect("lock");
                for (offset, (role, text)) in turns.iter().enumerate() {
                    let mut message = StoredMessage::new(
                        session_id.to_string(),
                        None,
                        *role,
                        (*text).to_string(),
                        None,
                        None,
                    );
                    message.id = format!("m{offset}");
                    message.created_at =
                        start + Duration::seconds(i64::try_from(offset).unwrap_or(0));
                    messages.push(message);
                }
            }
            store
        }

        pub(crate) fn fetch_count(&self) -> usize {
            self.fetches.lock().expect("lock").len()
        }

        pub(crate) fn stored(&self) -> Vec<StoredMessage> {
            self.messages.lock().expect("lock").clone()
        }
    }

    #[async_trait]
    impl ChatStore for FakeChatStore {
        async fn store_message(&self, message: NewMessage) -> Result<StoredMessage, AppError> {
            if self.fail_writes {
                return Err(AppError::InternalError("relational store down".to_string()));
            }
            let stored = StoredMessage::new(
                message.session_id,
                message.conversation_id,
                message.role,
                message.content,
                message.collection,
                message.username,
            );
            self.messages.lock().expect("lock").push(stored.clone());
            Ok(stored)
        }

        async fn get_conversation_history(
            &self,
            session_id: &str,
            limit: usize,
            offset: usize,
            _conversation_id: Option<&str>,
            _username: Option<&str>,
        ) -> Result<Vec<StoredMessage>, AppError> {
            self.fetches.lock().expect("lock").push(limit);
            if self.fail_reads {
                return Err(AppError::InternalError("relational store down".to_string()));
            }
            Ok(self
                .messages
                .lock()
                .expect("lock")
                .iter()
                .rev()
                .filter(|m| m.session_id == session_id)
                .skip(offset)
                .take(limit)
                .cloned()
                .collect())
        }

        async fn update_message_vector_id(
            &self,
            message_id: &str,
            point_id: &str,
        ) -> Result<(), AppError> {
            let mut messages = self.messages.lock().expect("lock");
            let message = messages
                .iter_mut()
                .find(|m| m.id == message_id)
                .ok_or_else(|| AppError::NotFound(message_id.to_string()))?;
            message.vector_point_id = Some(point_id.to_string());
            self.vector_updates
                .lock()
                .expect("lock")
                .push((message_id.to_string(), point_id.to_string()));
            Ok(())
        }

        async fn delete_session_messages(&self, session_id: &str) -> Result<usize, AppError> {
            let mut messages = self.messages.lock().expect("lock");
            let before = messages.len();
            messages.retain(|m| m.session_id != session_id);
            Ok(before - messages.len())
        }
    }

    fn turn(id: &str, role: MessageRole, text: &str) -> ConversationTurn {
        ConversationTurn::new(id, role, text)
    }

    fn texts(turns: &[ConversationTurn]) -> Vec<&str> {
        turns.iter().map(|t| t.text.as_str()).collect()
    }

    #[tokio::test]
    async fn test_disabled_or_sessionless_returns_provided() {
        let store = Arc::new(FakeChatStore::with_turns("s1", &[(MessageRole::User, "old")]));
        let provided = vec![turn("p1", MessageRole::User, "hi")];

        let disabled = HistoryReconciler::new(store.clone(), false, 1000);
        assert_eq!(disabled.reconcile(Some("s1"), provided.clone(), &[]).await, provided);

        let enabled = HistoryReconciler::new(store.clone(), true, 1000);
        assert_eq!(enabled.reconcile(None, provided.clone(), &[]).await, provided);
        assert_eq!(enabled.reconcile(Some("  "), provided.clone(), &[]).await, provided);
        assert_eq!(store.fetch_count(), 0);
    }

    #[tokio::test]
    async fn test_full_provided_history_skips_fetch() {
        let store = Arc::new(FakeChatStore::with_turns("s1", &[(MessageRole::User, "old")]));
        let reconciler = HistoryReconciler::new(store.clone(), true, 10);
        let provided = vec![turn("p1", MessageRole::User, "0123456789")];

        let merged = reconciler.reconcile(Some("s1"), provided.clone(), &[]).await;

        assert_eq!(merged, provided);
        assert_eq!(store.fetch_count(), 0);
    }

    #[tokio::test]
    async fn test_stored_turns_precede_provided_in_chronological_order() {
        let store = Arc::new(FakeChatStore::with_turns(
            "s1",
            &[
                (MessageRole::User, "What is virtue?"),
                (MessageRole::Assistant, "Virtue is a mean."),
                (MessageRole::User, "Between what?"),
            ],
        ));
        let reconciler = HistoryReconciler::new(store, true, 1000);
        let provided = vec![
            turn("p1", MessageRole::Assistant, "Between excess and deficiency."),
            turn("p2", MessageRole::User, "Give an example."),
        ];

        let merged = reconciler.reconcile(Some("s1"), provided, &[]).await;

        assert_eq!(
            texts(&merged),
            vec![
                "What is virtue?",
                "Virtue is a mean.",
                "Between what?",
                "Between excess and deficiency.",
                "Give an example."
            ]
        );
    }

    #[tokio::test]
    async fn test_duplicates_of_provided_turns_are_dropped() {
        let store = Arc::new(FakeChatStore::with_turns(
            "s1",
            &[
                (MessageRole::User, "What is virtue?"),
                (MessageRole::Assistant, "Virtue is a mean."),
            ],
        ));
        let reconciler = HistoryReconciler::new(store, true, 1000);
        let provided = vec![turn("p1", MessageRole::Assistant, "Virtue is a mean.")];

        let merged = reconciler.reconcile(Some("s1"), provided, &[]).await;

        assert_eq!(texts(&merged), vec!["What is virtue?", "Virtue is a mean."]);
    }

    #[tokio::test]
    async fn test_walk_stops_at_first_turn_over_budget() {
        let store = Arc::new(FakeChatStore::with_turns(
            "s1",
            &[
                (MessageRole::User, "aaaa"),
                (MessageRole::Assistant, "bbbbbbbbbbbbbbbbbbbb"),
                (MessageRole::User, "cc"),
            ],
        ));
        let reconciler = HistoryReconciler::new(store, true, 10);

        let merged = reconciler.reconcile(Some("s1"), Vec::new(), &[]).await;

        // "cc" would fit after "aaaa", but the walk stopped at the long turn.
        assert_eq!(texts(&merged), vec!["aaaa"]);
    }

    #[tokio::test]
    async fn test_excluded_ids_are_skipped() {
        let store = Arc::new(FakeChatStore::with_turns(
            "s1",
            &[
                (MessageRole::User, "earlier question"),
                (MessageRole::User, "current question"),
            ],
        ));
        let reconciler = HistoryReconciler::new(store, true, 1000);

        let merged = reconciler
            .reconcile(Some("s1"), Vec::new(), &["m1".to_string()])
            .await;

        assert_eq!(texts(&merged), vec!["earlier question"]);
    }

    #[tokio::test]
    async fn test_fetch_size_has_a_floor() {
        let store = Arc::new(FakeChatStore::with_turns("s1", &[(MessageRole::User, "x")]));
        let reconciler = HistoryReconciler::new(store.clone(), true, 50);

        reconciler.reconcile(Some("s1"), Vec::new(), &[]).await;

        assert_eq!(store.fetches.lock().expect("lock").as_slice(), &[MIN_FETCH]);
    }

    #[tokio::test]
    async fn test_store_failure_falls_back_to_provided() {
        let store = Arc::new(FakeChatStore {
            fail_reads: true,
            ..FakeChatStore::default()
        });
        let reconciler = HistoryReconciler::new(store, true, 1000);
        let provided = vec![turn("p1", MessageRole::User, "hello")];

        let merged = reconciler.reconcile(Some("s1"), provided.clone(), &[]).await;

        assert_eq!(merged, provided);
    }

    #[tokio::test]
    async fn test_sessions_do_not_leak() {
        let store = Arc::new(FakeChatStore::with_turns("other", &[(MessageRole::User, "secret")]));
        let reconciler = HistoryReconciler::new(store, true, 1000);

        let merged = reconciler.reconcile(Some("s1"), Vec::new(), &[]).await;

        assert!(merged.is_empty());
    }
}
