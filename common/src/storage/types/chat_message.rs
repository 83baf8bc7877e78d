#![allow(clippy::module_name_repetitions)]
use std::str::FromStr;

use uuid::Uuid;

use crate::stored_object;

#[derive(Deserialize, Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

stored_object!(StoredMessage, "chat_message", {
    conversation_id: String,
    session_id: String,
    username: Option<String>,
    role: MessageRole,
    content: String,
    philosopher_collection: Option<String>,
    vector_point_id: Option<String>
});

impl StoredMessage {
    pub fn new(
        session_id: String,
        conversation_id: Option<String>,
        role: MessageRole,
        content: String,
        philosopher_collection: Option<String>,
        username: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            conversation_id: conversation_id.unwrap_or_else(|| session_id.clone()),
            session_id,
            username,
            role,
            content,
            philosopher_collection,
            vector_point_id: None,
        }
    }
}

/// One exchange unit handed to the model as history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversationTurn {
    #[serde(default)]
    pub id: String,
    pub role: MessageRole,
    #[serde(alias = "content")]
    pub text: String,
}

impl ConversationTurn {
    pub fn new(id: impl Into<String>, role: MessageRole, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role,
            text: text.into(),
        }
    }

    pub fn text_len(&self) -> usize {
        self.text.chars().count()
    }
}

impl From<StoredMessage> for ConversationTurn {
    fn from(message: StoredMessage) -> Self {
        Self {
            id: message.id,
            role: message.role,
            text: message.content,
        }
    }
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
            MessageRole::System => write!(f, "system"),
        }
    }
}

impl FromStr for MessageRole {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "user" => Ok(Self::User),
            "assistant" | "ai" => Ok(Self::Assistant),
            "system" => Ok(Self::System),
            other => Err(format!("unknown message role '{other}'")),
        }
    }
}

impl fmt::Display for StoredMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.role, self.content)
    }
}
