use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Payload fields holding passage text, in the order they are preferred.
pub const CONTENT_FIELDS: [&str; 3] = ["text", "summary", "conjecture"];

/// Attribution tag for passages that came from a user's own documents.
pub const USER_DOCUMENT_SOURCE: &str = "user_document";

/// A scored passage returned by the vector store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContentNode {
    pub id: String,
    pub score: f32,
    #[serde(default)]
    pub payload: Map<String, Value>,
}

impl ContentNode {
    pub fn new(id: impl Into<String>, score: f32, payload: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            score,
            payload,
        }
    }

    /// First non-empty of `text`, `summary`, `conjecture`.
    pub fn content(&self) -> Option<&str> {
        CONTENT_FIELDS.iter().find_map(|field| {
            self.payload
                .get(*field)
                .and_then(Value::as_str)
                .filter(|value| !value.is_empty())
        })
    }

    pub fn content_len(&self) -> usize {
        self.content().map_or(0, |text| text.chars().count())
    }

    pub fn source(&self) -> Option<&str> {
        self.payload.get("source").and_then(Value::as_str)
    }

    pub fn filename(&self) -> Option<&str> {
        self.payload.get("filename").and_then(Value::as_str)
    }

    pub fn set_source(&mut self, source: &str) {
        self.payload
            .insert("source".to_string(), Value::String(source.to_string()));
    }

    pub fn is_user_document(&self) -> bool {
        self.source() == Some(USER_DOCUMENT_SOURCE)
    }
}
