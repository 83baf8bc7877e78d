use std::sync::Arc;

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequest, CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use common::{
    error::AppError,
    storage::types::{
        chat_message::{ConversationTurn, MessageRole},
        content_node::ContentNode,
    },
};
use futures::{stream::BoxStream, StreamExt};
use tracing::{debug, warn};

use crate::prompt::{
    create_user_message, document_turns, fit_to_window, format_passages, system_prompt,
};

/// Everything one model call needs, window size included.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub query: String,
    pub nodes: Vec<ContentNode>,
    pub history: Vec<ConversationTurn>,
    pub persona: Option<String>,
    pub temperature: f32,
    pub context_window: usize,
}

pub type TextStream = BoxStream<'static, Result<String, AppError>>;

#[async_trait]
pub trait InferenceBackend: Send + Sync {
    async fn chat(&self, request: ChatRequest) -> Result<String, AppError>;

    /// Incremental answer text; empty deltas are not yielded.
    async fn chat_stream(&self, request: ChatRequest) -> Result<TextStream, AppError>;
}

pub struct OpenAiInference {
    client: Arc<Client<OpenAIConfig>>,
    model: String,
}

impl OpenAiInference {
    pub fn new(client: Arc<Client<OpenAIConfig>>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }

    fn create_chat_request(
        &self,
        request: ChatRequest,
    ) -> Result<CreateChatCompletionRequest, OpenAIError> {
        CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .temperature(request.temperature)
            .messages(build_messages(request)?)
            .build()
    }
}

/// System prompt, document excerpts, history, then passages with the question.
pub fn build_messages(
    request: ChatRequest,
) -> Result<Vec<ChatCompletionRequestMessage>, OpenAIError> {
    let ChatRequest {
        query,
        mut nodes,
        history,
        persona,
        context_window,
        ..
    } = request;

    let dropped = fit_to_window(&mut nodes, &history, &query, context_window);
    if dropped > 0 {
        warn!(dropped, context_window, "Dropped passages to fit the context window");
    }

    let (doc_turns, passages) = document_turns(nodes);

    let mut messages: Vec<ChatCompletionRequestMessage> = Vec::new();
    messages.push(
        ChatCompletionRequestSystemMessageArgs::default()
            .content(system_prompt(persona.as_deref()))
            .build()?
            .into(),
    );

    for turn in doc_turns.into_iter().chain(history) {
        messages.push(turn_to_message(turn)?);
    }

    messages.push(
        ChatCompletionRequestUserMessageArgs::default()
            .content(create_user_message(&format_passages(&passages), &query))
            .build()?
            .into(),
    );

    Ok(messages)
}

fn turn_to_message(turn: ConversationTurn) -> Result<ChatCompletionRequestMessage, OpenAIError> {
    Ok(match turn.role {
        MessageRole::User => ChatCompletionRequestUserMessageArgs::default()
            .content(turn.text)
            .build()?
            .into(),
        MessageRole::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
            .content(turn.text)
            .build()?
            .into(),
        MessageRole::System => ChatCompletionRequestSystemMessageArgs::default()
            .content(turn.text)
            .build()?
            .into(),
    })
}

#[async_trait]
impl InferenceBackend for OpenAiInference {
    async fn chat(&self, request: ChatRequest) -> Result<String, AppError> {
        let context_window = request.context_window;
        let request = self.create_chat_request(request)?;
        let response = self.client.chat().create(request).await?;

        let answer = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| AppError::LLMParsing("No content found in LLM response".into()))?;

        debug!(context_window, answer_len = answer.len(), "Chat completion finished");
        Ok(answer)
    }

    async fn chat_stream(&self, request: ChatRequest) -> Result<TextStream, AppError> {
        let request = self.create_chat_request(request)?;
        let stream = self.client.chat().create_stream(request).await?;

        Ok(stream
            .filter_map(|result| async move {
                match result {
                    Ok(response) => response
                        .choices
                        .first()
                        .and_then(|choice| choice.delta.content.clone())
                        .filter(|content| !content.is_empty())
                        .map(Ok),
                    Err(err) => Some(Err(AppError::from(err))),
                }
            })
            .boxed())
    }
}
