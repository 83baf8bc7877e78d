pub mod answer;
pub mod budget;
pub mod collections;
pub mod history;
pub mod inference;
pub mod persistence;
pub mod prompt;
pub mod refeed;
pub mod user_documents;

pub use answer::{
    AnswerError, AnswerPipeline, AnswerStream, AskRequest, AskResponse, HybridQuery,
    HybridResponse, PipelineSettings, PreparedAnswer, SourceSummary,
};
pub use budget::{ContextBudgetDecision, WindowTier};
pub use collections::{resolve, validate_collection, ResolveError};
pub use inference::{ChatRequest, InferenceBackend, OpenAiInference, TextStream};
