use std::sync::Arc;

use common::storage::{db::SurrealDbClient, vector::KnowledgeSearch};
use retrieval_pipeline::AnswerPipeline;

#[derive(Clone)]
pub struct ApiState {
    pub db: Arc<SurrealDbClient>,
    pub search: Arc<dyn KnowledgeSearch>,
    pub pipeline: Arc<AnswerPipeline>,
}

impl ApiState {
    pub fn new(
        db: Arc<SurrealDbClient>,
        search: Arc<dyn KnowledgeSearch>,
        pipeline: Arc<AnswerPipeline>,
    ) -> Self {
        Self {
            db,
            search,
            pipeline,
        }
    }
}
