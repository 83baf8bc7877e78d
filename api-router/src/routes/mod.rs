pub mod ask;
pub mod ask_stream;
pub mod chat_history;
pub mod collections;
pub mod liveness;
pub mod query_hybrid;
pub mod readiness;
