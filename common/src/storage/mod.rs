pub mod chat_store;
pub mod db;
pub mod types;
pub mod vector;
