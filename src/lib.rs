pub mod cache;
pub mod chat;
pub mod corpus;
pub mod embeddings;
pub mod llm;
pub mod query;
pub mod search;
pub mod vectordb;

pub mod error;
pub mod types;
pub mod config;

pub use error::{Error, Result};
pub use types::*;
pub use config::Config;
