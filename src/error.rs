use thiserror::Error;

use crate::cache::CacheError;
use crate::sync::StoreError;
use crate::sync::ollama::AssistantError;

#[derive(Debug, Error)]
pub enum Error {
    #[error("durable store: {0}")]
    Store(#[from] StoreError),

    #[error("local cache: {0}")]
    Cache(#[from] CacheError),

    #[error("assistant: {0}")]
    Assistant(#[from] AssistantError),

    #[error("{0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("config: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;
