use thiserror::Error;

use crate::embeddings::ProviderError;

pub type Result<T> = std::result::Result<T, SearchError>;

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Provider still failing after {attempts} attempts: {source}")]
    ExhaustedRetries {
        attempts: u32,
        #[source]
        source: ProviderError,
    },

    #[error("Corpus unavailable at {path}: {reason}")]
    CorpusUnavailable { path: String, reason: String },

    #[error("Corrupt corpus: {0}")]
    CorruptCorpus(String),

    #[error("Embedding dimension mismatch: corpus has {expected}, query vector has {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod commands;
pub mod config;
pub mod corpus;
pub mod embeddings;
pub mod retrieval;
pub mod server;
