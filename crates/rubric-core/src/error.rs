use thiserror::Error;

use crate::types::PointId;

#[derive(Debug, Error)]
pub enum Error {
    /// The collection holds no points yet. Callers should run ingestion first.
    #[error("collection '{collection}' is empty; embed the catalog first")]
    NotReady { collection: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Embedding provider failed: {0:#}")]
    Embedding(anyhow::Error),

    #[error("Vector store failed: {0:#}")]
    Store(anyhow::Error),

    #[error("Vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Point id {point_id} is shared by rubric '{first}' and rubric '{second}'")]
    IdCollision { point_id: PointId, first: String, second: String },

    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn is_not_ready(&self) -> bool {
        matches!(self, Error::NotReady { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
