use async_trait::async_trait;

use crate::types::{Point, RubricResult, ScoredPoint, ScrollCursor, ScrollPage};

/// Maps text to fixed-length vectors. Implementations must return
/// L2-normalized vectors of length `dim()` for a given `model_id()`.
pub trait Embedder: Send + Sync {
    /// Stable identifier of the model (e.g. `all-MiniLM-L6-v2`).
    fn model_id(&self) -> &str;
    fn dim(&self) -> usize;
    fn max_len(&self) -> usize;
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;
}

/// Persists `(id, vector, payload)` points in named collections and answers
/// cosine nearest-neighbour queries.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Short backend label for logs and status output.
    fn backend(&self) -> &'static str;

    async fn collection_exists(&self, collection: &str) -> anyhow::Result<bool>;

    /// Create an empty collection with cosine distance. Must not fail if it already exists.
    async fn create_collection(&self, collection: &str, dim: usize) -> anyhow::Result<()>;

    /// Remove every point, leaving an empty collection of the same schema.
    async fn reset_collection(&self, collection: &str, dim: usize) -> anyhow::Result<()>;

    async fn upsert(&self, collection: &str, points: &[Point]) -> anyhow::Result<()>;

    /// At most `limit` hits, best first.
    async fn query(&self, collection: &str, vector: &[f32], limit: usize) -> anyhow::Result<Vec<ScoredPoint>>;

    async fn scroll(&self, collection: &str, cursor: Option<ScrollCursor>, limit: usize) -> anyhow::Result<ScrollPage>;

    async fn count(&self, collection: &str) -> anyhow::Result<usize>;
}

/// Anything that can rank rubrics for a free-text query.
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn retrieve(&self, query: &str, top_k: usize) -> crate::error::Result<Vec<RubricResult>>;
}
