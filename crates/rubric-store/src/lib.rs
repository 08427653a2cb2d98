//! Vector store backends behind [`rubric_core::traits::VectorStore`].

use anyhow::Result;
use std::sync::Arc;

use rubric_core::config::StoreConfig;
use rubric_core::traits::VectorStore;

pub mod lance;
pub mod memory;
pub mod qdrant;
pub mod schema;

pub use lance::LanceStore;
pub use memory::MemoryStore;
pub use qdrant::QdrantStore;

/// Open the backend selected by configuration.
pub async fn open_store(config: &StoreConfig) -> Result<Arc<dyn VectorStore>> {
    let store: Arc<dyn VectorStore> = match config {
        StoreConfig::Local { path } => Arc::new(LanceStore::open(path).await?),
        StoreConfig::Remote { url, api_key } => Arc::new(QdrantStore::new(url, api_key.as_deref())?),
        StoreConfig::Memory => Arc::new(MemoryStore::new()),
    };
    tracing::info!(backend = store.backend(), "vector store ready");
    Ok(store)
}
