//! Rubric Index: maps catalog rows to vector-store points and back.
//!
//! The index owns no model or storage of its own. Both are injected as
//! `Arc<dyn Embedder>` / `Arc<dyn VectorStore>` so one loaded model can serve
//! many readers. Writes assume a single writer at a time.

use async_trait::async_trait;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use rubric_core::config::Settings;
use rubric_core::error::{Error, Result};
use rubric_core::traits::{Embedder, Retriever, VectorStore};
use rubric_core::types::{
    HealthStatus, Point, PointId, Rubric, RubricResult, SearchResponse, TextField,
};

/// Embedding runs larger than this show a progress bar.
const PROGRESS_THRESHOLD: usize = 100;

#[derive(Debug, Clone)]
pub struct IndexOptions {
    pub collection: String,
    pub batch_size: usize,
    pub scroll_page_size: usize,
    pub max_top_k: usize,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self { collection: "rubrics".to_string(), batch_size: 500, scroll_page_size: 1000, max_top_k: 100 }
    }
}

impl IndexOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            collection: settings.store.collection.clone(),
            batch_size: settings.embedding.batch_size,
            scroll_page_size: settings.index.scroll_page_size,
            max_top_k: settings.search.max_top_k,
        }
    }

    #[must_use]
    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = collection.into();
        self
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AddOptions {
    /// Leave rubrics whose id is already stored untouched.
    pub skip_existing: bool,
    pub text_field: TextField,
}

impl Default for AddOptions {
    fn default() -> Self {
        Self { skip_existing: true, text_field: TextField::Translation }
    }
}

pub struct RubricIndex {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    options: IndexOptions,
}

/// Cosine similarity clamped to `[-1, 1]` and rounded to 4 decimals.
fn round_score(score: f32) -> f32 {
    if score.is_nan() {
        return 0.0;
    }
    (score.clamp(-1.0, 1.0) * 10_000.0).round() / 10_000.0
}

fn progress_bar(len: usize) -> ProgressBar {
    let pb = ProgressBar::new(len as u64);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} rubrics ({percent}%) {msg}")
        .map(|s| s.progress_chars("#>-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    pb.set_style(style);
    pb
}

impl RubricIndex {
    pub fn new(embedder: Arc<dyn Embedder>, store: Arc<dyn VectorStore>, options: IndexOptions) -> Self {
        Self { embedder, store, options }
    }

    /// Construct and make sure the backing collection exists.
    pub async fn open(embedder: Arc<dyn Embedder>, store: Arc<dyn VectorStore>, options: IndexOptions) -> Result<Self> {
        let index = Self::new(embedder, store, options);
        index.ensure_collection().await?;
        Ok(index)
    }

    pub fn collection(&self) -> &str {
        &self.options.collection
    }

    pub fn model_id(&self) -> &str {
        self.embedder.model_id()
    }

    /// Idempotent: creates the collection with the embedder's dimensionality if absent.
    pub async fn ensure_collection(&self) -> Result<()> {
        self.store
            .create_collection(&self.options.collection, self.embedder.dim())
            .await
            .map_err(Error::Store)
    }

    pub async fn count(&self) -> Result<usize> {
        self.store.count(&self.options.collection).await.map_err(Error::Store)
    }

    /// Drop every point. The collection stays, empty, with the same schema.
    pub async fn clear(&self) -> Result<()> {
        self.store
            .reset_collection(&self.options.collection, self.embedder.dim())
            .await
            .map_err(Error::Store)?;
        tracing::info!(collection = %self.options.collection, "collection cleared");
        Ok(())
    }

    /// Every stored rubric id, scanned page by page.
    pub async fn get_existing_ids(&self) -> Result<HashSet<String>> {
        Ok(self.stored_points().await?.into_values().collect())
    }

    async fn stored_points(&self) -> Result<HashMap<PointId, String>> {
        let mut out = HashMap::new();
        let mut cursor = None;
        loop {
            let page = self
                .store
                .scroll(&self.options.collection, cursor, self.options.scroll_page_size)
                .await
                .map_err(Error::Store)?;
            for p in page.points {
                out.insert(p.id, p.payload.rubric_id);
            }
            match page.next {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        Ok(out)
    }

    /// Embed texts off the async runtime and check every vector's width.
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let embedder = Arc::clone(&self.embedder);
        let expected_rows = texts.len();
        let vectors = tokio::task::spawn_blocking(move || embedder.embed_batch(&texts))
            .await
            .map_err(|e| Error::Embedding(anyhow::anyhow!("embedding task failed: {e}")))?
            .map_err(Error::Embedding)?;
        if vectors.len() != expected_rows {
            return Err(Error::Embedding(anyhow::anyhow!(
                "embedder returned {} vectors for {} texts",
                vectors.len(),
                expected_rows
            )));
        }
        let dim = self.embedder.dim();
        if let Some(bad) = vectors.iter().find(|v| v.len() != dim) {
            return Err(Error::DimensionMismatch { expected: dim, actual: bad.len() });
        }
        Ok(vectors)
    }

    /// Embed and upsert `rubrics`. Returns how many were written.
    ///
    /// Batches are committed one at a time; a failure leaves earlier batches stored.
    pub async fn add_rubrics(&self, rubrics: &[Rubric], opts: AddOptions) -> Result<usize> {
        let mut seen: HashMap<PointId, &str> = HashMap::new();
        let mut pending: Vec<&Rubric> = Vec::with_capacity(rubrics.len());
        for r in rubrics {
            let pid = r.point_id();
            match seen.get(&pid) {
                Some(&first) if first == r.id => {
                    tracing::warn!(rubric_id = %r.id, "duplicate rubric id in input; keeping the first");
                }
                Some(&first) => {
                    return Err(Error::IdCollision { point_id: pid, first: first.to_string(), second: r.id.clone() });
                }
                None => {
                    seen.insert(pid, &r.id);
                    pending.push(r);
                }
            }
        }

        if opts.skip_existing {
            let stored = self.stored_points().await?;
            let mut fresh = Vec::with_capacity(pending.len());
            for r in pending {
                match stored.get(&r.point_id()) {
                    Some(existing) if *existing == r.id => {}
                    Some(existing) => {
                        return Err(Error::IdCollision {
                            point_id: r.point_id(),
                            first: existing.clone(),
                            second: r.id.clone(),
                        });
                    }
                    None => fresh.push(r),
                }
            }
            let skipped = rubrics.len() - fresh.len();
            if skipped > 0 {
                tracing::info!(skipped, "rubrics already present or duplicated");
            }
            pending = fresh;
        }

        if pending.is_empty() {
            return Ok(0);
        }

        let pb = (pending.len() > PROGRESS_THRESHOLD).then(|| progress_bar(pending.len()));
        let batch_size = self.options.batch_size.max(1);
        let mut added = 0usize;
        for batch in pending.chunks(batch_size) {
            let texts: Vec<String> = batch.iter().map(|r| r.text(opts.text_field).to_string()).collect();
            let vectors = self.embed(texts).await?;
            let points: Vec<Point> = batch
                .iter()
                .zip(vectors)
                .map(|(r, vector)| Point { id: r.point_id(), vector, payload: r.payload() })
                .collect();
            self.store
                .upsert(&self.options.collection, &points)
                .await
                .map_err(Error::Store)?;
            added += points.len();
            if let Some(pb) = &pb {
                pb.set_position(added as u64);
            }
            tracing::debug!(added, total = pending.len(), "batch committed");
        }
        if let Some(pb) = pb {
            pb.finish_with_message("done");
        }
        tracing::info!(collection = %self.options.collection, added, text_field = %opts.text_field, "rubrics embedded");
        Ok(added)
    }

    /// Nearest rubrics for `query`, best first. An empty collection yields `[]`.
    pub async fn search(&self, query: &str, top_k: usize) -> Result<Vec<RubricResult>> {
        if top_k == 0 {
            return Ok(Vec::new());
        }
        let count = self.count().await?;
        if count == 0 {
            return Ok(Vec::new());
        }
        let limit = top_k.min(count.max(1));
        let vector = self.embed(vec![query.to_string()]).await?.pop().unwrap_or_default();
        let hits = self
            .store
            .query(&self.options.collection, &vector, limit)
            .await
            .map_err(Error::Store)?;
        let mut results: Vec<RubricResult> = hits
            .into_iter()
            .map(|hit| {
                let score = round_score(hit.score);
                RubricResult::from_hit(hit, score)
            })
            .collect();
        results.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.rubric_id.cmp(&b.rubric_id)));
        results.truncate(limit);
        tracing::debug!(query, top_k, hits = results.len(), "search");
        Ok(results)
    }

    /// Validated search for presentation layers. An empty collection is `NotReady`.
    pub async fn search_response(&self, query: &str, top_k: usize) -> Result<SearchResponse> {
        if query.trim().is_empty() {
            return Err(Error::InvalidInput("query must not be empty".to_string()));
        }
        if top_k == 0 || top_k > self.options.max_top_k {
            return Err(Error::InvalidInput(format!("top_k must be within 1..={}", self.options.max_top_k)));
        }
        let total_in_collection = self.count().await?;
        if total_in_collection == 0 {
            return Err(Error::NotReady { collection: self.options.collection.clone() });
        }
        let results = self.search(query, top_k).await?;
        Ok(SearchResponse { query: query.to_string(), results, total_in_collection })
    }

    pub async fn status(&self) -> Result<HealthStatus> {
        Ok(HealthStatus {
            status: "ok".to_string(),
            collection: self.options.collection.clone(),
            collection_size: self.count().await?,
            model: self.embedder.model_id().to_string(),
        })
    }

    /// Make the collection hold exactly `rubrics`, embedded by `text_field`.
    /// A collection whose size already matches is left alone.
    pub async fn populate(&self, rubrics: &[Rubric], text_field: TextField) -> Result<usize> {
        let count = self.count().await?;
        if count == rubrics.len() {
            tracing::info!(collection = %self.options.collection, count, "collection already populated");
            return Ok(0);
        }
        self.clear().await?;
        self.add_rubrics(rubrics, AddOptions { skip_existing: false, text_field }).await
    }
}

#[async_trait]
impl Retriever for RubricIndex {
    async fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<RubricResult>> {
        self.search(query, top_k).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scores_are_clamped_and_rounded() {
        assert_eq!(round_score(1.000_03), 1.0);
        assert_eq!(round_score(-1.2), -1.0);
        assert!((round_score(0.123_456) - 0.1235).abs() < 1e-6);
        assert_eq!(round_score(f32::NAN), 0.0);
    }

    #[test]
    fn add_defaults_skip_existing_translation() {
        let opts = AddOptions::default();
        assert!(opts.skip_existing);
        assert_eq!(opts.text_field, TextField::Translation);
    }
}
