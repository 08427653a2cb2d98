//! Sentence embedders.
//!
//! [`MiniLmEmbedder`] runs a local sentence-transformers BERT checkpoint
//! (`all-MiniLM-L6-v2` by default) with candle and mean pooling.
//! [`FakeEmbedder`] hashes tokens into buckets and is used by tests and
//! whenever `embedding.fake` is set.

use anyhow::{anyhow, ensure, Context, Result};
use std::collections::HashMap;
use std::hash::Hasher;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use serde::Deserialize;
use tokenizers::Tokenizer;
use twox_hash::XxHash64;

use rubric_core::config::{resolve_with_base, EmbeddingSettings};
use rubric_core::traits::Embedder;

mod device;
mod pool;
mod tokenize;

pub use device::select_device;
pub use pool::masked_mean_l2;
pub use tokenize::tokenize_batch;

/// The two `config.json` fields the embedder needs for itself.
#[derive(Deserialize)]
struct ModelShape {
    hidden_size: usize,
    max_position_embeddings: usize,
}

pub struct MiniLmEmbedder {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    model_id: String,
    dim: usize,
    max_len: usize,
}

impl MiniLmEmbedder {
    /// Load `tokenizer.json`, `config.json` and weights from `model_dir`.
    /// Weights are read from `model.safetensors`, falling back to `pytorch_model.bin`.
    pub fn load(model_dir: &Path, model_id: &str, max_len: usize) -> Result<Self> {
        let device = select_device();
        tracing::info!(model = model_id, dir = %model_dir.display(), "loading embedding model");

        let tokenizer_path = model_dir.join("tokenizer.json");
        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow!("Failed to load tokenizer from {}: {}", tokenizer_path.display(), e))?;

        let config_path = model_dir.join("config.json");
        let raw = std::fs::read_to_string(&config_path).with_context(|| format!("reading {}", config_path.display()))?;
        let config: BertConfig = serde_json::from_str(&raw)?;
        let shape: ModelShape = serde_json::from_str(&raw)?;
        let dim = shape.hidden_size;
        let max_len = max_len.min(shape.max_position_embeddings);

        let safetensors = model_dir.join("model.safetensors");
        let weights: HashMap<String, Tensor> = if safetensors.exists() {
            candle_core::safetensors::load(&safetensors, &device)?
        } else {
            let bin = model_dir.join("pytorch_model.bin");
            candle_core::pickle::read_all(&bin)
                .with_context(|| format!("reading {}", bin.display()))?
                .into_iter()
                .collect()
        };
        let vb = VarBuilder::from_tensors(weights, DType::F32, &device);
        let model = BertModel::load(vb, &config)?;
        tracing::info!(model = model_id, dim, max_len, "embedding model loaded");

        Ok(Self { model, tokenizer, device, model_id: model_id.to_string(), dim, max_len })
    }
}

impl Embedder for MiniLmEmbedder {
    fn model_id(&self) -> &str { &self.model_id }
    fn dim(&self) -> usize { self.dim }
    fn max_len(&self) -> usize { self.max_len }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let start = Instant::now();
        let (input_ids, attention_mask) = tokenize_batch(&self.tokenizer, texts, self.max_len, &self.device)?;
        let token_type_ids = input_ids.zeros_like()?;
        let hidden = self.model.forward(&input_ids, &token_type_ids, Some(&attention_mask))?;
        let pooled = masked_mean_l2(&hidden, &attention_mask)?;
        let vectors: Vec<Vec<f32>> = pooled.to_device(&Device::Cpu)?.to_vec2()?;
        ensure!(vectors.len() == texts.len(), "embedder returned {} vectors for {} texts", vectors.len(), texts.len());
        tracing::debug!(batch = texts.len(), elapsed_ms = start.elapsed().as_millis() as u64, "embedded batch");
        Ok(vectors)
    }
}

/// Deterministic bag-of-words embedder: each lowercased token adds weight to
/// an xxHash bucket. Texts sharing words get positive cosine similarity.
/// Text without any tokens maps to the zero vector.
pub struct FakeEmbedder {
    dim: usize,
    model_id: String,
}

impl FakeEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim, model_id: format!("fake-{dim}") }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0f32; self.dim];
        let tokens = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(str::to_lowercase);
        for token in tokens {
            let mut hasher = XxHash64::with_seed(0);
            hasher.write(token.as_bytes());
            let h = hasher.finish();
            let idx = (h % self.dim as u64) as usize;
            v[idx] += 0.5 + ((h >> 32) as u32) as f32 / u32::MAX as f32;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut v { *x /= norm; }
        }
        v
    }
}

impl Embedder for FakeEmbedder {
    fn model_id(&self) -> &str { &self.model_id }
    fn dim(&self) -> usize { self.dim }
    fn max_len(&self) -> usize { usize::MAX }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

/// Build the configured embedder. Relative model dirs resolve against `base_dir`.
pub fn build_embedder(settings: &EmbeddingSettings, base_dir: &Path) -> Result<Arc<dyn Embedder>> {
    if settings.fake {
        tracing::info!(dim = settings.dim, "using FakeEmbedder");
        return Ok(Arc::new(FakeEmbedder::new(settings.dim)));
    }
    let model_dir = resolve_model_dir(settings, base_dir)?;
    let model = MiniLmEmbedder::load(&model_dir, &settings.model_name, settings.max_len)?;
    ensure!(
        model.dim() == settings.dim,
        "model {} produces {}-dim vectors but embedding.dim = {}",
        settings.model_name,
        model.dim(),
        settings.dim
    );
    Ok(Arc::new(model))
}

/// `embedding.model_dir` when set, otherwise `models/<model_name>` next to or above `base_dir`.
pub fn resolve_model_dir(settings: &EmbeddingSettings, base_dir: &Path) -> Result<PathBuf> {
    if let Some(dir) = settings.model_dir.as_deref().filter(|d| !d.is_empty()) {
        let p = resolve_with_base(base_dir, dir);
        ensure!(p.exists(), "embedding.model_dir {} does not exist", p.display());
        return Ok(p);
    }
    let candidates = [
        base_dir.join("models").join(&settings.model_name),
        base_dir.join("..").join("models").join(&settings.model_name),
    ];
    candidates
        .into_iter()
        .find(|p| p.exists())
        .ok_or_else(|| anyhow!("Could not locate model directory for {} (set embedding.model_dir)", settings.model_name))
}
