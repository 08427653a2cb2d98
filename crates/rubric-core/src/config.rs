//! Layered configuration and path helpers.
//!
//! Uses Figment to merge built-in defaults, `config.toml`, `config.<env>.toml`
//! and `APP_*` env vars (`__` separates nested keys, e.g. `APP_STORE__MODE`).
//! `APP_USE_FAKE_EMBEDDINGS` and `APP_MODEL_DIR` are shorthands for
//! `embedding.fake` and `embedding.model_dir`.
//! The store backend is resolved once into a [`StoreConfig`].

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::types::TextField;

pub struct Config {
    figment: Figment,
    base_dir: PathBuf,
}

impl Config {
    /// Load from the current directory.
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new("."))
    }

    /// Load `config.toml` and `config.<env>.toml` from `base_dir`, then `APP_*` env vars.
    pub fn load_from(base_dir: &Path) -> Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::new().merge(Toml::file(base_dir.join("config.toml")));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file(base_dir.join("config.dev.toml"))),
            "prod" | "production" => figment = figment.merge(Toml::file(base_dir.join("config.prod.toml"))),
            "test" | "testing" => figment = figment.merge(Toml::file(base_dir.join("config.test.toml"))),
            _ => {}
        }
        figment = figment
            .merge(Env::raw().only(&["APP_USE_FAKE_EMBEDDINGS"]).map(|_| "embedding.fake".into()))
            .merge(Env::raw().only(&["APP_MODEL_DIR"]).map(|_| "embedding.model_dir".into()))
            .merge(Env::prefixed("APP_").split("__"));

        Ok(Self { figment, base_dir: base_dir.to_path_buf() })
    }

    pub fn get<T>(&self, key: &str) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| Error::InvalidConfig(format!("Failed to get '{key}': {e}")))
    }

    /// Typed, validated settings.
    pub fn settings(&self) -> Result<Settings> {
        let settings: Settings = self
            .figment
            .extract()
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub store: StoreSettings,
    pub embedding: EmbeddingSettings,
    pub index: IndexSettings,
    pub search: SearchSettings,
    pub eval: EvalSettings,
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| Err(Error::InvalidConfig(msg.to_string()));
        if self.embedding.dim == 0 {
            return invalid("embedding.dim must be positive");
        }
        if self.embedding.batch_size == 0 {
            return invalid("embedding.batch_size must be positive");
        }
        if self.embedding.max_len == 0 {
            return invalid("embedding.max_len must be positive");
        }
        if self.index.scroll_page_size == 0 {
            return invalid("index.scroll_page_size must be positive");
        }
        if self.store.collection.trim().is_empty() {
            return invalid("store.collection must not be empty");
        }
        if self.search.default_top_k == 0 || self.search.default_top_k > self.search.max_top_k {
            return invalid("search.default_top_k must be within 1..=search.max_top_k");
        }
        if self.eval.cutoffs.is_empty() {
            return invalid("eval.cutoffs must not be empty");
        }
        if self.eval.cutoffs.iter().any(|&k| k == 0 || k > self.eval.top_k) {
            return invalid("eval.cutoffs must be within 1..=eval.top_k");
        }
        if !(self.eval.comparison_margin >= 0.0) {
            return invalid("eval.comparison_margin must be non-negative");
        }
        if self.store.mode == StoreMode::Remote && self.store.url.trim().is_empty() {
            return invalid("store.url is required when store.mode = \"remote\"");
        }
        Ok(())
    }
}

/// Where points live. Resolved once into a [`StoreConfig`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreMode {
    /// Embedded LanceDB directory.
    #[default]
    Local,
    /// Qdrant over HTTP.
    Remote,
    /// In-process, nothing persisted.
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    pub mode: StoreMode,
    pub path: String,
    pub url: String,
    pub api_key: Option<String>,
    pub collection: String,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            mode: StoreMode::Local,
            path: "data/lancedb".to_string(),
            url: "http://localhost:6333".to_string(),
            api_key: None,
            collection: "rubrics".to_string(),
        }
    }
}

/// Fully resolved store selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreConfig {
    Local { path: PathBuf },
    Remote { url: String, api_key: Option<String> },
    Memory,
}

impl StoreSettings {
    pub fn resolve(&self, base_dir: &Path) -> StoreConfig {
        match self.mode {
            StoreMode::Local => StoreConfig::Local { path: resolve_with_base(base_dir, &self.path) },
            StoreMode::Remote => StoreConfig::Remote {
                url: self.url.trim_end_matches('/').to_string(),
                api_key: self.api_key.clone().filter(|k| !k.is_empty()),
            },
            StoreMode::Memory => StoreConfig::Memory,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub model_name: String,
    pub model_dir: Option<String>,
    pub dim: usize,
    pub max_len: usize,
    pub batch_size: usize,
    pub fake: bool,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            model_name: "all-MiniLM-L6-v2".to_string(),
            model_dir: None,
            dim: 384,
            max_len: 256,
            batch_size: 500,
            fake: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexSettings {
    pub scroll_page_size: usize,
    pub text_field: TextField,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self { scroll_page_size: 1000, text_field: TextField::Translation }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    pub default_top_k: usize,
    pub max_top_k: usize,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self { default_top_k: 10, max_top_k: 100 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvalSettings {
    pub top_k: usize,
    pub cutoffs: Vec<usize>,
    pub comparison_margin: f64,
}

impl Default for EvalSettings {
    fn default() -> Self {
        Self { top_k: 10, cutoffs: vec![1, 3, 5, 10], comparison_margin: 0.05 }
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}
