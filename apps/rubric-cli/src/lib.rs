//! `rubricfinder` command line: embed a catalog, search it, and measure retrieval quality.

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rubric_core::catalog::load_catalog;
use rubric_core::config::{Config, Settings};
use rubric_core::traits::{Embedder, VectorStore};
use rubric_core::types::TextField;
use rubric_embed::build_embedder;
use rubric_eval::{compare, evaluate, load_test_set, report::comparison_table, EvalConfig, Verdict};
use rubric_index::{AddOptions, IndexOptions, RubricIndex};
use rubric_store::open_store;

#[derive(Parser, Debug)]
#[command(name = "rubricfinder")]
#[command(about = "Semantic search over a translated rubric catalog", long_about = None)]
pub struct Cli {
    /// Directory holding config.toml / config.<env>.toml
    #[arg(long, default_value = ".")]
    pub config_dir: PathBuf,

    /// Log level (overrides RUST_LOG)
    #[arg(long)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Embed catalog rubrics into the collection
    Embed {
        #[arg(long)]
        catalog: PathBuf,
        /// Clear the collection and re-embed everything
        #[arg(long)]
        force: bool,
        /// Field to embed (translation|path); defaults to index.text_field
        #[arg(long)]
        text_field: Option<TextField>,
    },
    /// Search for rubrics matching a free-text query
    Search {
        query: String,
        #[arg(long)]
        top_k: Option<usize>,
        /// Print the raw search response as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print collection size and active model
    Status,
    /// Replay test_* queries and report Hit@K / MRR
    Evaluate {
        #[arg(long)]
        tests: PathBuf,
        /// Print every query's rank
        #[arg(short, long)]
        verbose: bool,
        /// Write the full report as JSON
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Compare translation embeddings against original path embeddings
    Compare {
        #[arg(long)]
        catalog: PathBuf,
        #[arg(long)]
        tests: PathBuf,
    },
}

/// Shared state for one invocation: settings plus the loaded model and store.
struct App {
    settings: Settings,
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
}

impl App {
    async fn load(config_dir: &Path) -> Result<Self> {
        let config = Config::load_from(config_dir)?;
        let settings = config.settings()?;
        let store_config = settings.store.resolve(config.base_dir());
        let store = open_store(&store_config).await?;
        let embedder = build_embedder(&settings.embedding, config.base_dir())?;
        Ok(Self { settings, embedder, store })
    }

    async fn index(&self, collection: &str) -> Result<RubricIndex> {
        let options = IndexOptions::from_settings(&self.settings).with_collection(collection);
        Ok(RubricIndex::open(self.embedder.clone(), self.store.clone(), options).await?)
    }

    async fn main_index(&self) -> Result<RubricIndex> {
        self.index(&self.settings.store.collection).await
    }
}

pub async fn run(cli: Cli) -> Result<()> {
    let app = App::load(&cli.config_dir).await?;
    match cli.command {
        Command::Embed { catalog, force, text_field } => {
            let text_field = text_field.unwrap_or(app.settings.index.text_field);
            embed(&app, &catalog, force, text_field).await
        }
        Command::Search { query, top_k, json } => {
            let top_k = top_k.unwrap_or(app.settings.search.default_top_k);
            search(&app, &query, top_k, json).await
        }
        Command::Status => {
            let status = app.main_index().await?.status().await?;
            println!("{}", serde_json::to_string_pretty(&status)?);
            Ok(())
        }
        Command::Evaluate { tests, verbose, output } => run_evaluate(&app, &tests, verbose, output.as_deref()).await,
        Command::Compare { catalog, tests } => run_compare(&app, &catalog, &tests).await,
    }
}

async fn embed(app: &App, catalog_path: &Path, force: bool, text_field: TextField) -> Result<()> {
    let catalog = load_catalog(catalog_path)?;
    println!("Loaded {} rubrics from {} ({} without translation skipped)", catalog.rubrics.len(), catalog_path.display(), catalog.skipped);

    let index = app.main_index().await?;
    if force {
        index.clear().await?;
    }
    let added = index
        .add_rubrics(&catalog.rubrics, AddOptions { skip_existing: !force, text_field })
        .await?;
    let total = index.count().await?;
    println!("Added: {added}");
    println!("Skipped (already present): {}", catalog.rubrics.len() - added);
    println!("Total in '{}': {total}", index.collection());
    Ok(())
}

async fn search(app: &App, query: &str, top_k: usize, json: bool) -> Result<()> {
    let index = app.main_index().await?;
    let response = match index.search_response(query, top_k).await {
        Err(e) if e.is_not_ready() => {
            return Err(anyhow!("{e}. Ingest first: rubricfinder embed --catalog <FILE>"));
        }
        other => other?,
    };
    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }
    println!("Query: {}  ({} rubrics indexed)", response.query, response.total_in_collection);
    for (i, r) in response.results.iter().enumerate() {
        println!("{:>3}. [{:.4}] {}", i + 1, r.score, r.path);
        println!("     {} | chapter: {} | remedies: {} | id: {}", r.translation, r.chapter, r.remedy_count, r.rubric_id);
    }
    Ok(())
}

async fn run_evaluate(app: &App, tests: &Path, verbose: bool, output: Option<&Path>) -> Result<()> {
    let cases = load_test_set(tests).with_context(|| format!("loading {}", tests.display()))?;
    let index = app.main_index().await?;
    let count = index.count().await?;
    println!("Loaded {} test rubrics; {} embeddings in '{}'", cases.len(), count, index.collection());

    let report = evaluate(&index, &cases, &EvalConfig::from(&app.settings.eval)).await?;
    if verbose {
        for o in &report.outcomes {
            let status = o.rank.map_or_else(|| "NOT FOUND".to_string(), |r| format!("rank {r}"));
            let preview: String = o.query.chars().take(50).collect();
            println!("  {}: {status} (query: {preview})", o.rubric_id);
        }
    }
    println!("\n{report}");
    if let Some(path) = output {
        report.write_json(path)?;
        println!("\nResults saved to: {}", path.display());
    }
    Ok(())
}

async fn run_compare(app: &App, catalog_path: &Path, tests: &Path) -> Result<()> {
    let catalog = load_catalog(catalog_path)?;
    let cases = load_test_set(tests)?;
    println!("Loaded {} rubrics with translations, {} test rubrics", catalog.rubrics.len(), cases.len());

    let translation = app.main_index().await?;
    if translation.count().await? == 0 {
        translation.populate(&catalog.rubrics, TextField::Translation).await?;
    }
    let original_name = format!("{}_original", app.settings.store.collection);
    let original = app.index(&original_name).await?;
    original.populate(&catalog.rubrics, TextField::Path).await?;

    let config = EvalConfig::from(&app.settings.eval);
    let a = evaluate(&translation, &cases, &config).await?;
    let b = evaluate(&original, &cases, &config).await?;

    println!("\n{}", "=".repeat(55));
    println!("EMBEDDING COMPARISON RESULTS");
    println!("{}", "=".repeat(55));
    println!("{}", comparison_table("Translation", &a, "Original", &b));
    let margin = app.settings.eval.comparison_margin;
    match compare(&a, &b, margin) {
        Verdict::FirstBetter => println!("Winner: Translation embeddings perform better"),
        Verdict::SecondBetter => println!("Winner: Original path embeddings perform better"),
        Verdict::Equivalent => println!("Result: Performance is similar (within {:.0}%)", margin * 100.0),
    }
    Ok(())
}
