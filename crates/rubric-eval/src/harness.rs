use indicatif::{ProgressBar, ProgressStyle};

use rubric_core::config::EvalSettings;
use rubric_core::error::Result;
use rubric_core::traits::Retriever;

use crate::report::{CutoffStat, EvalReport, QueryOutcome};
use crate::testset::EvalCase;

#[derive(Debug, Clone)]
pub struct EvalConfig {
    /// Results requested per query.
    pub top_k: usize,
    /// Hit@K cutoffs, each `<= top_k`.
    pub cutoffs: Vec<usize>,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self { top_k: 10, cutoffs: vec![1, 3, 5, 10] }
    }
}

impl From<&EvalSettings> for EvalConfig {
    fn from(s: &EvalSettings) -> Self {
        Self { top_k: s.top_k, cutoffs: s.cutoffs.clone() }
    }
}

/// Run every query of every case and aggregate ranking metrics.
///
/// A query's rank is the 1-based position of its case's rubric in the
/// results, or `None` if absent from the top `top_k`. Retrieval errors abort
/// the run.
pub async fn evaluate(retriever: &dyn Retriever, cases: &[EvalCase], config: &EvalConfig) -> Result<EvalReport> {
    let total: usize = cases.iter().map(|c| c.queries.len()).sum();
    let pb = ProgressBar::new(total as u64);
    if let Ok(style) = ProgressStyle::default_bar().template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} queries") {
        pb.set_style(style.progress_chars("#>-"));
    }

    let mut outcomes = Vec::with_capacity(total);
    for case in cases {
        for query in &case.queries {
            let results = retriever.retrieve(query, config.top_k).await?;
            let found = results
                .iter()
                .take(config.top_k)
                .enumerate()
                .find(|(_, r)| r.rubric_id == case.rubric_id);
            let outcome = QueryOutcome {
                rubric_id: case.rubric_id.clone(),
                query: query.clone(),
                rank: found.map(|(i, _)| i + 1),
                score: found.map(|(_, r)| r.score),
            };
            tracing::debug!(rubric_id = %outcome.rubric_id, rank = ?outcome.rank, query = %query, "evaluated");
            outcomes.push(outcome);
            pb.inc(1);
        }
    }
    pb.finish_and_clear();

    Ok(aggregate(cases.len(), config, outcomes))
}

#[allow(clippy::cast_precision_loss)]
fn aggregate(rubrics_tested: usize, config: &EvalConfig, outcomes: Vec<QueryOutcome>) -> EvalReport {
    let total_queries = outcomes.len();
    let pct = |n: usize| if total_queries == 0 { 0.0 } else { n as f64 / total_queries as f64 * 100.0 };

    let cutoffs = config
        .cutoffs
        .iter()
        .map(|&k| {
            let hits = outcomes.iter().filter(|o| o.rank.is_some_and(|r| r <= k)).count();
            CutoffStat { k, hits, percent: pct(hits) }
        })
        .collect();

    let mrr = if total_queries == 0 {
        0.0
    } else {
        outcomes.iter().map(|o| o.rank.map_or(0.0, |r| 1.0 / r as f64)).sum::<f64>() / total_queries as f64
    };

    let found: Vec<f64> = outcomes.iter().filter_map(|o| o.score).map(f64::from).collect();
    let avg_score_when_found = if found.is_empty() { 0.0 } else { found.iter().sum::<f64>() / found.len() as f64 };

    EvalReport { total_queries, rubrics_tested, top_k: config.top_k, cutoffs, mrr, avg_score_when_found, outcomes }
}
