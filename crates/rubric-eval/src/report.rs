use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use rubric_core::error::Result;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryOutcome {
    pub rubric_id: String,
    pub query: String,
    /// 1-based rank, `None` when not within `top_k`.
    pub rank: Option<usize>,
    pub score: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CutoffStat {
    pub k: usize,
    pub hits: usize,
    pub percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalReport {
    pub total_queries: usize,
    pub rubrics_tested: usize,
    pub top_k: usize,
    pub cutoffs: Vec<CutoffStat>,
    pub mrr: f64,
    pub avg_score_when_found: f64,
    pub outcomes: Vec<QueryOutcome>,
}

impl EvalReport {
    /// Hit@`k` as a percentage, if `k` was one of the configured cutoffs.
    pub fn hit_rate(&self, k: usize) -> Option<f64> {
        self.cutoffs.iter().find(|c| c.k == k).map(|c| c.percent)
    }

    pub fn misses(&self) -> impl Iterator<Item = &QueryOutcome> {
        self.outcomes.iter().filter(|o| o.rank.is_none())
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, self).map_err(std::io::Error::from)?;
        Ok(())
    }
}

impl fmt::Display for EvalReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", "=".repeat(40))?;
        writeln!(f, "SEARCH EVALUATION RESULTS")?;
        writeln!(f, "{}", "=".repeat(40))?;
        writeln!(f, "Test queries: {}", self.total_queries)?;
        writeln!(f, "Rubrics tested: {}", self.rubrics_tested)?;
        writeln!(f)?;
        for c in &self.cutoffs {
            writeln!(f, "{:<8}{:5.1}%", format!("Hit@{}:", c.k), c.percent)?;
        }
        writeln!(f, "{:<8}{:.3}", "MRR:", self.mrr)?;
        write!(f, "Avg score when found: {:.3}", self.avg_score_when_found)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    FirstBetter,
    SecondBetter,
    Equivalent,
}

/// `a` wins only if its MRR beats `b`'s by more than the relative `margin`, and vice versa.
pub fn compare(a: &EvalReport, b: &EvalReport, margin: f64) -> Verdict {
    if a.mrr > b.mrr * (1.0 + margin) {
        Verdict::FirstBetter
    } else if b.mrr > a.mrr * (1.0 + margin) {
        Verdict::SecondBetter
    } else {
        Verdict::Equivalent
    }
}

/// Side-by-side metrics for two runs over the same test set.
pub fn comparison_table(a_label: &str, a: &EvalReport, b_label: &str, b: &EvalReport) -> String {
    let mut out = String::new();
    let rule = "-".repeat(55);
    out.push_str(&format!("{:<15} {:>15} {:>15}\n", "Metric", a_label, b_label));
    out.push_str(&rule);
    out.push('\n');
    for c in &a.cutoffs {
        let other = b.hit_rate(c.k).unwrap_or(0.0);
        out.push_str(&format!("{:<15} {:>14.1}% {:>14.1}%\n", format!("Hit@{}:", c.k), c.percent, other));
    }
    out.push_str(&format!("{:<15} {:>15.3} {:>15.3}\n", "MRR:", a.mrr, b.mrr));
    out.push_str(&rule);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(mrr: f64) -> EvalReport {
        EvalReport {
            total_queries: 10,
            rubrics_tested: 5,
            top_k: 10,
            cutoffs: vec![CutoffStat { k: 1, hits: 4, percent: 40.0 }],
            mrr,
            avg_score_when_found: 0.6,
            outcomes: Vec::new(),
        }
    }

    #[test]
    fn compare_requires_relative_margin() {
        assert_eq!(compare(&report(0.60), &report(0.50), 0.05), Verdict::FirstBetter);
        assert_eq!(compare(&report(0.50), &report(0.60), 0.05), Verdict::SecondBetter);
        assert_eq!(compare(&report(0.52), &report(0.50), 0.05), Verdict::Equivalent);
        assert_eq!(compare(&report(0.0), &report(0.0), 0.05), Verdict::Equivalent);
    }

    #[test]
    fn table_lists_every_cutoff() {
        let table = comparison_table("Translation", &report(0.5), "Original", &report(0.4));
        assert!(table.contains("Hit@1:"));
        assert!(table.contains("0.500") && table.contains("0.400"));
    }
}
