//! Evaluation Harness: replays held-out paraphrase queries against a
//! [`Retriever`](rubric_core::traits::Retriever) and reports Hit@K and MRR.

pub mod harness;
pub mod report;
pub mod testset;

pub use harness::{evaluate, EvalConfig};
pub use report::{compare, CutoffStat, EvalReport, QueryOutcome, Verdict};
pub use testset::{load_test_set, read_test_set, EvalCase};
