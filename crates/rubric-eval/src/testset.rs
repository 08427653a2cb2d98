//! Test-set CSV: an `id` column plus any number of `test_*` query columns.
//! Optional `path` and `translation` columns are carried along. When a
//! `translation` column exists, rows with a blank translation are skipped.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use rubric_core::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvalCase {
    /// Rubric every query in `queries` is expected to retrieve.
    pub rubric_id: String,
    pub path: Option<String>,
    pub translation: Option<String>,
    pub queries: Vec<String>,
}

impl EvalCase {
    pub fn new(rubric_id: impl Into<String>, queries: Vec<String>) -> Self {
        Self { rubric_id: rubric_id.into(), path: None, translation: None, queries }
    }
}

pub fn load_test_set(path: &Path) -> Result<Vec<EvalCase>> {
    let file = File::open(path)
        .map_err(|e| Error::Catalog(format!("cannot open test set {}: {e}", path.display())))?;
    read_test_set(file)
}

pub fn read_test_set<R: Read>(reader: R) -> Result<Vec<EvalCase>> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).flexible(true).from_reader(reader);
    let headers = rdr.headers().map_err(|e| Error::Catalog(format!("test set header: {e}")))?.clone();
    let find = |name: &str| headers.iter().position(|h| h == name);
    let id_col = find("id").ok_or_else(|| Error::Catalog("test set has no 'id' column".to_string()))?;
    let path_col = find("path");
    let translation_col = find("translation");
    let test_cols: Vec<usize> = headers
        .iter()
        .enumerate()
        .filter(|(_, h)| h.starts_with("test_"))
        .map(|(i, _)| i)
        .collect();
    if test_cols.is_empty() {
        tracing::warn!("test set has no test_* columns");
    }

    let mut cases = Vec::new();
    for (line, record) in rdr.records().enumerate() {
        let record = record.map_err(|e| Error::Catalog(format!("test set row {}: {e}", line + 1)))?;
        let cell = |i: usize| record.get(i).map(str::trim).filter(|v| !v.is_empty()).map(str::to_string);
        let Some(rubric_id) = cell(id_col) else { continue };
        let translation = translation_col.and_then(cell);
        if translation_col.is_some() && translation.is_none() {
            continue;
        }
        cases.push(EvalCase {
            rubric_id,
            path: path_col.and_then(cell),
            translation,
            queries: test_cols.iter().filter_map(|&i| cell(i)).collect(),
        });
    }
    Ok(cases)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collects_test_columns_and_skips_blanks() {
        let csv = "id,path,translation,test_1,test_2,test_3,notes\n\
                   1,\"Mind, fear, dark\",afraid of the dark,scared at night,,hate dark rooms,x\n\
                   2,\"Mind, anger\",,gets mad,,,\n\
                   3,\"Mind, sadness\",feeling down,,,,\n";
        let cases = read_test_set(csv.as_bytes()).unwrap();
        assert_eq!(cases.len(), 2);
        assert_eq!(cases[0].queries, vec!["scared at night", "hate dark rooms"]);
        assert_eq!(cases[0].path.as_deref(), Some("Mind, fear, dark"));
        assert!(cases[1].queries.is_empty());
    }

    #[test]
    fn id_column_is_required() {
        assert!(read_test_set("rubric,test_1\n1,foo\n".as_bytes()).is_err());
    }
}
