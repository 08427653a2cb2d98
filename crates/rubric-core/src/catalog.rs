//! Catalog exchange format: CSV rows `id,path,translation,chapter[,remedy_count]`.
//!
//! Rows with a blank `translation` have not been processed by the translation
//! pipeline yet and are skipped. A blank `chapter` is derived from `path`.

use serde::Deserialize;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::error::{Error, Result};
use crate::types::{chapter_of, Rubric};

#[derive(Debug, Deserialize)]
struct CatalogRow {
    id: String,
    path: String,
    #[serde(default)]
    translation: Option<String>,
    #[serde(default)]
    chapter: Option<String>,
    #[serde(default)]
    remedy_count: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct Catalog {
    pub rubrics: Vec<Rubric>,
    /// Rows without a translation.
    pub skipped: usize,
}

pub fn load_catalog(path: &Path) -> Result<Catalog> {
    let file = File::open(path)
        .map_err(|e| Error::Catalog(format!("cannot open {}: {e}", path.display())))?;
    read_catalog(file)
}

pub fn read_catalog<R: Read>(reader: R) -> Result<Catalog> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);
    let mut catalog = Catalog::default();
    for (line, row) in rdr.deserialize::<CatalogRow>().enumerate() {
        let row = row.map_err(|e| Error::Catalog(format!("row {}: {e}", line + 1)))?;
        if row.id.is_empty() {
            return Err(Error::Catalog(format!("row {}: empty id", line + 1)));
        }
        let Some(translation) = non_blank(row.translation) else {
            catalog.skipped += 1;
            continue;
        };
        let chapter = non_blank(row.chapter).unwrap_or_else(|| chapter_of(&row.path));
        catalog.rubrics.push(Rubric {
            id: row.id,
            path: row.path,
            translation,
            chapter,
            remedy_count: parse_remedy_count(row.remedy_count.as_deref()),
        });
    }
    Ok(catalog)
}

fn non_blank(s: Option<String>) -> Option<String> {
    s.filter(|v| !v.trim().is_empty())
}

// Spreadsheet exports often write integers as "12.0".
#[allow(clippy::cast_possible_truncation)]
fn parse_remedy_count(raw: Option<&str>) -> i64 {
    let Some(raw) = raw.map(str::trim).filter(|v| !v.is_empty()) else { return 0 };
    raw.parse::<i64>()
        .ok()
        .or_else(|| raw.parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f as i64))
        .unwrap_or(0)
}
