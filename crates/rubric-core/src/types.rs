//! Domain types shared by the index, the stores and the evaluation harness.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::Hasher;
use twox_hash::XxHash64;

/// One catalog entry.
///
/// - `id`: stable external identifier, unique within the catalog
/// - `path`: archaic hierarchical label, general to specific ("Mind, fear, dark")
/// - `translation`: modern-English paraphrase of `path`, embedded by default
/// - `chapter`: top-level category, the first `path` segment
/// - `remedy_count`: optional weight carried as metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rubric {
    pub id: String,
    pub path: String,
    pub translation: String,
    pub chapter: String,
    #[serde(default)]
    pub remedy_count: i64,
}

impl Rubric {
    /// Build a rubric whose chapter is derived from `path`.
    pub fn new(id: impl Into<String>, path: impl Into<String>, translation: impl Into<String>) -> Self {
        let path = path.into();
        let chapter = chapter_of(&path);
        Self { id: id.into(), path, translation: translation.into(), chapter, remedy_count: 0 }
    }

    #[must_use]
    pub fn with_remedy_count(mut self, remedy_count: i64) -> Self {
        self.remedy_count = remedy_count;
        self
    }

    /// The text that gets embedded for `field`.
    pub fn text(&self, field: TextField) -> &str {
        match field {
            TextField::Translation => &self.translation,
            TextField::Path => &self.path,
        }
    }

    pub fn point_id(&self) -> PointId {
        PointId::from_rubric_id(&self.id)
    }

    pub fn payload(&self) -> RubricPayload {
        RubricPayload {
            rubric_id: self.id.clone(),
            path: self.path.clone(),
            translation: self.translation.clone(),
            chapter: self.chapter.clone(),
            remedy_count: self.remedy_count,
        }
    }
}

/// First segment of a hierarchical path. Commas take precedence over " - ".
pub fn chapter_of(path: &str) -> String {
    let head = if path.contains(',') {
        path.split(',').next()
    } else {
        path.split(" - ").next()
    };
    head.unwrap_or(path).trim().to_string()
}

/// Which rubric field is embedded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextField {
    #[default]
    Translation,
    Path,
}

impl fmt::Display for TextField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TextField::Translation => write!(f, "translation"),
            TextField::Path => write!(f, "path"),
        }
    }
}

impl std::str::FromStr for TextField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "translation" => Ok(TextField::Translation),
            "path" => Ok(TextField::Path),
            other => Err(format!("unknown text field '{other}' (expected 'translation' or 'path')")),
        }
    }
}

/// Numeric store key derived from a rubric id.
///
/// xxHash64 (seed 0) over the UTF-8 bytes, masked to 63 bits so it is a
/// positive integer for every backend. Stable across processes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PointId(pub u64);

impl PointId {
    const MASK: u64 = 0x7FFF_FFFF_FFFF_FFFF;

    pub fn from_rubric_id(id: &str) -> Self {
        let mut hasher = XxHash64::with_seed(0);
        hasher.write(id.as_bytes());
        PointId(hasher.finish() & Self::MASK)
    }
}

impl fmt::Display for PointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Denormalized copy of a rubric stored next to its vector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RubricPayload {
    pub rubric_id: String,
    pub path: String,
    pub translation: String,
    pub chapter: String,
    #[serde(default)]
    pub remedy_count: i64,
}

/// A vector plus payload as written to a store.
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    pub id: PointId,
    pub vector: Vec<f32>,
    pub payload: RubricPayload,
}

/// A nearest-neighbour hit. `score` is cosine similarity, higher is better.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredPoint {
    pub id: PointId,
    pub score: f32,
    pub payload: RubricPayload,
}

/// A stored point without its vector, as returned by a scroll.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredPoint {
    pub id: PointId,
    pub payload: RubricPayload,
}

/// Store-defined position to resume a scroll from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrollCursor(pub u64);

#[derive(Debug, Clone, Default)]
pub struct ScrollPage {
    pub points: Vec<StoredPoint>,
    /// `None` once the collection is exhausted.
    pub next: Option<ScrollCursor>,
}

/// One ranked search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RubricResult {
    pub rubric_id: String,
    pub path: String,
    pub translation: String,
    pub chapter: String,
    pub remedy_count: i64,
    pub score: f32,
}

impl RubricResult {
    pub fn from_hit(hit: ScoredPoint, score: f32) -> Self {
        let RubricPayload { rubric_id, path, translation, chapter, remedy_count } = hit.payload;
        Self { rubric_id, path, translation, chapter, remedy_count, score }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub query: String,
    pub results: Vec<RubricResult>,
    pub total_in_collection: usize,
}

/// Health surface: collection size and active embedding model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub collection: String,
    pub collection_size: usize,
    pub model: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chapter_is_first_comma_segment() {
        assert_eq!(chapter_of("Mind, fear, dark"), "Mind");
        assert_eq!(chapter_of("Vertigo - morning - rising"), "Vertigo");
        assert_eq!(chapter_of("Generalities"), "Generalities");
        assert_eq!(chapter_of("Mind, self-reproach"), "Mind");
    }

    #[test]
    fn point_id_is_stable_and_positive() {
        let a = PointId::from_rubric_id("12345");
        let b = PointId::from_rubric_id("12345");
        let c = PointId::from_rubric_id("12346");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.0 <= 0x7FFF_FFFF_FFFF_FFFF);
    }

    #[test]
    fn text_field_parses_and_selects() {
        let r = Rubric::new("1", "Mind, fear, dark", "afraid of the dark");
        assert_eq!(r.text("path".parse().expect("parse")), "Mind, fear, dark");
        assert_eq!(r.text(TextField::default()), "afraid of the dark");
        assert!("chapter".parse::<TextField>().is_err());
    }
}
