//! In-process store. Brute-force cosine over every point; nothing is persisted.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};

use rubric_core::traits::VectorStore;
use rubric_core::types::{Point, PointId, ScoredPoint, ScrollCursor, ScrollPage, StoredPoint};

struct Collection {
    dim: usize,
    points: BTreeMap<PointId, Point>,
}

#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, Collection>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let (mut dot, mut na, mut nb) = (0f32, 0f32, 0f32);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    dot / (na.sqrt() * nb.sqrt())
}

#[async_trait]
impl VectorStore for MemoryStore {
    fn backend(&self) -> &'static str { "memory" }

    async fn collection_exists(&self, collection: &str) -> Result<bool> {
        Ok(self.collections.read().contains_key(collection))
    }

    async fn create_collection(&self, collection: &str, dim: usize) -> Result<()> {
        let mut guard = self.collections.write();
        if let Some(existing) = guard.get(collection) {
            if existing.dim != dim {
                bail!("collection '{collection}' has dim {} but {dim} was requested", existing.dim);
            }
            return Ok(());
        }
        guard.insert(collection.to_string(), Collection { dim, points: BTreeMap::new() });
        Ok(())
    }

    async fn reset_collection(&self, collection: &str, dim: usize) -> Result<()> {
        self.collections
            .write()
            .insert(collection.to_string(), Collection { dim, points: BTreeMap::new() });
        Ok(())
    }

    async fn upsert(&self, collection: &str, points: &[Point]) -> Result<()> {
        let mut guard = self.collections.write();
        let coll = guard.get_mut(collection).ok_or_else(|| anyhow!("collection '{collection}' not found"))?;
        if let Some(bad) = points.iter().find(|p| p.vector.len() != coll.dim) {
            bail!("point {} has dim {} but collection '{collection}' expects {}", bad.id, bad.vector.len(), coll.dim);
        }
        for p in points {
            coll.points.insert(p.id, p.clone());
        }
        Ok(())
    }

    async fn query(&self, collection: &str, vector: &[f32], limit: usize) -> Result<Vec<ScoredPoint>> {
        let guard = self.collections.read();
        let coll = guard.get(collection).ok_or_else(|| anyhow!("collection '{collection}' not found"))?;
        let mut hits: Vec<ScoredPoint> = coll
            .points
            .values()
            .map(|p| ScoredPoint { id: p.id, score: cosine(vector, &p.vector), payload: p.payload.clone() })
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.id.cmp(&b.id)));
        hits.truncate(limit);
        Ok(hits)
    }

    async fn scroll(&self, collection: &str, cursor: Option<ScrollCursor>, limit: usize) -> Result<ScrollPage> {
        let guard = self.collections.read();
        let coll = guard.get(collection).ok_or_else(|| anyhow!("collection '{collection}' not found"))?;
        let start = PointId(cursor.map_or(0, |c| c.0));
        let mut iter = coll.points.range(start..);
        let points: Vec<StoredPoint> = iter
            .by_ref()
            .take(limit)
            .map(|(_, p)| StoredPoint { id: p.id, payload: p.payload.clone() })
            .collect();
        let next = iter.next().map(|(id, _)| ScrollCursor(id.0));
        Ok(ScrollPage { points, next })
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        Ok(self.collections.read().get(collection).map_or(0, |c| c.points.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rubric_core::types::Rubric;

    fn point(id: &str, vector: Vec<f32>) -> Point {
        let r = Rubric::new(id, format!("Mind, {id}"), id);
        Point { id: r.point_id(), vector, payload: r.payload() }
    }

    #[tokio::test]
    async fn query_orders_by_cosine() {
        let store = MemoryStore::new();
        store.create_collection("c", 2).await.unwrap();
        store
            .upsert("c", &[point("a", vec![1.0, 0.0]), point("b", vec![0.0, 1.0]), point("c", vec![0.7, 0.7])])
            .await
            .unwrap();
        let hits = store.query("c", &[1.0, 0.1], 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].payload.rubric_id, "a");
        assert_eq!(hits[1].payload.rubric_id, "c");
        assert!(hits[0].score >= hits[1].score);
    }

    #[tokio::test]
    async fn scroll_visits_every_point_once() {
        let store = MemoryStore::new();
        store.create_collection("c", 1).await.unwrap();
        let points: Vec<Point> = (0..7).map(|i| point(&i.to_string(), vec![1.0])).collect();
        store.upsert("c", &points).await.unwrap();

        let mut seen = Vec::new();
        let mut cursor = None;
        loop {
            let page = store.scroll("c", cursor, 3).await.unwrap();
            seen.extend(page.points.into_iter().map(|p| p.payload.rubric_id));
            match page.next {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        seen.sort();
        assert_eq!(seen, vec!["0", "1", "2", "3", "4", "5", "6"]);
    }

    #[tokio::test]
    async fn dimension_mismatch_is_rejected() {
        let store = MemoryStore::new();
        store.create_collection("c", 3).await.unwrap();
        assert!(store.create_collection("c", 4).await.is_err());
        assert!(store.upsert("c", &[point("x", vec![1.0])]).await.is_err());
        assert_eq!(store.count("c").await.unwrap(), 0);
    }
}
