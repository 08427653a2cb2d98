//! Embedded LanceDB backend.
//!
//! One table per collection, keyed by `point_id`. Upserts go through
//! `merge_insert` so re-adding a rubric replaces its row. Scroll cursors are
//! row offsets into a plain scan. Resetting overwrites the table, so the
//! vector width may change.

use anyhow::{anyhow, bail, Result};
use arrow_array::{
    types::Float32Type, Array, FixedSizeListArray, Float32Array, Int64Array, RecordBatch, RecordBatchIterator,
    StringArray, UInt64Array,
};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::database::CreateTableMode;
use lancedb::query::{ExecutableQuery, QueryBase, Select};
use lancedb::{connect, Connection, DistanceType, Table};
use std::path::Path;
use std::sync::Arc;

use rubric_core::traits::VectorStore;
use rubric_core::types::{Point, PointId, RubricPayload, ScoredPoint, ScrollCursor, ScrollPage, StoredPoint};

use crate::schema::{build_rubric_schema, vector_dim};

const PAYLOAD_COLUMNS: [&str; 6] = ["point_id", "rubric_id", "path", "translation", "chapter", "remedy_count"];

pub async fn open_db(uri: &str) -> Result<Connection> {
    Ok(connect(uri).execute().await?)
}

pub async fn ensure_table(conn: &Connection, name: &str, schema: Arc<arrow_schema::Schema>) -> Result<()> {
    let names = conn.table_names().execute().await?;
    if names.contains(&name.to_string()) {
        return Ok(());
    }
    // create empty table with 0 rows
    let iter = RecordBatchIterator::new(vec![].into_iter(), schema.clone());
    conn.create_table(name, Box::new(iter)).execute().await?;
    Ok(())
}

pub struct LanceStore {
    db: Connection,
}

impl LanceStore {
    pub async fn open(path: &Path) -> Result<Self> {
        std::fs::create_dir_all(path)?;
        let db = open_db(path.to_string_lossy().as_ref()).await?;
        tracing::debug!(path = %path.display(), "opened LanceDB");
        Ok(Self { db })
    }

    async fn table(&self, collection: &str) -> Result<Table> {
        self.db
            .open_table(collection)
            .execute()
            .await
            .map_err(|e| anyhow!("collection '{collection}' not found: {e}"))
    }

    async fn table_dim(table: &Table) -> Result<usize> {
        let schema = table.schema().await?;
        vector_dim(&schema).ok_or_else(|| anyhow!("table {} has no fixed-size vector column", table.name()))
    }
}

fn column<'a, T: 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<T>())
        .ok_or_else(|| anyhow!("column '{name}' missing or mistyped"))
}

fn payloads(batch: &RecordBatch) -> Result<Vec<(PointId, RubricPayload)>> {
    let ids = column::<UInt64Array>(batch, "point_id")?;
    let rubric_ids = column::<StringArray>(batch, "rubric_id")?;
    let paths = column::<StringArray>(batch, "path")?;
    let translations = column::<StringArray>(batch, "translation")?;
    let chapters = column::<StringArray>(batch, "chapter")?;
    let remedy_counts = column::<Int64Array>(batch, "remedy_count")?;
    Ok((0..batch.num_rows())
        .map(|i| {
            let payload = RubricPayload {
                rubric_id: rubric_ids.value(i).to_string(),
                path: paths.value(i).to_string(),
                translation: translations.value(i).to_string(),
                chapter: chapters.value(i).to_string(),
                remedy_count: remedy_counts.value(i),
            };
            (PointId(ids.value(i)), payload)
        })
        .collect())
}

fn points_to_record_batch(points: &[Point], dim: usize) -> Result<RecordBatch> {
    let schema = build_rubric_schema(dim)?;
    let width = i32::try_from(dim)?;
    let vectors = points.iter().map(|p| Some(p.vector.iter().map(|&x| Some(x)).collect::<Vec<_>>()));
    let batch = RecordBatch::try_new(
        schema,
        vec![
            Arc::new(UInt64Array::from_iter_values(points.iter().map(|p| p.id.0))),
            Arc::new(StringArray::from_iter_values(points.iter().map(|p| p.payload.rubric_id.as_str()))),
            Arc::new(StringArray::from_iter_values(points.iter().map(|p| p.payload.path.as_str()))),
            Arc::new(StringArray::from_iter_values(points.iter().map(|p| p.payload.translation.as_str()))),
            Arc::new(StringArray::from_iter_values(points.iter().map(|p| p.payload.chapter.as_str()))),
            Arc::new(Int64Array::from_iter_values(points.iter().map(|p| p.payload.remedy_count))),
            Arc::new(FixedSizeListArray::from_iter_primitive::<Float32Type, _, _>(vectors, width)),
        ],
    )?;
    Ok(batch)
}

#[async_trait]
impl VectorStore for LanceStore {
    fn backend(&self) -> &'static str { "lancedb" }

    async fn collection_exists(&self, collection: &str) -> Result<bool> {
        let names = self.db.table_names().execute().await?;
        Ok(names.iter().any(|n| n == collection))
    }

    async fn create_collection(&self, collection: &str, dim: usize) -> Result<()> {
        if self.collection_exists(collection).await? {
            let existing = Self::table_dim(&self.table(collection).await?).await?;
            if existing != dim {
                bail!("collection '{collection}' has dim {existing} but {dim} was requested");
            }
            return Ok(());
        }
        ensure_table(&self.db, collection, build_rubric_schema(dim)?).await?;
        tracing::info!(collection, dim, "created LanceDB table");
        Ok(())
    }

    async fn reset_collection(&self, collection: &str, dim: usize) -> Result<()> {
        if !self.collection_exists(collection).await? {
            return self.create_collection(collection, dim).await;
        }
        let empty = RecordBatchIterator::new(vec![].into_iter(), build_rubric_schema(dim)?);
        self.db
            .create_table(collection, Box::new(empty))
            .mode(CreateTableMode::Overwrite)
            .execute()
            .await?;
        tracing::info!(collection, dim, "recreated LanceDB table");
        Ok(())
    }

    async fn upsert(&self, collection: &str, points: &[Point]) -> Result<()> {
        if points.is_empty() {
            return Ok(());
        }
        let table = self.table(collection).await?;
        let dim = Self::table_dim(&table).await?;
        if let Some(bad) = points.iter().find(|p| p.vector.len() != dim) {
            bail!("point {} has dim {} but collection '{collection}' expects {dim}", bad.id, bad.vector.len());
        }
        let rb = points_to_record_batch(points, dim)?;
        let schema = rb.schema();
        let reader = Box::new(RecordBatchIterator::new(vec![Ok(rb)].into_iter(), schema));
        // Upsert behavior via merge_insert: point_id is unique
        let mut mi = table.merge_insert(&["point_id"]);
        mi.when_matched_update_all(None).when_not_matched_insert_all();
        let _ = mi.execute(reader).await?;
        Ok(())
    }

    async fn query(&self, collection: &str, vector: &[f32], limit: usize) -> Result<Vec<ScoredPoint>> {
        let table = self.table(collection).await?;
        if limit == 0 || table.count_rows(None).await? == 0 {
            return Ok(Vec::new());
        }
        let mut stream = table
            .vector_search(vector.to_vec())?
            .distance_type(DistanceType::Cosine)
            .select(Select::columns(&PAYLOAD_COLUMNS))
            .limit(limit)
            .execute()
            .await?;
        let mut hits = Vec::new();
        while let Some(batch) = stream.try_next().await? {
            let distances = column::<Float32Array>(&batch, "_distance")?;
            for (i, (id, payload)) in payloads(&batch)?.into_iter().enumerate() {
                // Cosine distance is 1 - similarity.
                // A zero query vector has no direction and yields NaN.
                let distance = distances.value(i);
                let score = if distances.is_null(i) || !distance.is_finite() { 0.0 } else { 1.0 - distance };
                hits.push(ScoredPoint { id, score, payload });
            }
        }
        hits.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.id.cmp(&b.id)));
        hits.truncate(limit);
        Ok(hits)
    }

    async fn scroll(&self, collection: &str, cursor: Option<ScrollCursor>, limit: usize) -> Result<ScrollPage> {
        let table = self.table(collection).await?;
        let offset = usize::try_from(cursor.map_or(0, |c| c.0))?;
        let mut stream = table
            .query()
            .select(Select::columns(&PAYLOAD_COLUMNS))
            .limit(limit)
            .offset(offset)
            .execute()
            .await?;
        let mut points = Vec::new();
        while let Some(batch) = stream.try_next().await? {
            points.extend(payloads(&batch)?.into_iter().map(|(id, payload)| StoredPoint { id, payload }));
        }
        let next = (limit > 0 && points.len() >= limit).then(|| ScrollCursor((offset + points.len()) as u64));
        Ok(ScrollPage { points, next })
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        if !self.collection_exists(collection).await? {
            return Ok(0);
        }
        Ok(self.table(collection).await?.count_rows(None).await?)
    }
}
