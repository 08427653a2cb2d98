//! Remote Qdrant backend over the REST API.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

use rubric_core::traits::VectorStore;
use rubric_core::types::{Point, PointId, RubricPayload, ScoredPoint, ScrollCursor, ScrollPage, StoredPoint};

pub struct QdrantStore {
    http: Client,
    base_url: String,
}

#[derive(Serialize)]
struct QdrantPoint<'a> {
    id: u64,
    vector: &'a [f32],
    payload: &'a RubricPayload,
}

#[derive(Deserialize)]
struct Envelope<T> {
    result: T,
}

#[derive(Deserialize)]
struct SearchEntry {
    id: Value,
    score: f32,
    payload: Option<RubricPayload>,
}

#[derive(Deserialize)]
struct ScrollResult {
    points: Vec<ScrollEntry>,
    next_page_offset: Option<Value>,
}

#[derive(Deserialize)]
struct ScrollEntry {
    id: Value,
    payload: Option<RubricPayload>,
}

#[derive(Deserialize)]
struct CountResult {
    count: usize,
}

fn point_id(value: &Value) -> Result<PointId> {
    value.as_u64().map(PointId).ok_or_else(|| anyhow!("unexpected qdrant point id {value}"))
}

async fn check(response: Response, what: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    bail!("qdrant {what} failed ({status}): {body}")
}

impl QdrantStore {
    pub fn new(url: &str, api_key: Option<&str>) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(key) = api_key {
            headers.insert(HeaderName::from_static("api-key"), HeaderValue::from_str(key)?);
        }
        let http = Client::builder().timeout(Duration::from_secs(30)).default_headers(headers).build()?;
        Ok(Self { http, base_url: url.trim_end_matches('/').to_string() })
    }

    fn url(&self, collection: &str, suffix: &str) -> String {
        format!("{}/collections/{}{}", self.base_url, collection, suffix)
    }

    /// Configured vector size, or `None` when the collection does not exist.
    async fn vector_size(&self, collection: &str) -> Result<Option<usize>> {
        let response = self.http.get(self.url(collection, "")).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let info: Envelope<Value> = check(response, "collection info").await?.json().await?;
        let size = info.result["config"]["params"]["vectors"]["size"]
            .as_u64()
            .and_then(|s| usize::try_from(s).ok());
        Ok(Some(size.unwrap_or(0)))
    }

    async fn put_collection(&self, collection: &str, dim: usize) -> Result<()> {
        let body = json!({ "vectors": { "size": dim, "distance": "Cosine" } });
        let response = self
            .http
            .put(self.url(collection, ""))
            .json(&body)
            .send()
            .await?;
        if response.status() == StatusCode::CONFLICT {
            return Ok(());
        }
        check(response, "create collection").await?;
        tracing::info!(collection, dim, "created qdrant collection");
        Ok(())
    }
}

#[async_trait]
impl VectorStore for QdrantStore {
    fn backend(&self) -> &'static str { "qdrant" }

    async fn collection_exists(&self, collection: &str) -> Result<bool> {
        Ok(self.vector_size(collection).await?.is_some())
    }

    async fn create_collection(&self, collection: &str, dim: usize) -> Result<()> {
        match self.vector_size(collection).await? {
            Some(size) if size == dim => Ok(()),
            Some(size) => bail!("collection '{collection}' has dim {size} but {dim} was requested"),
            None => self.put_collection(collection, dim).await,
        }
    }

    async fn reset_collection(&self, collection: &str, dim: usize) -> Result<()> {
        let response = self.http.delete(self.url(collection, "")).send().await?;
        if response.status() != StatusCode::NOT_FOUND {
            check(response, "delete collection").await?;
        }
        self.put_collection(collection, dim).await
    }

    async fn upsert(&self, collection: &str, points: &[Point]) -> Result<()> {
        if points.is_empty() {
            return Ok(());
        }
        let body: Vec<QdrantPoint<'_>> = points
            .iter()
            .map(|p| QdrantPoint { id: p.id.0, vector: &p.vector, payload: &p.payload })
            .collect();
        let response = self
            .http
            .put(self.url(collection, "/points"))
            .query(&[("wait", "true")])
            .json(&json!({ "points": body }))
            .send()
            .await?;
        check(response, "upsert").await?;
        Ok(())
    }

    async fn query(&self, collection: &str, vector: &[f32], limit: usize) -> Result<Vec<ScoredPoint>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let body = json!({ "vector": vector, "limit": limit, "with_payload": true });
        let response = self
            .http
            .post(self.url(collection, "/points/search"))
            .json(&body)
            .send()
            .await?;
        let parsed: Envelope<Vec<SearchEntry>> = check(response, "search").await?.json().await?;
        parsed
            .result
            .into_iter()
            .map(|entry| {
                let id = point_id(&entry.id)?;
                let payload = entry.payload.ok_or_else(|| anyhow!("point {id} has no payload"))?;
                Ok(ScoredPoint { id, score: entry.score, payload })
            })
            .collect()
    }

    async fn scroll(&self, collection: &str, cursor: Option<ScrollCursor>, limit: usize) -> Result<ScrollPage> {
        let mut body = json!({ "limit": limit, "with_payload": true, "with_vector": false });
        if let Some(c) = cursor {
            body["offset"] = json!(c.0);
        }
        let response = self
            .http
            .post(self.url(collection, "/points/scroll"))
            .json(&body)
            .send()
            .await?;
        let parsed: Envelope<ScrollResult> = check(response, "scroll").await?.json().await?;
        let points = parsed
            .result
            .points
            .into_iter()
            .map(|entry| {
                let id = point_id(&entry.id)?;
                let payload = entry.payload.ok_or_else(|| anyhow!("point {id} has no payload"))?;
                Ok(StoredPoint { id, payload })
            })
            .collect::<Result<Vec<_>>>()?;
        let next = match parsed.result.next_page_offset {
            Some(Value::Null) | None => None,
            Some(v) => Some(ScrollCursor(point_id(&v)?.0)),
        };
        Ok(ScrollPage { points, next })
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        let response = self
            .http
            .post(self.url(collection, "/points/count"))
            .json(&json!({ "exact": true }))
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(0);
        }
        let parsed: Envelope<CountResult> = check(response, "count").await?.json().await?;
        Ok(parsed.result.count)
    }
}
