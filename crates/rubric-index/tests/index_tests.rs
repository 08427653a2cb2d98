use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use rubric_core::config::StoreConfig;
use rubric_core::error::Error;
use rubric_core::traits::{Embedder, Retriever, VectorStore};
use rubric_core::types::{Point, Rubric, TextField};
use rubric_embed::FakeEmbedder;
use rubric_index::{AddOptions, IndexOptions, RubricIndex};
use rubric_store::{open_store, MemoryStore};

fn catalog() -> Vec<Rubric> {
    vec![
        Rubric::new("1", "Mind, fear, dark", "afraid of the dark").with_remedy_count(41),
        Rubric::new("2", "Mind, weeping, music, from", "crying when hearing music"),
        Rubric::new("3", "Vertigo, morning, rising, on", "dizzy when getting up in the morning"),
        Rubric::new("4", "Head, pain, forehead, cold air", "forehead headache from cold wind"),
        Rubric::new("5", "Sleep, position, back, on", "sleeps lying on the back"),
    ]
}

async fn memory_index() -> RubricIndex {
    RubricIndex::open(Arc::new(FakeEmbedder::new(64)), Arc::new(MemoryStore::new()), IndexOptions::default())
        .await
        .expect("index")
}

#[tokio::test]
async fn add_twice_with_skip_existing_is_idempotent() {
    let index = memory_index().await;
    let added = index.add_rubrics(&catalog(), AddOptions::default()).await.unwrap();
    assert_eq!(added, 5);
    let again = index.add_rubrics(&catalog(), AddOptions::default()).await.unwrap();
    assert_eq!(again, 0);
    assert_eq!(index.count().await.unwrap(), 5);

    let ids = index.get_existing_ids().await.unwrap();
    assert!(ids.contains("3") && ids.len() == 5);
}

#[tokio::test]
async fn forced_add_overwrites_in_place() {
    let index = memory_index().await;
    index.add_rubrics(&catalog(), AddOptions::default()).await.unwrap();
    let forced = AddOptions { skip_existing: false, ..AddOptions::default() };
    assert_eq!(index.add_rubrics(&catalog(), forced).await.unwrap(), 5);
    assert_eq!(index.count().await.unwrap(), 5);
}

#[tokio::test]
async fn duplicate_ids_in_one_input_are_added_once() {
    let index = memory_index().await;
    let mut rubrics = catalog();
    rubrics.push(rubrics[0].clone());
    assert_eq!(index.add_rubrics(&rubrics, AddOptions::default()).await.unwrap(), 5);
}

#[tokio::test]
async fn self_retrieval_ranks_own_rubric_first() {
    let index = memory_index().await;
    index.add_rubrics(&catalog(), AddOptions::default()).await.unwrap();
    for r in catalog() {
        let results = index.search(&r.translation, 3).await.unwrap();
        assert_eq!(results[0].rubric_id, r.id, "query {:?}", r.translation);
        assert!((results[0].score - 1.0).abs() < 1e-4);
    }
    let top = index.search("afraid of the dark", 1).await.unwrap();
    assert_eq!(top[0].path, "Mind, fear, dark");
    assert_eq!(top[0].chapter, "Mind");
    assert_eq!(top[0].remedy_count, 41);
}

#[tokio::test]
async fn results_are_ordered_bounded_and_deterministic() {
    let index = memory_index().await;
    index.add_rubrics(&catalog(), AddOptions::default()).await.unwrap();

    let first = index.search("crying in the morning", 10).await.unwrap();
    assert_eq!(first.len(), 5, "capped at collection size");
    for pair in first.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
    assert!(first.iter().all(|r| (-1.0..=1.0).contains(&r.score)));

    let second = index.search("crying in the morning", 10).await.unwrap();
    assert_eq!(first, second);

    assert_eq!(index.search("crying", 2).await.unwrap().len(), 2);
    assert!(index.search("crying", 0).await.unwrap().is_empty());
}

#[tokio::test]
async fn empty_collection_searches_return_nothing_but_response_is_not_ready() {
    let index = memory_index().await;
    assert!(index.search("anything", 5).await.unwrap().is_empty());
    let err = index.search_response("anything", 5).await.unwrap_err();
    assert!(err.is_not_ready());
}

#[tokio::test]
async fn search_response_validates_and_reports_total() {
    let index = memory_index().await;
    index.add_rubrics(&catalog(), AddOptions::default()).await.unwrap();
    assert!(matches!(index.search_response("  ", 5).await, Err(Error::InvalidInput(_))));
    assert!(matches!(index.search_response("dark", 0).await, Err(Error::InvalidInput(_))));
    assert!(matches!(index.search_response("dark", 101).await, Err(Error::InvalidInput(_))));

    let resp = index.search_response("afraid of the dark", 2).await.unwrap();
    assert_eq!(resp.query, "afraid of the dark");
    assert_eq!(resp.total_in_collection, 5);
    assert_eq!(resp.results.len(), 2);
    assert_eq!(resp.results[0].rubric_id, "1");
}

#[tokio::test]
async fn clear_empties_the_collection() {
    let index = memory_index().await;
    index.add_rubrics(&catalog(), AddOptions::default()).await.unwrap();
    index.clear().await.unwrap();
    assert_eq!(index.count().await.unwrap(), 0);
    assert!(index.search("afraid of the dark", 5).await.unwrap().is_empty());
    // Still usable after a clear.
    assert_eq!(index.add_rubrics(&catalog()[..2], AddOptions::default()).await.unwrap(), 2);
}

#[tokio::test]
async fn status_reports_size_and_model() {
    let index = memory_index().await;
    index.add_rubrics(&catalog(), AddOptions::default()).await.unwrap();
    let status = index.status().await.unwrap();
    assert_eq!(status.status, "ok");
    assert_eq!(status.collection, "rubrics");
    assert_eq!(status.collection_size, 5);
    assert_eq!(status.model, "fake-64");
}

#[tokio::test]
async fn stored_point_under_another_id_is_a_collision() {
    let store = Arc::new(MemoryStore::new());
    let index = RubricIndex::open(Arc::new(FakeEmbedder::new(8)), store.clone(), IndexOptions::default())
        .await
        .unwrap();
    let victim = Rubric::new("A", "Mind, fear", "fear");
    let impostor = Rubric::new("B", "Mind, anger", "anger");
    store
        .upsert("rubrics", &[Point { id: victim.point_id(), vector: vec![1.0; 8], payload: impostor.payload() }])
        .await
        .unwrap();

    match index.add_rubrics(&[victim], AddOptions::default()).await {
        Err(Error::IdCollision { first, second, .. }) => {
            assert_eq!(first, "B");
            assert_eq!(second, "A");
        }
        other => panic!("expected collision, got {other:?}"),
    }
}

struct BrokenEmbedder {
    width: usize,
    fail: bool,
}

impl Embedder for BrokenEmbedder {
    fn model_id(&self) -> &str { "broken" }
    fn dim(&self) -> usize { 4 }
    fn max_len(&self) -> usize { 16 }
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        if self.fail {
            anyhow::bail!("model offline");
        }
        Ok(texts.iter().map(|_| vec![0.5; self.width]).collect())
    }
}

#[tokio::test]
async fn provider_failures_propagate() {
    let store: Arc<dyn VectorStore> = Arc::new(MemoryStore::new());
    let failing = RubricIndex::open(Arc::new(BrokenEmbedder { width: 4, fail: true }), store.clone(), IndexOptions::default())
        .await
        .unwrap();
    let err = failing.add_rubrics(&catalog(), AddOptions::default()).await.unwrap_err();
    assert!(matches!(err, Error::Embedding(_)));
    assert!(!err.is_not_ready());

    let narrow = RubricIndex::new(Arc::new(BrokenEmbedder { width: 3, fail: false }), store, IndexOptions::default());
    let err = narrow.add_rubrics(&catalog(), AddOptions::default()).await.unwrap_err();
    assert!(matches!(err, Error::DimensionMismatch { expected: 4, actual: 3 }));
}

/// Records every batch it is handed and fails on the second call.
struct FailsOnSecondBatch {
    calls: AtomicUsize,
    batch_lens: Mutex<Vec<usize>>,
}

impl Embedder for FailsOnSecondBatch {
    fn model_id(&self) -> &str { "flaky" }
    fn dim(&self) -> usize { 4 }
    fn max_len(&self) -> usize { 16 }
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        self.batch_lens.lock().unwrap().push(texts.len());
        if self.calls.fetch_add(1, Ordering::SeqCst) == 1 {
            anyhow::bail!("model offline");
        }
        Ok(texts.iter().map(|_| vec![0.5; 4]).collect())
    }
}

#[tokio::test]
async fn failed_batch_keeps_earlier_batches_committed() {
    let embedder = Arc::new(FailsOnSecondBatch { calls: AtomicUsize::new(0), batch_lens: Mutex::new(Vec::new()) });
    let options = IndexOptions { batch_size: 2, ..IndexOptions::default() };
    let index = RubricIndex::open(embedder.clone(), Arc::new(MemoryStore::new()), options).await.unwrap();

    let err = index.add_rubrics(&catalog(), AddOptions::default()).await.unwrap_err();
    assert!(matches!(err, Error::Embedding(_)), "{err:?}");
    assert_eq!(index.count().await.unwrap(), 2);

    let lens = embedder.batch_lens.lock().unwrap().clone();
    assert_eq!(lens.len(), 2, "stops at the failing batch");
    assert!(lens.iter().all(|&n| n <= 2), "{lens:?}");

    // A retry skips what was committed and finishes the rest.
    assert_eq!(index.add_rubrics(&catalog(), AddOptions::default()).await.unwrap(), 3);
    assert_eq!(index.count().await.unwrap(), 5);
    assert!(embedder.batch_lens.lock().unwrap().iter().all(|&n| n <= 2));
}

#[tokio::test]
async fn populate_reuses_matching_collection() {
    let index = RubricIndex::open(
        Arc::new(FakeEmbedder::new(64)),
        Arc::new(MemoryStore::new()),
        IndexOptions::default().with_collection("rubrics_original"),
    )
    .await
    .unwrap();
    assert_eq!(index.populate(&catalog(), TextField::Path).await.unwrap(), 5);
    assert_eq!(index.populate(&catalog(), TextField::Path).await.unwrap(), 0);
    assert_eq!(index.populate(&catalog()[..3], TextField::Path).await.unwrap(), 3);
    assert_eq!(index.count().await.unwrap(), 3);

    let hit = index.retrieve("Vertigo, morning, rising, on", 1).await.unwrap();
    assert_eq!(hit[0].rubric_id, "3");
}

#[tokio::test]
async fn lance_backed_index_round_trip() {
    let tmp = tempfile::tempdir().unwrap();
    let store = open_store(&StoreConfig::Local { path: tmp.path().join("lancedb") }).await.unwrap();
    let options = IndexOptions { batch_size: 2, scroll_page_size: 2, ..IndexOptions::default() };
    let index = RubricIndex::open(Arc::new(FakeEmbedder::new(32)), store, options).await.unwrap();

    assert_eq!(index.add_rubrics(&catalog(), AddOptions::default()).await.unwrap(), 5);
    assert_eq!(index.add_rubrics(&catalog(), AddOptions::default()).await.unwrap(), 0);
    assert_eq!(index.get_existing_ids().await.unwrap().len(), 5);

    let results = index.search("dizzy when getting up in the morning", 3).await.unwrap();
    assert_eq!(results[0].rubric_id, "3");
    assert!(results.len() <= 3);

    index.clear().await.unwrap();
    assert_eq!(index.count().await.unwrap(), 0);
}
