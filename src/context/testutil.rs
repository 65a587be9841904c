//! In-memory `VectorIndex` double with failure injection and call counters

use super::embedder::cosine_similarity;
use super::remote::VectorIndex;
use super::segment::{SearchHit, Segment};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

#[derive(Default)]
pub struct MockIndex {
    pub fail_get: AtomicBool,
    pub fail_create: AtomicBool,
    pub fail_upsert: AtomicBool,
    pub fail_search: AtomicBool,
    pub fail_close: AtomicBool,
    pub delay: Option<Duration>,
    pub get_calls: AtomicUsize,
    pub create_calls: AtomicUsize,
    pub upsert_calls: AtomicUsize,
    pub search_calls: AtomicUsize,
    pub close_calls: AtomicUsize,
    pub points: Mutex<Vec<Segment>>,
}

impl MockIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_upsert() -> Self {
        let index = Self::new();
        index.fail_upsert.store(true, Ordering::SeqCst);
        index
    }

    pub fn failing_search() -> Self {
        let index = Self::new();
        index.fail_search.store(true, Ordering::SeqCst);
        index
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn calls(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    async fn maybe_delay(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn check(flag: &AtomicBool, op: &str) -> Result<()> {
        if flag.load(Ordering::SeqCst) {
            return Err(Error::VectorStore(format!("mock {} failure", op)));
        }
        Ok(())
    }
}

#[async_trait]
impl VectorIndex for MockIndex {
    async fn get_collection(&self, _collection: &str) -> Result<()> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        self.maybe_delay().await;
        Self::check(&self.fail_get, "get_collection")
    }

    async fn create_collection(&self, _collection: &str, _dimension: usize) -> Result<()> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        self.maybe_delay().await;
        Self::check(&self.fail_create, "create_collection")
    }

    async fn upsert(&self, _collection: &str, segment: &Segment) -> Result<()> {
        self.upsert_calls.fetch_add(1, Ordering::SeqCst);
        self.maybe_delay().await;
        Self::check(&self.fail_upsert, "upsert")?;
        self.points.lock().await.push(segment.clone());
        Ok(())
    }

    async fn search(
        &self,
        _collection: &str,
        story_id: &str,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<SearchHit>> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        self.maybe_delay().await;
        Self::check(&self.fail_search, "search")?;

        let points = self.points.lock().await;
        let mut hits: Vec<SearchHit> = points
            .iter()
            .filter(|p| p.story_id == story_id)
            .map(|p| SearchHit {
                text: p.text.clone(),
                score: cosine_similarity(&p.vector, vector),
            })
            .collect();
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(limit);
        Ok(hits)
    }

    async fn close(&self) -> Result<()> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        Self::check(&self.fail_close, "close")
    }
}
