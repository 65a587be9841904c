//! In-process fallback segment store
//!
//! Keeps segments per story in insertion order and answers searches with a
//! case-insensitive substring match. It exists to keep the engine answering
//! deterministically without the remote backend, not to approximate
//! semantic search.

use super::segment::{new_segment_id, SearchHit, SegmentStore};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

/// Score for a segment containing the query.
const MATCH_SCORE: f32 = 1.0;
/// Score for every other segment.
const MISS_SCORE: f32 = 0.0;

#[derive(Debug, Clone)]
struct FallbackEntry {
    id: String,
    text: String,
}

type StorySegments = Arc<Mutex<Vec<FallbackEntry>>>;

/// Per-story, insertion-ordered segment lists.
///
/// The outer map lock is only held long enough to find or create a story's
/// list; each list has its own lock so stories never contend.
pub struct FallbackStore {
    stories: RwLock<HashMap<String, StorySegments>>,
}

impl FallbackStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            stories: RwLock::new(HashMap::new()),
        }
    }

    /// Store a segment under a caller-chosen id.
    ///
    /// Used when a remote upsert failed after its id was allocated, so the
    /// segment keeps the same identity in the fallback.
    pub async fn upsert_with_id(&self, story_id: &str, id: &str, text: &str) -> Result<String> {
        let segments = self.story_segments(story_id).await;
        let mut segments = segments.lock().await;

        if segments.iter().any(|s| s.id == id) {
            tracing::error!("Duplicate segment id {} for story {}", id, story_id);
            return Err(Error::Invariant(format!(
                "segment id {} already stored for story {}",
                id, story_id
            )));
        }

        segments.push(FallbackEntry {
            id: id.to_string(),
            text: text.to_string(),
        });
        Ok(id.to_string())
    }

    /// Number of segments stored for a story
    pub async fn segment_count(&self, story_id: &str) -> usize {
        match self.stories.read().await.get(story_id) {
            Some(segments) => segments.lock().await.len(),
            None => 0,
        }
    }

    async fn story_segments(&self, story_id: &str) -> StorySegments {
        if let Some(segments) = self.stories.read().await.get(story_id) {
            return segments.clone();
        }
        self.stories
            .write()
            .await
            .entry(story_id.to_string())
            .or_default()
            .clone()
    }
}

impl Default for FallbackStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SegmentStore for FallbackStore {
    async fn upsert(&self, story_id: &str, text: &str) -> Result<String> {
        self.upsert_with_id(story_id, &new_segment_id(), text).await
    }

    async fn search(&self, story_id: &str, query: &str, limit: usize) -> Result<Vec<SearchHit>> {
        let snapshot = match self.stories.read().await.get(story_id) {
            Some(segments) => segments.clone(),
            None => return Ok(Vec::new()),
        };
        let segments = snapshot.lock().await.clone();

        let lowered = query.to_lowercase();
        let mut hits: Vec<SearchHit> = segments
            .into_iter()
            .map(|s| {
                let score = if s.text.to_lowercase().contains(&lowered) {
                    MATCH_SCORE
                } else {
                    MISS_SCORE
                };
                SearchHit {
                    text: s.text,
                    score,
                }
            })
            .collect();

        // Stable sort: ties keep insertion order
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(limit);
        Ok(hits)
    }

    fn name(&self) -> &str {
        "fallback"
    }
}
