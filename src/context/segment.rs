//! Segment types and the `SegmentStore` interface
//!
//! A segment is an independently retrievable slice of narrative text. Every
//! context append produces one; segments are never updated or pruned, so
//! text folded out of a transcript can still be found here.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A stored narrative segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    /// Unique segment identifier
    pub id: String,
    /// Owning story (associative key, not a foreign key)
    pub story_id: String,
    /// Raw appended text
    pub text: String,
    /// Embedding of `text`
    pub vector: Vec<f32>,
}

/// A single search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    /// Segment text
    pub text: String,
    /// Relevance score (higher is better)
    pub score: f32,
}

/// Fresh opaque segment identifier.
pub fn new_segment_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Persists story segments and answers similarity queries.
///
/// Results from `search` are ordered by descending score, restricted to
/// `story_id`, and truncated to `limit`.
#[async_trait]
pub trait SegmentStore: Send + Sync {
    /// Store `text` as a new segment for `story_id`, returning its id.
    ///
    /// Retried calls create duplicate segments; they never corrupt the store.
    async fn upsert(&self, story_id: &str, text: &str) -> Result<String>;

    /// Return up to `limit` segments of `story_id` most relevant to `query`.
    async fn search(&self, story_id: &str, query: &str, limit: usize) -> Result<Vec<SearchHit>>;

    /// Human-readable backend name (used in logs).
    fn name(&self) -> &str;
}
