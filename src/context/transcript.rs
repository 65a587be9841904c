//! Persisted transcript records
//!
//! One row per story: the public record `{id, story_id, content,
//! created_at, updated_at}` plus the structured manager state needed to
//! resume the transcript after a restart.
//!
//! File layout (one pretty-printed JSON file per story):
//! ```text
//! <data_dir>/
//! ├── <sha256(story_id)>.json
//! └── ...
//! ```

use super::budget::TranscriptState;
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::RwLock;

/// Public shape of a story's transcript
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextRecord {
    pub id: String,
    pub story_id: String,
    /// Rendered optimized transcript
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl ContextRecord {
    /// New record for a story's first save
    pub fn new(story_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            story_id: story_id.into(),
            content: content.into(),
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    /// Replace the content and stamp `updated_at`
    pub fn update(&mut self, content: impl Into<String>) {
        self.content = content.into();
        self.updated_at = Some(Utc::now());
    }
}

/// A persisted row: public record plus resumable state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredTranscript {
    pub record: ContextRecord,
    #[serde(default)]
    pub state: TranscriptState,
}

/// Persistence for transcript rows, keyed by unique `story_id`.
#[async_trait]
pub trait TranscriptStore: Send + Sync {
    /// Load the row for a story, if any
    async fn load(&self, story_id: &str) -> Result<Option<StoredTranscript>>;

    /// Insert or replace the row for `stored.record.story_id`
    async fn save(&self, stored: &StoredTranscript) -> Result<()>;
}

// =============================================================================
// In-memory store
// =============================================================================

/// Transcript rows held in process memory
pub struct MemoryTranscriptStore {
    rows: RwLock<HashMap<String, StoredTranscript>>,
}

impl MemoryTranscriptStore {
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryTranscriptStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TranscriptStore for MemoryTranscriptStore {
    async fn load(&self, story_id: &str) -> Result<Option<StoredTranscript>> {
        Ok(self.rows.read().await.get(story_id).cloned())
    }

    async fn save(&self, stored: &StoredTranscript) -> Result<()> {
        self.rows
            .write()
            .await
            .insert(stored.record.story_id.clone(), stored.clone());
        Ok(())
    }
}

// =============================================================================
// File-backed store
// =============================================================================

/// Transcript rows persisted as JSON files
pub struct FileTranscriptStore {
    dir: PathBuf,
}

impl FileTranscriptStore {
    /// Open (creating if needed) a store rooted at `dir`
    pub async fn new(dir: PathBuf) -> Result<Self> {
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    fn path_for(&self, story_id: &str) -> PathBuf {
        let digest = Sha256::digest(story_id.as_bytes());
        self.dir.join(format!("{:x}.json", digest))
    }
}

#[async_trait]
impl TranscriptStore for FileTranscriptStore {
    async fn load(&self, story_id: &str) -> Result<Option<StoredTranscript>> {
        let path = self.path_for(story_id);
        let data = match tokio::fs::read_to_string(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let stored: StoredTranscript = serde_json::from_str(&data)?;
        Ok(Some(stored))
    }

    async fn save(&self, stored: &StoredTranscript) -> Result<()> {
        let path = self.path_for(&stored.record.story_id);
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(stored)?;

        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &path).await?;
        tracing::debug!(
            "Persisted transcript for story {} to {}",
            stored.record.story_id,
            path.display()
        );
        Ok(())
    }
}
