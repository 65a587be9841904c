//! Bounded narrative context engine
//!
//! - [`budget`]: token-budgeted running transcript per story
//! - [`segment`]: segment store abstraction
//! - [`fallback`]: in-process keyword-matching segment store
//! - [`remote`]: vector-database segment store (Qdrant REST)
//! - [`health`]: one-way failover from remote to fallback
//! - [`transcript`]: persisted transcript records
//! - [`service`]: save/get/search orchestration

pub mod budget;
pub mod embedder;
pub mod fallback;
pub mod health;
pub mod remote;
pub mod segment;
pub mod service;
pub mod transcript;

#[cfg(test)]
mod testutil;

pub use budget::{ContextBudgetManager, PlaceholderSummarizer, Summarizer, TranscriptState};
pub use embedder::Embedder;
pub use fallback::FallbackStore;
pub use health::{BackendHealthController, BackendState};
pub use remote::{QdrantIndex, RemoteVectorStore, VectorIndex};
pub use segment::{SearchHit, Segment, SegmentStore};
pub use service::{ContextService, SearchResponse, StoryGenerator, DEFAULT_SEARCH_LIMIT};
pub use transcript::{
    ContextRecord, FileTranscriptStore, MemoryTranscriptStore, StoredTranscript, TranscriptStore,
};

use crate::config::ContextConfig;
use crate::error::Result;
use std::sync::Arc;

/// Wire up a context service from configuration.
///
/// Initializes the vector backend before returning, so a backend that is
/// unreachable at startup is already disabled when traffic arrives.
pub async fn bootstrap(
    config: &ContextConfig,
) -> Result<(Arc<ContextService>, Arc<BackendHealthController>)> {
    config.validate()?;

    let backend = Arc::new(BackendHealthController::from_config(
        &config.vector,
        Arc::new(FallbackStore::new()),
    ));
    backend.initialize().await;

    let transcripts: Arc<dyn TranscriptStore> = match &config.storage.data_dir {
        Some(dir) => {
            tracing::info!("Persisting transcripts to {}", dir.display());
            Arc::new(FileTranscriptStore::new(dir.clone()).await?)
        }
        None => Arc::new(MemoryTranscriptStore::new()),
    };

    let service = Arc::new(ContextService::new(
        transcripts,
        backend.clone(),
        config.budget.clone(),
    ));
    Ok((service, backend))
}
