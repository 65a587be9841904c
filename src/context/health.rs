//! Backend health controller (one-way circuit breaker)
//!
//! Routes `SegmentStore` calls to the remote vector store while it is
//! healthy and to the in-process fallback once it is not.
//!
//! ```text
//!   Healthy ──(any remote failure or timeout)──▶ Disabled
//!      │                                            │
//!   remote call ──fail──▶ trip ──▶ retry once on fallback
//!                                                   │
//!                                          fallback only
//! ```
//!
//! The transition is terminal for the process lifetime. Exactly one caller
//! wins the transition and performs teardown of the remote client;
//! concurrent failures observe the flag already flipped and only fall back.

use super::embedder::Embedder;
use super::fallback::FallbackStore;
use super::remote::{QdrantIndex, RemoteVectorStore};
use super::segment::{new_segment_id, SearchHit, SegmentStore};
use crate::config::VectorConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

const HEALTHY: u8 = 0;
const DISABLED: u8 = 1;

/// Remote backend state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendState {
    /// Calls are attempted against the remote store
    Healthy,
    /// Calls go straight to the fallback store
    Disabled,
}

impl std::fmt::Display for BackendState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Disabled => write!(f, "disabled"),
        }
    }
}

/// `SegmentStore` that fails over from a remote store to the fallback.
pub struct BackendHealthController {
    state: AtomicU8,
    remote: Option<RemoteVectorStore>,
    fallback: Arc<FallbackStore>,
    timeout: Duration,
}

impl BackendHealthController {
    /// Create a controller.
    ///
    /// `remote` is the capability flag: `None` starts the controller
    /// `Disabled` and the remote path is never attempted.
    pub fn new(
        remote: Option<RemoteVectorStore>,
        fallback: Arc<FallbackStore>,
        timeout: Duration,
    ) -> Self {
        let state = if remote.is_some() { HEALTHY } else { DISABLED };
        Self {
            state: AtomicU8::new(state),
            remote,
            fallback,
            timeout,
        }
    }

    /// Build a controller from configuration.
    ///
    /// A missing URL, a disabled capability flag, or a client that cannot be
    /// constructed all start the controller `Disabled`.
    pub fn from_config(config: &VectorConfig, fallback: Arc<FallbackStore>) -> Self {
        let timeout = Duration::from_secs(config.timeout_secs);

        let remote = match config.url.as_deref() {
            Some(url) if config.remote_configured() => match QdrantIndex::new(url, timeout) {
                Ok(index) => Some(RemoteVectorStore::new(
                    Arc::new(index),
                    Embedder::new(config.dimension),
                    config.collection.clone(),
                )),
                Err(e) => {
                    tracing::warn!("Vector backend unavailable, using in-memory fallback: {}", e);
                    None
                }
            },
            _ => {
                tracing::info!("No vector backend configured; using in-memory fallback");
                None
            }
        };

        Self::new(remote, fallback, timeout)
    }

    /// Current backend state
    pub fn state(&self) -> BackendState {
        match self.state.load(Ordering::SeqCst) {
            HEALTHY => BackendState::Healthy,
            _ => BackendState::Disabled,
        }
    }

    /// Whether calls are still routed to the remote store
    pub fn is_healthy(&self) -> bool {
        self.state() == BackendState::Healthy
    }

    /// The fallback store
    pub fn fallback(&self) -> &Arc<FallbackStore> {
        &self.fallback
    }

    /// Ensure the remote collection exists before traffic arrives.
    ///
    /// Failure trips the breaker; it is never returned as an error.
    pub async fn initialize(&self) {
        let remote = match self.healthy_remote() {
            Some(remote) => remote,
            None => {
                tracing::info!("Vector store initialisation skipped; using in-memory fallback");
                return;
            }
        };

        match self
            .call_remote("initialize", remote.ensure_collection())
            .await
        {
            Ok(()) => tracing::info!("Vector collection {} ready", remote.collection()),
            Err(e) => self.trip("initialize", &e).await,
        }
    }

    fn healthy_remote(&self) -> Option<&RemoteVectorStore> {
        if self.is_healthy() {
            self.remote.as_ref()
        } else {
            None
        }
    }

    /// Run a remote call bounded by the configured timeout.
    async fn call_remote<T, F>(&self, op: &str, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(Error::VectorStore(format!(
                "{} timed out after {:?}",
                op, self.timeout
            ))),
        }
    }

    /// Transition `Healthy -> Disabled`. Only the winning caller tears down.
    async fn trip(&self, op: &str, err: &Error) {
        if self
            .state
            .compare_exchange(HEALTHY, DISABLED, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::debug!("Vector backend already disabled ({} failed): {}", op, err);
            return;
        }

        tracing::warn!("Vector backend disabled ({} failed): {}", op, err);

        if let Some(remote) = &self.remote {
            if let Err(e) = remote.close().await {
                tracing::debug!("Vector backend teardown failed: {}", e);
            }
        }
    }
}

#[async_trait]
impl SegmentStore for BackendHealthController {
    async fn upsert(&self, story_id: &str, text: &str) -> Result<String> {
        let id = new_segment_id();

        if let Some(remote) = self.healthy_remote() {
            match self
                .call_remote("upsert", remote.upsert_with_id(story_id, &id, text))
                .await
            {
                Ok(id) => return Ok(id),
                Err(e) => self.trip("upsert", &e).await,
            }
        }

        self.fallback.upsert_with_id(story_id, &id, text).await
    }

    async fn search(&self, story_id: &str, query: &str, limit: usize) -> Result<Vec<SearchHit>> {
        if let Some(remote) = self.healthy_remote() {
            match self
                .call_remote("search", remote.search(story_id, query, limit))
                .await
            {
                Ok(hits) => return Ok(hits),
                Err(e) => self.trip("search", &e).await,
            }
        }

        self.fallback.search(story_id, query, limit).await
    }

    fn name(&self) -> &str {
        match self.state() {
            BackendState::Healthy => "remote",
            BackendState::Disabled => "fallback",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::testutil::MockIndex;

    fn controller_with(index: Arc<MockIndex>) -> BackendHealthController {
        let remote = RemoteVectorStore::new(index, Embedder::default(), "story_context");
        BackendHealthController::new(
            Some(remote),
            Arc::new(FallbackStore::new()),
            Duration::from_secs(5),
        )
    }

    #[test]
    fn test_starts_disabled_without_remote() {
        let controller =
            BackendHealthController::new(None, Arc::new(FallbackStore::new()), Duration::from_secs(1));
        assert_eq!(controller.state(), BackendState::Disabled);
        assert_eq!(controller.name(), "fallback");
    }

    #[test]
    fn test_from_config_without_url_is_disabled() {
        let config = VectorConfig {
            url: None,
            ..VectorConfig::default()
        };
        let controller = BackendHealthController::from_config(&config, Arc::new(FallbackStore::new()));
        assert_eq!(controller.state(), BackendState::Disabled);
    }

    #[test]
    fn test_from_config_capability_flag_off_is_disabled() {
        let config = VectorConfig {
            enabled: false,
            ..VectorConfig::default()
        };
        let controller = BackendHealthController::from_config(&config, Arc::new(FallbackStore::new()));
        assert_eq!(controller.state(), BackendState::Disabled);
    }

    #[test]
    fn test_from_config_with_url_starts_healthy() {
        let controller = BackendHealthController::from_config(
            &VectorConfig::default(),
            Arc::new(FallbackStore::new()),
        );
        assert_eq!(controller.state(), BackendState::Healthy);
    }

    #[tokio::test]
    async fn test_healthy_routes_to_remote() {
        let index = Arc::new(MockIndex::new());
        let controller = controller_with(index.clone());

        let id = controller.upsert("S", "The dragon sleeps").await.unwrap();
        assert!(!id.is_empty());
        assert_eq!(MockIndex::calls(&index.upsert_calls), 1);
        assert_eq!(controller.fallback().segment_count("S").await, 0);

        let hits = controller.search("S", "The dragon sleeps", 5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert!((hits[0].score - 1.0).abs() < 1e-5);
        assert_eq!(controller.state(), BackendState::Healthy);
    }

    #[tokio::test]
    async fn test_upsert_failure_trips_and_falls_back() {
        let index = Arc::new(MockIndex::failing_upsert());
        let controller = controller_with(index.clone());

        let id = controller.upsert("S", "text").await.unwrap();
        assert!(!id.is_empty());
        assert_eq!(controller.state(), BackendState::Disabled);
        assert_eq!(MockIndex::calls(&index.close_calls), 1);
        assert_eq!(controller.fallback().segment_count("S").await, 1);

        // Subsequent calls never touch the remote
        controller.upsert("S", "more").await.unwrap();
        controller.search("S", "more", 5).await.unwrap();
        assert_eq!(MockIndex::calls(&index.upsert_calls), 1);
        assert_eq!(MockIndex::calls(&index.search_calls), 0);
        assert_eq!(controller.fallback().segment_count("S").await, 2);
    }

    #[tokio::test]
    async fn test_search_failure_answers_from_fallback() {
        let index = Arc::new(MockIndex::failing_search());
        let controller = controller_with(index.clone());

        // Remote upsert succeeds, so the fallback has nothing yet
        controller.upsert("S", "Dragons appear").await.unwrap();
        let hits = controller.search("S", "dragon", 5).await.unwrap();
        assert!(hits.is_empty());
        assert_eq!(controller.state(), BackendState::Disabled);

        controller.upsert("S", "Hero fights dragon").await.unwrap();
        let hits = controller.search("S", "dragon", 5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].text, "Hero fights dragon");
    }

    #[tokio::test]
    async fn test_timeout_trips_breaker() {
        let index = Arc::new(MockIndex::slow(Duration::from_millis(500)));
        let remote = RemoteVectorStore::new(index.clone(), Embedder::default(), "story_context");
        let controller = BackendHealthController::new(
            Some(remote),
            Arc::new(FallbackStore::new()),
            Duration::from_millis(20),
        );

        controller.upsert("S", "slow write").await.unwrap();
        assert_eq!(controller.state(), BackendState::Disabled);
        assert_eq!(controller.fallback().segment_count("S").await, 1);
    }

    #[tokio::test]
    async fn test_teardown_failure_is_swallowed() {
        let index = Arc::new(MockIndex::failing_upsert());
        index
            .fail_close
            .store(true, std::sync::atomic::Ordering::SeqCst);
        let controller = controller_with(index.clone());

        assert!(controller.upsert("S", "text").await.is_ok());
        assert_eq!(controller.state(), BackendState::Disabled);
    }

    #[tokio::test]
    async fn test_concurrent_failures_teardown_once() {
        let index = Arc::new(MockIndex {
            delay: Some(Duration::from_millis(20)),
            ..MockIndex::default()
        });
        index
            .fail_upsert
            .store(true, std::sync::atomic::Ordering::SeqCst);
        let controller = Arc::new(controller_with(index.clone()));

        let mut handles = Vec::new();
        for i in 0..16 {
            let controller = controller.clone();
            handles.push(tokio::spawn(async move {
                controller.upsert("S", &format!("segment {}", i)).await
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }

        assert_eq!(controller.state(), BackendState::Disabled);
        assert_eq!(MockIndex::calls(&index.close_calls), 1);
        assert_eq!(controller.fallback().segment_count("S").await, 16);
    }

    #[tokio::test]
    async fn test_initialize_creates_missing_collection() {
        let index = Arc::new(MockIndex::new());
        index
            .fail_get
            .store(true, std::sync::atomic::Ordering::SeqCst);
        let controller = controller_with(index.clone());

        controller.initialize().await;
        assert_eq!(MockIndex::calls(&index.create_calls), 1);
        assert_eq!(controller.state(), BackendState::Healthy);
    }

    #[tokio::test]
    async fn test_initialize_failure_trips_before_traffic() {
        let index = Arc::new(MockIndex::new());
        index
            .fail_get
            .store(true, std::sync::atomic::Ordering::SeqCst);
        index
            .fail_create
            .store(true, std::sync::atomic::Ordering::SeqCst);
        let controller = controller_with(index.clone());

        controller.initialize().await;
        assert_eq!(controller.state(), BackendState::Disabled);

        controller.upsert("S", "first").await.unwrap();
        assert_eq!(MockIndex::calls(&index.upsert_calls), 0);
    }

    #[tokio::test]
    async fn test_initialize_when_disabled_is_noop() {
        let controller =
            BackendHealthController::new(None, Arc::new(FallbackStore::new()), Duration::from_secs(1));
        controller.initialize().await;
        assert_eq!(controller.state(), BackendState::Disabled);
    }

    #[tokio::test]
    async fn test_unreachable_backend_trips() {
        // Nothing listens on port 1
        let config = VectorConfig {
            url: Some("http://127.0.0.1:1".to_string()),
            timeout_secs: 2,
            ..VectorConfig::default()
        };
        let controller = BackendHealthController::from_config(&config, Arc::new(FallbackStore::new()));
        assert!(controller.is_healthy());

        controller.upsert("S", "Dragons appear").await.unwrap();
        assert_eq!(controller.state(), BackendState::Disabled);
        let hits = controller.search("S", "dragon", 5).await.unwrap();
        assert_eq!(hits.len(), 1);
    }
}
