//! Remote vector-similarity backend
//!
//! `VectorIndex` is the seam to the remote index service; `QdrantIndex`
//! speaks the Qdrant REST API over `reqwest`. `RemoteVectorStore` embeds
//! text and maps segments onto index points of the shape
//! `{id, vector, payload: {story_id, text}}`.
//!
//! Nothing here retries. Failures are returned to the caller, which is
//! expected to be the `BackendHealthController`.

use super::embedder::Embedder;
use super::segment::{new_segment_id, SearchHit, Segment, SegmentStore};
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Client interface to a remote similarity index.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Succeeds when the collection exists.
    async fn get_collection(&self, collection: &str) -> Result<()>;

    /// Create a cosine-distance collection with vectors of `dimension`.
    async fn create_collection(&self, collection: &str, dimension: usize) -> Result<()>;

    /// Write one point and wait for it to be indexed.
    async fn upsert(&self, collection: &str, segment: &Segment) -> Result<()>;

    /// Nearest-neighbour query restricted to points whose payload `story_id` matches.
    async fn search(
        &self,
        collection: &str,
        story_id: &str,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<SearchHit>>;

    /// Release the connection. Later calls fail.
    async fn close(&self) -> Result<()>;
}

// =============================================================================
// Qdrant REST client
// =============================================================================

/// Qdrant REST implementation of `VectorIndex`.
pub struct QdrantIndex {
    base_url: String,
    client: RwLock<Option<reqwest::Client>>,
}

#[derive(Serialize)]
struct CreateCollectionBody {
    vectors: VectorParams,
}

#[derive(Serialize)]
struct VectorParams {
    size: usize,
    distance: &'static str,
}

#[derive(Serialize)]
struct UpsertBody<'a> {
    points: Vec<PointBody<'a>>,
}

#[derive(Serialize)]
struct PointBody<'a> {
    id: &'a str,
    vector: &'a [f32],
    payload: PointPayload<'a>,
}

#[derive(Serialize)]
struct PointPayload<'a> {
    story_id: &'a str,
    text: &'a str,
}

#[derive(Serialize)]
struct SearchBody<'a> {
    vector: &'a [f32],
    filter: serde_json::Value,
    limit: usize,
    with_payload: bool,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    result: Vec<ScoredPoint>,
}

#[derive(Deserialize)]
struct ScoredPoint {
    score: f32,
    #[serde(default)]
    payload: Option<serde_json::Map<String, serde_json::Value>>,
}

impl QdrantIndex {
    /// Create a client for the Qdrant instance at `base_url`.
    ///
    /// Every request is bounded by `timeout`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| Error::VectorStore(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: RwLock::new(Some(client)),
        })
    }

    fn collection_url(&self, collection: &str) -> String {
        format!("{}/collections/{}", self.base_url, collection)
    }

    async fn client(&self) -> Result<reqwest::Client> {
        self.client
            .read()
            .await
            .clone()
            .ok_or_else(|| Error::VectorStore("Qdrant client closed".to_string()))
    }

    async fn send(&self, request: reqwest::RequestBuilder, op: &str) -> Result<reqwest::Response> {
        let response = request
            .send()
            .await
            .map_err(|e| Error::VectorStore(format!("Qdrant {} request failed: {}", op, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::VectorStore(format!(
                "Qdrant {} returned {}: {}",
                op, status, body
            )));
        }
        Ok(response)
    }
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    async fn get_collection(&self, collection: &str) -> Result<()> {
        let client = self.client().await?;
        self.send(client.get(self.collection_url(collection)), "get_collection")
            .await?;
        Ok(())
    }

    async fn create_collection(&self, collection: &str, dimension: usize) -> Result<()> {
        let client = self.client().await?;
        let body = CreateCollectionBody {
            vectors: VectorParams {
                size: dimension,
                distance: "Cosine",
            },
        };
        self.send(
            client.put(self.collection_url(collection)).json(&body),
            "create_collection",
        )
        .await?;
        Ok(())
    }

    async fn upsert(&self, collection: &str, segment: &Segment) -> Result<()> {
        let client = self.client().await?;
        let body = UpsertBody {
            points: vec![PointBody {
                id: &segment.id,
                vector: &segment.vector,
                payload: PointPayload {
                    story_id: &segment.story_id,
                    text: &segment.text,
                },
            }],
        };
        let url = format!("{}/points?wait=true", self.collection_url(collection));
        self.send(client.put(url).json(&body), "upsert").await?;
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        story_id: &str,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<SearchHit>> {
        let client = self.client().await?;
        let body = SearchBody {
            vector,
            filter: serde_json::json!({
                "must": [{ "key": "story_id", "match": { "value": story_id } }]
            }),
            limit,
            with_payload: true,
        };
        let url = format!("{}/points/search", self.collection_url(collection));
        let response = self.send(client.post(url).json(&body), "search").await?;

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| Error::VectorStore(format!("Failed to parse Qdrant search response: {}", e)))?;

        Ok(parsed
            .result
            .into_iter()
            .map(|point| SearchHit {
                text: point
                    .payload
                    .as_ref()
                    .and_then(|p| p.get("text"))
                    .and_then(|t| t.as_str())
                    .unwrap_or_default()
                    .to_string(),
                score: point.score,
            })
            .collect())
    }

    async fn close(&self) -> Result<()> {
        // reqwest has no explicit shutdown; dropping the client closes its pool
        self.client.write().await.take();
        Ok(())
    }
}

// =============================================================================
// Segment store over a remote index
// =============================================================================

/// `SegmentStore` backed by a remote `VectorIndex`.
pub struct RemoteVectorStore {
    index: Arc<dyn VectorIndex>,
    embedder: Embedder,
    collection: String,
}

impl RemoteVectorStore {
    /// Create a store writing into `collection` of `index`
    pub fn new(index: Arc<dyn VectorIndex>, embedder: Embedder, collection: impl Into<String>) -> Self {
        Self {
            index,
            embedder,
            collection: collection.into(),
        }
    }

    /// Collection name
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Get-or-create the collection.
    pub async fn ensure_collection(&self) -> Result<()> {
        match self.index.get_collection(&self.collection).await {
            Ok(()) => Ok(()),
            Err(e) => {
                tracing::debug!("Collection {} lookup failed: {}", self.collection, e);
                self.index
                    .create_collection(&self.collection, self.embedder.dimension())
                    .await?;
                tracing::info!(
                    "Created collection {} (dimension {})",
                    self.collection,
                    self.embedder.dimension()
                );
                Ok(())
            }
        }
    }

    /// Embed and write a segment under a caller-chosen id.
    pub async fn upsert_with_id(&self, story_id: &str, id: &str, text: &str) -> Result<String> {
        let segment = Segment {
            id: id.to_string(),
            story_id: story_id.to_string(),
            text: text.to_string(),
            vector: self.embedder.embed(text),
        };
        self.index.upsert(&self.collection, &segment).await?;
        Ok(segment.id)
    }

    /// Tear down the index connection.
    pub async fn close(&self) -> Result<()> {
        self.index.close().await
    }
}

#[async_trait]
impl SegmentStore for RemoteVectorStore {
    async fn upsert(&self, story_id: &str, text: &str) -> Result<String> {
        self.upsert_with_id(story_id, &new_segment_id(), text).await
    }

    async fn search(&self, story_id: &str, query: &str, limit: usize) -> Result<Vec<SearchHit>> {
        let vector = self.embedder.embed(query);
        let mut hits = self
            .index
            .search(&self.collection, story_id, &vector, limit)
            .await?;
        hits.truncate(limit);
        Ok(hits)
    }

    fn name(&self) -> &str {
        "remote"
    }
}
