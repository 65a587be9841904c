//! Context service: orchestrates transcripts and segment indexing per story
//!
//! Every mutation of a story's transcript runs under that story's lock, so
//! writes to one story never block reads or writes of another. Mutations
//! are applied to a copy of the story state and committed only after the
//! row is persisted; an abandoned call leaves the previous state intact.

use super::budget::{ContextBudgetManager, PlaceholderSummarizer, Summarizer, TranscriptState};
use super::segment::{SearchHit, SegmentStore};
use super::transcript::{ContextRecord, StoredTranscript, TranscriptStore};
use crate::config::BudgetConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

/// Default number of search results.
pub const DEFAULT_SEARCH_LIMIT: usize = 5;

/// Opaque text-generation collaborator (the LLM call).
#[async_trait]
pub trait StoryGenerator: Send + Sync {
    /// Generate text for `prompt` given the story `context` and `system_prompt`.
    async fn generate(&self, prompt: &str, context: &str, system_prompt: &str) -> Result<String>;
}

/// Search results envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub results: Vec<SearchHit>,
}

struct StoryContext {
    record: ContextRecord,
    state: TranscriptState,
}

/// Per-story slot; `None` until the story is loaded or first saved.
type StorySlot = Arc<Mutex<Option<StoryContext>>>;

fn not_found(story_id: &str) -> Error {
    Error::NotFound(format!("Context for story {} not found", story_id))
}

/// Save/get/search over story contexts.
pub struct ContextService {
    transcripts: Arc<dyn TranscriptStore>,
    segments: Arc<dyn SegmentStore>,
    budget: BudgetConfig,
    summarizer: Arc<dyn Summarizer>,
    stories: RwLock<HashMap<String, StorySlot>>,
}

impl ContextService {
    /// Create a service using the placeholder summarizer
    pub fn new(
        transcripts: Arc<dyn TranscriptStore>,
        segments: Arc<dyn SegmentStore>,
        budget: BudgetConfig,
    ) -> Self {
        Self {
            transcripts,
            segments,
            budget,
            summarizer: Arc::new(PlaceholderSummarizer),
            stories: RwLock::new(HashMap::new()),
        }
    }

    /// Substitute the summarization strategy
    pub fn with_summarizer(mut self, summarizer: Arc<dyn Summarizer>) -> Self {
        self.summarizer = summarizer;
        self
    }

    fn manager(&self, state: TranscriptState) -> ContextBudgetManager {
        ContextBudgetManager::from_state(state, self.budget.max_tokens, self.summarizer.clone())
            .with_recent_sections(self.budget.recent_sections)
    }

    /// Slot for a story, created empty when absent. Only writes create slots.
    async fn slot(&self, story_id: &str) -> StorySlot {
        if let Some(slot) = self.stories.read().await.get(story_id) {
            return slot.clone();
        }
        self.stories
            .write()
            .await
            .entry(story_id.to_string())
            .or_default()
            .clone()
    }

    /// Slot for an existing story, loaded from the transcript store on a miss.
    ///
    /// Unknown stories leave the map untouched.
    async fn existing_slot(&self, story_id: &str) -> Result<StorySlot> {
        if let Some(slot) = self.stories.read().await.get(story_id) {
            return Ok(slot.clone());
        }

        let stored = self
            .transcripts
            .load(story_id)
            .await?
            .ok_or_else(|| not_found(story_id))?;

        Ok(self
            .stories
            .write()
            .await
            .entry(story_id.to_string())
            .or_insert_with(|| {
                Arc::new(Mutex::new(Some(StoryContext {
                    record: stored.record,
                    state: stored.state,
                })))
            })
            .clone())
    }

    /// Drop a slot that never came to hold a story.
    ///
    /// Only removes it when no other caller holds a handle to it.
    async fn discard_if_empty(&self, story_id: &str, slot: &StorySlot) {
        let mut stories = self.stories.write().await;
        let same_slot = stories
            .get(story_id)
            .map(|current| Arc::ptr_eq(current, slot))
            .unwrap_or(false);
        let unused = same_slot
            && Arc::strong_count(slot) == 2
            && matches!(slot.try_lock(), Ok(guard) if guard.is_none());
        if unused {
            stories.remove(story_id);
        }
    }

    /// Fill an empty slot from the transcript store.
    async fn hydrate(&self, story_id: &str, slot: &mut Option<StoryContext>) -> Result<()> {
        if slot.is_none() {
            if let Some(stored) = self.transcripts.load(story_id).await? {
                *slot = Some(StoryContext {
                    record: stored.record,
                    state: stored.state,
                });
            }
        }
        Ok(())
    }

    /// Persist a mutated copy of a story and commit it to the slot.
    async fn commit(
        &self,
        slot: &mut Option<StoryContext>,
        record: ContextRecord,
        state: TranscriptState,
    ) -> Result<ContextRecord> {
        let stored = StoredTranscript { record, state };
        self.transcripts.save(&stored).await?;

        let record = stored.record.clone();
        *slot = Some(StoryContext {
            record: stored.record,
            state: stored.state,
        });
        Ok(record)
    }

    /// Append text to a story's transcript and index it as a segment.
    ///
    /// Creates the story context on first use. The raw `text`, not the
    /// optimized transcript, is what gets indexed. Once the transcript is
    /// persisted the call succeeds; an indexing failure after that point is
    /// logged, not returned.
    pub async fn save_context(&self, story_id: &str, text: &str) -> Result<ContextRecord> {
        let slot = self.slot(story_id).await;
        let result = {
            let mut guard = slot.lock().await;
            let result = self.append_locked(story_id, text, &mut guard).await;
            result
        };

        if result.is_err() {
            self.discard_if_empty(story_id, &slot).await;
        }
        result
    }

    async fn append_locked(
        &self,
        story_id: &str,
        text: &str,
        slot: &mut Option<StoryContext>,
    ) -> Result<ContextRecord> {
        self.hydrate(story_id, slot).await?;

        let (mut record, state, is_new) = match slot.as_ref() {
            Some(ctx) => (ctx.record.clone(), ctx.state.clone(), false),
            None => (
                ContextRecord::new(story_id, String::new()),
                TranscriptState::default(),
                true,
            ),
        };

        let mut manager = self.manager(state);
        manager.append(text).await?;

        let content = manager.transcript();
        if is_new {
            record.content = content;
        } else {
            record.update(content);
        }

        let record = self.commit(slot, record, manager.state().clone()).await?;

        match self.segments.upsert(story_id, text).await {
            Ok(segment_id) => tracing::debug!(
                "Saved context for story {} (segment {}, {} chars)",
                story_id,
                segment_id,
                record.content.len()
            ),
            Err(e) => tracing::error!(
                "Saved context for story {} but indexing via {} failed: {}",
                story_id,
                self.segments.name(),
                e
            ),
        }

        Ok(record)
    }

    /// Run `view` over an existing story's state.
    async fn read<T, F>(&self, story_id: &str, view: F) -> Result<T>
    where
        F: FnOnce(&StoryContext) -> T,
    {
        let slot = self.existing_slot(story_id).await?;
        let value = {
            let mut guard = slot.lock().await;
            self.hydrate(story_id, &mut guard).await?;
            let value = guard.as_ref().map(view);
            value
        };

        match value {
            Some(value) => Ok(value),
            None => {
                self.discard_if_empty(story_id, &slot).await;
                Err(not_found(story_id))
            }
        }
    }

    /// Current transcript record for a story.
    pub async fn get_context(&self, story_id: &str) -> Result<ContextRecord> {
        self.read(story_id, |ctx| ctx.record.clone()).await
    }

    /// Transcript prepared for prompting, optionally with hidden guidance.
    pub async fn get_prompt_context(
        &self,
        story_id: &str,
        include_hidden_notes: bool,
    ) -> Result<String> {
        self.read(story_id, |ctx| {
            self.manager(ctx.state.clone())
                .get_context(include_hidden_notes)
        })
        .await
    }

    /// Record an author directive for a story.
    pub async fn add_hidden_note(&self, story_id: &str, note: &str) -> Result<()> {
        self.mutate(story_id, |manager| manager.add_hidden_note(note))
            .await
            .map(|_| ())
    }

    /// Set a character summary shown in the folded transcript.
    pub async fn set_character_summary(
        &self,
        story_id: &str,
        name: &str,
        detail: &str,
    ) -> Result<ContextRecord> {
        self.mutate(story_id, |manager| manager.set_character_summary(name, detail))
            .await
    }

    /// Apply a synchronous edit to an existing story and persist it.
    ///
    /// `updated_at` is only stamped when the rendered transcript changes.
    async fn mutate<F>(&self, story_id: &str, edit: F) -> Result<ContextRecord>
    where
        F: FnOnce(&mut ContextBudgetManager),
    {
        let slot = self.existing_slot(story_id).await?;
        let mut guard = slot.lock().await;
        self.hydrate(story_id, &mut guard).await?;

        let current = guard
            .as_ref()
            .map(|ctx| (ctx.record.clone(), ctx.state.clone()));
        let (mut record, state) = match current {
            Some(current) => current,
            None => {
                drop(guard);
                self.discard_if_empty(story_id, &slot).await;
                return Err(not_found(story_id));
            }
        };

        let mut manager = self.manager(state);
        edit(&mut manager);

        let content = manager.transcript();
        if content != record.content {
            record.update(content);
        }

        self.commit(&mut guard, record, manager.state().clone())
            .await
    }

    /// Segments of a story most relevant to `query`.
    ///
    /// Always answers for an existing story, from the fallback store when
    /// the remote backend is unavailable.
    pub async fn search_context(
        &self,
        story_id: &str,
        query: &str,
        limit: usize,
    ) -> Result<SearchResponse> {
        self.read(story_id, |_| ()).await?;

        let results = self.segments.search(story_id, query, limit).await?;
        Ok(SearchResponse { results })
    }

    /// Generate the next passage of a story and fold it into its context.
    ///
    /// A story without a context starts from an empty one.
    pub async fn continue_story(
        &self,
        story_id: &str,
        prompt: &str,
        system_prompt: &str,
        generator: &dyn StoryGenerator,
    ) -> Result<String> {
        let context = match self.get_prompt_context(story_id, true).await {
            Ok(context) => context,
            Err(Error::NotFound(_)) => String::new(),
            Err(e) => return Err(e),
        };

        let generated = generator.generate(prompt, &context, system_prompt).await?;
        if generated.trim().is_empty() {
            return Err(Error::Generation(format!(
                "Empty continuation generated for story {}",
                story_id
            )));
        }

        self.save_context(story_id, &generated).await?;
        tracing::info!(
            "Continued story {} ({} chars generated)",
            story_id,
            generated.len()
        );
        Ok(generated)
    }
}
