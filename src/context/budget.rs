//! Token-budgeted running transcript
//!
//! A story's transcript is a list of raw sections (separated by a blank
//! line when rendered) plus, once the budget has been exceeded, a synthetic
//! summary covering everything folded out of it. Folding is lossy and
//! one-directional: the raw text of folded sections survives only in
//! the segment store.
//!
//! Rendered layout after the first fold:
//!
//! ```text
//! STORY SUMMARY (EARLIER CHAPTERS):
//! <summary>
//!
//! CHARACTER INFORMATION:            (only when character summaries exist)
//! { "name": "detail", ... }
//!
//! RECENT STORY CONTENT:
//! <section>
//!
//! <section>
//! ...
//! ```

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Section boundary in a rendered transcript.
pub const SECTION_SEPARATOR: &str = "\n\n";
/// Fixed words -> tokens approximation ratio.
pub const TOKENS_PER_WORD: f64 = 1.3;
/// Raw sections kept verbatim when the transcript is folded.
pub const DEFAULT_RECENT_SECTIONS: usize = 30;

pub const SUMMARY_HEADER: &str = "STORY SUMMARY (EARLIER CHAPTERS):";
pub const SUMMARY_PLACEHOLDER: &str = "[Summary would be generated here]";
pub const CHARACTER_HEADER: &str = "CHARACTER INFORMATION:";
pub const RECENT_HEADER: &str = "RECENT STORY CONTENT:";
pub const HIDDEN_GUIDANCE_HEADER: &str = "隐藏指导 (HIDDEN GUIDANCE):";

/// Estimated token count of `text` (word count x 1.3).
pub fn estimate_tokens(text: &str) -> f64 {
    text.split_whitespace().count() as f64 * TOKENS_PER_WORD
}

/// Produces the summary that replaces folded sections.
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Summarize `folded` sections, given the summary already covering
    /// everything folded before them.
    async fn summarize(&self, previous: Option<&str>, folded: &[String]) -> Result<String>;
}

/// Fixed-text summarizer; performs no generation.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaceholderSummarizer;

#[async_trait]
impl Summarizer for PlaceholderSummarizer {
    async fn summarize(&self, _previous: Option<&str>, _folded: &[String]) -> Result<String> {
        Ok(SUMMARY_PLACEHOLDER.to_string())
    }
}

/// Serializable state of one story's transcript.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TranscriptState {
    /// Summary of folded sections (None until the first fold)
    #[serde(default)]
    pub summary: Option<String>,
    /// Raw sections not yet folded, oldest first
    #[serde(default)]
    pub sections: Vec<String>,
    /// Author directives, oldest first; never folded
    #[serde(default)]
    pub hidden_notes: Vec<String>,
    /// Character name -> free-form detail
    #[serde(default)]
    pub character_summaries: BTreeMap<String, String>,
}

/// Keeps a story transcript within a token budget.
pub struct ContextBudgetManager {
    state: TranscriptState,
    budget_tokens: usize,
    recent_sections: usize,
    summarizer: Arc<dyn Summarizer>,
}

impl ContextBudgetManager {
    /// Create an empty manager with the placeholder summarizer
    pub fn new(budget_tokens: usize) -> Self {
        Self::with_summarizer(budget_tokens, Arc::new(PlaceholderSummarizer))
    }

    /// Create an empty manager with a custom summarizer
    pub fn with_summarizer(budget_tokens: usize, summarizer: Arc<dyn Summarizer>) -> Self {
        Self::from_state(TranscriptState::default(), budget_tokens, summarizer)
    }

    /// Resume a manager from persisted state
    pub fn from_state(
        state: TranscriptState,
        budget_tokens: usize,
        summarizer: Arc<dyn Summarizer>,
    ) -> Self {
        Self {
            state,
            budget_tokens,
            recent_sections: DEFAULT_RECENT_SECTIONS,
            summarizer,
        }
    }

    /// Override how many raw sections survive a fold (minimum 1)
    pub fn with_recent_sections(mut self, recent_sections: usize) -> Self {
        self.recent_sections = recent_sections.max(1);
        self
    }

    pub fn budget_tokens(&self) -> usize {
        self.budget_tokens
    }

    pub fn state(&self) -> &TranscriptState {
        &self.state
    }

    /// Append narrative text and re-enforce the budget.
    ///
    /// Text containing blank lines contributes one section per paragraph.
    pub async fn append(&mut self, new_text: &str) -> Result<()> {
        self.state.sections.extend(
            new_text
                .split(SECTION_SEPARATOR)
                .filter(|s| !s.trim().is_empty())
                .map(str::to_string),
        );
        self.optimize().await?;
        Ok(())
    }

    /// Record an author directive. Notes are never folded.
    pub fn add_hidden_note(&mut self, note: impl Into<String>) {
        self.state.hidden_notes.push(note.into());
    }

    /// Set or replace a character's summary
    pub fn set_character_summary(&mut self, name: impl Into<String>, detail: impl Into<String>) {
        self.state
            .character_summaries
            .insert(name.into(), detail.into());
    }

    /// Estimated token count of the rendered transcript
    pub fn estimated_tokens(&self) -> f64 {
        estimate_tokens(&self.transcript())
    }

    /// Fold older sections into the summary when over budget.
    ///
    /// Returns whether the transcript changed. An over-budget transcript
    /// always switches to the summary layout; the most recent sections are
    /// kept verbatim even when they alone exceed the budget, so a second
    /// call with no intervening append never changes the transcript.
    pub async fn optimize(&mut self) -> Result<bool> {
        if self.estimated_tokens() <= self.budget_tokens as f64 {
            return Ok(false);
        }
        if self.state.sections.len() <= self.recent_sections {
            if self.state.summary.is_some() {
                return Ok(false);
            }
            // Nothing to fold yet, but the layout still changes
            let summary = self.summarizer.summarize(None, &[]).await?;
            self.state.summary = Some(summary);
            tracing::debug!(
                "Switched to summary layout with {} sections (~{:.0} tokens, budget {})",
                self.state.sections.len(),
                self.estimated_tokens(),
                self.budget_tokens
            );
            return Ok(true);
        }

        let split_at = self.state.sections.len() - self.recent_sections;
        let summary = self
            .summarizer
            .summarize(self.state.summary.as_deref(), &self.state.sections[..split_at])
            .await?;

        self.state.sections.drain(..split_at);
        self.state.summary = Some(summary);

        tracing::debug!(
            "Folded {} sections into summary ({} kept, ~{:.0} tokens, budget {})",
            split_at,
            self.state.sections.len(),
            self.estimated_tokens(),
            self.budget_tokens
        );
        Ok(true)
    }

    /// Render the optimized transcript
    pub fn transcript(&self) -> String {
        let recent = self.state.sections.join(SECTION_SEPARATOR);

        let summary = match &self.state.summary {
            Some(summary) => summary,
            None => return recent,
        };

        let mut out = format!("{}\n{}{}", SUMMARY_HEADER, summary, SECTION_SEPARATOR);
        if !self.state.character_summaries.is_empty() {
            let characters =
                serde_json::to_string_pretty(&self.state.character_summaries).unwrap_or_default();
            out.push_str(&format!(
                "{}\n{}{}",
                CHARACTER_HEADER, characters, SECTION_SEPARATOR
            ));
        }
        out.push_str(RECENT_HEADER);
        out.push('\n');
        out.push_str(&recent);
        out
    }

    /// Transcript for prompting, optionally followed by the hidden guidance block
    pub fn get_context(&self, include_hidden_notes: bool) -> String {
        let mut context = self.transcript();
        if include_hidden_notes && !self.state.hidden_notes.is_empty() {
            context.push_str(SECTION_SEPARATOR);
            context.push_str(HIDDEN_GUIDANCE_HEADER);
            context.push('\n');
            context.push_str(&self.state.hidden_notes.join("\n"));
        }
        context
    }
}
