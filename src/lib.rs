//! Story Context - bounded narrative context engine
//!
//! Maintains, per story, a running transcript kept within a token budget and
//! a searchable index of every passage ever added. Older material is folded
//! into a synthetic summary while its raw text remains retrievable through
//! the segment store.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       HTTP API (axum)                         │
//! └──────────────────────────────┬───────────────────────────────┘
//!                                │
//! ┌──────────────────────────────▼───────────────────────────────┐
//! │                       ContextService                          │
//! │  ┌────────────────────────┐   ┌────────────────────────────┐ │
//! │  │  ContextBudgetManager  │   │  BackendHealthController   │ │
//! │  │  (per story, locked)   │   │  Healthy ──▶ Disabled      │ │
//! │  └───────────┬────────────┘   └──────┬──────────────┬──────┘ │
//! │              │                       │              │        │
//! │  ┌───────────▼────────────┐  ┌───────▼──────┐ ┌─────▼──────┐ │
//! │  │    TranscriptStore     │  │ RemoteVector │ │  Fallback  │ │
//! │  │  (memory / JSON files) │  │    Store     │ │   Store    │ │
//! │  └────────────────────────┘  └───────┬──────┘ └────────────┘ │
//! └──────────────────────────────────────┼───────────────────────┘
//!                                        │ REST
//!                                  ┌─────▼─────┐
//!                                  │  Qdrant   │
//!                                  └───────────┘
//! ```
//!
//! ## Modules
//!
//! - [`context`]: transcript budgeting, segment stores and the service
//! - [`api`]: HTTP routes over the service
//! - [`config`]: Configuration management
//! - [`error`]: Crate error type

pub mod api;
pub mod config;
pub mod context;
pub mod error;

pub use config::ContextConfig;
pub use context::{ContextRecord, ContextService, SearchHit, SearchResponse};
pub use error::{Error, Result};
