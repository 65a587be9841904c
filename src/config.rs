//! Story context configuration management

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Token budget used by the interactive writing path.
pub const INTERACTIVE_MAX_TOKENS: usize = 90_000;

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// HTTP server configuration
    pub server: ServerConfig,

    /// Remote vector backend configuration
    pub vector: VectorConfig,

    /// Transcript budget configuration
    pub budget: BudgetConfig,

    /// Transcript persistence configuration
    pub storage: StorageConfig,
}

impl ContextConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.vector.dimension == 0 {
            return Err(Error::Config("vector.dimension must be positive".to_string()));
        }
        if self.vector.timeout_secs == 0 {
            return Err(Error::Config("vector.timeout_secs must be positive".to_string()));
        }
        if self.vector.collection.trim().is_empty() {
            return Err(Error::Config("vector.collection must not be empty".to_string()));
        }
        if self.budget.max_tokens == 0 {
            return Err(Error::Config("budget.max_tokens must be positive".to_string()));
        }
        if self.budget.recent_sections == 0 {
            return Err(Error::Config(
                "budget.recent_sections must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Allowed CORS origins (empty = any)
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8004,
            cors_origins: Vec::new(),
        }
    }
}

/// Remote vector backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorConfig {
    /// Capability flag; when false the backend is never contacted
    pub enabled: bool,

    /// Backend base URL (None = in-process fallback only)
    pub url: Option<String>,

    /// Collection holding story segments
    pub collection: String,

    /// Embedding vector length
    pub dimension: usize,

    /// Upper bound for any single backend call, in seconds
    pub timeout_secs: u64,
}

impl VectorConfig {
    /// Whether a remote backend should be attempted at all
    pub fn remote_configured(&self) -> bool {
        self.enabled
            && self
                .url
                .as_deref()
                .map(|u| !u.trim().is_empty())
                .unwrap_or(false)
    }
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: Some("http://localhost:6333".to_string()),
            collection: "story_context".to_string(),
            dimension: 8,
            timeout_secs: 10,
        }
    }
}

/// Transcript budget configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetConfig {
    /// Ceiling on the estimated token count of a transcript
    pub max_tokens: usize,

    /// Raw sections preserved verbatim when the transcript is folded
    pub recent_sections: usize,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            max_tokens: 4096,
            recent_sections: 30,
        }
    }
}

/// Transcript persistence configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory for transcript records (None = keep in memory)
    pub data_dir: Option<PathBuf>,
}

impl StorageConfig {
    /// Default on-disk location (~/.story-context/transcripts)
    pub fn default_dir() -> PathBuf {
        dirs_next::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".story-context")
            .join("transcripts")
    }
}
