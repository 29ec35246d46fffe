//! Workflow configuration.
//!
//! [`WorkflowConfig`] is deserialized from JSON. Every section defaults
//! sensibly so an empty `{}` document is valid.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::Result;
use crate::Error;

// ---------------------------------------------------------------------------
// Top-level WorkflowConfig
// ---------------------------------------------------------------------------

/// Root configuration for a policy run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    pub execution: ExecutionConfig,
    pub logging: LoggingConfig,
    pub expressions: ExpressionConfig,
}

impl WorkflowConfig {
    /// Deserialize a `WorkflowConfig` from a JSON string.
    pub fn from_json(json_str: &str) -> Result<Self> {
        serde_json::from_str(json_str)
            .map_err(|e| Error::Validation(format!("config parse error: {e}")))
    }

    /// Load configuration from a file path, falling back to defaults if the
    /// path is `None` or the file does not exist.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };

        match std::fs::read_to_string(path) {
            Ok(contents) => Self::from_json(&contents).unwrap_or_else(|e| {
                tracing::warn!("Failed to parse config file {}: {e}", path.display());
                Self::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No config file at {}; using defaults", path.display());
                Self::default()
            }
            Err(e) => {
                tracing::warn!("Failed to read config file {}: {e}", path.display());
                Self::default()
            }
        }
    }

    /// Return a list of validation warnings (non-fatal issues).
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        let levels = ["trace", "debug", "info", "warn", "error"];
        if !levels.contains(&self.logging.level.to_lowercase().as_str()) {
            warnings.push(format!(
                "logging.level '{}' is not a recognized level (valid: {})",
                self.logging.level,
                levels.join(", ")
            ));
        }

        if self.expressions.max_depth == 0 {
            warnings.push("expressions.max_depth is 0; every expression will be rejected".into());
        } else if self.expressions.max_depth > MAX_EXPRESSION_DEPTH {
            warnings.push(format!(
                "expressions.max_depth {} exceeds {MAX_EXPRESSION_DEPTH}; policy documents are still limited to {MAX_EXPRESSION_DEPTH}",
                self.expressions.max_depth
            ));
        }

        if self.execution.dry_run && self.execution.keep_original {
            warnings.push("execution.keep_original has no effect in dry-run mode".into());
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// How plans are handed to the execution collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Build plans but never apply them.
    pub dry_run: bool,
    #[serde(default = "default_true")]
    pub keep_backup: bool,
    pub keep_original: bool,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            keep_backup: true,
            keep_original: false,
        }
    }
}

/// Log output settings; `RUST_LOG` overrides `level` when set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_true")]
    pub ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            ansi: true,
        }
    }
}

/// Nesting limit applied while policy documents are deserialized. A lower
/// configured `max_depth` tightens it; a higher one cannot loosen it.
pub const MAX_EXPRESSION_DEPTH: usize = 50;

/// Expression-parser limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpressionConfig {
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
}

impl Default for ExpressionConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".into()
}

fn default_max_depth() -> usize {
    MAX_EXPRESSION_DEPTH
}
