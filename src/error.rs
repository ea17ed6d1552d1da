//! Error types with fix suggestions

use thiserror::Error;

/// Trait for errors that provide fix suggestions
pub trait FixSuggestion {
    fn fix_suggestion(&self) -> Option<&str>;
}

/// All error variants are part of the public API.
#[derive(Error, Debug)]
pub enum ImportError {
    /// Bad or unresolvable job description: unknown datasource type,
    /// duplicate name, dangling entity reference. Raised before any
    /// write statement is submitted.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A template could not be rendered against the binding context.
    #[error("template error: {0}")]
    Render(String),

    /// Cursor contract violation, e.g. `next_row()` called past exhaustion.
    #[error("cursor error: {0}")]
    Iteration(String),

    /// A datasource failed to produce rows or release its resources.
    #[error("datasource error: {0}")]
    Backend(String),

    /// A batch submission to the graph store failed. No automatic retry;
    /// batches already committed in the same run stay committed.
    #[error("sink error: {0}")]
    Sink(String),

    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl FixSuggestion for ImportError {
    fn fix_suggestion(&self) -> Option<&str> {
        match self {
            ImportError::Configuration(_) => {
                Some("Check the datasources/graphs sections of the job file")
            }
            ImportError::Render(_) => Some("Use {{name}} or {{name.field}} placeholders"),
            ImportError::Iteration(_) => {
                Some("Call has_next() before next_row(); cursors are single-use")
            }
            ImportError::Backend(_) => Some("Check the datasource url and credentials"),
            ImportError::Sink(_) => {
                Some("Check the target url is a transactional commit endpoint and the store is up")
            }
            ImportError::YamlParse(_) => Some("Check YAML syntax: indentation and quoting"),
            ImportError::Io(_) => Some("Check file path and permissions"),
        }
    }
}
