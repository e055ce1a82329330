//! Error types for understory operations
//!
//! Only `Configuration` is fatal. Everything else is recovered by the
//! component that observes it (file skipped, strategy dropped, sync falling
//! back to a wider pull) and logged with a warning.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum UnderstoryError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Indexing failed for {path}: {message}")]
    Indexing { path: String, message: String },

    #[error("Parse error for {path}: {message}")]
    Parse { path: String, message: String },

    #[error("Publish error during {operation}: {message}")]
    Publish { operation: String, message: String },

    #[error("Pattern analysis failed: {0}")]
    ProfileAnalysis(String),

    #[error("Retrieval strategy '{strategy}' failed: {message}")]
    Strategy { strategy: String, message: String },

    #[error("Malformed blob {blob}: {message}")]
    Decode { blob: String, message: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Agent call failed: {0}")]
    Agent(String),

    #[error("Embedding provider error: {0}")]
    Embedding(String),

    #[error("Not initialized (no .understory directory at {}). Run 'understory init' first.", .0.display())]
    NotInitialized(PathBuf),

    #[error("Config already exists at {}", .0.display())]
    ConfigExists(PathBuf),

    #[error("Lock error on {}: {message}", .path.display())]
    Lock { path: PathBuf, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl UnderstoryError {
    pub fn publish(operation: impl Into<String>, message: impl ToString) -> Self {
        Self::Publish {
            operation: operation.into(),
            message: message.to_string(),
        }
    }

    pub fn decode(blob: impl Into<String>, message: impl ToString) -> Self {
        Self::Decode {
            blob: blob.into(),
            message: message.to_string(),
        }
    }

    pub fn parse(path: impl Into<String>, message: impl ToString) -> Self {
        Self::Parse {
            path: path.into(),
            message: message.to_string(),
        }
    }

    pub fn strategy(strategy: impl Into<String>, message: impl ToString) -> Self {
        Self::Strategy {
            strategy: strategy.into(),
            message: message.to_string(),
        }
    }

    /// Fatal errors abort the run before any side effect; everything else
    /// degrades gracefully.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Configuration(_) | Self::NotInitialized(_) | Self::ConfigExists(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_configuration_class_errors_are_fatal() {
        assert!(UnderstoryError::Configuration("missing token".into()).is_fatal());
        assert!(!UnderstoryError::publish("push", "boom").is_fatal());
        assert!(!UnderstoryError::ProfileAnalysis("bad json".into()).is_fatal());
        assert!(!UnderstoryError::strategy("lexical", "oops").is_fatal());
    }

    #[test]
    fn messages_name_the_failing_component() {
        let err = UnderstoryError::strategy("semantic", "provider down");
        assert_eq!(
            err.to_string(),
            "Retrieval strategy 'semantic' failed: provider down"
        );
        let err = UnderstoryError::decode("abc.json", "missing field `files`");
        assert!(err.to_string().contains("abc.json"));
    }
}
