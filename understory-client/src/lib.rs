//! Understory Client - HTTP backends
//!
//! Concrete collaborators for `understory-core`: the GitHub REST API behind
//! `VcsClient`, and OpenAI-compatible endpoints behind `EmbeddingProvider`
//! and `Agent`.

pub mod agent;
pub mod embeddings;
pub mod github;

pub use agent::HttpAgent;
pub use embeddings::HttpEmbeddingProvider;
pub use github::GitHubClient;

use std::sync::Arc;
use tracing::Span;
use understory_core::{Agent, Config, EmbeddingProvider, Result};

/// Optional backends enabled in `config`.
pub struct Backends {
    pub embedder: Option<Arc<dyn EmbeddingProvider>>,
    pub agent: Option<Arc<dyn Agent>>,
}

impl Backends {
    /// Build every enabled backend. An enabled backend without its API key
    /// is a configuration error.
    pub fn from_config(config: &Config, span: &Span) -> Result<Self> {
        let embedder: Option<Arc<dyn EmbeddingProvider>> = if config.embedding.enabled {
            Some(Arc::new(HttpEmbeddingProvider::from_config(
                &config.embedding,
                span.clone(),
            )?))
        } else {
            None
        };
        let agent: Option<Arc<dyn Agent>> = if config.agent.enabled {
            Some(Arc::new(HttpAgent::from_config(&config.agent, span.clone())?))
        } else {
            None
        };
        Ok(Self { embedder, agent })
    }
}
