//! Pattern memory: learned codebase conventions, pruned and capped

use crate::agent::{complete_typed, Agent, AgentRequest};
use crate::error::UnderstoryError;
use crate::model::{CodebaseMemory, CodebaseOutline, PatternCategory, PatternEntry};
use crate::Result;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashSet;
use tracing::{info, Span};

pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.3;
pub const DEFAULT_MAX_PATTERNS: usize = 30;

/// Discovers conventions from an outline.
///
/// `known` lists patterns already on record; implementations should
/// report only new ones.
pub trait PatternAnalyzer: Send + Sync {
    fn discover(&self, outline_text: &str, known: &[PatternEntry]) -> Result<Vec<PatternEntry>>;
}

impl<T: PatternAnalyzer + ?Sized> PatternAnalyzer for &T {
    fn discover(&self, outline_text: &str, known: &[PatternEntry]) -> Result<Vec<PatternEntry>> {
        (**self).discover(outline_text, known)
    }
}

/// Keep patterns at or above `min_confidence`, highest first, at most
/// `max_entries`. Equal confidences keep their input order.
pub fn prune_and_cap(
    patterns: Vec<PatternEntry>,
    min_confidence: f64,
    max_entries: usize,
) -> Vec<PatternEntry> {
    let mut kept: Vec<PatternEntry> = patterns
        .into_iter()
        .filter(|p| p.confidence() >= min_confidence)
        .collect();
    kept.sort_by(|a, b| b.confidence().total_cmp(&a.confidence()));
    kept.truncate(max_entries);
    kept
}

pub struct PatternMemoryService<A> {
    analyzer: A,
    min_confidence: f64,
    max_patterns: usize,
    span: Span,
}

impl<A: PatternAnalyzer> PatternMemoryService<A> {
    pub fn new(analyzer: A, span: Span) -> Self {
        Self {
            analyzer,
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            max_patterns: DEFAULT_MAX_PATTERNS,
            span,
        }
    }

    pub fn with_limits(mut self, min_confidence: f64, max_patterns: usize) -> Self {
        self.min_confidence = min_confidence;
        self.max_patterns = max_patterns;
        self
    }

    /// Discover patterns from scratch. The result is version 1.
    pub fn build_profile(
        &self,
        repo_id: &str,
        outline: CodebaseOutline,
        outline_text: &str,
    ) -> Result<CodebaseMemory> {
        let discovered = self.discover(outline_text, &[])?;
        let found = discovered.len();
        let patterns = prune_and_cap(discovered, self.min_confidence, self.max_patterns);
        info!(parent: &self.span, repo = %repo_id, found, kept = patterns.len(), "Built pattern profile");
        Ok(CodebaseMemory {
            repo_id: repo_id.to_string(),
            outline,
            patterns,
            version: 1,
        })
    }

    /// Ask only for new patterns, merge them after the existing ones, then
    /// prune and cap again. Rediscovered patterns are dropped.
    pub fn update_profile(
        &self,
        existing: &CodebaseMemory,
        outline: CodebaseOutline,
        outline_text: &str,
    ) -> Result<CodebaseMemory> {
        let discovered = self.discover(outline_text, &existing.patterns)?;

        let mut seen: HashSet<_> = existing.patterns.iter().map(PatternEntry::dedup_key).collect();
        let mut merged = existing.patterns.clone();
        let mut added = 0usize;
        for pattern in discovered {
            if seen.insert(pattern.dedup_key()) {
                merged.push(pattern);
                added += 1;
            }
        }

        let patterns = prune_and_cap(merged, self.min_confidence, self.max_patterns);
        let version = existing.version + 1;
        info!(
            parent: &self.span,
            repo = %existing.repo_id,
            added,
            kept = patterns.len(),
            version,
            "Updated pattern profile"
        );
        Ok(CodebaseMemory {
            repo_id: existing.repo_id.clone(),
            outline,
            patterns,
            version,
        })
    }

    fn discover(&self, outline_text: &str, known: &[PatternEntry]) -> Result<Vec<PatternEntry>> {
        self.analyzer
            .discover(outline_text, known)
            .map_err(|e| match e {
                UnderstoryError::ProfileAnalysis(_) => e,
                other => UnderstoryError::ProfileAnalysis(other.to_string()),
            })
    }
}

/// Pattern analyzer backed by an LLM agent.
pub struct AgentPatternAnalyzer<A> {
    agent: A,
}

#[derive(Debug, Deserialize)]
struct PatternReply {
    #[serde(default)]
    patterns: Vec<ReportedPattern>,
}

#[derive(Debug, Deserialize)]
struct ReportedPattern {
    category: String,
    description: String,
    confidence: f64,
    #[serde(default)]
    examples: Vec<String>,
}

const ANALYZER_SYSTEM: &str = "You study codebase outlines and report the conventions the \
code follows: style, naming, architecture, error handling, testing and dependency usage. \
Each pattern needs a confidence between 0 and 1 and up to three example paths or symbols.";

impl<A: Agent> AgentPatternAnalyzer<A> {
    pub fn new(agent: A) -> Self {
        Self { agent }
    }

    fn request(&self, outline_text: &str, known: &[PatternEntry]) -> AgentRequest {
        let mut prompt = String::from("Codebase outline:\n\n");
        prompt.push_str(outline_text);
        if !known.is_empty() {
            prompt.push_str("\nAlready known patterns (do not report these again):\n");
            for pattern in known {
                prompt.push_str(&format!(
                    "- [{}] {}\n",
                    pattern.category().as_str(),
                    pattern.description()
                ));
            }
        }
        AgentRequest::new("codebase_patterns", pattern_schema(), prompt).with_system(ANALYZER_SYSTEM)
    }
}

impl<A: Agent> PatternAnalyzer for AgentPatternAnalyzer<A> {
    fn discover(&self, outline_text: &str, known: &[PatternEntry]) -> Result<Vec<PatternEntry>> {
        let reply: PatternReply = complete_typed(&self.agent, &self.request(outline_text, known))
            .map_err(|e| UnderstoryError::ProfileAnalysis(e.to_string()))?;
        // Out-of-range confidences from the model are clamped, not rejected
        Ok(reply
            .patterns
            .into_iter()
            .filter(|p| !p.description.trim().is_empty())
            .map(|p| {
                PatternEntry::clamped(
                    PatternCategory::parse(&p.category),
                    p.description.trim(),
                    p.confidence,
                    p.examples,
                )
            })
            .collect())
    }
}

fn pattern_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "patterns": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "category": {
                            "type": "string",
                            "enum": ["style", "naming", "architecture", "error_handling", "testing", "dependency"]
                        },
                        "description": {"type": "string"},
                        "confidence": {"type": "number"},
                        "examples": {"type": "array", "items": {"type": "string"}}
                    },
                    "required": ["category", "description", "confidence"]
                }
            }
        },
        "required": ["patterns"]
    })
}
