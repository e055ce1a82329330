//! Learned codebase conventions and the memory that holds them

use super::ids::stable_hash;
use super::CodebaseOutline;
use crate::error::UnderstoryError;
use crate::Result;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PatternCategory {
    Style,
    Naming,
    Architecture,
    ErrorHandling,
    Testing,
    Dependency,
}

impl PatternCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Style => "style",
            Self::Naming => "naming",
            Self::Architecture => "architecture",
            Self::ErrorHandling => "error_handling",
            Self::Testing => "testing",
            Self::Dependency => "dependency",
        }
    }

    /// Analyzer output is free-form; anything unrecognised is a style note.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().replace(['-', ' '], "_").as_str() {
            "naming" => Self::Naming,
            "architecture" => Self::Architecture,
            "error_handling" | "errors" => Self::ErrorHandling,
            "testing" | "tests" => Self::Testing,
            "dependency" | "dependencies" => Self::Dependency,
            _ => Self::Style,
        }
    }
}

impl Serialize for PatternCategory {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for PatternCategory {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(PatternCategory::parse(&s))
    }
}

#[derive(Deserialize)]
struct RawPatternEntry {
    category: PatternCategory,
    description: String,
    confidence: f64,
    #[serde(default)]
    examples: Vec<String>,
}

impl TryFrom<RawPatternEntry> for PatternEntry {
    type Error = UnderstoryError;

    fn try_from(raw: RawPatternEntry) -> Result<Self> {
        PatternEntry::new(raw.category, raw.description, raw.confidence, raw.examples)
    }
}

/// A convention with a confidence in [0, 1].
///
/// Deserialization goes through the same validation as `new`, so a stored
/// memory can never hold an out-of-range confidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawPatternEntry")]
pub struct PatternEntry {
    category: PatternCategory,
    description: String,
    confidence: f64,
    examples: Vec<String>,
}

impl PatternEntry {
    pub fn new(
        category: PatternCategory,
        description: impl Into<String>,
        confidence: f64,
        examples: Vec<String>,
    ) -> Result<Self> {
        if !(0.0..=1.0).contains(&confidence) {
            return Err(UnderstoryError::Validation(format!(
                "pattern confidence {confidence} outside [0, 1]"
            )));
        }
        Ok(Self {
            category,
            description: description.into(),
            confidence,
            examples,
        })
    }

    /// Build from untrusted analyzer output, clamping confidence into range.
    /// NaN is treated as zero.
    pub fn clamped(
        category: PatternCategory,
        description: impl Into<String>,
        confidence: f64,
        examples: Vec<String>,
    ) -> Self {
        let confidence = if confidence.is_nan() {
            0.0
        } else {
            confidence.clamp(0.0, 1.0)
        };
        Self {
            category,
            description: description.into(),
            confidence,
            examples,
        }
    }

    pub fn category(&self) -> PatternCategory {
        self.category
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn examples(&self) -> &[String] {
        &self.examples
    }

    /// Identity used to spot rediscovered patterns.
    pub fn dedup_key(&self) -> (PatternCategory, String) {
        let normalized = self
            .description
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();
        (self.category, normalized)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodebaseMemory {
    pub repo_id: String,
    pub outline: CodebaseOutline,
    pub patterns: Vec<PatternEntry>,
    pub version: u64,
}

impl CodebaseMemory {
    pub fn blob_name(repo_id: &str) -> String {
        format!("{}_memory.json", stable_hash(repo_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn construction_rejects_out_of_range_confidence() {
        assert!(PatternEntry::new(PatternCategory::Style, "x", 1.5, vec![]).is_err());
        assert!(PatternEntry::new(PatternCategory::Style, "x", -0.1, vec![]).is_err());
        assert!(PatternEntry::new(PatternCategory::Style, "x", f64::NAN, vec![]).is_err());
        assert!(PatternEntry::new(PatternCategory::Style, "x", 1.0, vec![]).is_ok());
    }

    #[test]
    fn clamped_pins_confidence_to_range() {
        let entry = PatternEntry::clamped(PatternCategory::Naming, "snake_case", 1.5, vec![]);
        assert_eq!(entry.confidence(), 1.0);
        let entry = PatternEntry::clamped(PatternCategory::Naming, "snake_case", f64::NAN, vec![]);
        assert_eq!(entry.confidence(), 0.0);
    }

    #[test]
    fn deserialization_validates_confidence() {
        let bad = r#"{"category":"style","description":"x","confidence":2.0,"examples":[]}"#;
        assert!(serde_json::from_str::<PatternEntry>(bad).is_err());
        let ok = r#"{"category":"Error Handling","description":"x","confidence":0.4}"#;
        let entry: PatternEntry = serde_json::from_str(ok).unwrap();
        assert_eq!(entry.category(), PatternCategory::ErrorHandling);
    }

    #[test]
    fn unknown_category_defaults_to_style() {
        assert_eq!(PatternCategory::parse("performance"), PatternCategory::Style);
    }

    #[test]
    fn dedup_key_ignores_case_and_spacing() {
        let a = PatternEntry::clamped(PatternCategory::Testing, "Tests  live in tests/", 0.5, vec![]);
        let b = PatternEntry::clamped(PatternCategory::Testing, "tests live in tests/", 0.9, vec![]);
        assert_eq!(a.dedup_key(), b.dedup_key());
    }
}
