//! Configuration for understory

use crate::UnderstoryError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Directory holding config and the local store, relative to the repo root
pub const CONFIG_DIR: &str = ".understory";
pub const CONFIG_FILE: &str = "config.toml";

/// The only token encoding `estimate_tokens` implements
pub const SUPPORTED_ENCODING: &str = "cl100k_base";

/// Default configuration as TOML
pub const DEFAULT_CONFIG: &str = r#"# Understory Configuration

[core]
# Token encoding (cl100k_base is GPT-4/Claude compatible)
encoding = "cl100k_base"

[sync]
# Branch of the hosted repository that stores the index
branch = "understory-index"
# Local blob store, relative to the repository root
store_dir = ".understory/store"
# Cross-shard hops pulled around changed files
adjacent_hops = 1

[indexing]
include_glob = "**/*.{rs,py,pyi,js,jsx,mjs,cjs,ts,tsx,go}"
# Files above this size (bytes) are skipped
max_file_bytes = 1000000
# More changed files than this since the checkpoint forces a full rebuild
full_rebuild_threshold = 200
# Patterns to ignore (beyond .gitignore)
ignore = [
    ".git",
    ".understory",
    "node_modules",
    "target",
    "__pycache__",
    ".venv",
    "vendor",
    "dist",
    "*.min.js",
]

[chunking]
max_chunk_tokens = 512

[retrieval]
# Total tokens of context per review
budget = 8000
# Share of the budget each strategy may use (sum must not exceed 1.0)
structural_ratio = 0.35
lexical_ratio = 0.25
semantic_ratio = 0.25
agentic_ratio = 0.15
# Graph distance walked by the structural strategy
max_hops = 2
# Characters of the diff used as query text
diff_excerpt_chars = 2000

[agentic]
max_iterations = 3

[embedding]
enabled = false
model = "text-embedding-3-small"
dimension = 1536
endpoint = "https://api.openai.com/v1"
api_key_env = "OPENAI_API_KEY"
batch_size = 64

[agent]
enabled = false
model = "gpt-4o-mini"
endpoint = "https://api.openai.com/v1"
api_key_env = "OPENAI_API_KEY"
max_retries = 3

[memory]
# Patterns below this confidence are pruned
min_confidence = 0.3
max_patterns = 30
# Token budget of the outline handed to the analyzer
outline_budget = 4000

[logging]
# Overridden by RUST_LOG when set
default = "info"

[logging.modules]
# "understory_core::sync" = "debug"
"#;

/// Understory configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub core: CoreConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub indexing: IndexingConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub agentic: AgenticConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    #[serde(default = "default_encoding")]
    pub encoding: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_branch")]
    pub branch: String,
    #[serde(default = "default_store_dir")]
    pub store_dir: String,
    #[serde(default = "default_adjacent_hops")]
    pub adjacent_hops: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexingConfig {
    #[serde(default = "default_include_glob")]
    pub include_glob: String,
    #[serde(default = "default_ignore_patterns")]
    pub ignore: Vec<String>,
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,
    #[serde(default = "default_full_rebuild_threshold")]
    pub full_rebuild_threshold: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_chunk_tokens")]
    pub max_chunk_tokens: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    #[serde(default = "default_budget")]
    pub budget: usize,
    #[serde(default = "default_structural_ratio")]
    pub structural_ratio: f64,
    #[serde(default = "default_lexical_ratio")]
    pub lexical_ratio: f64,
    #[serde(default = "default_semantic_ratio")]
    pub semantic_ratio: f64,
    #[serde(default = "default_agentic_ratio")]
    pub agentic_ratio: f64,
    #[serde(default = "default_max_hops")]
    pub max_hops: usize,
    #[serde(default = "default_diff_excerpt_chars")]
    pub diff_excerpt_chars: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgenticConfig {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_agent_model")]
    pub model: String,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
    #[serde(default = "default_max_patterns")]
    pub max_patterns: usize,
    #[serde(default = "default_outline_budget")]
    pub outline_budget: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub default: String,
    /// Per-module level overrides, e.g. `understory_core::sync = "debug"`
    #[serde(default)]
    pub modules: BTreeMap<String, String>,
}

// Default value functions
fn default_encoding() -> String {
    "cl100k_base".to_string()
}
fn default_branch() -> String {
    "understory-index".to_string()
}
fn default_store_dir() -> String {
    format!("{CONFIG_DIR}/store")
}
fn default_adjacent_hops() -> usize {
    1
}
fn default_include_glob() -> String {
    "**/*.{rs,py,pyi,js,jsx,mjs,cjs,ts,tsx,go}".to_string()
}
/// Same list as `ignore` in `DEFAULT_CONFIG`.
const DEFAULT_IGNORE: &[&str] = &[
    ".git",
    CONFIG_DIR,
    "node_modules",
    "target",
    "__pycache__",
    ".venv",
    "vendor",
    "dist",
    "*.min.js",
];

fn default_ignore_patterns() -> Vec<String> {
    DEFAULT_IGNORE.iter().map(|p| p.to_string()).collect()
}
fn default_max_file_bytes() -> u64 {
    1_000_000
}
fn default_full_rebuild_threshold() -> usize {
    200
}
fn default_max_chunk_tokens() -> usize {
    512
}
fn default_budget() -> usize {
    8000
}
fn default_structural_ratio() -> f64 {
    0.35
}
fn default_lexical_ratio() -> f64 {
    0.25
}
fn default_semantic_ratio() -> f64 {
    0.25
}
fn default_agentic_ratio() -> f64 {
    0.15
}
fn default_max_hops() -> usize {
    2
}
fn default_diff_excerpt_chars() -> usize {
    2000
}
fn default_max_iterations() -> usize {
    3
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}
fn default_embedding_dimension() -> usize {
    1536
}
fn default_endpoint() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_agent_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_max_retries() -> usize {
    3
}
fn default_min_confidence() -> f64 {
    0.3
}
fn default_max_patterns() -> usize {
    30
}
fn default_outline_budget() -> usize {
    4000
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            encoding: default_encoding(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            branch: default_branch(),
            store_dir: default_store_dir(),
            adjacent_hops: default_adjacent_hops(),
        }
    }
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            include_glob: default_include_glob(),
            ignore: default_ignore_patterns(),
            max_file_bytes: default_max_file_bytes(),
            full_rebuild_threshold: default_full_rebuild_threshold(),
        }
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chunk_tokens: default_max_chunk_tokens(),
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            budget: default_budget(),
            structural_ratio: default_structural_ratio(),
            lexical_ratio: default_lexical_ratio(),
            semantic_ratio: default_semantic_ratio(),
            agentic_ratio: default_agentic_ratio(),
            max_hops: default_max_hops(),
            diff_excerpt_chars: default_diff_excerpt_chars(),
        }
    }
}

impl Default for AgenticConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            model: default_embedding_model(),
            dimension: default_embedding_dimension(),
            endpoint: default_endpoint(),
            api_key_env: default_api_key_env(),
            batch_size: default_batch_size(),
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            model: default_agent_model(),
            endpoint: default_endpoint(),
            api_key_env: default_api_key_env(),
            max_retries: default_max_retries(),
        }
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            min_confidence: default_min_confidence(),
            max_patterns: default_max_patterns(),
            outline_budget: default_outline_budget(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Load config from a TOML file
    pub fn load(path: &Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            UnderstoryError::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml(&content)
    }

    /// Load `<repo_root>/.understory/config.toml`, or defaults when the
    /// file does not exist. The result is validated either way.
    pub fn load_for_repo(repo_root: &Path) -> crate::Result<Self> {
        let path = Self::path_for_repo(repo_root);
        let config = if path.is_file() {
            Self::load(&path)?
        } else {
            Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Parse config from TOML string
    pub fn from_toml(content: &str) -> crate::Result<Self> {
        toml::from_str(content).map_err(|e| UnderstoryError::Configuration(e.to_string()))
    }

    pub fn path_for_repo(repo_root: &Path) -> PathBuf {
        repo_root.join(CONFIG_DIR).join(CONFIG_FILE)
    }

    /// Write `DEFAULT_CONFIG` under `repo_root` and keep the directory out
    /// of version control; refuses to overwrite.
    pub fn init(repo_root: &Path) -> crate::Result<PathBuf> {
        let path = Self::path_for_repo(repo_root);
        if path.exists() {
            return Err(UnderstoryError::ConfigExists(path));
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, DEFAULT_CONFIG)?;
        update_gitignore(repo_root)?;
        Ok(path)
    }

    /// Absolute path of the local blob store.
    pub fn store_path(&self, repo_root: &Path) -> PathBuf {
        repo_root.join(&self.sync.store_dir)
    }

    /// Reject settings no run could succeed with.
    pub fn validate(&self) -> crate::Result<()> {
        let r = &self.retrieval;
        let ratios = [
            ("structural_ratio", r.structural_ratio),
            ("lexical_ratio", r.lexical_ratio),
            ("semantic_ratio", r.semantic_ratio),
            ("agentic_ratio", r.agentic_ratio),
        ];
        for (name, ratio) in ratios {
            if !ratio.is_finite() || ratio < 0.0 {
                return Err(UnderstoryError::Configuration(format!(
                    "retrieval.{name} must be a non-negative number, got {ratio}"
                )));
            }
        }
        let sum: f64 = ratios.iter().map(|(_, r)| r).sum();
        if sum > 1.0 + 1e-9 {
            return Err(UnderstoryError::Configuration(format!(
                "retrieval ratios sum to {sum:.3}, above 1.0"
            )));
        }
        if r.budget == 0 {
            return Err(UnderstoryError::Configuration(
                "retrieval.budget must be positive".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.memory.min_confidence) {
            return Err(UnderstoryError::Configuration(format!(
                "memory.min_confidence must lie in [0, 1], got {}",
                self.memory.min_confidence
            )));
        }
        if self.core.encoding != SUPPORTED_ENCODING {
            return Err(UnderstoryError::Configuration(format!(
                "core.encoding {:?} is not supported (only {SUPPORTED_ENCODING})",
                self.core.encoding
            )));
        }
        if self.sync.branch.trim().is_empty() {
            return Err(UnderstoryError::Configuration(
                "sync.branch must not be empty".to_string(),
            ));
        }
        if self.embedding.enabled && self.embedding.dimension == 0 {
            return Err(UnderstoryError::Configuration(
                "embedding.dimension must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Filter directives for the tracing subscriber, e.g.
    /// `info,understory_core::sync=debug`.
    pub fn log_directives(&self) -> String {
        let mut directives = vec![self.logging.default.clone()];
        for (module, level) in &self.logging.modules {
            directives.push(format!("{module}={level}"));
        }
        directives.join(",")
    }
}

fn update_gitignore(repo_root: &Path) -> crate::Result<()> {
    let gitignore = repo_root.join(".gitignore");
    let entry = format!("{CONFIG_DIR}/");
    if gitignore.exists() {
        let content = std::fs::read_to_string(&gitignore)?;
        if content
            .lines()
            .any(|line| line.trim() == CONFIG_DIR || line.trim() == entry)
        {
            return Ok(());
        }
        use std::io::Write;
        let mut file = std::fs::OpenOptions::new().append(true).open(&gitignore)?;
        writeln!(file, "\n# Understory index\n{entry}")?;
    } else {
        std::fs::write(&gitignore, format!("# Understory index\n{entry}\n"))?;
    }
    Ok(())
}

/// Token for the hosted repository API.
pub fn github_token() -> Option<String> {
    env_non_empty("UNDERSTORY_GITHUB_TOKEN").or_else(|| env_non_empty("GITHUB_TOKEN"))
}

/// Value of `name` when set and non-empty.
pub fn env_non_empty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config_parses() {
        let config = Config::from_toml(DEFAULT_CONFIG).unwrap();
        assert_eq!(config.sync.branch, "understory-index");
        assert_eq!(config.retrieval.budget, 8000);
        assert_eq!(config.memory.max_patterns, 30);
        assert_eq!(config.chunking.max_chunk_tokens, 512);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn builtin_defaults_match_default_config() {
        let parsed = Config::from_toml(DEFAULT_CONFIG).unwrap();
        assert_eq!(Config::default().indexing.ignore, parsed.indexing.ignore);
        let bare = Config::from_toml("").unwrap();
        assert_eq!(bare.indexing.ignore, parsed.indexing.ignore);
    }

    #[test]
    fn unreadable_config_is_a_configuration_error() {
        let dir = TempDir::new().unwrap();
        let err = Config::load(&dir.path().join("missing.toml")).unwrap_err();
        assert!(matches!(err, UnderstoryError::Configuration(_)));
        assert!(err.is_fatal());

        let err = Config::load(dir.path()).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn missing_sections_take_defaults() {
        let config = Config::from_toml("[retrieval]\nbudget = 100\n").unwrap();
        assert_eq!(config.retrieval.budget, 100);
        assert_eq!(config.retrieval.max_hops, 2);
        assert_eq!(config.sync.adjacent_hops, 1);
        assert_eq!(config.agentic.max_iterations, 3);
    }

    #[test]
    fn validate_rejects_bad_ratios_and_thresholds() {
        let mut config = Config::default();
        config.retrieval.lexical_ratio = 0.9;
        assert!(matches!(
            config.validate(),
            Err(UnderstoryError::Configuration(_))
        ));

        let mut config = Config::default();
        config.retrieval.semantic_ratio = -0.1;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.memory.min_confidence = 1.2;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.retrieval.budget = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.core.encoding = "o200k_base".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn invalid_toml_is_a_configuration_error() {
        let err = Config::from_toml("[retrieval\nbudget = ").unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn log_directives_include_module_overrides() {
        let config = Config::from_toml(
            "[logging]\ndefault = \"warn\"\n[logging.modules]\n\"understory_core::sync\" = \"debug\"\n",
        )
        .unwrap();
        assert_eq!(config.log_directives(), "warn,understory_core::sync=debug");
    }

    #[test]
    fn init_writes_once() {
        let dir = TempDir::new().unwrap();
        let path = Config::init(dir.path()).unwrap();
        assert!(path.ends_with(".understory/config.toml"));
        assert!(matches!(
            Config::init(dir.path()),
            Err(UnderstoryError::ConfigExists(_))
        ));
        let config = Config::load_for_repo(dir.path()).unwrap();
        assert_eq!(config.sync.store_dir, ".understory/store");
    }

    #[test]
    fn init_ignores_the_config_dir_once() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(".gitignore"), "target/\n").unwrap();
        Config::init(dir.path()).unwrap();
        std::fs::remove_file(Config::path_for_repo(dir.path())).unwrap();
        Config::init(dir.path()).unwrap();

        let ignore = std::fs::read_to_string(dir.path().join(".gitignore")).unwrap();
        assert!(ignore.starts_with("target/\n"));
        assert_eq!(ignore.matches(".understory/").count(), 1);
    }
}
