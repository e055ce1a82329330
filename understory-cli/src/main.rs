//! Understory CLI - codebase context for pull-request review

mod logging;

use clap::{Parser, Subcommand};
use colored::Colorize;
use serde_json::json;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{info_span, warn, Span};
use understory_client::{Backends, GitHubClient};
use understory_core::config::CONFIG_DIR;
use understory_core::diff::{changed_symbols, parse_unified_diff};
use understory_core::embedding::{build_embedding_index, is_compatible, EmbeddingProvider};
use understory_core::{
    build_orchestrator, candidate_files, chunk_files, parser_for, AgentPatternAnalyzer,
    BranchSync, Checkpoint, Chunker, CodebaseMap, CodebaseMemory, CodebaseOutline, CodeChunk,
    CommitSha, Config, ContextItem, FilePath, IndexingService, LocalContentSource, LocalStore,
    PatternMemoryService, PullMode, RetrievalContext, RetrievalQuery, ReviewPipeline, ShardId,
    ShardedManifest, TokenCount, UnderstoryError, UpdatePlan,
};

/// Scratch store used by `review` and `update`; those events wipe their
/// store first, so they never touch the one `index` writes.
const EVENT_STORE_DIR: &str = "event-store";

#[derive(Parser)]
#[command(name = "understory")]
#[command(about = "Token-budgeted codebase context for pull-request review", long_about = None)]
struct Cli {
    /// Override repo root detection
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create .understory/ and config.toml
    Init,

    /// Index the working tree into the local store
    Index {
        /// Re-parse from an empty map instead of updating the stored one
        #[arg(long)]
        full: bool,
    },

    /// Move blobs between the local store and the index branch
    Sync {
        #[command(subcommand)]
        action: SyncAction,
    },

    /// Rank context for a set of changed files
    Context {
        /// Changed files, relative to the repo root
        #[arg(long, num_args = 1.., required = true)]
        files: Vec<String>,

        /// Changed symbol names (added to those found in --diff)
        #[arg(long, num_args = 1..)]
        symbols: Vec<String>,

        /// Unified diff of the change
        #[arg(long)]
        diff: Option<PathBuf>,

        /// Token budget (default from config)
        #[arg(long)]
        budget: Option<usize>,
    },

    /// Build or update the learned codebase patterns
    Memory {
        #[command(subcommand)]
        action: MemoryAction,
    },

    /// Show the shards a change to these files can reach
    Shards {
        #[arg(long, num_args = 1.., required = true)]
        files: Vec<String>,

        /// Cross-shard hops (default from config)
        #[arg(long)]
        hops: Option<usize>,
    },

    /// Assemble review context for a pull request
    Review {
        /// Repository as owner/name
        #[arg(long, env = "UNDERSTORY_REPO")]
        repo: String,

        /// Pull request number
        #[arg(long)]
        pr: u64,
    },

    /// Bring the index branch up to date with a pushed commit
    Update {
        /// Repository as owner/name
        #[arg(long, env = "UNDERSTORY_REPO")]
        repo: String,

        /// Commit now at the head of the default branch
        #[arg(long)]
        head: String,
    },
}

#[derive(Subcommand)]
enum SyncAction {
    /// Download blobs from the index branch
    Pull {
        #[arg(long, env = "UNDERSTORY_REPO")]
        repo: String,

        /// Only the shards these files can reach (default: everything)
        #[arg(long, num_args = 1..)]
        files: Vec<String>,
    },

    /// Publish the local store as a new commit on the index branch
    Push {
        #[arg(long, env = "UNDERSTORY_REPO")]
        repo: String,

        /// Commit message
        #[arg(short, long)]
        message: Option<String>,
    },
}

#[derive(Subcommand)]
enum MemoryAction {
    /// Discover patterns from scratch
    Build {
        /// Repository id (default: repo directory name)
        #[arg(long, env = "UNDERSTORY_REPO")]
        repo: Option<String>,
    },

    /// Add newly discovered patterns to the stored memory
    Update {
        #[arg(long, env = "UNDERSTORY_REPO")]
        repo: Option<String>,
    },
}

fn main() {
    let cli = Cli::parse();
    let json = cli.json;

    let result = match cli.command {
        Commands::Init => cmd_init(cli.root),
        command => Workspace::open(cli.root).and_then(|ws| run(&ws, command, json)),
    };

    if let Err(e) = result {
        if json {
            let error_json = json!({
                "code": error_code(&e),
                "message": e.to_string(),
            });
            eprintln!(
                "{}",
                serde_json::to_string_pretty(&error_json).unwrap_or_else(|_| e.to_string())
            );
        } else {
            eprintln!("{} {}", "Error:".red(), e);
        }
        std::process::exit(1);
    }
}

fn run(ws: &Workspace, command: Commands, json: bool) -> understory_core::Result<()> {
    match command {
        Commands::Init => cmd_init(Some(ws.root.clone())),
        Commands::Index { full } => cmd_index(ws, full, json),
        Commands::Sync {
            action: SyncAction::Pull { repo, files },
        } => cmd_sync_pull(ws, &repo, &files, json),
        Commands::Sync {
            action: SyncAction::Push { repo, message },
        } => cmd_sync_push(ws, &repo, message.as_deref(), json),
        Commands::Context {
            files,
            symbols,
            diff,
            budget,
        } => cmd_context(ws, &files, symbols, diff.as_deref(), budget, json),
        Commands::Memory { action } => cmd_memory(ws, action, json),
        Commands::Shards { files, hops } => cmd_shards(ws, &files, hops, json),
        Commands::Review { repo, pr } => cmd_review(ws, &repo, pr, json),
        Commands::Update { repo, head } => cmd_update(ws, &repo, &head, json),
    }
}

fn error_code(e: &UnderstoryError) -> &'static str {
    match e {
        UnderstoryError::Configuration(_) => "configuration",
        UnderstoryError::NotInitialized(_) => "not_initialized",
        UnderstoryError::ConfigExists(_) => "config_exists",
        UnderstoryError::Publish { .. } => "publish",
        UnderstoryError::Validation(_) => "validation",
        _ => "error",
    }
}

/// Repo root, loaded config and the span every component logs under.
struct Workspace {
    root: PathBuf,
    config: Config,
    span: Span,
}

impl Workspace {
    fn open(root: Option<PathBuf>) -> understory_core::Result<Self> {
        let root = detect_repo_root(root)?;
        let config = Config::load_for_repo(&root)?;
        logging::init(&config);
        let span = info_span!("understory", root = %root.display());
        Ok(Self { root, config, span })
    }

    fn store(&self) -> understory_core::Result<LocalStore> {
        LocalStore::open(self.config.store_path(&self.root))
    }

    fn content(&self) -> understory_core::Result<LocalContentSource> {
        let indexing = &self.config.indexing;
        LocalContentSource::new(
            &self.root,
            &indexing.include_glob,
            &indexing.ignore,
            indexing.max_file_bytes,
        )
    }

    fn backends(&self) -> understory_core::Result<Backends> {
        Backends::from_config(&self.config, &self.span)
    }

    fn github(&self, repo: &str) -> understory_core::Result<GitHubClient> {
        GitHubClient::from_env(repo, self.span.clone())
    }

    fn branch_sync(&self, client: GitHubClient, store: LocalStore) -> BranchSync<GitHubClient> {
        BranchSync::new(client, store, &self.config.sync.branch, self.span.clone())
    }

    /// Stored map, or a validation error pointing at `understory index`.
    fn load_map(&self, store: &LocalStore) -> understory_core::Result<(ShardedManifest, CodebaseMap)> {
        store.load_map(None)?.ok_or_else(|| {
            UnderstoryError::Validation(
                "no local index; run 'understory index' or 'understory sync pull' first".to_string(),
            )
        })
    }
}

fn cmd_init(root: Option<PathBuf>) -> understory_core::Result<()> {
    let repo_root = detect_repo_root(root)?;
    Config::init(&repo_root)?;

    println!("{} {CONFIG_DIR}/config.toml", "Created".green());
    println!("{} {CONFIG_DIR}/ to .gitignore", "Added".green());
    Ok(())
}

fn cmd_index(ws: &Workspace, full: bool, json: bool) -> understory_core::Result<()> {
    // Backends are resolved before anything touches the store
    let embedder = ws.backends()?.embedder;
    let content = ws.content()?;
    let store = ws.store()?;
    let files = content.discover()?;
    let head = local_head(&ws.root);

    let mut map = if full {
        CodebaseMap::new(head.clone())
    } else {
        match store.load_map(None) {
            Ok(Some((_, map))) => map,
            Ok(None) => CodebaseMap::new(head.clone()),
            Err(e) => {
                warn!(parent: &ws.span, error = %e, "Stored map unreadable; indexing from scratch");
                CodebaseMap::new(head.clone())
            }
        }
    };

    let present: BTreeSet<&FilePath> = files.iter().collect();
    let removed: Vec<FilePath> = map
        .files()
        .into_iter()
        .filter(|p| !present.contains(p))
        .cloned()
        .collect();

    let parser = parser_for(files.iter().cloned(), &content);
    let report = IndexingService::new(head.clone(), ws.span.clone())
        .apply_changes(&mut map, &files, &removed, &content, &parser);
    let manifest = store.save_map(&map, None)?;
    store.save_checkpoint(&Checkpoint::new(head.clone(), map.len()))?;

    let shards = if full {
        manifest.shard_ids()
    } else {
        report.dirty_shards()
    };
    let embedded = match &embedder {
        Some(embedder) => refresh_embeddings(ws, embedder.as_ref(), &store, &map, &shards, &content),
        None => 0,
    };

    if json {
        let out = json!({
            "commit": head.as_str(),
            "files": map.len(),
            "changed": report.changed.len(),
            "unchanged": report.unchanged,
            "removed": report.removed.len(),
            "failed": report.failed.iter().map(|(p, e)| json!({"path": p.as_str(), "error": e})).collect::<Vec<_>>(),
            "shards": manifest.shards.len(),
            "embedded_shards": embedded,
        });
        println!("{}", to_pretty(&out));
    } else {
        println!(
            "{}: {} files in {} shards at {}",
            "Indexed".green(),
            map.len(),
            manifest.shards.len(),
            head.short()
        );
        println!(
            "  {} changed, {} unchanged, {} removed",
            report.changed.len(),
            report.unchanged,
            report.removed.len()
        );
        for (path, error) in &report.failed {
            println!("  {} {path}: {error}", "skipped".yellow());
        }
        if embedded > 0 {
            println!("  {} {embedded} shards", "embedded".blue());
        }
    }
    Ok(())
}

/// Re-embed `shards`. Returns the number of shards written; a failing
/// shard is logged and skipped.
fn refresh_embeddings(
    ws: &Workspace,
    embedder: &dyn EmbeddingProvider,
    store: &LocalStore,
    map: &CodebaseMap,
    shards: &BTreeSet<ShardId>,
    content: &LocalContentSource,
) -> usize {
    let paths: Vec<FilePath> = map
        .files()
        .into_iter()
        .filter(|p| shards.contains(&p.shard_id()))
        .cloned()
        .collect();
    let chunker = Chunker::new(TokenCount::new(ws.config.chunking.max_chunk_tokens));
    let chunks = chunk_files(map, &paths, content, &chunker, &ws.span);

    let mut written = 0;
    for shard in shards {
        let in_shard: Vec<CodeChunk> = chunks
            .iter()
            .filter(|c| &c.source.shard_id() == shard)
            .cloned()
            .collect();
        if in_shard.is_empty() {
            continue;
        }
        let batch_size = ws.config.embedding.batch_size;
        match build_embedding_index(shard, &in_shard, embedder, batch_size)
            .and_then(|index| store.save_embeddings(&index))
        {
            Ok(()) => written += 1,
            Err(e) => warn!(parent: &ws.span, shard = %shard, error = %e, "Embedding failed"),
        }
    }
    written
}

fn cmd_sync_pull(ws: &Workspace, repo: &str, files: &[String], json: bool) -> understory_core::Result<()> {
    let client = ws.github(repo)?;
    let mut sync = ws.branch_sync(client, ws.store()?);

    let (pulled, shards) = if files.is_empty() {
        (sync.pull_all()?, None)
    } else if !sync.pull_manifest()? {
        (0, Some(BTreeSet::new()))
    } else {
        let manifest = sync.store().load_manifest()?.unwrap_or_default();
        let paths = to_paths(files);
        let shards = manifest.blast_radius(&paths, ws.config.sync.adjacent_hops);
        let mut pulled = sync.pull_shards(&shards)?;
        let memory = CodebaseMemory::blob_name(repo);
        pulled += sync.pull_blobs([Checkpoint::BLOB_NAME, memory.as_str()])?;
        (pulled, Some(shards))
    };

    if json {
        let out = json!({
            "branch": sync.branch(),
            "blobs": pulled,
            "shards": shards.map(|s| s.iter().map(|id| id.as_str().to_string()).collect::<Vec<_>>()),
        });
        println!("{}", to_pretty(&out));
    } else if pulled == 0 {
        println!("{} nothing on {}", "Pulled".yellow(), sync.branch());
    } else {
        println!("{} {pulled} blobs from {}", "Pulled".green(), sync.branch());
        if let Some(shards) = shards {
            for shard in shards {
                println!("  {}", shard.as_str().cyan());
            }
        }
    }
    Ok(())
}

fn cmd_sync_push(ws: &Workspace, repo: &str, message: Option<&str>, json: bool) -> understory_core::Result<()> {
    let client = ws.github(repo)?;
    let store = ws.store()?;
    let indexed = store
        .load_manifest()?
        .map(|m| m.indexed_at)
        .unwrap_or_default();
    let message = match message {
        Some(m) => m.to_string(),
        None => format!("Update index to {}", indexed.short()),
    };

    let mut sync = ws.branch_sync(client, store);
    let commit = sync.push(&message)?;

    if json {
        let out = json!({
            "branch": sync.branch(),
            "commit": commit.as_ref().map(CommitSha::as_str),
        });
        println!("{}", to_pretty(&out));
    } else {
        match commit {
            Some(sha) => println!("{} {} at {}", "Pushed".green(), sync.branch(), sha.short()),
            None => println!("{} nothing to push", "Skipped".yellow()),
        }
    }
    Ok(())
}

fn cmd_context(
    ws: &Workspace,
    files: &[String],
    mut symbols: Vec<String>,
    diff: Option<&Path>,
    budget: Option<usize>,
    json: bool,
) -> understory_core::Result<()> {
    let backends = ws.backends()?;
    let store = ws.store()?;
    let (_, map) = ws.load_map(&store)?;
    let content = ws.content()?;
    let changed = to_paths(files);

    let mut query = RetrievalQuery::new(changed.clone());
    if let Some(diff) = diff {
        let text = std::fs::read_to_string(diff)?;
        for symbol in changed_symbols(&map, &parse_unified_diff(&text)) {
            if !symbols.contains(&symbol) {
                symbols.push(symbol);
            }
        }
        query = query.with_diff(text);
    }
    let query = query.with_symbols(symbols);

    let candidates = candidate_files(&map, &changed, ws.config.retrieval.max_hops);
    let chunker = Chunker::new(TokenCount::new(ws.config.chunking.max_chunk_tokens));
    let chunks = chunk_files(&map, &candidates, &content, &chunker, &ws.span);

    let mut embeddings = Vec::new();
    if let Some(embedder) = &backends.embedder {
        let shards: BTreeSet<ShardId> = candidates.iter().map(FilePath::shard_id).collect();
        for shard in &shards {
            match store.load_embeddings(shard, embedder.model()) {
                Ok(Some(index)) if is_compatible(&index, embedder.as_ref()) => embeddings.push(index),
                Ok(_) => {}
                Err(e) => warn!(parent: &ws.span, shard = %shard, error = %e, "Skipping unreadable embeddings"),
            }
        }
    }

    let orchestrator = build_orchestrator(
        &ws.config,
        backends.embedder.as_ref(),
        backends.agent.as_ref(),
        &ws.span,
    );
    let context = RetrievalContext::new(&map, &chunks).with_embeddings(&embeddings);
    let budget = TokenCount::new(budget.unwrap_or(ws.config.retrieval.budget));
    let items = orchestrator.retrieve(&query, &context, budget);

    if json {
        let out = json!({
            "budget": budget.get(),
            "tokens": total_tokens(&items),
            "symbols": query.changed_symbols,
            "items": items,
        });
        println!("{}", to_pretty(&out));
    } else {
        print_items(&items, budget);
    }
    Ok(())
}

fn cmd_memory(ws: &Workspace, action: MemoryAction, json: bool) -> understory_core::Result<()> {
    let agent = ws.backends()?.agent.ok_or_else(|| {
        UnderstoryError::Configuration(
            "memory needs the agent backend; set [agent] enabled = true".to_string(),
        )
    })?;
    let store = ws.store()?;
    let (_, map) = ws.load_map(&store)?;

    let outline = CodebaseOutline::from_map(&map, TokenCount::new(ws.config.memory.outline_budget));
    let text = outline.render();
    let service = PatternMemoryService::new(AgentPatternAnalyzer::new(agent), ws.span.clone())
        .with_limits(ws.config.memory.min_confidence, ws.config.memory.max_patterns);

    let memory = match action {
        MemoryAction::Build { repo } => {
            let repo_id = repo.unwrap_or_else(|| default_repo_id(&ws.root));
            service.build_profile(&repo_id, outline, &text)?
        }
        MemoryAction::Update { repo } => {
            let repo_id = repo.unwrap_or_else(|| default_repo_id(&ws.root));
            let existing = store.load_memory(&repo_id)?.ok_or_else(|| {
                UnderstoryError::Validation(format!(
                    "no stored memory for {repo_id}; run 'understory memory build' first"
                ))
            })?;
            service.update_profile(&existing, outline, &text)?
        }
    };
    store.save_memory(&memory)?;

    if json {
        println!("{}", to_pretty(&memory));
    } else {
        println!(
            "{} memory for {} (version {}, {} patterns)",
            "Saved".green(),
            memory.repo_id,
            memory.version,
            memory.patterns.len()
        );
        for pattern in &memory.patterns {
            println!(
                "  {:.2} {} {}",
                pattern.confidence(),
                format!("[{}]", pattern.category().as_str()).cyan(),
                pattern.description()
            );
        }
    }
    Ok(())
}

fn cmd_shards(ws: &Workspace, files: &[String], hops: Option<usize>, json: bool) -> understory_core::Result<()> {
    let store = ws.store()?;
    let manifest = store.load_manifest()?.ok_or_else(|| {
        UnderstoryError::Validation("no local manifest; run 'understory index' first".to_string())
    })?;
    let paths = to_paths(files);
    let hops = hops.unwrap_or(ws.config.sync.adjacent_hops);
    let seeds = manifest.shards_for_files(&paths);
    let radius = manifest.blast_radius(&paths, hops);

    if json {
        let shards: Vec<_> = radius
            .iter()
            .filter_map(|id| manifest.descriptor(id))
            .map(|d| {
                json!({
                    "shard": d.shard_id.as_str(),
                    "blob": d.blob_name,
                    "files": d.file_count,
                    "seed": seeds.contains(&d.shard_id),
                })
            })
            .collect();
        println!("{}", to_pretty(&json!({"hops": hops, "shards": shards})));
    } else {
        println!(
            "{} of {} shards within {hops} hops",
            radius.len(),
            manifest.shards.len()
        );
        for id in &radius {
            let files = manifest.descriptor(id).map_or(0, |d| d.file_count);
            let label = if seeds.contains(id) {
                "changed".green()
            } else {
                "adjacent".blue()
            };
            println!("  {:<8} {} ({files} files)", label, id.as_str());
        }
    }
    Ok(())
}

fn cmd_review(ws: &Workspace, repo: &str, pr: u64, json: bool) -> understory_core::Result<()> {
    let mut pipeline = event_pipeline(ws, repo)?;
    let review = pipeline.on_pull_request(pr)?;
    let budget = TokenCount::new(ws.config.retrieval.budget);

    if json {
        let out = json!({
            "pr": review.pull_request.number,
            "title": review.pull_request.title,
            "pull": pull_mode_name(&review.pull_mode),
            "budget": budget.get(),
            "tokens": review.total_tokens().get(),
            "symbols": review.query.changed_symbols,
            "items": review.items,
            "memory": review.memory,
        });
        println!("{}", to_pretty(&out));
    } else {
        println!(
            "{} #{} {} ({} pull)",
            "Review".green(),
            review.pull_request.number,
            review.pull_request.title,
            pull_mode_name(&review.pull_mode)
        );
        if let Some(memory) = &review.memory {
            println!("  {} {} patterns", "memory".blue(), memory.patterns.len());
        }
        print_items(&review.items, budget);
    }
    Ok(())
}

fn cmd_update(ws: &Workspace, repo: &str, head: &str, json: bool) -> understory_core::Result<()> {
    let mut pipeline = event_pipeline(ws, repo)?;
    let outcome = pipeline.on_push(&CommitSha::new(head))?;

    let plan = match &outcome.plan {
        UpdatePlan::FullRebuild { reason } => format!("full rebuild ({reason})"),
        UpdatePlan::Incremental { changed, removed } => {
            format!("incremental ({} changed, {} removed)", changed.len(), removed.len())
        }
    };
    if json {
        let out = json!({
            "full": outcome.plan.is_full(),
            "plan": plan,
            "changed": outcome.report.changed.len(),
            "removed": outcome.report.removed.len(),
            "failed": outcome.report.failed.len(),
            "commit": outcome.commit.as_ref().map(CommitSha::as_str),
        });
        println!("{}", to_pretty(&out));
    } else {
        println!("{} {plan}", "Plan".blue());
        match &outcome.commit {
            Some(sha) => println!("{} index at {}", "Pushed".green(), sha.short()),
            None => println!("{} index already current", "Skipped".yellow()),
        }
    }
    Ok(())
}

fn event_pipeline(ws: &Workspace, repo: &str) -> understory_core::Result<ReviewPipeline<GitHubClient>> {
    let backends = ws.backends()?;
    let client = ws.github(repo)?;
    let store = LocalStore::open(ws.root.join(CONFIG_DIR).join(EVENT_STORE_DIR))?;
    let sync = ws.branch_sync(client, store);
    let mut pipeline = ReviewPipeline::new(ws.config.clone(), sync, repo, ws.span.clone());
    if let Some(embedder) = backends.embedder {
        pipeline = pipeline.with_embedder(embedder);
    }
    if let Some(agent) = backends.agent {
        pipeline = pipeline.with_agent(agent);
    }
    Ok(pipeline)
}

fn print_items(items: &[ContextItem], budget: TokenCount) {
    println!(
        "{} items, {} / {} tokens",
        items.len(),
        total_tokens(items),
        budget.get()
    );
    for item in items {
        let symbol = item.symbol.as_deref().unwrap_or("-");
        println!(
            "\n{} {}:{} {} {}",
            format!("{:.3}", item.relevance_score).yellow(),
            item.source.as_str().cyan(),
            symbol,
            format!("[{}]", item.strategy).blue(),
            format!("{} tokens", item.token_cost.get()).dimmed()
        );
        for line in item.content.lines() {
            println!("    {line}");
        }
    }
}

fn total_tokens(items: &[ContextItem]) -> usize {
    items.iter().map(|i| i.token_cost).sum::<TokenCount>().get()
}

fn pull_mode_name(mode: &PullMode) -> &'static str {
    match mode {
        PullMode::Selective(_) => "selective",
        PullMode::Full => "full",
        PullMode::Fresh => "fresh",
    }
}

fn to_paths(files: &[String]) -> Vec<FilePath> {
    files.iter().map(|f| FilePath::new(f.as_str())).collect()
}

fn to_pretty<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|e| format!("{{\"error\": \"{e}\"}}"))
}

fn default_repo_id(root: &Path) -> String {
    root.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "local".to_string())
}

/// Commit checked out at `root`, read straight from `.git`. Falls back to
/// `working-tree` outside a git checkout.
fn local_head(root: &Path) -> CommitSha {
    let git = root.join(".git");
    let Ok(head) = std::fs::read_to_string(git.join("HEAD")) else {
        return CommitSha::new("working-tree");
    };
    let head = head.trim();
    let Some(reference) = head.strip_prefix("ref: ") else {
        return CommitSha::new(head);
    };
    if let Ok(sha) = std::fs::read_to_string(git.join(reference)) {
        return CommitSha::new(sha.trim());
    }
    // Refs gc'd into packed-refs: "<sha> <ref>"
    std::fs::read_to_string(git.join("packed-refs"))
        .ok()
        .and_then(|packed| {
            packed.lines().find_map(|line| {
                let (sha, name) = line.split_once(' ')?;
                (name == reference).then(|| CommitSha::new(sha))
            })
        })
        .unwrap_or_else(|| CommitSha::new("working-tree"))
}

fn detect_repo_root(override_path: Option<PathBuf>) -> understory_core::Result<PathBuf> {
    if let Some(path) = override_path {
        return Ok(path);
    }

    // Walk up from current directory looking for .understory or .git
    let mut current = std::env::current_dir()?;
    loop {
        if current.join(CONFIG_DIR).exists() || current.join(".git").exists() {
            return Ok(current);
        }
        if !current.pop() {
            return Ok(std::env::current_dir()?);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn head_follows_a_branch_ref() {
        let dir = TempDir::new().unwrap();
        let git = dir.path().join(".git");
        std::fs::create_dir_all(git.join("refs/heads")).unwrap();
        std::fs::write(git.join("HEAD"), "ref: refs/heads/main\n").unwrap();
        std::fs::write(git.join("refs/heads/main"), "abc123\n").unwrap();

        assert_eq!(local_head(dir.path()), CommitSha::new("abc123"));
    }

    #[test]
    fn head_reads_packed_refs_and_detached_heads() {
        let dir = TempDir::new().unwrap();
        let git = dir.path().join(".git");
        std::fs::create_dir_all(&git).unwrap();
        std::fs::write(git.join("HEAD"), "ref: refs/heads/dev\n").unwrap();
        std::fs::write(
            git.join("packed-refs"),
            "# pack-refs with: peeled\nfff000 refs/heads/main\neee111 refs/heads/dev\n",
        )
        .unwrap();
        assert_eq!(local_head(dir.path()), CommitSha::new("eee111"));

        std::fs::write(git.join("HEAD"), "0123abcd\n").unwrap();
        assert_eq!(local_head(dir.path()), CommitSha::new("0123abcd"));
    }

    #[test]
    fn head_outside_git_is_the_working_tree() {
        let dir = TempDir::new().unwrap();
        assert_eq!(local_head(dir.path()), CommitSha::new("working-tree"));
    }

    #[test]
    fn missing_embedding_key_fails_before_the_store_is_touched() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("app.py"), "def main():\n    return 1\n").unwrap();
        let mut config = Config::default();
        config.embedding.enabled = true;
        config.embedding.api_key_env = "UNDERSTORY_TEST_EMBEDDING_KEY_NEVER_SET".into();
        let ws = Workspace {
            root: dir.path().to_path_buf(),
            config,
            span: Span::none(),
        };

        let err = cmd_index(&ws, true, true).unwrap_err();
        assert!(matches!(err, UnderstoryError::Configuration(_)));
        assert!(!ws.config.store_path(&ws.root).exists());
    }

    #[test]
    fn index_writes_manifest_and_checkpoint() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/app.py"), "def main():\n    return 1\n").unwrap();
        let ws = Workspace {
            root: dir.path().to_path_buf(),
            config: Config::default(),
            span: Span::none(),
        };

        cmd_index(&ws, false, true).unwrap();
        let store = ws.store().unwrap();
        let (manifest, map) = store.load_map(None).unwrap().unwrap();
        assert!(manifest.descriptor(&ShardId::new("src")).is_some());
        assert!(map.contains(&FilePath::new("src/app.py")));
        assert_eq!(store.load_checkpoint().unwrap().unwrap().file_count, 1);
    }

    #[test]
    fn explicit_root_wins() {
        let root = detect_repo_root(Some(PathBuf::from("/tmp/somewhere"))).unwrap();
        assert_eq!(root, PathBuf::from("/tmp/somewhere"));
    }

    #[test]
    fn cli_parses_nested_commands() {
        let cli = Cli::try_parse_from([
            "understory",
            "--json",
            "sync",
            "pull",
            "--repo",
            "acme/shop",
            "--files",
            "src/a.py",
            "src/b.py",
        ])
        .unwrap();
        assert!(cli.json);
        match cli.command {
            Commands::Sync {
                action: SyncAction::Pull { repo, files },
            } => {
                assert_eq!(repo, "acme/shop");
                assert_eq!(files, vec!["src/a.py", "src/b.py"]);
            }
            _ => panic!("expected sync pull"),
        }

        assert!(Cli::try_parse_from(["understory", "context"]).is_err());
    }
}
