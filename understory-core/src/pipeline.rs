//! Event-driven review pipeline
//!
//! A push to the default branch brings the index branch up to date with the
//! new head. A pull request pulls only the shards its change can reach,
//! re-indexes the touched files at the PR head in memory and runs budgeted
//! retrieval over them. The local store is wiped at the start of every event
//! so it holds exactly what was pulled for this run.

use crate::agent::Agent;
use crate::chunker::{Chunker, CodeChunk};
use crate::config::Config;
use crate::content::{ContentSource, PathFilter, VcsContentSource};
use crate::diff::{changed_symbols, parse_unified_diff};
use crate::embedding::{build_embedding_index, is_compatible, EmbeddingProvider};
use crate::indexing::{IndexReport, IndexingService};
use crate::memory::{AgentPatternAnalyzer, PatternMemoryService};
use crate::model::{
    plan_update, Checkpoint, CodebaseMap, CodebaseMemory, CodebaseOutline, CommitSha,
    EmbeddingIndex, FilePath, ShardId, TokenCount, UpdatePlan,
};
use crate::parse::{Language, TreeSitterParser};
use crate::retrieval::{
    AgenticStrategy, ContextItem, LexicalStrategy, RetrievalContext, RetrievalOrchestrator,
    RetrievalQuery, SemanticStrategy, StructuralStrategy,
};
use crate::shard::{dirty_shards, ShardedManifest};
use crate::sync::BranchSync;
use crate::vcs::{ChangedFile, PullRequest, VcsClient};
use crate::Result;
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info, warn, Span};

/// Files chunked for retrieval per pull request
const MAX_CANDIDATE_FILES: usize = 400;

/// How much of the index branch a run managed to pull.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PullMode {
    /// Manifest plus the listed shards.
    Selective(BTreeSet<ShardId>),
    /// Every blob on the branch.
    Full,
    /// Nothing usable; the run starts from an empty store.
    Fresh,
}

#[derive(Debug)]
pub struct PushOutcome {
    pub plan: UpdatePlan,
    pub report: IndexReport,
    /// New index commit, `None` when nothing was pushed.
    pub commit: Option<CommitSha>,
}

#[derive(Debug)]
pub struct ReviewContext {
    pub pull_request: PullRequest,
    pub query: RetrievalQuery,
    pub items: Vec<ContextItem>,
    pub memory: Option<CodebaseMemory>,
    pub pull_mode: PullMode,
}

impl ReviewContext {
    pub fn total_tokens(&self) -> TokenCount {
        self.items.iter().map(|i| i.token_cost).sum()
    }
}

pub struct ReviewPipeline<V> {
    config: Config,
    sync: BranchSync<V>,
    repo_id: String,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    agent: Option<Arc<dyn Agent>>,
    span: Span,
}

impl<V: VcsClient> ReviewPipeline<V> {
    /// `repo_id` names the memory blob, usually `owner/name`.
    pub fn new(config: Config, sync: BranchSync<V>, repo_id: impl Into<String>, span: Span) -> Self {
        Self {
            config,
            sync,
            repo_id: repo_id.into(),
            embedder: None,
            agent: None,
            span,
        }
    }

    pub fn with_embedder(mut self, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn with_agent(mut self, agent: Arc<dyn Agent>) -> Self {
        self.agent = Some(agent);
        self
    }

    pub fn sync(&self) -> &BranchSync<V> {
        &self.sync
    }

    /// Bring the index branch up to date with `head` and push it.
    ///
    /// Incremental when a checkpoint exists and the change set is small,
    /// a full rebuild from the repository tree otherwise.
    pub fn on_push(&mut self, head: &CommitSha) -> Result<PushOutcome> {
        self.sync.store().clear()?;
        let checkpoint = self.pull_checkpoint();

        let changes = match checkpoint.as_ref() {
            Some(cp) if cp.commit != *head => {
                match self.sync.client().compare_commits(&cp.commit, head) {
                    Ok(files) => Some(flatten_changes(&files)),
                    Err(e) => {
                        warn!(parent: &self.span, error = %e, base = %cp.commit.short(), "Compare failed");
                        None
                    }
                }
            }
            _ => None,
        };
        let plan = plan_update(
            checkpoint.as_ref(),
            head,
            changes,
            self.config.indexing.full_rebuild_threshold,
        );

        let current = matches!(
            &plan,
            UpdatePlan::Incremental { changed, removed } if changed.is_empty() && removed.is_empty()
        );
        if current {
            info!(parent: &self.span, head = %head.short(), "Index already current");
            return Ok(PushOutcome {
                plan,
                report: IndexReport::default(),
                commit: None,
            });
        }

        let report = match &plan {
            UpdatePlan::Incremental { changed, removed } => {
                match self.update_incremental(head, changed, removed)? {
                    Some(report) => report,
                    None => self.rebuild_full(head)?,
                }
            }
            UpdatePlan::FullRebuild { reason } => {
                info!(parent: &self.span, reason = %reason, "Rebuilding index");
                self.rebuild_full(head)?
            }
        };

        let file_count = self
            .sync
            .store()
            .load_manifest()?
            .map_or(0, |m| m.shards.values().map(|d| d.file_count).sum());
        self.sync
            .store()
            .save_checkpoint(&Checkpoint::new(head.clone(), file_count))?;

        let commit = self
            .sync
            .push(&format!("Update index to {}", head.short()))?;
        Ok(PushOutcome {
            plan,
            report,
            commit,
        })
    }

    /// Assemble review context for pull request `number`.
    pub fn on_pull_request(&mut self, number: u64) -> Result<ReviewContext> {
        let client = self.sync.client();
        let pull_request = client.get_pull_request(number)?;
        let files = client.pull_request_files(number)?;
        let diff_text = match client.get_pull_request_diff(number) {
            Ok(text) => text,
            Err(e) => {
                warn!(parent: &self.span, pr = number, error = %e, "Diff unavailable; using per-file patches");
                files
                    .iter()
                    .filter_map(|f| f.patch.as_deref())
                    .collect::<Vec<_>>()
                    .join("\n")
            }
        };

        let filter = self.path_filter()?;
        let (changed, removed) = split_changes(&files, &filter);
        info!(
            parent: &self.span,
            pr = number,
            title = %pull_request.title,
            changed = changed.len(),
            removed = removed.len(),
            "Preparing review context"
        );

        self.sync.store().clear()?;
        let touched: Vec<FilePath> = changed.iter().chain(&removed).cloned().collect();
        let pull_mode = self.pull_for(&touched);
        let (manifest, mut map) = self.load_pulled_map(&pull_mode, &pull_request.base_sha);

        let content = VcsContentSource::new(self.sync.client(), pull_request.head_sha.as_str());
        let known = manifest
            .shards
            .values()
            .flat_map(|d| d.files.iter().cloned())
            .chain(map.files().into_iter().cloned())
            .chain(changed.iter().cloned());
        let parser = parser_for(known, &content);
        IndexingService::new(pull_request.head_sha.clone(), self.span.clone()).apply_changes(
            &mut map,
            &changed,
            &removed,
            &content,
            &parser,
        );

        let diffs = parse_unified_diff(&diff_text);
        let symbols = changed_symbols(&map, &diffs);
        let query = RetrievalQuery::new(changed.clone())
            .with_symbols(symbols)
            .with_diff(diff_text);

        let hops = self.config.retrieval.max_hops;
        let candidates = candidate_files(&map, &changed, hops);
        let chunks = self.chunk_files(&map, &candidates, &content);
        let shards: BTreeSet<ShardId> = candidates.iter().map(FilePath::shard_id).collect();
        let embeddings = self.load_embeddings(&shards);

        let context = RetrievalContext::new(&map, &chunks).with_embeddings(&embeddings);
        let budget = TokenCount::new(self.config.retrieval.budget);
        let items = self.build_orchestrator().retrieve(&query, &context, budget);

        let memory = match self.sync.store().load_memory(&self.repo_id) {
            Ok(memory) => memory,
            Err(e) => {
                warn!(parent: &self.span, error = %e, "Codebase memory unreadable; continuing without it");
                None
            }
        };

        let review = ReviewContext {
            pull_request,
            query,
            items,
            memory,
            pull_mode,
        };
        info!(
            parent: &self.span,
            pr = number,
            items = review.items.len(),
            tokens = review.total_tokens().get(),
            chunks = chunks.len(),
            "Review context ready"
        );
        Ok(review)
    }

    pub fn build_orchestrator(&self) -> RetrievalOrchestrator {
        build_orchestrator(&self.config, self.embedder.as_ref(), self.agent.as_ref(), &self.span)
    }

    /// Build or extend the pattern profile from `map` and store it locally.
    /// Without an agent, or when analysis fails, the stored profile (if any)
    /// is returned unchanged.
    pub fn refresh_memory(&self, map: &CodebaseMap) -> Option<CodebaseMemory> {
        let store = self.sync.store();
        let existing = match store.load_memory(&self.repo_id) {
            Ok(existing) => existing,
            Err(e) => {
                warn!(parent: &self.span, error = %e, "Stored memory unreadable; rebuilding");
                None
            }
        };
        let Some(agent) = &self.agent else {
            return existing;
        };

        let outline =
            CodebaseOutline::from_map(map, TokenCount::new(self.config.memory.outline_budget));
        let text = outline.render();
        let service =
            PatternMemoryService::new(AgentPatternAnalyzer::new(Arc::clone(agent)), self.span.clone())
                .with_limits(self.config.memory.min_confidence, self.config.memory.max_patterns);
        let result = match &existing {
            Some(memory) => service.update_profile(memory, outline, &text),
            None => service.build_profile(&self.repo_id, outline, &text),
        };
        match result {
            Ok(memory) => {
                if let Err(e) = store.save_memory(&memory) {
                    warn!(parent: &self.span, error = %e, "Could not store codebase memory");
                }
                Some(memory)
            }
            Err(e) => {
                warn!(parent: &self.span, error = %e, "Pattern analysis failed; keeping previous memory");
                existing
            }
        }
    }

    /// Manifest plus checkpoint. Any failure means "no checkpoint".
    fn pull_checkpoint(&mut self) -> Option<Checkpoint> {
        let pulled = self
            .sync
            .pull_manifest()
            .and_then(|found| {
                if found {
                    self.sync.pull_blobs([Checkpoint::BLOB_NAME])
                } else {
                    Ok(0)
                }
            })
            .and_then(|_| self.sync.store().load_checkpoint());
        match pulled {
            Ok(checkpoint) => checkpoint,
            Err(e) => {
                warn!(parent: &self.span, error = %e, "Could not read checkpoint");
                None
            }
        }
    }

    /// Re-index the changed files into the shards they touch. Returns `None`
    /// when a shard that must be rewritten could not be pulled, in which
    /// case the caller rebuilds from scratch.
    fn update_incremental(
        &mut self,
        head: &CommitSha,
        changed: &[FilePath],
        removed: &[FilePath],
    ) -> Result<Option<IndexReport>> {
        let filter = self.path_filter()?;
        let changed: Vec<FilePath> = changed
            .iter()
            .filter(|p| filter.matches(p.as_str()))
            .cloned()
            .collect();
        let dirty = dirty_shards(changed.iter().chain(removed));

        if let Err(e) = self.sync.pull_shards(&dirty) {
            warn!(parent: &self.span, error = %e, "Shard pull failed");
            return Ok(None);
        }
        let store = self.sync.store();
        let Some((manifest, mut map)) = store.load_map(Some(&dirty))? else {
            return Ok(None);
        };
        let local = store.local_shards(&manifest);
        let missing: Vec<&ShardId> = dirty
            .iter()
            .filter(|s| manifest.descriptor(s).is_some() && !local.contains(*s))
            .collect();
        if !missing.is_empty() {
            warn!(parent: &self.span, missing = missing.len(), "Dirty shards unavailable; falling back to full rebuild");
            return Ok(None);
        }

        let content = VcsContentSource::new(self.sync.client(), head.as_str());
        let known = manifest
            .shards
            .values()
            .flat_map(|d| d.files.iter().cloned())
            .chain(changed.iter().cloned());
        let parser = parser_for(known, &content);
        let report = IndexingService::new(head.clone(), self.span.clone())
            .apply_changes(&mut map, &changed, removed, &content, &parser);

        store.save_map(&map, Some(&dirty))?;
        self.refresh_embeddings(&map, &report.dirty_shards(), &content);
        info!(
            parent: &self.span,
            changed = report.changed.len(),
            removed = report.removed.len(),
            shards = dirty.len(),
            "Incremental update"
        );
        Ok(Some(report))
    }

    /// Index every eligible file of the tree at `head`.
    fn rebuild_full(&mut self, head: &CommitSha) -> Result<IndexReport> {
        let store = self.sync.store();
        store.clear()?;
        let client = self.sync.client();
        let tree_sha = client.get_commit_tree_sha(head)?;
        let entries = client.get_tree_entries_flat(&tree_sha)?;

        let filter = self.path_filter()?;
        let max_bytes = self.config.indexing.max_file_bytes;
        let paths: Vec<FilePath> = entries
            .iter()
            .filter(|e| e.is_blob() && e.size.map_or(true, |size| size <= max_bytes))
            .filter(|e| filter.matches(&e.path))
            .map(|e| FilePath::new(e.path.as_str()))
            .filter(|p| Language::from_path(p).is_some())
            .collect();

        let content = VcsContentSource::new(client, head.as_str());
        let parser = parser_for(paths.iter().cloned(), &content);
        let mut map = CodebaseMap::new(head.clone());
        let report =
            IndexingService::new(head.clone(), self.span.clone()).index(&mut map, &paths, &content, &parser);
        store.save_map(&map, None)?;

        let all: BTreeSet<ShardId> = map.files().into_iter().map(FilePath::shard_id).collect();
        self.refresh_embeddings(&map, &all, &content);
        info!(parent: &self.span, files = map.len(), shards = all.len(), "Full rebuild");

        if self.agent.is_some() {
            let memory_blob = CodebaseMemory::blob_name(&self.repo_id);
            if let Err(e) = self.sync.pull_blobs([memory_blob.as_str()]) {
                debug!(parent: &self.span, error = %e, "No previous memory pulled");
            }
            self.refresh_memory(&map);
        }
        Ok(report)
    }

    /// Recompute embeddings of `shards` from `map`. Failures are logged and
    /// leave the shard without an index.
    fn refresh_embeddings<C>(&self, map: &CodebaseMap, shards: &BTreeSet<ShardId>, content: &C)
    where
        C: ContentSource + ?Sized,
    {
        let Some(embedder) = &self.embedder else {
            return;
        };
        let paths: Vec<FilePath> = map
            .files()
            .into_iter()
            .filter(|p| shards.contains(&p.shard_id()))
            .cloned()
            .collect();
        let mut by_shard: BTreeMap<ShardId, Vec<CodeChunk>> = BTreeMap::new();
        for chunk in self.chunk_files(map, &paths, content) {
            by_shard.entry(chunk.source.shard_id()).or_default().push(chunk);
        }

        let batch_size = self.config.embedding.batch_size;
        for (shard, chunks) in by_shard {
            let stored = build_embedding_index(&shard, &chunks, embedder.as_ref(), batch_size)
                .and_then(|index| self.sync.store().save_embeddings(&index));
            match stored {
                Ok(()) => debug!(parent: &self.span, shard = %shard, chunks = chunks.len(), "Embedded shard"),
                Err(e) => warn!(parent: &self.span, shard = %shard, error = %e, "Embedding failed; shard left without vectors"),
            }
        }
    }

    /// Pull what a change to `paths` can reach, widening on failure.
    fn pull_for(&mut self, paths: &[FilePath]) -> PullMode {
        match self.pull_selective(paths) {
            Ok(Some(shards)) => return PullMode::Selective(shards),
            Ok(None) => debug!(parent: &self.span, "No manifest on branch; trying full pull"),
            Err(e) => warn!(parent: &self.span, error = %e, "Selective pull failed; trying full pull"),
        }
        match self.sync.pull_all() {
            Ok(0) => PullMode::Fresh,
            Ok(_) => PullMode::Full,
            Err(e) => {
                warn!(parent: &self.span, error = %e, "Full pull failed; starting fresh");
                if let Err(e) = self.sync.store().clear() {
                    warn!(parent: &self.span, error = %e, "Could not clear local store");
                }
                PullMode::Fresh
            }
        }
    }

    /// Assemble what `pull_for` brought down. After a full pull with no
    /// usable manifest the map is rebuilt from the shard blobs themselves.
    fn load_pulled_map(&self, mode: &PullMode, base: &CommitSha) -> (ShardedManifest, CodebaseMap) {
        let store = self.sync.store();
        let selected = match mode {
            PullMode::Selective(shards) => Some(shards),
            PullMode::Full | PullMode::Fresh => None,
        };
        match store.load_map(selected) {
            Ok(Some(loaded)) => return loaded,
            Ok(None) => debug!(parent: &self.span, "No stored manifest"),
            Err(e) => warn!(parent: &self.span, error = %e, "Stored manifest unreadable"),
        }
        if *mode == PullMode::Full {
            match store.load_map_from_shards(base.clone()) {
                Ok(Some(recovered)) => {
                    warn!(parent: &self.span, files = recovered.1.len(), "Rebuilt map from shard blobs");
                    return recovered;
                }
                Ok(None) => {}
                Err(e) => warn!(parent: &self.span, error = %e, "Shard blobs unreadable"),
            }
        }
        info!(parent: &self.span, "Indexing the change alone");
        (ShardedManifest::default(), CodebaseMap::new(base.clone()))
    }

    fn pull_selective(&mut self, paths: &[FilePath]) -> Result<Option<BTreeSet<ShardId>>> {
        if !self.sync.pull_manifest()? {
            return Ok(None);
        }
        let Some(manifest) = self.sync.store().load_manifest()? else {
            return Ok(None);
        };
        let shards = manifest.blast_radius(paths, self.config.sync.adjacent_hops);

        let mut names = manifest.blob_names(&shards);
        names.push(CodebaseMemory::blob_name(&self.repo_id));
        if let Some(embedder) = &self.embedder {
            names.extend(
                shards
                    .iter()
                    .map(|s| EmbeddingIndex::blob_name(s, embedder.model())),
            );
        }
        self.sync.pull_blobs(names.iter().map(String::as_str))?;
        info!(parent: &self.span, shards = shards.len(), of = manifest.shards.len(), "Selective pull");
        Ok(Some(shards))
    }

    fn load_embeddings(&self, shards: &BTreeSet<ShardId>) -> Vec<EmbeddingIndex> {
        let Some(embedder) = &self.embedder else {
            return Vec::new();
        };
        let mut indices = Vec::new();
        for shard in shards {
            match self.sync.store().load_embeddings(shard, embedder.model()) {
                Ok(Some(index)) if is_compatible(&index, embedder.as_ref()) => indices.push(index),
                Ok(Some(index)) => {
                    debug!(parent: &self.span, shard = %shard, dimension = index.dimension, "Stale embedding dimension")
                }
                Ok(None) => {}
                Err(e) => warn!(parent: &self.span, shard = %shard, error = %e, "Skipping unreadable embeddings"),
            }
        }
        indices
    }

    fn chunk_files<C>(&self, map: &CodebaseMap, paths: &[FilePath], content: &C) -> Vec<CodeChunk>
    where
        C: ContentSource + ?Sized,
    {
        let chunker = Chunker::new(TokenCount::new(self.config.chunking.max_chunk_tokens));
        chunk_files(map, paths, content, &chunker, &self.span)
    }

    fn path_filter(&self) -> Result<PathFilter> {
        PathFilter::new(&self.config.indexing.include_glob, &self.config.indexing.ignore)
    }
}

/// Structural and lexical strategies always; semantic and agentic when
/// their backends are configured. Each gets its configured share of the
/// budget; the share of an absent strategy stays unused.
pub fn build_orchestrator(
    config: &Config,
    embedder: Option<&Arc<dyn EmbeddingProvider>>,
    agent: Option<&Arc<dyn Agent>>,
    span: &Span,
) -> RetrievalOrchestrator {
    let r = &config.retrieval;
    let mut orchestrator = RetrievalOrchestrator::new(span.clone())
        .register(Box::new(StructuralStrategy::new(r.max_hops)), r.structural_ratio)
        .register(Box::new(LexicalStrategy::new(r.diff_excerpt_chars)), r.lexical_ratio);
    if let Some(embedder) = embedder {
        orchestrator = orchestrator.register(
            Box::new(SemanticStrategy::new(Arc::clone(embedder), r.diff_excerpt_chars)),
            r.semantic_ratio,
        );
    }
    if let Some(agent) = agent {
        let agentic = AgenticStrategy::new(
            Arc::clone(agent),
            Box::new(LexicalStrategy::new(r.diff_excerpt_chars)),
            config.agentic.max_iterations,
            r.diff_excerpt_chars,
            span.clone(),
        );
        orchestrator = orchestrator.register(Box::new(agentic), r.agentic_ratio);
    }
    orchestrator
}

/// Parser resolving imports against `known`. Go imports also need the
/// module path from the root `go.mod`.
pub fn parser_for<I, C>(known: I, content: &C) -> TreeSitterParser
where
    I: IntoIterator<Item = FilePath>,
    C: ContentSource + ?Sized,
{
    let known: Vec<FilePath> = known.into_iter().collect();
    let has_go = known.iter().any(|p| p.extension() == Some("go"));
    let mut parser = TreeSitterParser::new().with_known_files(known);
    if has_go {
        let module = content
            .fetch(&FilePath::new("go.mod"))
            .ok()
            .and_then(|text| TreeSitterParser::go_module_from(&text));
        if let Some(module) = module {
            parser = parser.with_go_module(module);
        }
    }
    parser
}

/// Chunk every path of `paths` that `map` knows, fetching in parallel.
/// Files that cannot be fetched are skipped.
pub fn chunk_files<C>(
    map: &CodebaseMap,
    paths: &[FilePath],
    content: &C,
    chunker: &Chunker,
    span: &Span,
) -> Vec<CodeChunk>
where
    C: ContentSource + ?Sized,
{
    paths
        .par_iter()
        .filter_map(|path| {
            let entry = map.get(path)?;
            match content.fetch(path) {
                Ok(text) => Some(chunker.chunk_file(entry, &text)),
                Err(e) => {
                    debug!(parent: span, path = %path, error = %e, "Not chunked");
                    None
                }
            }
        })
        .flatten()
        .collect()
}

/// `(path, removed)` pairs for update planning. A rename removes the old
/// path and changes the new one.
fn flatten_changes(files: &[ChangedFile]) -> Vec<(FilePath, bool)> {
    let mut changes = Vec::with_capacity(files.len());
    for file in files {
        if let Some(previous) = &file.previous_path {
            changes.push((previous.clone(), true));
        }
        changes.push((file.path.clone(), file.is_removed()));
    }
    changes
}

/// Changed (re-indexable) and removed paths of a pull request.
fn split_changes(files: &[ChangedFile], filter: &PathFilter) -> (Vec<FilePath>, Vec<FilePath>) {
    let mut changed = BTreeSet::new();
    let mut removed = BTreeSet::new();
    for (path, is_removed) in flatten_changes(files) {
        if is_removed {
            removed.insert(path);
        } else if filter.matches(path.as_str()) && Language::from_path(&path).is_some() {
            changed.insert(path);
        }
    }
    (changed.into_iter().collect(), removed.into_iter().collect())
}

/// Changed files first, then graph neighbours out to `hops`, then the rest
/// of the loaded map, capped at `MAX_CANDIDATE_FILES`.
pub fn candidate_files(map: &CodebaseMap, changed: &[FilePath], hops: usize) -> Vec<FilePath> {
    let mut ordered: Vec<FilePath> = Vec::new();
    let mut seen: BTreeSet<FilePath> = BTreeSet::new();
    let mut frontier: Vec<FilePath> = changed.iter().filter(|p| map.contains(p)).cloned().collect();
    for path in &frontier {
        if seen.insert(path.clone()) {
            ordered.push(path.clone());
        }
    }

    let graph = map.graph();
    for _ in 0..hops {
        let mut next = Vec::new();
        for path in &frontier {
            for neighbour in graph
                .dependents_of(path)
                .into_iter()
                .chain(graph.dependencies_of(path))
            {
                if seen.insert(neighbour.clone()) {
                    ordered.push(neighbour.clone());
                    next.push(neighbour.clone());
                }
            }
        }
        frontier = next;
    }

    let mut rest: Vec<&FilePath> = map.files().into_iter().filter(|p| !seen.contains(*p)).collect();
    rest.sort();
    ordered.extend(rest.into_iter().cloned());
    ordered.truncate(MAX_CANDIDATE_FILES);
    ordered
}
