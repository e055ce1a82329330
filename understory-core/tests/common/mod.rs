//! In-memory collaborators shared by the integration tests.

#![allow(dead_code)]

use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;
use understory_core::vcs::{ChangedFile, NewTreeEntry, PullRequest, TreeEntry};
use understory_core::{
    Agent, AgentRequest, CommitSha, EmbeddingProvider, FilePath, Result, UnderstoryError,
    VcsClient,
};

fn missing(what: &str, key: &str) -> UnderstoryError {
    UnderstoryError::publish("fake", format!("{what} {key} not found"))
}

#[derive(Default)]
struct State {
    refs: HashMap<String, CommitSha>,
    commit_trees: HashMap<String, String>,
    trees: HashMap<String, Vec<TreeEntry>>,
    blobs: HashMap<String, Vec<u8>>,
    /// (ref, path) -> text of the hosted repository
    files: HashMap<(String, String), String>,
    pull_requests: HashMap<u64, (PullRequest, Vec<ChangedFile>, String)>,
    comparisons: HashMap<(String, String), Vec<ChangedFile>>,
    fetched: Vec<String>,
    tree_listings: usize,
    next_id: usize,
    /// When set, every blob download fails.
    blobs_unavailable: bool,
}

impl State {
    fn next(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}{:04}", self.next_id)
    }

    fn put_blob(&mut self, bytes: &[u8]) -> String {
        let sha = self.next("blob");
        self.blobs.insert(sha.clone(), bytes.to_vec());
        sha
    }
}

/// Git data API plus pull-request lookups, held in memory.
#[derive(Default)]
pub struct FakeVcs {
    state: Mutex<State>,
}

impl FakeVcs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a commit of the hosted repository with the given files.
    pub fn add_commit(&self, sha: &str, files: &[(&str, &str)]) {
        let mut state = self.state.lock().unwrap();
        let mut entries = Vec::new();
        for (path, text) in files {
            let blob = state.put_blob(text.as_bytes());
            entries.push(TreeEntry {
                path: path.to_string(),
                mode: "100644".into(),
                kind: "blob".into(),
                sha: blob,
                size: Some(text.len() as u64),
            });
            state
                .files
                .insert((sha.to_string(), path.to_string()), text.to_string());
        }
        let tree = state.next("tree");
        state.trees.insert(tree.clone(), entries);
        state.commit_trees.insert(sha.to_string(), tree);
    }

    pub fn add_comparison(&self, base: &str, head: &str, files: Vec<ChangedFile>) {
        self.state
            .lock()
            .unwrap()
            .comparisons
            .insert((base.to_string(), head.to_string()), files);
    }

    pub fn add_pull_request(&self, pr: PullRequest, files: Vec<ChangedFile>, diff: &str) {
        self.state
            .lock()
            .unwrap()
            .pull_requests
            .insert(pr.number, (pr, files, diff.to_string()));
    }

    /// Names of the top-level blobs on `branch`.
    pub fn branch_blobs(&self, branch: &str) -> BTreeSet<String> {
        let state = self.state.lock().unwrap();
        Self::branch_entries(&state, branch)
            .iter()
            .map(|e| e.path.clone())
            .collect()
    }

    pub fn branch_blob(&self, branch: &str, name: &str) -> Option<Vec<u8>> {
        let state = self.state.lock().unwrap();
        let entry = Self::branch_entries(&state, branch)
            .into_iter()
            .find(|e| e.path == name)?;
        state.blobs.get(&entry.sha).cloned()
    }

    /// Names (per the current tree of `branch`) of every blob downloaded
    /// since the last `reset_log`.
    pub fn fetched_names(&self, branch: &str) -> BTreeSet<String> {
        let state = self.state.lock().unwrap();
        let entries = Self::branch_entries(&state, branch);
        state
            .fetched
            .iter()
            .filter_map(|sha| entries.iter().find(|e| &e.sha == sha))
            .map(|e| e.path.clone())
            .collect()
    }

    /// Replace the bytes behind `name` on `branch` without a new commit.
    pub fn overwrite_branch_blob(&self, branch: &str, name: &str, bytes: &[u8]) {
        let mut state = self.state.lock().unwrap();
        let entry = Self::branch_entries(&state, branch)
            .into_iter()
            .find(|e| e.path == name)
            .unwrap_or_else(|| panic!("{name} is not on {branch}"));
        state.blobs.insert(entry.sha, bytes.to_vec());
    }

    pub fn set_blobs_unavailable(&self, unavailable: bool) {
        self.state.lock().unwrap().blobs_unavailable = unavailable;
    }

    pub fn tree_listings(&self) -> usize {
        self.state.lock().unwrap().tree_listings
    }

    pub fn reset_log(&self) {
        let mut state = self.state.lock().unwrap();
        state.fetched.clear();
        state.tree_listings = 0;
    }

    fn branch_entries(state: &State, branch: &str) -> Vec<TreeEntry> {
        state
            .refs
            .get(branch)
            .and_then(|head| state.commit_trees.get(head.as_str()))
            .and_then(|tree| state.trees.get(tree))
            .cloned()
            .unwrap_or_default()
    }
}

impl VcsClient for FakeVcs {
    fn get_ref_sha(&self, branch: &str) -> Result<Option<CommitSha>> {
        Ok(self.state.lock().unwrap().refs.get(branch).cloned())
    }

    fn get_commit_tree_sha(&self, commit: &CommitSha) -> Result<String> {
        let state = self.state.lock().unwrap();
        state
            .commit_trees
            .get(commit.as_str())
            .cloned()
            .ok_or_else(|| missing("commit", commit.as_str()))
    }

    fn get_tree_entries_flat(&self, tree_sha: &str) -> Result<Vec<TreeEntry>> {
        let mut state = self.state.lock().unwrap();
        state.tree_listings += 1;
        state
            .trees
            .get(tree_sha)
            .cloned()
            .ok_or_else(|| missing("tree", tree_sha))
    }

    fn get_blob_content(&self, blob_sha: &str) -> Result<Vec<u8>> {
        let mut state = self.state.lock().unwrap();
        if state.blobs_unavailable {
            return Err(UnderstoryError::publish("get_blob", "service unavailable"));
        }
        state.fetched.push(blob_sha.to_string());
        state
            .blobs
            .get(blob_sha)
            .cloned()
            .ok_or_else(|| missing("blob", blob_sha))
    }

    fn create_blob(&self, content: &[u8]) -> Result<String> {
        Ok(self.state.lock().unwrap().put_blob(content))
    }

    fn create_tree(&self, entries: &[NewTreeEntry]) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        let mut listed = Vec::with_capacity(entries.len());
        for entry in entries {
            let size = state
                .blobs
                .get(&entry.sha)
                .map(|b| b.len() as u64)
                .ok_or_else(|| missing("blob", &entry.sha))?;
            listed.push(TreeEntry {
                path: entry.path.clone(),
                mode: entry.mode.clone(),
                kind: entry.kind.clone(),
                sha: entry.sha.clone(),
                size: Some(size),
            });
        }
        let tree = state.next("tree");
        state.trees.insert(tree.clone(), listed);
        Ok(tree)
    }

    fn create_commit(
        &self,
        _message: &str,
        tree_sha: &str,
        _parents: &[CommitSha],
    ) -> Result<CommitSha> {
        let mut state = self.state.lock().unwrap();
        let commit = state.next("commit");
        state.commit_trees.insert(commit.clone(), tree_sha.to_string());
        Ok(CommitSha::new(commit))
    }

    fn create_ref(&self, branch: &str, commit: &CommitSha) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.refs.contains_key(branch) {
            return Err(UnderstoryError::publish("create_ref", "reference already exists"));
        }
        state.refs.insert(branch.to_string(), commit.clone());
        Ok(())
    }

    fn update_ref(&self, branch: &str, commit: &CommitSha) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if !state.refs.contains_key(branch) {
            return Err(missing("ref", branch));
        }
        state.refs.insert(branch.to_string(), commit.clone());
        Ok(())
    }

    fn get_pull_request(&self, number: u64) -> Result<PullRequest> {
        let state = self.state.lock().unwrap();
        state
            .pull_requests
            .get(&number)
            .map(|(pr, _, _)| pr.clone())
            .ok_or_else(|| missing("pull request", &number.to_string()))
    }

    fn pull_request_files(&self, number: u64) -> Result<Vec<ChangedFile>> {
        let state = self.state.lock().unwrap();
        state
            .pull_requests
            .get(&number)
            .map(|(_, files, _)| files.clone())
            .ok_or_else(|| missing("pull request", &number.to_string()))
    }

    fn get_pull_request_diff(&self, number: u64) -> Result<String> {
        let state = self.state.lock().unwrap();
        state
            .pull_requests
            .get(&number)
            .map(|(_, _, diff)| diff.clone())
            .ok_or_else(|| missing("pull request", &number.to_string()))
    }

    fn compare_commits(&self, base: &CommitSha, head: &CommitSha) -> Result<Vec<ChangedFile>> {
        let state = self.state.lock().unwrap();
        state
            .comparisons
            .get(&(base.to_string(), head.to_string()))
            .cloned()
            .ok_or_else(|| missing("comparison", &format!("{base}...{head}")))
    }

    fn get_file_content(&self, path: &FilePath, git_ref: &str) -> Result<Option<String>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .files
            .get(&(git_ref.to_string(), path.to_string()))
            .cloned())
    }
}

/// Bag-of-words vectors: each term lands in a bucket picked from its bytes.
pub struct HashingEmbedder {
    pub model: String,
    pub dimension: usize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            model: "hashing".to_string(),
            dimension,
        }
    }
}

impl EmbeddingProvider for HashingEmbedder {
    fn model(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|text| {
                let mut vector = vec![0.0_f32; self.dimension];
                for word in text
                    .split(|c: char| !c.is_alphanumeric())
                    .filter(|w| w.len() > 2)
                {
                    let bucket = word
                        .to_lowercase()
                        .bytes()
                        .fold(7usize, |acc, b| acc.wrapping_mul(31).wrapping_add(b as usize));
                    vector[bucket % self.dimension] += 1.0;
                }
                vector
            })
            .collect())
    }
}

/// Replays canned replies in order; errors once they run out.
pub struct ScriptedAgent {
    replies: Mutex<Vec<Result<Value>>>,
    pub schemas_seen: Mutex<Vec<String>>,
}

impl ScriptedAgent {
    pub fn new(mut replies: Vec<Result<Value>>) -> Self {
        replies.reverse();
        Self {
            replies: Mutex::new(replies),
            schemas_seen: Mutex::new(Vec::new()),
        }
    }
}

impl Agent for ScriptedAgent {
    fn complete(&self, request: &AgentRequest) -> Result<Value> {
        self.schemas_seen
            .lock()
            .unwrap()
            .push(request.schema_name.clone());
        self.replies
            .lock()
            .unwrap()
            .pop()
            .unwrap_or_else(|| Err(UnderstoryError::Agent("script exhausted".into())))
    }
}
