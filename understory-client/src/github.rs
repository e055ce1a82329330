//! GitHub REST backend for the hosted repository

use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{ACCEPT, USER_AGENT};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn, Span};
use understory_core::vcs::{
    ChangedFile, FileChangeStatus, NewTreeEntry, PullRequest, TreeEntry, VcsClient,
};
use understory_core::{CommitSha, FilePath, Result, UnderstoryError};

pub const DEFAULT_API_BASE: &str = "https://api.github.com";

const JSON_MEDIA: &str = "application/vnd.github+json";
const RAW_MEDIA: &str = "application/vnd.github.raw";
const DIFF_MEDIA: &str = "application/vnd.github.diff";
const API_VERSION: &str = "2022-11-28";
const FILES_PER_PAGE: usize = 100;

#[derive(Deserialize)]
struct ApiError {
    message: String,
}

#[derive(Deserialize)]
struct ShaRef {
    sha: String,
}

#[derive(Deserialize)]
struct RefResponse {
    object: ShaRef,
}

#[derive(Deserialize)]
struct CommitResponse {
    tree: ShaRef,
}

#[derive(Deserialize)]
struct TreeResponse {
    tree: Vec<TreeEntry>,
    #[serde(default)]
    truncated: bool,
}

#[derive(Serialize)]
struct CreateBlob<'a> {
    content: &'a str,
    encoding: &'static str,
}

#[derive(Serialize)]
struct CreateTree<'a> {
    tree: &'a [NewTreeEntry],
}

#[derive(Serialize)]
struct CreateCommit<'a> {
    message: &'a str,
    tree: &'a str,
    parents: Vec<&'a str>,
}

#[derive(Serialize)]
struct CreateRef<'a> {
    #[serde(rename = "ref")]
    reference: String,
    sha: &'a str,
}

#[derive(Serialize)]
struct UpdateRef<'a> {
    sha: &'a str,
    force: bool,
}

#[derive(Deserialize)]
struct PullResponse {
    number: u64,
    #[serde(default)]
    title: String,
    head: ShaRef,
    base: ShaRef,
}

#[derive(Deserialize)]
struct FileResponse {
    filename: String,
    status: String,
    #[serde(default)]
    previous_filename: Option<String>,
    #[serde(default)]
    patch: Option<String>,
}

impl From<FileResponse> for ChangedFile {
    fn from(file: FileResponse) -> Self {
        let mut changed = ChangedFile::new(file.filename, FileChangeStatus::parse(&file.status));
        changed.previous_path = file.previous_filename.map(FilePath::from);
        changed.patch = file.patch;
        changed
    }
}

#[derive(Deserialize)]
struct CompareResponse {
    #[serde(default)]
    files: Vec<FileResponse>,
}

/// Git data, pull request and contents endpoints of one repository.
pub struct GitHubClient {
    http: Client,
    api_base: String,
    repo: String,
    token: String,
    span: Span,
}

impl GitHubClient {
    /// `repo` is `owner/name`.
    pub fn new(repo: &str, token: impl Into<String>, span: Span) -> Result<Self> {
        let token = token.into();
        if token.trim().is_empty() {
            return Err(UnderstoryError::Configuration(
                "GitHub token is empty".to_string(),
            ));
        }
        match repo.split_once('/') {
            Some((owner, name)) if !owner.is_empty() && !name.is_empty() && !name.contains('/') => {}
            _ => {
                return Err(UnderstoryError::Configuration(format!(
                    "repository must be owner/name, got '{repo}'"
                )))
            }
        }
        let http = Client::builder()
            .build()
            .map_err(|e| UnderstoryError::Configuration(format!("HTTP client: {e}")))?;
        Ok(Self {
            http,
            api_base: DEFAULT_API_BASE.to_string(),
            repo: repo.to_string(),
            token,
            span,
        })
    }

    /// Token from `UNDERSTORY_GITHUB_TOKEN` or `GITHUB_TOKEN`.
    pub fn from_env(repo: &str, span: Span) -> Result<Self> {
        let token = understory_core::config::github_token().ok_or_else(|| {
            UnderstoryError::Configuration(
                "set UNDERSTORY_GITHUB_TOKEN or GITHUB_TOKEN".to_string(),
            )
        })?;
        Self::new(repo, token, span)
    }

    /// Point at GitHub Enterprise or a test server.
    pub fn with_api_base(mut self, api_base: &str) -> Self {
        self.api_base = api_base.trim_end_matches('/').to_string();
        self
    }

    pub fn repo(&self) -> &str {
        &self.repo
    }

    fn url(&self, path: &str) -> String {
        format!("{}/repos/{}/{}", self.api_base, self.repo, path)
    }

    fn request(&self, method: Method, path: &str, accept: &str) -> RequestBuilder {
        self.http
            .request(method, self.url(path))
            .bearer_auth(&self.token)
            .header(ACCEPT, accept)
            .header(USER_AGENT, "understory")
            .header("X-GitHub-Api-Version", API_VERSION)
    }

    /// Send and require a 2xx status.
    fn send(&self, operation: &str, request: RequestBuilder) -> Result<Response> {
        match self.send_optional(operation, request)? {
            Some(response) => Ok(response),
            None => Err(UnderstoryError::publish(operation, "not found")),
        }
    }

    /// Like `send`, but 404 is `None`.
    fn send_optional(&self, operation: &str, request: RequestBuilder) -> Result<Option<Response>> {
        let response = request
            .send()
            .map_err(|e| UnderstoryError::publish(operation, e))?;
        let status = response.status();
        debug!(parent: &self.span, operation, status = status.as_u16(), "GitHub response");
        if status.is_success() {
            return Ok(Some(response));
        }
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let message = match response.json::<ApiError>() {
            Ok(body) => body.message,
            Err(_) => format!("HTTP {status}"),
        };
        Err(UnderstoryError::publish(
            operation,
            format!("{} ({})", message, status.as_u16()),
        ))
    }

    fn json<T: DeserializeOwned>(&self, operation: &str, response: Response) -> Result<T> {
        response
            .json::<T>()
            .map_err(|e| UnderstoryError::publish(operation, format!("unexpected response: {e}")))
    }

    fn get_json<T: DeserializeOwned>(&self, operation: &str, path: &str) -> Result<T> {
        let response = self.send(operation, self.request(Method::GET, path, JSON_MEDIA))?;
        self.json(operation, response)
    }

    fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        operation: &str,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let request = self.request(Method::POST, path, JSON_MEDIA).json(body);
        let response = self.send(operation, request)?;
        self.json(operation, response)
    }

    fn changed_files_page(&self, number: u64, page: usize) -> Result<Vec<ChangedFile>> {
        let path = format!("pulls/{number}/files?per_page={FILES_PER_PAGE}&page={page}");
        let files: Vec<FileResponse> = self.get_json("pull_request_files", &path)?;
        Ok(files.into_iter().map(ChangedFile::from).collect())
    }
}

impl VcsClient for GitHubClient {
    fn get_ref_sha(&self, branch: &str) -> Result<Option<CommitSha>> {
        let request = self.request(Method::GET, &format!("git/ref/heads/{branch}"), JSON_MEDIA);
        match self.send_optional("get_ref", request)? {
            Some(response) => {
                let body: RefResponse = self.json("get_ref", response)?;
                Ok(Some(CommitSha::new(body.object.sha)))
            }
            None => Ok(None),
        }
    }

    fn get_commit_tree_sha(&self, commit: &CommitSha) -> Result<String> {
        let body: CommitResponse = self.get_json("get_commit", &format!("git/commits/{commit}"))?;
        Ok(body.tree.sha)
    }

    fn get_tree_entries_flat(&self, tree_sha: &str) -> Result<Vec<TreeEntry>> {
        let body: TreeResponse =
            self.get_json("get_tree", &format!("git/trees/{tree_sha}?recursive=1"))?;
        if body.truncated {
            warn!(parent: &self.span, tree = %tree_sha, entries = body.tree.len(), "Tree listing truncated by GitHub");
        }
        Ok(body.tree)
    }

    fn get_blob_content(&self, blob_sha: &str) -> Result<Vec<u8>> {
        let request = self.request(Method::GET, &format!("git/blobs/{blob_sha}"), RAW_MEDIA);
        let response = self.send("get_blob", request)?;
        let bytes = response
            .bytes()
            .map_err(|e| UnderstoryError::publish("get_blob", e))?;
        Ok(bytes.to_vec())
    }

    fn create_blob(&self, content: &[u8]) -> Result<String> {
        let text = std::str::from_utf8(content)
            .map_err(|e| UnderstoryError::publish("create_blob", format!("blob is not UTF-8: {e}")))?;
        let body = CreateBlob {
            content: text,
            encoding: "utf-8",
        };
        let created: ShaRef = self.post_json("create_blob", "git/blobs", &body)?;
        Ok(created.sha)
    }

    fn create_tree(&self, entries: &[NewTreeEntry]) -> Result<String> {
        let created: ShaRef =
            self.post_json("create_tree", "git/trees", &CreateTree { tree: entries })?;
        Ok(created.sha)
    }

    fn create_commit(
        &self,
        message: &str,
        tree_sha: &str,
        parents: &[CommitSha],
    ) -> Result<CommitSha> {
        let body = CreateCommit {
            message,
            tree: tree_sha,
            parents: parents.iter().map(CommitSha::as_str).collect(),
        };
        let created: ShaRef = self.post_json("create_commit", "git/commits", &body)?;
        Ok(CommitSha::new(created.sha))
    }

    fn create_ref(&self, branch: &str, commit: &CommitSha) -> Result<()> {
        let body = CreateRef {
            reference: format!("refs/heads/{branch}"),
            sha: commit.as_str(),
        };
        let request = self.request(Method::POST, "git/refs", JSON_MEDIA).json(&body);
        self.send("create_ref", request)?;
        Ok(())
    }

    fn update_ref(&self, branch: &str, commit: &CommitSha) -> Result<()> {
        let body = UpdateRef {
            sha: commit.as_str(),
            force: false,
        };
        let request = self
            .request(Method::PATCH, &format!("git/refs/heads/{branch}"), JSON_MEDIA)
            .json(&body);
        self.send("update_ref", request)?;
        Ok(())
    }

    fn get_pull_request(&self, number: u64) -> Result<PullRequest> {
        let body: PullResponse = self.get_json("get_pull_request", &format!("pulls/{number}"))?;
        Ok(PullRequest {
            number: body.number,
            title: body.title,
            head_sha: CommitSha::new(body.head.sha),
            base_sha: CommitSha::new(body.base.sha),
        })
    }

    fn pull_request_files(&self, number: u64) -> Result<Vec<ChangedFile>> {
        let mut files = Vec::new();
        for page in 1.. {
            let batch = self.changed_files_page(number, page)?;
            let last = batch.len() < FILES_PER_PAGE;
            files.extend(batch);
            if last {
                break;
            }
        }
        Ok(files)
    }

    fn get_pull_request_diff(&self, number: u64) -> Result<String> {
        let request = self.request(Method::GET, &format!("pulls/{number}"), DIFF_MEDIA);
        let response = self.send("get_pull_request_diff", request)?;
        response
            .text()
            .map_err(|e| UnderstoryError::publish("get_pull_request_diff", e))
    }

    fn compare_commits(&self, base: &CommitSha, head: &CommitSha) -> Result<Vec<ChangedFile>> {
        let body: CompareResponse =
            self.get_json("compare_commits", &format!("compare/{base}...{head}"))?;
        Ok(body.files.into_iter().map(ChangedFile::from).collect())
    }

    fn get_file_content(&self, path: &FilePath, git_ref: &str) -> Result<Option<String>> {
        let request = self.request(Method::GET, &format!("contents/{path}?ref={git_ref}"), RAW_MEDIA);
        match self.send_optional("get_file_content", request)? {
            Some(response) => response
                .text()
                .map(Some)
                .map_err(|e| UnderstoryError::publish("get_file_content", e)),
            None => Ok(None),
        }
    }
}
