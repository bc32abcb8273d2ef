/// GitHub client — the single point of entry for all GitHub API calls.
///
/// ARCHITECTURAL RULE: No other module may call the GitHub API directly.
/// The commit pipeline and the resume routes see only the `VersionControl`
/// trait, so tests can substitute a scripted fake.
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use reqwest::{Client, Method, RequestBuilder};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

const GITHUB_API_URL: &str = "https://api.github.com";
const GITHUB_ACCEPT: &str = "application/vnd.github+json";
/// GitHub rejects requests without a User-Agent.
const USER_AGENT: &str = concat!("resume-api/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
pub enum VcsError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("GitHub API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Commit rejected, file changed upstream: {0}")]
    Conflict(String),

    #[error("Malformed GitHub response: {0}")]
    Decode(String),
}

/// A tracked file's content plus the content SHA used for
/// optimistic-concurrency writes.
#[derive(Debug, Clone)]
pub struct FileRevision {
    pub content: String,
    pub sha: String,
}

/// One execution of the build workflow, as reported by the runs feed.
#[derive(Debug, Clone)]
pub struct BuildRun {
    pub id: u64,
    pub head_sha: String,
    pub status: String,
    pub conclusion: Option<String>,
}

impl BuildRun {
    pub fn is_completed(&self) -> bool {
        self.status == "completed"
    }
}

/// Read/write/list-runs operations against the resume repository.
#[async_trait]
pub trait VersionControl: Send + Sync {
    /// Reads a file at `git_ref`. A missing file is `Ok(None)`, not an error.
    async fn read_file(&self, path: &str, git_ref: &str) -> Result<Option<FileRevision>, VcsError>;

    /// Writes a new version of `path` and returns the resulting commit SHA.
    /// `revision` is the current content SHA: `None` creates the file,
    /// `Some` updates it only if it still matches, otherwise
    /// `VcsError::Conflict`.
    async fn write_file(
        &self,
        path: &str,
        content: &str,
        message: &str,
        branch: &str,
        revision: Option<&str>,
    ) -> Result<String, VcsError>;

    /// Lists build-workflow runs, most recent first. A run triggered by a
    /// fresh commit may take a few seconds to appear in this feed.
    async fn list_runs(
        &self,
        branch: &str,
        event: &str,
        per_page: u32,
    ) -> Result<Vec<BuildRun>, VcsError>;
}

#[derive(Debug, Deserialize)]
struct ContentResponse {
    content: Option<String>,
    sha: String,
}

#[derive(Debug, Serialize)]
struct PutContentRequest<'a> {
    message: &'a str,
    content: String,
    branch: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct PutContentResponse {
    commit: CommitInfo,
}

#[derive(Debug, Deserialize)]
struct CommitInfo {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct WorkflowRunsResponse {
    workflow_runs: Vec<WorkflowRun>,
}

#[derive(Debug, Deserialize)]
struct WorkflowRun {
    id: u64,
    head_sha: String,
    status: String,
    conclusion: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GitHubErrorBody {
    message: String,
}

/// The concrete GitHub REST client used in production.
#[derive(Clone)]
pub struct GitHubClient {
    client: Client,
    token: String,
    owner: String,
    repo: String,
    workflow_id: String,
}

impl GitHubClient {
    pub fn new(token: String, owner: String, repo: String, workflow_id: String) -> Self {
        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .expect("Failed to build HTTP client"),
            token,
            owner,
            repo,
            workflow_id,
        }
    }

    fn request(&self, method: Method, url: String) -> RequestBuilder {
        self.client
            .request(method, url)
            .bearer_auth(&self.token)
            .header("Accept", GITHUB_ACCEPT)
            .header("User-Agent", USER_AGENT)
    }

    fn contents_url(&self, path: &str) -> String {
        format!(
            "{GITHUB_API_URL}/repos/{}/{}/contents/{path}",
            self.owner, self.repo
        )
    }

    fn runs_url(&self) -> String {
        format!(
            "{GITHUB_API_URL}/repos/{}/{}/actions/workflows/{}/runs",
            self.owner, self.repo, self.workflow_id
        )
    }

    /// Extracts the `message` field from a GitHub error body, falling back
    /// to the raw text.
    async fn api_error(response: reqwest::Response) -> VcsError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<GitHubErrorBody>(&body)
            .map(|e| e.message)
            .unwrap_or(body);
        VcsError::Api { status, message }
    }
}

#[async_trait]
impl VersionControl for GitHubClient {
    async fn read_file(&self, path: &str, git_ref: &str) -> Result<Option<FileRevision>, VcsError> {
        let response = self
            .request(Method::GET, self.contents_url(path))
            .query(&[("ref", git_ref)])
            .send()
            .await?;

        if response.status().as_u16() == 404 {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }

        let body: ContentResponse = response.json().await?;
        let raw = body
            .content
            .ok_or_else(|| VcsError::Decode(format!("no content returned for {path}")))?;

        Ok(Some(FileRevision {
            content: decode_content(&raw)?,
            sha: body.sha,
        }))
    }

    async fn write_file(
        &self,
        path: &str,
        content: &str,
        message: &str,
        branch: &str,
        revision: Option<&str>,
    ) -> Result<String, VcsError> {
        let body = PutContentRequest {
            message,
            content: BASE64.encode(content),
            branch,
            sha: revision,
        };

        let response = self
            .request(Method::PUT, self.contents_url(path))
            .json(&body)
            .send()
            .await?;

        // 409: the supplied SHA no longer matches the file's current state.
        if response.status().as_u16() == 409 {
            let err = Self::api_error(response).await;
            let message = match err {
                VcsError::Api { message, .. } => message,
                other => other.to_string(),
            };
            return Err(VcsError::Conflict(message));
        }
        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }

        let body: PutContentResponse = response.json().await?;
        debug!("Committed {path} on {branch}: {}", body.commit.sha);
        Ok(body.commit.sha)
    }

    async fn list_runs(
        &self,
        branch: &str,
        event: &str,
        per_page: u32,
    ) -> Result<Vec<BuildRun>, VcsError> {
        let response = self
            .request(Method::GET, self.runs_url())
            .query(&[
                ("branch", branch),
                ("event", event),
                ("per_page", &per_page.to_string()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }

        let body: WorkflowRunsResponse = response.json().await?;
        Ok(body
            .workflow_runs
            .into_iter()
            .map(|r| BuildRun {
                id: r.id,
                head_sha: r.head_sha,
                status: r.status,
                conclusion: r.conclusion,
            })
            .collect())
    }
}

/// Decodes the base64 payload of a contents response. GitHub inserts
/// newlines every 60 characters, which the strict decoder rejects.
fn decode_content(raw: &str) -> Result<String, VcsError> {
    let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = BASE64
        .decode(compact)
        .map_err(|e| VcsError::Decode(format!("invalid base64 content: {e}")))?;
    String::from_utf8(bytes).map_err(|e| VcsError::Decode(format!("content is not UTF-8: {e}")))
}
