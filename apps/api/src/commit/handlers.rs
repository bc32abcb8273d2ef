use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use crate::commit::pipeline::CommitError;
use crate::errors::AppError;
use crate::state::AppState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitResumeRequest {
    #[serde(default)]
    pub latex_content: Option<String>,
    #[serde(default)]
    pub commit_message: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitResumeResponse {
    pub short_url: String,
}

/// POST /commit-resume
pub async fn handle_commit_resume(
    State(state): State<AppState>,
    Json(req): Json<CommitResumeRequest>,
) -> Result<Json<CommitResumeResponse>, AppError> {
    let (latex_content, commit_message) =
        match (req.latex_content.as_deref(), req.commit_message.as_deref()) {
            (Some(latex), Some(message)) if !latex.is_empty() && !message.is_empty() => {
                (latex, message)
            }
            _ => return Err(AppError::Validation("Missing parameters".to_string())),
        };

    let outcome = state.commit.run(latex_content, commit_message).await?;
    tracing::debug!(
        "Commit {} (run {}) resolved {} to {}",
        outcome.commit_sha,
        outcome.run_id,
        outcome.object_key,
        outcome.short_url
    );

    Ok(Json(CommitResumeResponse {
        short_url: outcome.short_url,
    }))
}

impl From<CommitError> for AppError {
    fn from(e: CommitError) -> Self {
        match e {
            CommitError::MissingTimestamp => AppError::Validation(e.to_string()),
            CommitError::Conflict(msg) => AppError::Conflict(msg),
            CommitError::Vcs(inner) => AppError::Upstream(inner.to_string()),
            CommitError::Lookup(inner) => AppError::Upstream(inner.to_string()),
            err @ CommitError::BuildTimeout => AppError::Timeout(err.to_string()),
            err @ CommitError::RecordUnavailable { .. } => {
                AppError::RecordUnavailable(err.to_string())
            }
        }
    }
}
