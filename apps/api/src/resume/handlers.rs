//! Read-side routes: the current LaTeX source, the metadata table, and the
//! stored PDF artifacts.

use axum::extract::{Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;

use crate::errors::AppError;
use crate::lookup::ShortUrlRecord;
use crate::state::AppState;

/// GET /fetch-resume
///
/// Returns the tracked resume source as plain text for the editor pane.
pub async fn handle_fetch_resume(State(state): State<AppState>) -> Result<Response, AppError> {
    let revision = state
        .vcs
        .read_file(&state.config.github_resume_path, &state.config.github_branch)
        .await
        .map_err(|e| AppError::Upstream(format!("Failed to fetch resume: {e}")))?
        .ok_or_else(|| AppError::NotFound("Resume file not found".to_string()))?;

    Ok((
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        revision.content,
    )
        .into_response())
}

/// GET /fetch-resumes
///
/// All known resume artifacts with their short links, newest first.
pub async fn handle_fetch_resumes(
    State(state): State<AppState>,
) -> Result<Json<Vec<ShortUrlRecord>>, AppError> {
    let mut records = state
        .lookup
        .list_records()
        .await
        .map_err(|e| AppError::Upstream(format!("Failed to fetch resumes: {e}")))?;
    records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    Ok(Json(records))
}

#[derive(Deserialize)]
pub struct PdfQuery {
    #[serde(default)]
    pub s3_key: Option<String>,
}

/// GET /fetch-resume-pdf?s3_key=...
pub async fn handle_fetch_resume_pdf(
    State(state): State<AppState>,
    Query(query): Query<PdfQuery>,
) -> Result<Response, AppError> {
    let key = query
        .s3_key
        .filter(|k| !k.is_empty())
        .ok_or_else(|| AppError::Validation("Missing s3_key parameter".to_string()))?;

    let object = state
        .s3
        .get_object()
        .bucket(&state.config.s3_bucket)
        .key(&key)
        .send()
        .await
        .map_err(|e| AppError::Storage(format!("Failed to fetch PDF: {e}")))?;

    let data: bytes::Bytes = object
        .body
        .collect()
        .await
        .map_err(|e| AppError::Storage(format!("Failed to read PDF body: {e}")))?
        .into_bytes();

    let filename = key.rsplit('/').next().unwrap_or(&key).to_string();
    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        data,
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::commit::fakes::{FakeStore, FakeVcs};
    use crate::lookup::ShortUrlRecord;
    use crate::routes::build_router;
    use crate::testutil::test_state;

    fn record(key: &str, timestamp: &str) -> ShortUrlRecord {
        ShortUrlRecord {
            s3_key: key.to_string(),
            short_url: format!("https://short.ly/{key}"),
            company: "ACME".to_string(),
            timestamp: timestamp.to_string(),
        }
    }

    #[tokio::test]
    async fn test_fetch_resume_returns_plain_text_source() {
        let app = build_router(test_state(FakeVcs::default(), FakeStore::available_after(1)));
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/fetch-resume")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers()["content-type"]
            .to_str()
            .unwrap()
            .starts_with("text/plain"));
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&bytes[..], b"\\documentclass{article}");
    }

    #[tokio::test]
    async fn test_fetch_resume_missing_file_is_404() {
        let mut vcs = FakeVcs::default();
        vcs.existing = None;
        let app = build_router(test_state(vcs, FakeStore::available_after(1)));
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/fetch-resume")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_fetch_resumes_sorted_newest_first() {
        let store = FakeStore::available_after(1);
        *store.records.lock().unwrap() = vec![
            record("a", "20250110T000000Z"),
            record("b", "20250610T165845Z"),
            record("c", "20250301T120000Z"),
        ];
        let app = build_router(test_state(FakeVcs::default(), store));
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/fetch-resumes")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        let timestamps: Vec<&str> = body
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["timestamp"].as_str().unwrap())
            .collect();
        assert_eq!(
            timestamps,
            vec!["20250610T165845Z", "20250301T120000Z", "20250110T000000Z"]
        );
    }

    #[tokio::test]
    async fn test_fetch_resume_pdf_requires_key() {
        let app = build_router(test_state(FakeVcs::default(), FakeStore::available_after(1)));
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/fetch-resume-pdf")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "Missing s3_key parameter");
    }
}
