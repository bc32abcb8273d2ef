//! In-browser preview: compile submitted LaTeX and hand the PDF back inline.
//!
//! The compiler runs in a scratch directory that is dropped with the request,
//! so concurrent previews never see each other's aux files.

use anyhow::Context;
use axum::Json;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::debug;

use crate::errors::AppError;

const PDFLATEX: &str = "pdflatex";

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewRequest {
    #[serde(default)]
    pub latex_content: Option<String>,
}

#[derive(Serialize)]
pub struct PreviewResponse {
    pub pdf: String,
}

/// POST /preview
pub async fn handle_preview(
    Json(req): Json<PreviewRequest>,
) -> Result<Json<PreviewResponse>, AppError> {
    let latex = req
        .latex_content
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::Validation("No LaTeX provided".to_string()))?;

    let pdf = compile_latex(&latex).await?;
    Ok(Json(PreviewResponse {
        pdf: BASE64.encode(pdf),
    }))
}

/// Compiles LaTeX source to PDF bytes. The compiler runs twice so
/// cross-references and the aux-file-driven bits settle.
async fn compile_latex(source: &str) -> Result<Vec<u8>, AppError> {
    let dir = tempfile::Builder::new()
        .prefix("latex-")
        .tempdir()
        .context("failed to create scratch directory")?;
    let tex_path = dir.path().join("preview.tex");
    tokio::fs::write(&tex_path, source)
        .await
        .context("failed to write LaTeX source")?;

    for pass in 1..=2 {
        let output = Command::new(PDFLATEX)
            .arg("-halt-on-error")
            .arg("-output-directory")
            .arg(dir.path())
            .arg(&tex_path)
            .output()
            .await
            .map_err(|e| AppError::Latex(format!("Failed to run {PDFLATEX}: {e}")))?;

        if !output.status.success() {
            // pdflatex reports errors on stdout; stderr is usually empty.
            let detail = if output.stderr.is_empty() {
                String::from_utf8_lossy(&output.stdout).into_owned()
            } else {
                String::from_utf8_lossy(&output.stderr).into_owned()
            };
            return Err(AppError::Latex(format!(
                "LaTeX compilation failed: {detail}"
            )));
        }
        debug!("{PDFLATEX} pass {pass} succeeded");
    }

    tokio::fs::read(dir.path().join("preview.pdf"))
        .await
        .map_err(|e| AppError::Latex(format!("Compiled PDF missing: {e}")))
}
