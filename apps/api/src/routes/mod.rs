pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::commit::handlers::handle_commit_resume;
use crate::email::handle_send_email;
use crate::preview::handle_preview;
use crate::resume::handlers::{
    handle_fetch_resume, handle_fetch_resume_pdf, handle_fetch_resumes,
};
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        .route("/commit-resume", post(handle_commit_resume))
        .route("/fetch-resume", get(handle_fetch_resume))
        .route("/fetch-resumes", get(handle_fetch_resumes))
        .route("/fetch-resume-pdf", get(handle_fetch_resume_pdf))
        .route("/preview", post(handle_preview))
        .route("/send-email", post(handle_send_email))
        .with_state(state)
}
