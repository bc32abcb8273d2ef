use std::sync::Arc;

use aws_sdk_s3::Client as S3Client;

use crate::commit::pipeline::CommitPipeline;
use crate::config::Config;
use crate::email::Mailer;
use crate::github::VersionControl;
use crate::lookup::ShortUrlStore;

/// Shared application state injected into all route handlers via Axum
/// extractors. The version-control and lookup clients sit behind trait
/// objects so tests can swap in scripted fakes.
#[derive(Clone)]
pub struct AppState {
    pub vcs: Arc<dyn VersionControl>,
    pub lookup: Arc<dyn ShortUrlStore>,
    pub s3: S3Client,
    pub mailer: Mailer,
    pub commit: CommitPipeline,
    pub config: Config,
}
