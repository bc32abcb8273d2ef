mod commit;
mod config;
mod email;
mod errors;
mod github;
mod lookup;
mod preview;
mod resume;
mod routes;
mod state;
#[cfg(test)]
mod testutil;

use anyhow::Result;
use aws_config::Region;
use std::net::SocketAddr;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use std::sync::Arc;

use crate::commit::pipeline::{CommitPipeline, CommitSettings};
use crate::config::Config;
use crate::email::Mailer;
use crate::github::{GitHubClient, VersionControl};
use crate::lookup::{DynamoStore, ShortUrlStore};
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (panics on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "{}={}",
                env!("CARGO_PKG_NAME").replace('-', "_"),
                &config.rust_log
            ))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Resume API v{}", env!("CARGO_PKG_VERSION"));

    // Shared AWS config: S3 holds the PDF artifacts, DynamoDB the short-URL table
    let aws_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(Region::new(config.aws_region.clone()))
        .load()
        .await;

    let s3 = aws_sdk_s3::Client::new(&aws_config);
    info!("S3 client initialized (bucket: {})", config.s3_bucket);

    let dynamo = aws_sdk_dynamodb::Client::new(&aws_config);
    let lookup: Arc<dyn ShortUrlStore> =
        Arc::new(DynamoStore::new(dynamo, config.ddb_table.clone()));
    info!("DynamoDB client initialized (table: {})", config.ddb_table);

    let vcs: Arc<dyn VersionControl> = Arc::new(GitHubClient::new(
        config.github_token.clone(),
        config.github_owner.clone(),
        config.github_repo.clone(),
        config.github_workflow_id.clone(),
    ));
    info!(
        "GitHub client initialized ({}/{}, workflow {})",
        config.github_owner, config.github_repo, config.github_workflow_id
    );

    let mailer = Mailer::new(
        config.sendgrid_api_key.clone(),
        config.email_sender.clone(),
    );
    info!("SendGrid mailer initialized (sender: {})", config.email_sender);

    let commit = CommitPipeline::new(
        vcs.clone(),
        lookup.clone(),
        CommitSettings {
            resume_path: config.github_resume_path.clone(),
            branch: config.github_branch.clone(),
            ..CommitSettings::default()
        },
    );

    // Build app state
    let state = AppState {
        vcs,
        lookup,
        s3,
        mailer,
        commit,
        config: config.clone(),
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: tighten CORS in production

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
