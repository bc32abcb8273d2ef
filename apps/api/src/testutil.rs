//! Shared construction helpers for router-level tests.

use std::sync::Arc;

use aws_sdk_s3::config::{BehaviorVersion, Region};

use crate::commit::fakes::{FakeStore, FakeVcs};
use crate::commit::pipeline::{CommitPipeline, CommitSettings};
use crate::config::Config;
use crate::email::Mailer;
use crate::github::VersionControl;
use crate::lookup::ShortUrlStore;
use crate::state::AppState;

pub fn test_config() -> Config {
    Config {
        github_token: "test-token".to_string(),
        github_owner: "octocat".to_string(),
        github_repo: "resume".to_string(),
        github_resume_path: "resume.tex".to_string(),
        github_branch: "main".to_string(),
        github_workflow_id: "main.yml".to_string(),
        ddb_table: "ResumeMetadata".to_string(),
        aws_region: "us-east-1".to_string(),
        s3_bucket: "resume-artifacts".to_string(),
        sendgrid_api_key: "test-key".to_string(),
        email_sender: "sender@example.com".to_string(),
        applicant_first_name: "Jane".to_string(),
        applicant_last_name: "Doe".to_string(),
        port: 0,
        rust_log: "info".to_string(),
    }
}

/// An `AppState` wired to scripted fakes. The S3 client is built offline and
/// never contacted by the routes under test.
pub fn test_state(vcs: FakeVcs, store: FakeStore) -> AppState {
    let vcs: Arc<dyn VersionControl> = Arc::new(vcs);
    let lookup: Arc<dyn ShortUrlStore> = Arc::new(store);
    let config = test_config();

    let s3_config = aws_sdk_s3::config::Builder::new()
        .behavior_version(BehaviorVersion::latest())
        .region(Region::new("us-east-1"))
        .build();
    let s3 = aws_sdk_s3::Client::from_conf(s3_config);

    let commit = CommitPipeline::new(
        vcs.clone(),
        lookup.clone(),
        CommitSettings {
            resume_path: config.github_resume_path.clone(),
            branch: config.github_branch.clone(),
            ..CommitSettings::default()
        },
    );

    AppState {
        vcs,
        lookup,
        s3,
        mailer: Mailer::new(config.sendgrid_api_key.clone(), config.email_sender.clone()),
        commit,
        config,
    }
}
