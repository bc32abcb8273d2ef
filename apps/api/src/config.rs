use anyhow::{Context, Result};

/// Application configuration loaded from environment variables.
/// Panics at startup if required variables are missing.
#[derive(Debug, Clone)]
pub struct Config {
    pub github_token: String,
    pub github_owner: String,
    pub github_repo: String,
    pub github_resume_path: String,
    pub github_branch: String,
    pub github_workflow_id: String,
    pub ddb_table: String,
    pub aws_region: String,
    pub s3_bucket: String,
    pub sendgrid_api_key: String,
    pub email_sender: String,
    pub applicant_first_name: String,
    pub applicant_last_name: String,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            github_token: require_env("GITHUB_RESUME_REPO_TOKEN")?,
            github_owner: require_env("GITHUB_RESUME_REPO_OWNER")?,
            github_repo: require_env("GITHUB_RESUME_REPO_NAME")?,
            github_resume_path: std::env::var("GITHUB_RESUME_REPO_PATH")
                .unwrap_or_else(|_| "resume.tex".to_string()),
            github_branch: std::env::var("GITHUB_RESUME_REPO_BRANCH")
                .unwrap_or_else(|_| "main".to_string()),
            github_workflow_id: std::env::var("GITHUB_RESUME_WORKFLOW_ID")
                .unwrap_or_else(|_| "main.yml".to_string()),
            ddb_table: std::env::var("DDB_TABLE").unwrap_or_else(|_| "ResumeMetadata".to_string()),
            aws_region: require_env("AWS_REGION")?,
            s3_bucket: require_env("AWS_S3_BUCKET")?,
            sendgrid_api_key: require_env("SENDGRID_API_KEY")?,
            email_sender: require_env("EMAIL_SENDER")?,
            applicant_first_name: std::env::var("APPLICANT_FIRSTNAME").unwrap_or_default(),
            applicant_last_name: std::env::var("APPLICANT_LASTNAME").unwrap_or_default(),
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse::<u16>()
                .context("PORT must be a valid port number")?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}
