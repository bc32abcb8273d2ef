//! Job-application email route — multipart form in, SendGrid v3 send out.
//!
//! ARCHITECTURAL RULE: all outgoing mail goes through [`Mailer`]; no other
//! module talks to SendGrid.

use std::sync::LazyLock;

use axum::extract::{Multipart, State};
use axum::Json;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use regex::Regex;
use reqwest::Client;
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::info;

use crate::errors::AppError;
use crate::state::AppState;

const SENDGRID_API_URL: &str = "https://api.sendgrid.com/v3/mail/send";

/// Stored artifacts are named `resume-<timestamp>-<company>.pdf` by the
/// frontend; the company segment becomes part of the outgoing filename.
static ATTACHMENT_COMPANY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)resume-\d+T\d+Z-(.+)\.pdf$").unwrap());

#[derive(Debug, Error)]
pub enum MailError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("SendGrid API error (status {status}): {message}")]
    Api { status: u16, message: String },
}

#[derive(Debug, Serialize)]
struct MailRequest<'a> {
    personalizations: Vec<Personalization<'a>>,
    from: EmailAddress<'a>,
    subject: &'a str,
    content: Vec<MailContent<'a>>,
    #[serde(skip_serializing_if = "<[_]>::is_empty")]
    attachments: &'a [MailAttachment],
}

#[derive(Debug, Serialize)]
struct Personalization<'a> {
    to: Vec<EmailAddress<'a>>,
}

#[derive(Debug, Serialize)]
struct EmailAddress<'a> {
    email: &'a str,
}

#[derive(Debug, Serialize)]
struct MailContent<'a> {
    #[serde(rename = "type")]
    content_type: &'a str,
    value: &'a str,
}

#[derive(Debug, Serialize)]
pub struct MailAttachment {
    content: String,
    filename: String,
    #[serde(rename = "type")]
    content_type: String,
    disposition: String,
}

impl MailAttachment {
    pub fn new(filename: String, content_type: String, data: &[u8]) -> Self {
        Self {
            content: BASE64.encode(data),
            filename,
            content_type,
            disposition: "attachment".to_string(),
        }
    }
}

/// The single SendGrid client used for all outgoing mail.
#[derive(Clone)]
pub struct Mailer {
    client: Client,
    api_key: String,
    sender: String,
}

impl Mailer {
    pub fn new(api_key: String, sender: String) -> Self {
        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .expect("Failed to build HTTP client"),
            api_key,
            sender,
        }
    }

    pub async fn send(
        &self,
        to: &str,
        subject: &str,
        body: &str,
        attachments: &[MailAttachment],
    ) -> Result<(), MailError> {
        let request = MailRequest {
            personalizations: vec![Personalization {
                to: vec![EmailAddress { email: to }],
            }],
            from: EmailAddress {
                email: &self.sender,
            },
            subject,
            content: vec![MailContent {
                content_type: "text/plain",
                value: body,
            }],
            attachments,
        };

        let response = self
            .client
            .post(SENDGRID_API_URL)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(MailError::Api { status, message });
        }

        info!("Sent application email to {to} ({} attachments)", request.attachments.len());
        Ok(())
    }
}

/// Rebuilds the outgoing attachment name from the stored artifact name:
/// `resume-20250610T165845Z-amazon.pdf` with applicant "Jane Doe" becomes
/// `JANE_DOE_RESUME_AMAZON.pdf`. Empty segments are skipped, so an
/// unrecognized artifact name still yields `JANE_DOE_RESUME.pdf`.
pub fn attachment_filename(original: &str, first_name: &str, last_name: &str) -> String {
    let company = ATTACHMENT_COMPANY_RE
        .captures(original)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_uppercase())
        .unwrap_or_default();

    let name = [
        first_name.to_uppercase(),
        last_name.to_uppercase(),
        "RESUME".to_string(),
        company,
    ]
    .into_iter()
    .filter(|s| !s.is_empty())
    .collect::<Vec<_>>()
    .join("_");

    format!("{name}.pdf")
}

/// POST /send-email
pub async fn handle_send_email(
    State(state): State<AppState>,
    mut form: Multipart,
) -> Result<Json<Value>, AppError> {
    let mut to = None;
    let mut subject = None;
    let mut body = None;
    let mut attachments = Vec::new();

    while let Some(field) = form
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Invalid multipart form: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "to" => to = Some(read_text(field).await?),
            "subject" => subject = Some(read_text(field).await?),
            "body" => body = Some(read_text(field).await?),
            _ if name.starts_with("attachments") => {
                let original = field.file_name().unwrap_or_default().to_string();
                let content_type = field
                    .content_type()
                    .map(str::to_string)
                    .unwrap_or_else(|| "application/pdf".to_string());
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::Validation(format!("Unreadable attachment: {e}")))?;
                attachments.push(MailAttachment::new(
                    attachment_filename(
                        &original,
                        &state.config.applicant_first_name,
                        &state.config.applicant_last_name,
                    ),
                    content_type,
                    &data,
                ));
            }
            _ => {}
        }
    }

    let (to, subject, body) = match (to, subject, body) {
        (Some(t), Some(s), Some(b)) => (t, s, b),
        _ => return Err(AppError::Validation("Missing parameters".to_string())),
    };

    state
        .mailer
        .send(&to, &subject, &body, &attachments)
        .await
        .map_err(|e| AppError::Email(format!("Send failed: {e}")))?;

    Ok(Json(json!({"message": "Email sent successfully"})))
}

async fn read_text(field: axum::extract::multipart::Field<'_>) -> Result<String, AppError> {
    field
        .text()
        .await
        .map_err(|e| AppError::Validation(format!("Invalid multipart form: {e}")))
}
