//! Canonical artifact naming.
//!
//! The build pipeline uploads the compiled PDF under a key derived from the
//! commit message, and the out-of-band shortener keys its records the same
//! way. Both sides must derive the name identically, so the rules here are a
//! contract: change them only together with the consumer.
//!
//! Accepted message grammar:
//!   "Applying to {company} at {timestamp}"
//!   "Applying to {company} as {position} at {timestamp}"
//!   "Applying as {position} at {timestamp}"
//!   "Update resume at {timestamp}"
//! where {timestamp} is `YYYYMMDDTHHMMSSZ`. Messages without the
//! "Applying to" prefix carry no company, which yields the
//! `RESUME__{timestamp}.pdf` double-underscore form. That form is what the
//! consumer expects; do not collapse it.

use std::sync::LazyLock;

use regex::Regex;

static TIMESTAMP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{8}T\d{6}Z)$").unwrap());

static APPLYING_TO_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?i:applying to)\s*").unwrap());

static POSITION_SUFFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\s+(?:as\s+.*?\s+)?at\s+\d{8}T\d{6}Z$").unwrap());

/// Extracts the trailing timestamp token, if present.
pub fn extract_timestamp(message: &str) -> Option<&str> {
    TIMESTAMP_RE
        .captures(message)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// Derives the company segment of the artifact name: uppercased, all
/// whitespace removed. Empty when the message does not start with
/// "Applying to".
pub fn derive_company(message: &str) -> String {
    let Some(prefix) = APPLYING_TO_RE.find(message) else {
        return String::new();
    };
    let rest = &message[prefix.end()..];
    let rest = POSITION_SUFFIX_RE.replace(rest, "");
    rest.to_uppercase().split_whitespace().collect()
}

/// Derives the S3 object key for the PDF this commit will produce.
/// `None` when the message carries no timestamp token.
pub fn derive_object_key(message: &str) -> Option<String> {
    let timestamp = extract_timestamp(message)?;
    let company = derive_company(message);
    Some(format!("resumes/RESUME_{company}_{timestamp}.pdf"))
}
