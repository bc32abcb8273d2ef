//! Short-URL lookup store — DynamoDB table keyed by S3 object key.
//!
//! Records are written by the out-of-band shortener after the build pipeline
//! uploads a PDF; this module only ever reads them. Point reads are strongly
//! consistent so a negative result means "not written yet", never "not
//! replicated yet".

use std::collections::HashMap;

use async_trait::async_trait;
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client as DynamoClient;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LookupError {
    #[error("DynamoDB request failed: {0}")]
    Request(String),
}

/// One row of the resume metadata table.
#[derive(Debug, Clone, Serialize)]
pub struct ShortUrlRecord {
    pub s3_key: String,
    pub short_url: String,
    pub company: String,
    pub timestamp: String,
}

#[async_trait]
pub trait ShortUrlStore: Send + Sync {
    /// Strongly consistent point read. `Ok(None)` when the row does not
    /// exist yet or has no short URL attached.
    async fn get_consistent(&self, key: &str) -> Result<Option<ShortUrlRecord>, LookupError>;

    /// Full table scan for the resume-list view.
    async fn list_records(&self) -> Result<Vec<ShortUrlRecord>, LookupError>;
}

#[derive(Clone)]
pub struct DynamoStore {
    client: DynamoClient,
    table: String,
}

impl DynamoStore {
    pub fn new(client: DynamoClient, table: String) -> Self {
        Self { client, table }
    }
}

#[async_trait]
impl ShortUrlStore for DynamoStore {
    async fn get_consistent(&self, key: &str) -> Result<Option<ShortUrlRecord>, LookupError> {
        let resp = self
            .client
            .get_item()
            .table_name(&self.table)
            .key("s3_key", AttributeValue::S(key.to_string()))
            .consistent_read(true)
            .send()
            .await
            .map_err(|e| LookupError::Request(e.to_string()))?;

        Ok(resp
            .item()
            .and_then(record_from_item)
            .filter(|r| !r.short_url.is_empty()))
    }

    async fn list_records(&self) -> Result<Vec<ShortUrlRecord>, LookupError> {
        let resp = self
            .client
            .scan()
            .table_name(&self.table)
            .projection_expression("s3_key, company, #ts, short_url")
            .expression_attribute_names("#ts", "timestamp")
            .send()
            .await
            .map_err(|e| LookupError::Request(e.to_string()))?;

        Ok(resp
            .items()
            .iter()
            .filter_map(record_from_item)
            .collect())
    }
}

fn attr_s(item: &HashMap<String, AttributeValue>, name: &str) -> String {
    item.get(name)
        .and_then(|v| v.as_s().ok())
        .cloned()
        .unwrap_or_default()
}

/// Converts a raw attribute map into a record. Rows without an `s3_key` are
/// dropped; the other attributes default to empty.
fn record_from_item(item: &HashMap<String, AttributeValue>) -> Option<ShortUrlRecord> {
    let s3_key = item.get("s3_key").and_then(|v| v.as_s().ok())?.clone();
    Some(ShortUrlRecord {
        s3_key,
        short_url: attr_s(item, "short_url"),
        company: attr_s(item, "company"),
        timestamp: attr_s(item, "timestamp"),
    })
}
