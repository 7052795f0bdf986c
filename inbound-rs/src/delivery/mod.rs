//! Delivery handoff
//!
//! Once a message is accepted, one [`DeliveryRecord`] per distinct
//! recipient is handed to a [`DeliverySink`]. Durability is the sink's job.

use crate::error::Result;
use crate::utils::normalize_address;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryRecord {
    /// Normalized recipient address
    pub recipient: String,
    /// `None` for the null reverse-path
    pub envelope_from: Option<String>,
    /// Subject header, when the message parses
    pub subject_hint: Option<String>,
    /// Shared between all records of one message
    pub raw_message: Arc<Vec<u8>>,
    pub received_at: DateTime<Utc>,
}

/// Receiver of accepted messages
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DeliverySink: Send + Sync {
    async fn deliver(&self, record: &DeliveryRecord) -> Result<()>;
}

/// Best-effort Subject extraction
pub fn subject_hint(raw_message: &[u8]) -> Option<String> {
    mail_parser::MessageParser::default()
        .parse(raw_message)
        .and_then(|parsed| parsed.subject().map(|s| s.to_string()))
}

/// One record per distinct recipient, in RCPT order
pub fn build_records(
    envelope_from: Option<&str>,
    recipients: &[String],
    raw_message: Vec<u8>,
    received_at: DateTime<Utc>,
) -> Vec<DeliveryRecord> {
    let subject_hint = subject_hint(&raw_message);
    let raw_message = Arc::new(raw_message);
    let mut seen = HashSet::new();

    recipients
        .iter()
        .map(|r| normalize_address(r))
        .filter(|r| seen.insert(r.clone()))
        .map(|recipient| DeliveryRecord {
            recipient,
            envelope_from: envelope_from.map(|s| s.to_string()),
            subject_hint: subject_hint.clone(),
            raw_message: Arc::clone(&raw_message),
            received_at,
        })
        .collect()
}

/// Hand every record to `sink`, stopping at the first failure
pub async fn hand_off(sink: &dyn DeliverySink, records: &[DeliveryRecord]) -> Result<usize> {
    for record in records {
        sink.deliver(record).await?;
        debug!("Handed off message for {}", record.recipient);
    }

    if let Some(first) = records.first() {
        info!(
            "Delivered message from {} ({} recipients, subject {:?})",
            first.envelope_from.as_deref().unwrap_or("<>"),
            records.len(),
            first.subject_hint.as_deref().unwrap_or("")
        );
    }
    Ok(records.len())
}
