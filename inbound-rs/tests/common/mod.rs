//! Test doubles shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use inbound_rs::authentication::{AuthContext, AuthEvaluator, AuthSummary, DmarcStatus};
use inbound_rs::clock::ManualClock;
use inbound_rs::config::Config;
use inbound_rs::delivery::{DeliveryRecord, DeliverySink};
use inbound_rs::error::{InboundError, Result};
use inbound_rs::utils::DnsResolver;
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Resolver answering from a fixed table; unknown names are NXDOMAIN
#[derive(Default)]
pub struct StaticResolver {
    answers: HashMap<String, Vec<Ipv4Addr>>,
    delay: Option<Duration>,
    slow: HashMap<String, Duration>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_answer(mut self, name: &str, address: Ipv4Addr) -> Self {
        self.answers.entry(name.to_string()).or_default().push(address);
        self
    }

    /// Every lookup sleeps this long first
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Only lookups of `name` sleep this long first
    pub fn with_slow_name(mut self, name: &str, delay: Duration) -> Self {
        self.slow.insert(name.to_string(), delay);
        self
    }
}

#[async_trait]
impl DnsResolver for StaticResolver {
    async fn resolve_a(&self, name: &str) -> Result<Vec<Ipv4Addr>> {
        if let Some(delay) = self.delay.or_else(|| self.slow.get(name).copied()) {
            tokio::time::sleep(delay).await;
        }
        self.answers
            .get(name)
            .cloned()
            .ok_or_else(|| InboundError::DnsLookup(format!("{}: NXDOMAIN", name)))
    }
}

/// Sink keeping every record in memory
#[derive(Default)]
pub struct RecordingSink {
    records: Mutex<Vec<DeliveryRecord>>,
}

impl RecordingSink {
    pub fn records(&self) -> Vec<DeliveryRecord> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl DeliverySink for RecordingSink {
    async fn deliver(&self, record: &DeliveryRecord) -> Result<()> {
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }
}

/// Evaluator with a canned answer, or an error when `None`
pub struct FixedEvaluator(pub Option<DmarcStatus>);

#[async_trait]
impl AuthEvaluator for FixedEvaluator {
    async fn evaluate(&self, _: &[u8], _: &AuthContext) -> anyhow::Result<AuthSummary> {
        match self.0 {
            Some(status) => Ok(AuthSummary {
                dmarc: Some(status),
            }),
            None => Err(anyhow::anyhow!("evaluator unavailable")),
        }
    }
}

pub fn clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap(),
    ))
}

/// example.com, any mailbox, RBL off, greylisting on with defaults
pub fn base_config() -> Config {
    let mut config = Config::default();
    config.recipients = Vec::new();
    config.rbl.enabled = false;
    config
}

pub const MESSAGE: &[u8] =
    b"From: Alice <alice@sender.example>\r\nTo: sales@example.com\r\nSubject: Pricing\r\n\r\nHello\r\n";
