//! Immutable policy snapshot and its publication point
//!
//! Every decision reads a [`Settings`] value. A session grabs one
//! `Arc<Settings>` when it is admitted and keeps it until it ends, so a
//! reconfiguration never changes the rules half way through a transaction.

use crate::config::{Config, Mode};
use crate::error::Result;
use crate::utils::{normalize_address, normalize_hostname};
use arc_swap::ArcSwap;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone, PartialEq)]
pub struct RblSettings {
    pub enabled: bool,
    pub zones: Vec<String>,
    pub lookup_timeout: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GreylistSettings {
    pub enabled: bool,
    pub min_delay_secs: u64,
    pub ttl_secs: u64,
    pub sweep_interval_secs: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PolicySettings {
    pub require_dmarc: bool,
    pub evaluator_timeout: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub mode: Mode,
    /// Lowercase, no trailing dot
    pub domain: String,
    /// Lowercase, no trailing dot
    pub mx_hostname: String,
    /// Allowed mailboxes; empty accepts any mailbox at `domain`
    pub recipients: HashSet<String>,
    /// Certificate and key are both configured and present on disk
    pub tls_available: bool,
    pub max_connections_per_ip: usize,
    pub max_message_size: usize,
    pub rbl: RblSettings,
    pub greylist: GreylistSettings,
    pub policy: PolicySettings,
    pub spool_dir: PathBuf,
}

impl Settings {
    /// Validate `config` and normalize it into a snapshot
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;

        let tls_available = match (&config.smtp.tls_cert_path, &config.smtp.tls_key_path) {
            (Some(cert), Some(key)) => Path::new(cert).exists() && Path::new(key).exists(),
            _ => false,
        };

        let zones = config
            .rbl
            .zones
            .iter()
            .map(|zone| normalize_hostname(zone).trim_start_matches('.').to_string())
            .filter(|zone| !zone.is_empty())
            .collect();

        Ok(Self {
            mode: config.server.mode,
            domain: normalize_hostname(&config.server.domain),
            mx_hostname: normalize_hostname(&config.server.mx_hostname),
            recipients: config
                .recipients
                .iter()
                .map(|r| normalize_address(r))
                .collect(),
            tls_available,
            max_connections_per_ip: config.smtp.max_connections_per_ip,
            max_message_size: config.smtp.max_message_size,
            rbl: RblSettings {
                enabled: config.rbl.enabled,
                zones,
                lookup_timeout: Duration::from_secs(config.rbl.lookup_timeout_secs),
            },
            greylist: GreylistSettings {
                enabled: config.greylist.enabled,
                min_delay_secs: config.greylist.min_delay_secs,
                ttl_secs: config.greylist.ttl_secs,
                sweep_interval_secs: config.greylist.sweep_interval_secs,
            },
            policy: PolicySettings {
                require_dmarc: config.policy.require_dmarc,
                evaluator_timeout: Duration::from_secs(config.policy.evaluator_timeout_secs),
            },
            spool_dir: PathBuf::from(&config.storage.spool_dir),
        })
    }

    /// Plaintext connections are refused up front
    pub fn requires_tls(&self) -> bool {
        self.mode == Mode::Prod && self.tls_available
    }
}

/// Holder of the active snapshot
pub struct SettingsHandle {
    current: ArcSwap<Settings>,
}

impl SettingsHandle {
    pub fn new(settings: Settings) -> Self {
        Self {
            current: ArcSwap::from_pointee(settings),
        }
    }

    /// The active snapshot. Hold on to it for the rest of the decision.
    pub fn current(&self) -> Arc<Settings> {
        self.current.load_full()
    }

    /// Publish a new snapshot. Holders of the previous one keep it alive.
    pub fn replace(&self, settings: Settings) {
        info!(
            "Publishing settings for {} (mx {})",
            settings.domain, settings.mx_hostname
        );
        self.current.store(Arc::new(settings));
    }
}
