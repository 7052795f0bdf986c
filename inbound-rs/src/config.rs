use crate::error::{InboundError, Result};
use crate::utils::email::split_address;
use crate::utils::{normalize_address, normalize_hostname, validate_email};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Operating mode. Production enforces STARTTLS when TLS material exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Dev,
    Prod,
}

impl std::str::FromStr for Mode {
    type Err = InboundError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dev" => Ok(Mode::Dev),
            "prod" => Ok(Mode::Prod),
            other => Err(InboundError::Config(format!("Unknown mode: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub server: ServerConfig,
    pub smtp: SmtpConfig,
    /// Allowed mailboxes. Empty means any mailbox at `server.domain`.
    #[serde(default)]
    pub recipients: Vec<String>,
    #[serde(default)]
    pub rbl: RblConfig,
    #[serde(default)]
    pub greylist: GreylistConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    pub domain: String,
    pub mx_hostname: String,
    #[serde(default = "default_mode")]
    pub mode: Mode,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SmtpConfig {
    pub tls_cert_path: Option<String>,
    pub tls_key_path: Option<String>,
    #[serde(default = "default_max_connections_per_ip")]
    pub max_connections_per_ip: usize,
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RblConfig {
    pub enabled: bool,
    #[serde(default)]
    pub zones: Vec<String>,
    /// Per-zone lookup timeout; an unbounded lookup would pin the connection slot
    #[serde(default = "default_lookup_timeout")]
    pub lookup_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GreylistConfig {
    pub enabled: bool,
    #[serde(default = "default_min_delay")]
    pub min_delay_secs: u64,
    #[serde(default = "default_ttl")]
    pub ttl_secs: u64,
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PolicyConfig {
    pub require_dmarc: bool,
    #[serde(default = "default_evaluator_timeout")]
    pub evaluator_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    pub spool_dir: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

fn default_mode() -> Mode {
    Mode::Dev
}

fn default_max_connections_per_ip() -> usize {
    10
}

fn default_max_message_size() -> usize {
    10 * 1024 * 1024 // 10MB
}

fn default_lookup_timeout() -> u64 {
    5
}

fn default_min_delay() -> u64 {
    60
}

fn default_ttl() -> u64 {
    86400
}

fn default_sweep_interval() -> u64 {
    300
}

fn default_evaluator_timeout() -> u64 {
    30
}

impl Default for RblConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            zones: Vec::new(),
            lookup_timeout_secs: default_lookup_timeout(),
        }
    }
}

impl Default for GreylistConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_delay_secs: default_min_delay(),
            ttl_secs: default_ttl(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            require_dmarc: false,
            evaluator_timeout_secs: default_evaluator_timeout(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            spool_dir: "./spool".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                domain: "example.com".to_string(),
                mx_hostname: "mx1.example.com".to_string(),
                mode: Mode::Dev,
            },
            smtp: SmtpConfig {
                tls_cert_path: None,
                tls_key_path: None,
                max_connections_per_ip: default_max_connections_per_ip(),
                max_message_size: default_max_message_size(),
            },
            recipients: vec!["info@example.com".to_string()],
            rbl: RblConfig::default(),
            greylist: GreylistConfig::default(),
            policy: PolicyConfig::default(),
            storage: StorageConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| InboundError::Config(e.to_string()))?;

        toml::from_str(&content).map_err(|e| InboundError::Config(e.to_string()))
    }

    /// Overlay the process environment on top of this configuration
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_vars(|key| std::env::var(key).ok())
    }

    /// Overlay variables from an arbitrary lookup (the environment in production)
    pub fn apply_vars<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(mode) = lookup("MODE") {
            self.server.mode = mode.parse()?;
        }
        if let Some(domain) = lookup("DOMAIN") {
            self.server.domain = domain;
        }
        if let Some(hostname) = lookup("SMTP_HOSTNAME") {
            self.server.mx_hostname = hostname;
        }
        if let Some(cert) = lookup("SMTP_TLS_CERT") {
            self.smtp.tls_cert_path = Some(cert);
        }
        if let Some(key) = lookup("SMTP_TLS_KEY") {
            self.smtp.tls_key_path = Some(key);
        }
        if let Some(max) = lookup("SMTP_MAX_CONN_PER_IP") {
            self.smtp.max_connections_per_ip = parse_var("SMTP_MAX_CONN_PER_IP", &max)?;
        }
        if let Some(size) = lookup("MAX_MESSAGE_SIZE") {
            self.smtp.max_message_size = parse_var("MAX_MESSAGE_SIZE", &size)?;
        }
        if let Some(enabled) = lookup("ENABLE_RBL") {
            self.rbl.enabled = enabled == "true";
        }
        if let Some(zones) = lookup("RBL_ZONES") {
            self.rbl.zones = zones
                .split(',')
                .map(|z| z.trim().to_string())
                .filter(|z| !z.is_empty())
                .collect();
        }
        if let Some(enabled) = lookup("ENABLE_GREYLIST") {
            self.greylist.enabled = enabled == "true";
        }
        if let Some(delay) = lookup("GREYLIST_MIN_DELAY") {
            self.greylist.min_delay_secs = parse_var("GREYLIST_MIN_DELAY", &delay)?;
        }
        if let Some(ttl) = lookup("GREYLIST_TTL") {
            self.greylist.ttl_secs = parse_var("GREYLIST_TTL", &ttl)?;
        }
        if let Some(require) = lookup("REQUIRE_DMARC") {
            self.policy.require_dmarc = require == "true";
        }
        if let Some(spool) = lookup("SPOOL_DIR") {
            self.storage.spool_dir = spool;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.domain.trim().is_empty() {
            return Err(InboundError::Config("server.domain is empty".to_string()));
        }
        if self.server.mx_hostname.trim().is_empty() {
            return Err(InboundError::Config(
                "server.mx_hostname is empty".to_string(),
            ));
        }
        if self.smtp.max_connections_per_ip == 0 {
            return Err(InboundError::Config(
                "smtp.max_connections_per_ip must be positive".to_string(),
            ));
        }
        if self.greylist.min_delay_secs == 0 || self.greylist.ttl_secs == 0 {
            return Err(InboundError::Config(
                "greylist delay and ttl must be positive".to_string(),
            ));
        }
        if self.greylist.ttl_secs < self.greylist.min_delay_secs {
            return Err(InboundError::Config(format!(
                "greylist.ttl_secs ({}) is shorter than greylist.min_delay_secs ({})",
                self.greylist.ttl_secs, self.greylist.min_delay_secs
            )));
        }
        if self.rbl.lookup_timeout_secs == 0 {
            return Err(InboundError::Config(
                "rbl.lookup_timeout_secs must be positive".to_string(),
            ));
        }
        if self.policy.evaluator_timeout_secs == 0 {
            return Err(InboundError::Config(
                "policy.evaluator_timeout_secs must be positive".to_string(),
            ));
        }

        let domain = normalize_hostname(&self.server.domain);
        for recipient in &self.recipients {
            let normalized = normalize_address(recipient);
            validate_email(&normalized)
                .map_err(|e| InboundError::Config(format!("recipients: {}", e)))?;

            let in_domain = split_address(&normalized)
                .map(|(_, recipient_domain)| recipient_domain == domain)
                .unwrap_or(false);
            if !in_domain {
                return Err(InboundError::Config(format!(
                    "recipients: {} is outside {}",
                    recipient, domain
                )));
            }
        }
        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| InboundError::Config(format!("{} is not a valid number: {}", name, value)))
}
