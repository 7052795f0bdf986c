use crate::error::InboundError;
use anyhow::Result;
use async_trait::async_trait;
use mail_auth::{AuthenticatedMessage, DmarcResult, Resolver};
use std::net::IpAddr;
use tracing::{debug, info, warn};

/// Outcome of DMARC evaluation for one message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DmarcStatus {
    Pass,
    Fail,
    /// The author domain publishes no DMARC record
    None,
    TempError,
    PermError,
}

impl std::fmt::Display for DmarcStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DmarcStatus::Pass => write!(f, "pass"),
            DmarcStatus::Fail => write!(f, "fail"),
            DmarcStatus::None => write!(f, "none"),
            DmarcStatus::TempError => write!(f, "temperror"),
            DmarcStatus::PermError => write!(f, "permerror"),
        }
    }
}

/// Envelope and connection facts handed to the evaluator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    pub remote_ip: IpAddr,
    pub helo: Option<String>,
    pub mx_hostname: String,
    /// `None` for the null reverse-path
    pub mail_from: Option<String>,
    pub rcpt_to: Vec<String>,
}

/// What the evaluator reports back
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AuthSummary {
    /// `None` when no result could be determined
    pub dmarc: Option<DmarcStatus>,
}

impl AuthSummary {
    pub fn dmarc_passed(&self) -> bool {
        self.dmarc == Some(DmarcStatus::Pass)
    }
}

/// DKIM/SPF/DMARC evaluation of a received message
///
/// Errors are opaque to callers: any failure means "no result".
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AuthEvaluator: Send + Sync {
    async fn evaluate(&self, raw_message: &[u8], context: &AuthContext) -> Result<AuthSummary>;
}

/// Evaluator backed by `mail-auth`
pub struct MailAuthEvaluator {
    resolver: Resolver,
}

impl MailAuthEvaluator {
    /// Use the system DNS configuration
    pub fn new() -> Result<Self> {
        let resolver = Resolver::new_system_conf().map_err(|e| {
            InboundError::Authentication(format!("Failed to create DNS resolver: {}", e))
        })?;
        Ok(Self { resolver })
    }

    pub fn with_resolver(resolver: Resolver) -> Self {
        Self { resolver }
    }
}

#[async_trait]
impl AuthEvaluator for MailAuthEvaluator {
    async fn evaluate(&self, raw_message: &[u8], context: &AuthContext) -> Result<AuthSummary> {
        let message = AuthenticatedMessage::parse(raw_message)
            .ok_or_else(|| InboundError::Authentication("unparseable message".to_string()))?;

        let dkim = self.resolver.verify_dkim(&message).await;
        debug!("DKIM produced {} signature results", dkim.len());

        // SPF HELO checks need some identity; fall back to our own MX name
        let helo = context
            .helo
            .as_deref()
            .filter(|h| !h.is_empty())
            .unwrap_or(context.mx_hostname.as_str());
        let sender_domain = context
            .mail_from
            .as_deref()
            .and_then(|addr| addr.rsplit_once('@'))
            .map(|(_, domain)| domain)
            .filter(|domain| !domain.is_empty());

        let spf = match (&context.mail_from, sender_domain) {
            (Some(mail_from), Some(_)) => {
                self.resolver
                    .verify_spf_sender(context.remote_ip, helo, &context.mx_hostname, mail_from)
                    .await
            }
            _ => {
                self.resolver
                    .verify_spf_helo(context.remote_ip, helo, &context.mx_hostname)
                    .await
            }
        };
        debug!("SPF result: {:?}", spf.result());

        let dmarc = self
            .resolver
            .verify_dmarc(&message, &dkim, sender_domain.unwrap_or(helo), &spf)
            .await;

        let status = dmarc_status(dmarc.dkim_result(), dmarc.spf_result());
        info!(
            "DMARC {} for message from {} (dkim={}, spf={})",
            status,
            context.remote_ip,
            dmarc.dkim_result(),
            dmarc.spf_result()
        );
        if matches!(status, DmarcStatus::TempError) {
            warn!("DMARC evaluation hit a temporary DNS error");
        }

        Ok(AuthSummary {
            dmarc: Some(status),
        })
    }
}

/// Collapse the aligned DKIM and SPF outcomes into one DMARC status
pub(crate) fn dmarc_status(dkim: &DmarcResult, spf: &DmarcResult) -> DmarcStatus {
    match (dkim, spf) {
        (DmarcResult::Pass, _) | (_, DmarcResult::Pass) => DmarcStatus::Pass,
        (DmarcResult::None, DmarcResult::None) => DmarcStatus::None,
        (DmarcResult::TempError(_), _) | (_, DmarcResult::TempError(_)) => DmarcStatus::TempError,
        (DmarcResult::PermError(_), _) | (_, DmarcResult::PermError(_)) => DmarcStatus::PermError,
        _ => DmarcStatus::Fail,
    }
}
