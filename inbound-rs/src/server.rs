//! Service object and per-connection session
//!
//! [`InboundServer`] owns the shared state (settings, connection counts,
//! greylist table) and the collaborators. The transport calls
//! [`InboundServer::connect`] when a peer connects and then drives the
//! returned [`InboundSession`] command by command.

use crate::antispam::GreylistEngine;
use crate::authentication::{AuthContext, AuthEvaluator, AuthenticationGate, MailAuthEvaluator};
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::delivery::{build_records, hand_off, DeliverySink};
use crate::error::Result;
use crate::policy::{
    AdmissionController, AdmissionDecision, ConnectionFacts, MessageVerdict, RcptDecision,
    RecipientAuthorizer, Rejection,
};
use crate::security::{ConnectionGuard, ConnectionTracker, RblChecker};
use crate::settings::{Settings, SettingsHandle};
use crate::storage::MaildirStorage;
use crate::utils::dns::{DnsResolver, SystemResolver};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

pub struct InboundServer {
    settings: Arc<SettingsHandle>,
    admission: AdmissionController,
    recipients: RecipientAuthorizer,
    gate: AuthenticationGate,
    sink: Arc<dyn DeliverySink>,
    clock: Arc<dyn Clock>,
}

impl InboundServer {
    pub fn new(
        settings: Settings,
        resolver: Arc<dyn DnsResolver>,
        evaluator: Option<Arc<dyn AuthEvaluator>>,
        sink: Arc<dyn DeliverySink>,
    ) -> Self {
        Self::with_clock(settings, resolver, evaluator, sink, Arc::new(SystemClock))
    }

    pub fn with_clock(
        settings: Settings,
        resolver: Arc<dyn DnsResolver>,
        evaluator: Option<Arc<dyn AuthEvaluator>>,
        sink: Arc<dyn DeliverySink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let gate = match evaluator {
            Some(evaluator) => AuthenticationGate::new(evaluator),
            None => AuthenticationGate::without_evaluator(),
        };

        Self {
            settings: Arc::new(SettingsHandle::new(settings)),
            admission: AdmissionController::new(
                Arc::new(ConnectionTracker::new()),
                RblChecker::new(resolver),
            ),
            recipients: RecipientAuthorizer::new(Arc::new(GreylistEngine::with_clock(
                clock.clone(),
            ))),
            gate,
            sink,
            clock,
        }
    }

    /// Production wiring: system DNS, `mail-auth`, Maildir spool
    pub fn from_config(config: &Config) -> Result<Self> {
        let settings = Settings::from_config(config)?;

        let resolver = Arc::new(SystemResolver::new(settings.rbl.lookup_timeout));
        let evaluator: Option<Arc<dyn AuthEvaluator>> = match MailAuthEvaluator::new() {
            Ok(evaluator) => Some(Arc::new(evaluator)),
            Err(e) => {
                warn!("Message authentication unavailable: {:#}", e);
                None
            }
        };
        let sink = Arc::new(MaildirStorage::new(settings.spool_dir.clone()));

        info!(
            "Inbound policy for {} (mx {}, mode {:?})",
            settings.domain, settings.mx_hostname, settings.mode
        );
        info!("  TLS required: {}", settings.requires_tls());
        info!("  Max connections per IP: {}", settings.max_connections_per_ip);
        info!("  RBL zones: {:?}", settings.rbl.zones);
        info!(
            "  Greylisting: {} ({}s delay)",
            settings.greylist.enabled, settings.greylist.min_delay_secs
        );
        info!("  Require DMARC: {}", settings.policy.require_dmarc);
        info!("  Spool: {}", settings.spool_dir.display());

        Ok(Self::new(settings, resolver, evaluator, sink))
    }

    /// Active snapshot
    pub fn settings(&self) -> Arc<Settings> {
        self.settings.current()
    }

    /// Publish new settings. Open sessions keep the snapshot they started with.
    pub fn reload(&self, settings: Settings) {
        self.settings.replace(settings);
    }

    pub fn tracker(&self) -> &Arc<ConnectionTracker> {
        self.admission.tracker()
    }

    pub fn greylist(&self) -> &Arc<GreylistEngine> {
        self.recipients.greylist()
    }

    /// Background purge of expired greylist entries
    pub fn spawn_sweeper(&self) -> JoinHandle<()> {
        let interval = Duration::from_secs(self.settings().greylist.sweep_interval_secs.max(1));
        Arc::clone(self.greylist()).spawn_sweeper(Arc::clone(&self.settings), interval)
    }

    /// Admission decision for a new connection
    pub async fn connect(
        self: &Arc<Self>,
        facts: ConnectionFacts,
    ) -> std::result::Result<InboundSession, Rejection> {
        let settings = self.settings.current();

        match self.admission.evaluate(&facts, &settings).await {
            AdmissionDecision::Admit(guard) => Ok(InboundSession {
                server: Arc::clone(self),
                settings,
                helo: facts.client_hostname.clone(),
                facts,
                guard,
                mail_from: None,
                rcpt_to: Vec::new(),
            }),
            AdmissionDecision::Reject(rejection) => Err(rejection),
        }
    }
}

/// One admitted connection
///
/// Holds its per-IP slot until dropped.
pub struct InboundSession {
    server: Arc<InboundServer>,
    settings: Arc<Settings>,
    facts: ConnectionFacts,
    guard: ConnectionGuard,
    helo: Option<String>,
    mail_from: Option<String>,
    /// Recipients accepted in the current transaction
    rcpt_to: Vec<String>,
}

impl InboundSession {
    pub fn remote_ip(&self) -> IpAddr {
        self.facts.remote_ip
    }

    /// Snapshot this session decides with
    pub fn settings(&self) -> &Arc<Settings> {
        &self.settings
    }

    /// Connections from this IP when the session was admitted
    pub fn active_connections(&self) -> usize {
        self.guard.active()
    }

    pub fn accepted_recipients(&self) -> &[String] {
        &self.rcpt_to
    }

    /// HELO/EHLO: records the name and aborts any transaction
    pub fn helo(&mut self, hostname: &str) {
        self.helo = Some(hostname.trim().to_string());
        self.reset();
    }

    /// MAIL FROM: starts a new transaction. `<>` is the null reverse-path.
    pub fn mail_from(&mut self, address: Option<&str>) {
        self.reset();
        self.mail_from = address
            .map(|a| {
                let trimmed = a.trim();
                trimmed
                    .strip_prefix('<')
                    .and_then(|s| s.strip_suffix('>'))
                    .unwrap_or(trimmed)
                    .trim()
                    .to_string()
            })
            .filter(|a| !a.is_empty());
    }

    /// RCPT TO: authorization, then greylisting
    pub fn rcpt_to(&mut self, address: &str) -> RcptDecision {
        let decision = self.server.recipients.evaluate(
            self.facts.remote_ip,
            self.mail_from.as_deref(),
            address,
            &self.settings,
        );

        if decision == RcptDecision::Accept {
            self.rcpt_to.push(address.trim().to_string());
        }
        decision
    }

    /// End of DATA: authentication policy, then handoff to the sink
    ///
    /// The transaction is over afterwards whatever the verdict.
    pub async fn data(&mut self, raw_message: Vec<u8>) -> MessageVerdict {
        if self.rcpt_to.is_empty() {
            info!(
                "Message from {} refused: no recipient accepted",
                self.facts.remote_ip
            );
            self.reset();
            return MessageVerdict::Reject(Rejection::no_valid_recipients());
        }

        let context = AuthContext {
            remote_ip: self.facts.remote_ip,
            helo: self.helo.clone(),
            mx_hostname: self.settings.mx_hostname.clone(),
            mail_from: self.mail_from.clone(),
            rcpt_to: self.rcpt_to.clone(),
        };

        let (verdict, summary) = self
            .server
            .gate
            .evaluate(&raw_message, &context, &self.settings)
            .await;

        if let MessageVerdict::Reject(rejection) = &verdict {
            info!("Message from {} rejected: {}", self.facts.remote_ip, rejection);
            self.reset();
            return verdict;
        }

        let records = build_records(
            self.mail_from.as_deref(),
            &self.rcpt_to,
            raw_message,
            self.server.clock.now(),
        );

        let verdict = match hand_off(self.server.sink.as_ref(), &records).await {
            Ok(_) => {
                info!(
                    "accepted from={} subject={:?} to={:?} dmarc={}",
                    self.mail_from.as_deref().unwrap_or("<>"),
                    records
                        .first()
                        .and_then(|r| r.subject_hint.as_deref())
                        .unwrap_or(""),
                    records.iter().map(|r| r.recipient.as_str()).collect::<Vec<_>>(),
                    summary
                        .dmarc
                        .map(|status| status.to_string())
                        .unwrap_or_else(|| "none".to_string())
                );
                MessageVerdict::Accept
            }
            Err(e) => {
                error!("Delivery handoff failed for {}: {}", self.facts.remote_ip, e);
                MessageVerdict::Reject(Rejection::processing_error())
            }
        };

        self.reset();
        verdict
    }

    /// RSET: forget the current transaction
    pub fn reset(&mut self) {
        self.mail_from = None;
        self.rcpt_to.clear();
    }
}

impl std::fmt::Debug for InboundSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InboundSession")
            .field("remote_ip", &self.facts.remote_ip)
            .field("helo", &self.helo)
            .field("mail_from", &self.mail_from)
            .field("rcpt_to", &self.rcpt_to)
            .finish()
    }
}
