use crate::policy::decision::Rejection;
use crate::security::{ConnectionGuard, ConnectionTracker, RblChecker, RblStatus};
use crate::settings::Settings;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// What the transport knows about a connection when it opens
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionFacts {
    pub remote_ip: IpAddr,
    pub tls_established: bool,
    /// Announced HELO/EHLO name, when already known
    pub client_hostname: Option<String>,
}

impl ConnectionFacts {
    pub fn new(remote_ip: IpAddr, tls_established: bool) -> Self {
        Self {
            remote_ip,
            tls_established,
            client_hostname: None,
        }
    }
}

/// Admission outcome. An admitted connection owns its slot via the guard.
#[derive(Debug)]
pub enum AdmissionDecision {
    Admit(ConnectionGuard),
    Reject(Rejection),
}

/// Per-connection gatekeeper, run before any command is processed
///
/// Rules, first failure wins:
/// 1. encryption required but the connection is plaintext
/// 2. more concurrent connections from this IP than the ceiling allows
/// 3. the IP is listed in a configured DNS blocklist
pub struct AdmissionController {
    tracker: Arc<ConnectionTracker>,
    rbl: RblChecker,
}

impl AdmissionController {
    pub fn new(tracker: Arc<ConnectionTracker>, rbl: RblChecker) -> Self {
        Self { tracker, rbl }
    }

    pub fn tracker(&self) -> &Arc<ConnectionTracker> {
        &self.tracker
    }

    pub async fn evaluate(&self, facts: &ConnectionFacts, settings: &Settings) -> AdmissionDecision {
        let ip = facts.remote_ip;

        if settings.requires_tls() && !facts.tls_established {
            warn!("Rejecting plaintext connection from {}: TLS required", ip);
            return AdmissionDecision::Reject(Rejection::tls_required());
        }

        // Taken before the DNS lookups so an abandoned decision still
        // releases the slot when this future is dropped
        let guard = match self.tracker.acquire(ip) {
            Ok(guard) => guard,
            Err(e) => {
                error!("Cannot evaluate admission for {}: {}", ip, e);
                return AdmissionDecision::Reject(Rejection::temporary_failure());
            }
        };

        if guard.active() > settings.max_connections_per_ip {
            warn!(
                "Too many connections from {} ({} > {})",
                ip,
                guard.active(),
                settings.max_connections_per_ip
            );
            drop(guard);
            return AdmissionDecision::Reject(Rejection::too_many_connections());
        }

        match self.rbl.check(ip, &settings.rbl).await {
            RblStatus::Listed { zone } => {
                info!("Rejecting {}: listed in {}", ip, zone);
                return AdmissionDecision::Reject(Rejection::rbl_listed());
            }
            RblStatus::Clean => debug!("{} not listed in any zone", ip),
            RblStatus::Skipped => {}
        }

        info!("Admitted connection from {} ({} active)", ip, guard.active());
        AdmissionDecision::Admit(guard)
    }
}
