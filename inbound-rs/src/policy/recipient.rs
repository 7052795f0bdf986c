use crate::antispam::{GreylistDecision, GreylistEngine, GreylistKey};
use crate::policy::decision::{RcptDecision, Rejection, RecipientVerdict};
use crate::settings::Settings;
use crate::utils::normalize_address;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, info};

/// Check a RCPT address against the served domain and the mailbox allowlist
///
/// The domain check is a hard relay boundary and applies even when the
/// allowlist would otherwise match.
pub fn authorize_recipient(address: &str, settings: &Settings) -> RecipientVerdict {
    let normalized = normalize_address(address);
    let suffix = format!("@{}", settings.domain);

    if !normalized.ends_with(&suffix) {
        return RecipientVerdict::RejectDomain;
    }

    // In the domain, but no mailbox can have an empty local part
    if normalized.len() == suffix.len() {
        return RecipientVerdict::RejectMailbox;
    }

    if !settings.recipients.is_empty() && !settings.recipients.contains(&normalized) {
        return RecipientVerdict::RejectMailbox;
    }

    RecipientVerdict::Allow
}

/// RCPT pipeline: authorization first, greylisting only for addresses that
/// would be accepted
pub struct RecipientAuthorizer {
    greylist: Arc<GreylistEngine>,
}

impl RecipientAuthorizer {
    pub fn new(greylist: Arc<GreylistEngine>) -> Self {
        Self { greylist }
    }

    pub fn greylist(&self) -> &Arc<GreylistEngine> {
        &self.greylist
    }

    pub fn evaluate(
        &self,
        client_ip: IpAddr,
        mail_from: Option<&str>,
        rcpt_to: &str,
        settings: &Settings,
    ) -> RcptDecision {
        match authorize_recipient(rcpt_to, settings) {
            RecipientVerdict::RejectDomain => {
                info!("Relay denied for {} from {}", rcpt_to, client_ip);
                return RcptDecision::Reject(Rejection::relay_denied());
            }
            RecipientVerdict::RejectMailbox => {
                info!("Unknown mailbox {} from {}", rcpt_to, client_ip);
                return RcptDecision::Reject(Rejection::mailbox_unavailable());
            }
            RecipientVerdict::Allow => {}
        }

        let key = GreylistKey::new(client_ip, mail_from, &normalize_address(rcpt_to));
        match self.greylist.check(&settings.greylist, key) {
            GreylistDecision::Allow => {
                debug!("Recipient {} accepted from {}", rcpt_to, client_ip);
                RcptDecision::Accept
            }
            GreylistDecision::TempFail(wait) => {
                info!("Greylisted {} -> {} ({}s)", client_ip, rcpt_to, wait);
                RcptDecision::Reject(Rejection::greylisted(wait))
            }
        }
    }
}
