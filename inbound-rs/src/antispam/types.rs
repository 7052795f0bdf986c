use chrono::{DateTime, Utc};
use std::net::IpAddr;

/// Greylist triple
///
/// A null reverse-path (bounce) is kept as the empty string so it never
/// collides with a real sender address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GreylistKey {
    pub client_ip: String,
    pub mail_from: String,
    pub rcpt_to: String,
}

impl GreylistKey {
    pub fn new(client_ip: IpAddr, mail_from: Option<&str>, rcpt_to: &str) -> Self {
        GreylistKey {
            client_ip: client_ip.to_string(),
            mail_from: mail_from.unwrap_or_default().to_string(),
            rcpt_to: rcpt_to.to_lowercase(),
        }
    }
}

impl std::fmt::Display for GreylistKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}|{}|{}", self.client_ip, self.mail_from, self.rcpt_to)
    }
}

/// Greylist entry tracking a triple
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GreylistEntry {
    /// First time this triple was seen
    pub first_seen: DateTime<Utc>,
}

impl GreylistEntry {
    pub fn new(first_seen: DateTime<Utc>) -> Self {
        GreylistEntry { first_seen }
    }

    /// Milliseconds since first contact, never negative
    pub fn elapsed_ms(&self, now: DateTime<Utc>) -> i64 {
        now.signed_duration_since(self.first_seen)
            .num_milliseconds()
            .max(0)
    }

    /// Older than the retention window
    pub fn is_expired(&self, now: DateTime<Utc>, ttl_secs: u64) -> bool {
        self.elapsed_ms(now) > secs_to_ms(ttl_secs)
    }
}

/// Greylist verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GreylistDecision {
    Allow,
    /// Retry no sooner than this many seconds
    TempFail(u64),
}

pub(crate) fn secs_to_ms(secs: u64) -> i64 {
    i64::try_from(secs.saturating_mul(1000)).unwrap_or(i64::MAX)
}
