/// Stable, machine-checkable reason for a refusal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReasonCode {
    TlsRequired,
    TooManyConnections,
    RblListed,
    RelayDenied,
    MailboxUnavailable,
    NoValidRecipients,
    Greylisted,
    DmarcFailure,
    MessageTooLarge,
    ProcessingError,
    TemporaryFailure,
}

impl ReasonCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasonCode::TlsRequired => "tls_required",
            ReasonCode::TooManyConnections => "too_many_connections",
            ReasonCode::RblListed => "rbl_listed",
            ReasonCode::RelayDenied => "relay_denied",
            ReasonCode::MailboxUnavailable => "mailbox_unavailable",
            ReasonCode::NoValidRecipients => "no_valid_recipients",
            ReasonCode::Greylisted => "greylisted",
            ReasonCode::DmarcFailure => "dmarc_failure",
            ReasonCode::MessageTooLarge => "message_too_large",
            ReasonCode::ProcessingError => "processing_error",
            ReasonCode::TemporaryFailure => "temporary_failure",
        }
    }
}

impl std::fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A refusal, ready for the transport layer to turn into a reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub reason: ReasonCode,
    /// SMTP reply code
    pub code: u16,
    /// RFC 3463 enhanced status code
    pub enhanced: &'static str,
    pub message: String,
}

impl Rejection {
    fn new(reason: ReasonCode, code: u16, enhanced: &'static str, message: &str) -> Self {
        Self {
            reason,
            code,
            enhanced,
            message: message.to_string(),
        }
    }

    pub fn tls_required() -> Self {
        Self::new(ReasonCode::TlsRequired, 530, "5.7.0", "STARTTLS required")
    }

    pub fn too_many_connections() -> Self {
        Self::new(
            ReasonCode::TooManyConnections,
            421,
            "4.7.0",
            "too many connections from your host",
        )
    }

    pub fn rbl_listed() -> Self {
        Self::new(ReasonCode::RblListed, 554, "5.7.1", "access denied (listed)")
    }

    pub fn relay_denied() -> Self {
        Self::new(ReasonCode::RelayDenied, 550, "5.1.1", "relaying denied")
    }

    pub fn mailbox_unavailable() -> Self {
        Self::new(ReasonCode::MailboxUnavailable, 550, "5.1.1", "mailbox unavailable")
    }

    /// DATA with no recipient accepted in the transaction
    pub fn no_valid_recipients() -> Self {
        Self::new(
            ReasonCode::NoValidRecipients,
            554,
            "5.5.1",
            "no valid recipients",
        )
    }

    pub fn greylisted(wait_secs: u64) -> Self {
        Self::new(
            ReasonCode::Greylisted,
            450,
            "4.7.1",
            &format!("greylisted; wait {}s", wait_secs),
        )
    }

    pub fn dmarc_failure() -> Self {
        Self::new(ReasonCode::DmarcFailure, 550, "5.7.1", "DMARC policy failure")
    }

    pub fn message_too_large() -> Self {
        Self::new(ReasonCode::MessageTooLarge, 552, "5.3.4", "message too large")
    }

    pub fn processing_error() -> Self {
        Self::new(ReasonCode::ProcessingError, 451, "4.3.0", "processing error")
    }

    pub fn temporary_failure() -> Self {
        Self::new(
            ReasonCode::TemporaryFailure,
            421,
            "4.3.0",
            "temporary failure, try again later",
        )
    }

    /// 4xx: the sender should retry
    pub fn is_temporary(&self) -> bool {
        (400..500).contains(&self.code)
    }

    /// 5xx: the sender should give up
    pub fn is_permanent(&self) -> bool {
        (500..600).contains(&self.code)
    }
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} {}", self.code, self.enhanced, self.message)
    }
}

/// Per-recipient verdict of the domain/allowlist check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecipientVerdict {
    Allow,
    RejectDomain,
    RejectMailbox,
}

/// Outcome of a RCPT command after authorization and greylisting
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RcptDecision {
    Accept,
    Reject(Rejection),
}

/// Final outcome for a received message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageVerdict {
    Accept,
    Reject(Rejection),
}

impl MessageVerdict {
    pub fn is_accept(&self) -> bool {
        matches!(self, MessageVerdict::Accept)
    }
}
