//! Full transactions through InboundServer

mod common;

use chrono::Duration;
use common::{base_config, clock, FixedEvaluator, RecordingSink, StaticResolver, MESSAGE};
use inbound_rs::authentication::DmarcStatus;
use inbound_rs::clock::Clock;
use inbound_rs::policy::{ConnectionFacts, MessageVerdict, RcptDecision, ReasonCode, Rejection};
use inbound_rs::settings::Settings;
use inbound_rs::storage::MaildirStorage;
use inbound_rs::InboundServer;
use std::sync::Arc;
use tempfile::TempDir;

fn facts() -> ConnectionFacts {
    ConnectionFacts::new("10.0.0.5".parse().unwrap(), false)
}

#[tokio::test]
async fn test_greylisted_then_accepted_on_retry() {
    let clock = clock();
    let sink = Arc::new(RecordingSink::default());
    let settings = Settings::from_config(&base_config()).unwrap();
    let server = Arc::new(InboundServer::with_clock(
        settings,
        Arc::new(StaticResolver::new()),
        None,
        sink.clone(),
        clock.clone(),
    ));

    // First attempt is deferred for the full delay
    let mut session = server.connect(facts()).await.unwrap();
    session.helo("mail.sender.example");
    session.mail_from(Some("alice@sender.example"));
    assert_eq!(
        session.rcpt_to("sales@example.com"),
        RcptDecision::Reject(Rejection::greylisted(60))
    );
    drop(session);
    assert_eq!(server.tracker().active(&"10.0.0.5".parse().unwrap()), 0);

    // Retry after 61 seconds with the same triple
    clock.advance(Duration::seconds(61));
    let mut session = server.connect(facts()).await.unwrap();
    session.helo("mail.sender.example");
    session.mail_from(Some("alice@sender.example"));
    assert_eq!(session.rcpt_to("sales@example.com"), RcptDecision::Accept);

    let verdict = session.data(MESSAGE.to_vec()).await;
    assert_eq!(verdict, MessageVerdict::Accept);

    let records = sink.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].recipient, "sales@example.com");
    assert_eq!(records[0].envelope_from.as_deref(), Some("alice@sender.example"));
    assert_eq!(records[0].subject_hint.as_deref(), Some("Pricing"));
    assert_eq!(records[0].raw_message.as_slice(), MESSAGE);
    assert_eq!(records[0].received_at, clock.now());
}

#[tokio::test]
async fn test_early_retry_waits_remaining_time() {
    let clock = clock();
    let settings = Settings::from_config(&base_config()).unwrap();
    let server = Arc::new(InboundServer::with_clock(
        settings,
        Arc::new(StaticResolver::new()),
        None,
        Arc::new(RecordingSink::default()),
        clock.clone(),
    ));

    let mut session = server.connect(facts()).await.unwrap();
    session.mail_from(None);
    session.rcpt_to("sales@example.com");

    clock.advance(Duration::milliseconds(20_500));
    assert_eq!(
        session.rcpt_to("sales@example.com"),
        RcptDecision::Reject(Rejection::greylisted(40))
    );

    match session.rcpt_to("sales@example.com") {
        RcptDecision::Reject(r) => assert_eq!(r.reason, ReasonCode::Greylisted),
        RcptDecision::Accept => panic!("still inside the delay"),
    }

    // A real sender is a different triple from the null sender
    session.mail_from(Some("bounce@sender.example"));
    assert_eq!(
        session.rcpt_to("sales@example.com"),
        RcptDecision::Reject(Rejection::greylisted(60))
    );
}

#[tokio::test]
async fn test_dmarc_required_and_evaluator_fails() {
    let mut config = base_config();
    config.greylist.enabled = false;
    config.policy.require_dmarc = true;
    let sink = Arc::new(RecordingSink::default());
    let server = Arc::new(InboundServer::new(
        Settings::from_config(&config).unwrap(),
        Arc::new(StaticResolver::new()),
        Some(Arc::new(FixedEvaluator(None))),
        sink.clone(),
    ));

    let mut session = server.connect(facts()).await.unwrap();
    session.mail_from(Some("alice@sender.example"));
    assert_eq!(session.rcpt_to("sales@example.com"), RcptDecision::Accept);

    let verdict = session.data(MESSAGE.to_vec()).await;
    assert_eq!(verdict, MessageVerdict::Reject(Rejection::dmarc_failure()));
    assert!(sink.records().is_empty());
}

#[tokio::test]
async fn test_dmarc_required_and_passing() {
    let mut config = base_config();
    config.greylist.enabled = false;
    config.policy.require_dmarc = true;
    let sink = Arc::new(RecordingSink::default());
    let server = Arc::new(InboundServer::new(
        Settings::from_config(&config).unwrap(),
        Arc::new(StaticResolver::new()),
        Some(Arc::new(FixedEvaluator(Some(DmarcStatus::Pass)))),
        sink.clone(),
    ));

    let mut session = server.connect(facts()).await.unwrap();
    session.mail_from(Some("alice@sender.example"));
    session.rcpt_to("sales@example.com");
    session.rcpt_to("Sales@Example.com");
    session.rcpt_to("info@example.com");

    assert_eq!(session.data(MESSAGE.to_vec()).await, MessageVerdict::Accept);

    let recipients: Vec<String> = sink.records().into_iter().map(|r| r.recipient).collect();
    assert_eq!(recipients, vec!["sales@example.com", "info@example.com"]);
}

#[tokio::test]
async fn test_accepted_message_lands_in_maildir() {
    let spool = TempDir::new().unwrap();
    let mut config = base_config();
    config.greylist.enabled = false;
    config.storage.spool_dir = spool.path().to_string_lossy().to_string();
    let settings = Settings::from_config(&config).unwrap();
    let sink = Arc::new(MaildirStorage::new(settings.spool_dir.clone()));
    let server = Arc::new(InboundServer::new(
        settings,
        Arc::new(StaticResolver::new()),
        None,
        sink,
    ));

    let mut session = server.connect(facts()).await.unwrap();
    session.mail_from(Some("alice@sender.example"));
    session.rcpt_to("sales@example.com");
    assert_eq!(session.data(MESSAGE.to_vec()).await, MessageVerdict::Accept);

    let new_dir = spool.path().join("example.com/sales/Maildir/new");
    let stored: Vec<_> = std::fs::read_dir(new_dir).unwrap().flatten().collect();
    assert_eq!(stored.len(), 1);
    assert_eq!(std::fs::read(stored[0].path()).unwrap(), MESSAGE.to_vec());
}

#[tokio::test]
async fn test_oversized_message_rejected() {
    let mut config = base_config();
    config.greylist.enabled = false;
    config.smtp.max_message_size = 32;
    let sink = Arc::new(RecordingSink::default());
    let server = Arc::new(InboundServer::new(
        Settings::from_config(&config).unwrap(),
        Arc::new(StaticResolver::new()),
        None,
        sink.clone(),
    ));

    let mut session = server.connect(facts()).await.unwrap();
    session.mail_from(Some("alice@sender.example"));
    session.rcpt_to("sales@example.com");

    let verdict = session.data(MESSAGE.to_vec()).await;
    assert_eq!(verdict, MessageVerdict::Reject(Rejection::message_too_large()));
    assert!(sink.records().is_empty());
}

#[tokio::test]
async fn test_data_without_accepted_recipients_is_refused() {
    let sink = Arc::new(RecordingSink::default());
    let settings = Settings::from_config(&base_config()).unwrap();
    let server = Arc::new(InboundServer::with_clock(
        settings,
        Arc::new(StaticResolver::new()),
        Some(Arc::new(FixedEvaluator(Some(DmarcStatus::Pass)))),
        sink.clone(),
        clock(),
    ));

    let mut session = server.connect(facts()).await.unwrap();
    session.mail_from(Some("alice@sender.example"));
    assert_eq!(
        session.rcpt_to("sales@example.com"),
        RcptDecision::Reject(Rejection::greylisted(60))
    );
    assert_eq!(
        session.rcpt_to("sales@other.example"),
        RcptDecision::Reject(Rejection::relay_denied())
    );

    let verdict = session.data(MESSAGE.to_vec()).await;
    match verdict {
        MessageVerdict::Reject(rejection) => {
            assert_eq!(rejection, Rejection::no_valid_recipients());
            assert_eq!(rejection.reason, ReasonCode::NoValidRecipients);
            assert_eq!(rejection.to_string(), "554 5.5.1 no valid recipients");
        }
        MessageVerdict::Accept => panic!("message accepted with no recipients"),
    }
    assert!(sink.records().is_empty());
    assert!(session.accepted_recipients().is_empty());
}
