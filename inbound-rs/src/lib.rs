//! inbound-rs: inbound SMTP admission and policy engine
//!
//! Decides, for a receiving mail exchanger, whether a connection, a
//! recipient and finally a message are accepted. The SMTP wire protocol
//! itself belongs to the transport; this crate hands it decisions with
//! stable reason codes and reply texts.
//!
//! # Pipeline
//!
//! - **Admission**: TLS requirement, per-IP connection ceiling, DNS blocklists
//! - **Recipients**: served-domain boundary, mailbox allowlist, greylisting
//! - **Message**: size limit and DMARC requirement (fails closed)
//! - **Handoff**: one delivery record per accepted recipient, Maildir spool
//!
//! # Example
//!
//! ```no_run
//! use inbound_rs::config::Config;
//! use inbound_rs::policy::{ConnectionFacts, MessageVerdict};
//! use inbound_rs::server::InboundServer;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = Config::default();
//!     config.apply_env()?;
//!     inbound_rs::logging::init(&config.logging)?;
//!
//!     let server = Arc::new(InboundServer::from_config(&config)?);
//!     let _sweeper = server.spawn_sweeper();
//!
//!     let facts = ConnectionFacts::new("192.0.2.10".parse()?, false);
//!     let mut session = match server.connect(facts).await {
//!         Ok(session) => session,
//!         Err(rejection) => {
//!             println!("{}", rejection);
//!             return Ok(());
//!         }
//!     };
//!
//!     session.helo("mail.sender.example");
//!     session.mail_from(Some("alice@sender.example"));
//!     let _ = session.rcpt_to("info@example.com");
//!     let verdict = session.data(b"Subject: hello\r\n\r\nhi\r\n".to_vec()).await;
//!     assert!(matches!(verdict, MessageVerdict::Accept | MessageVerdict::Reject(_)));
//!
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! - [`config`]: Configuration file and environment overrides
//! - [`settings`]: Normalized immutable snapshot and its publication
//! - [`error`]: Error types and handling
//! - [`policy`]: Admission and recipient decisions
//! - [`antispam`]: Greylist engine
//! - [`security`]: Connection accounting and DNS blocklists
//! - [`authentication`]: DMARC evaluation and the message gate
//! - [`delivery`]: Handoff records and the sink seam
//! - [`storage`]: Maildir spool
//! - [`server`]: Service object and per-connection session

pub mod antispam;
pub mod authentication;
pub mod clock;
pub mod config;
pub mod delivery;
pub mod error;
pub mod logging;
pub mod policy;
pub mod security;
pub mod server;
pub mod settings;
pub mod storage;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use error::{InboundError, Result};
pub use server::{InboundServer, InboundSession};
pub use settings::Settings;
