//! Email storage module
//!
//! Provides the spool delivery sink:
//! - [`maildir`]: per-recipient Maildir with tmp-then-rename writes

pub mod maildir;

pub use maildir::MaildirStorage;
