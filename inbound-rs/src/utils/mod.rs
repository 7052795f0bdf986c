//! Utility modules
//!
//! - [`dns`]: resolver seam and DNSBL name helpers
//! - [`email`]: address validation and normalization

pub mod dns;
pub mod email;

pub use dns::{DnsResolver, SystemResolver};
pub use email::{normalize_address, normalize_hostname, validate_email};
