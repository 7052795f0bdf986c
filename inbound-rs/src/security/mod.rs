//! Security module
//!
//! Connection-level abuse controls:
//! - [`connections`]: per-IP concurrent connection accounting
//! - [`rbl`]: DNS blocklist membership checks

pub mod connections;
pub mod rbl;

pub use connections::{ConnectionGuard, ConnectionTracker};
pub use rbl::{RblChecker, RblStatus};
