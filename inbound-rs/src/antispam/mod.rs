/// Anti-spam module
///
/// Provides the greylist engine

pub mod greylist;
pub mod types;

pub use greylist::GreylistEngine;
pub use types::{GreylistDecision, GreylistEntry, GreylistKey};
