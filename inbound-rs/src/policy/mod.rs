//! Admission and recipient policy
//!
//! Decisions are values, not errors: every refusal is a [`Rejection`]
//! carrying a stable [`ReasonCode`] and the reply the transport should send.

pub mod admission;
pub mod decision;
pub mod recipient;

pub use admission::{AdmissionController, AdmissionDecision, ConnectionFacts};
pub use decision::{MessageVerdict, RcptDecision, ReasonCode, RecipientVerdict, Rejection};
pub use recipient::{authorize_recipient, RecipientAuthorizer};
