//! Message authentication policy
//!
//! - [`evaluator`]: DKIM/SPF/DMARC evaluation seam and its `mail-auth` backend
//! - [`gate`]: the accept/reject decision taken once DATA is complete

pub mod evaluator;
pub mod gate;

pub use evaluator::{AuthContext, AuthEvaluator, AuthSummary, DmarcStatus, MailAuthEvaluator};
pub use gate::AuthenticationGate;
