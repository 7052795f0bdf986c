use super::evaluator::{AuthContext, AuthEvaluator, AuthSummary};
use crate::policy::decision::{MessageVerdict, Rejection};
use crate::settings::Settings;
use std::sync::Arc;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Final per-message policy, run once the whole message is buffered
///
/// When DMARC is required, anything short of a "pass" rejects. That
/// includes the evaluator being absent, failing or timing out.
pub struct AuthenticationGate {
    evaluator: Option<Arc<dyn AuthEvaluator>>,
}

impl AuthenticationGate {
    pub fn new(evaluator: Arc<dyn AuthEvaluator>) -> Self {
        Self {
            evaluator: Some(evaluator),
        }
    }

    /// Gate with no evaluator: every result is absent
    pub fn without_evaluator() -> Self {
        Self { evaluator: None }
    }

    /// Run the evaluator, collapsing every failure into an empty summary
    pub async fn authenticate(
        &self,
        raw_message: &[u8],
        context: &AuthContext,
        settings: &Settings,
    ) -> AuthSummary {
        let Some(evaluator) = &self.evaluator else {
            debug!("No authentication evaluator configured");
            return AuthSummary::default();
        };

        let limit = settings.policy.evaluator_timeout;
        match timeout(limit, evaluator.evaluate(raw_message, context)).await {
            Ok(Ok(summary)) => summary,
            Ok(Err(e)) => {
                warn!("Authentication evaluator failed for {}: {:#}", context.remote_ip, e);
                AuthSummary::default()
            }
            Err(_) => {
                warn!(
                    "Authentication evaluator timed out after {:?} for {}",
                    limit, context.remote_ip
                );
                AuthSummary::default()
            }
        }
    }

    /// Decide on a fully received message
    pub async fn evaluate(
        &self,
        raw_message: &[u8],
        context: &AuthContext,
        settings: &Settings,
    ) -> (MessageVerdict, AuthSummary) {
        if raw_message.len() > settings.max_message_size {
            info!(
                "Message from {} too large ({} > {} bytes)",
                context.remote_ip,
                raw_message.len(),
                settings.max_message_size
            );
            return (
                MessageVerdict::Reject(Rejection::message_too_large()),
                AuthSummary::default(),
            );
        }

        let summary = self.authenticate(raw_message, context, settings).await;

        if settings.policy.require_dmarc && !summary.dmarc_passed() {
            info!(
                "Rejecting message from {}: DMARC {}",
                context.remote_ip,
                summary
                    .dmarc
                    .map(|status| status.to_string())
                    .unwrap_or_else(|| "unavailable".to_string())
            );
            return (MessageVerdict::Reject(Rejection::dmarc_failure()), summary);
        }

        (MessageVerdict::Accept, summary)
    }
}
