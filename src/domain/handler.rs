use super::payment::PaymentRequest;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

/// Result of one pipeline step as reported by a handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Success,
    /// Definitive rejection. Never retried.
    Declined(String),
    /// Presumed recoverable by trying again.
    TransientFailure(String),
}

impl StepOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, StepOutcome::Success)
    }
}

impl fmt::Display for StepOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepOutcome::Success => f.write_str("success"),
            StepOutcome::Declined(reason) => write!(f, "declined: {reason}"),
            StepOutcome::TransientFailure(reason) => write!(f, "transient failure: {reason}"),
        }
    }
}

/// Validate/authorize/capture for one payment rail.
///
/// Implementations hold no per-call mutable state so one instance can serve
/// many concurrent transactions. They never see the transaction record; they
/// only report step outcomes.
#[async_trait]
pub trait PaymentMethodHandler: Send + Sync {
    /// Structural and business checks. Performs no I/O and never reports a
    /// transient failure.
    fn validate(&self, request: &PaymentRequest) -> StepOutcome;

    /// Reserves funds on the rail.
    async fn authorize(&self, request: &PaymentRequest) -> StepOutcome;

    /// Finalises a previous authorization. Keyed on the request's
    /// idempotency key so repeating it has a single external effect.
    async fn capture(&self, request: &PaymentRequest) -> StepOutcome;
}

pub type HandlerRef = Arc<dyn PaymentMethodHandler>;
pub type HandlerConstructor = Arc<dyn Fn() -> HandlerRef + Send + Sync>;
