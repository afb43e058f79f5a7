use super::{check_common, classify, declined, has_minor_units_at_most};
use crate::domain::handler::{PaymentMethodHandler, StepOutcome};
use crate::domain::payment::{PartyRef, PaymentRequest};
use crate::domain::ports::RailClientRef;
use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Per-transaction ceiling on the UPI switch.
pub const UPI_LIMIT: Decimal = dec!(100000);

/// Unified Payments Interface: INR only, parties addressed by VPA (`name@handle`).
pub struct UpiHandler {
    rail: RailClientRef,
}

impl UpiHandler {
    pub fn new(rail: RailClientRef) -> Self {
        Self { rail }
    }
}

fn is_vpa(party: &PartyRef) -> bool {
    let Some((name, handle)) = party.as_str().split_once('@') else {
        return false;
    };
    let valid = |s: &str| {
        !s.is_empty()
            && s
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
    };
    valid(name) && valid(handle)
}

#[async_trait]
impl PaymentMethodHandler for UpiHandler {
    fn validate(&self, request: &PaymentRequest) -> StepOutcome {
        let amount = match check_common(request) {
            Ok(amount) => amount,
            Err(reason) => return declined(reason),
        };
        if request.amount.currency.code() != "INR" {
            return declined(format!(
                "UPI only settles INR, got {}",
                request.amount.currency
            ));
        }
        if amount.value() > UPI_LIMIT {
            return declined(format!("amount exceeds UPI limit of {UPI_LIMIT}"));
        }
        if !has_minor_units_at_most(amount.value(), 2) {
            return declined("INR amounts carry at most two decimal places");
        }
        if !is_vpa(&request.payer) || !is_vpa(&request.payee) {
            return declined("payer and payee must be virtual payment addresses");
        }
        StepOutcome::Success
    }

    async fn authorize(&self, request: &PaymentRequest) -> StepOutcome {
        classify("upi", self.rail.authorize(request).await)
    }

    async fn capture(&self, request: &PaymentRequest) -> StepOutcome {
        classify("upi", self.rail.capture(request).await)
    }
}
