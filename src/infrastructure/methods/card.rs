use super::{check_common, classify, declined, has_minor_units_at_most};
use crate::domain::handler::{PaymentMethodHandler, StepOutcome};
use crate::domain::payment::PaymentRequest;
use crate::domain::ports::RailClientRef;
use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

pub const CARD_LIMIT: Decimal = dec!(1000000);

/// Card payments. The payer must be a network token (`tok_...`); raw card
/// numbers are refused.
pub struct CardHandler {
    rail: RailClientRef,
}

impl CardHandler {
    pub fn new(rail: RailClientRef) -> Self {
        Self { rail }
    }
}

#[async_trait]
impl PaymentMethodHandler for CardHandler {
    fn validate(&self, request: &PaymentRequest) -> StepOutcome {
        let amount = match check_common(request) {
            Ok(amount) => amount,
            Err(reason) => return declined(reason),
        };
        let token = request.payer.as_str();
        if !token.starts_with("tok_") || token.len() <= "tok_".len() {
            return declined("card payer must be a tokenized card reference");
        }
        if token.chars().filter(char::is_ascii_digit).count() >= 12 {
            return declined("raw card numbers are not accepted");
        }
        if amount.value() > CARD_LIMIT {
            return declined(format!("amount exceeds card limit of {CARD_LIMIT}"));
        }
        if !has_minor_units_at_most(amount.value(), 2) {
            return declined("card amounts carry at most two decimal places");
        }
        StepOutcome::Success
    }

    async fn authorize(&self, request: &PaymentRequest) -> StepOutcome {
        classify("card", self.rail.authorize(request).await)
    }

    async fn capture(&self, request: &PaymentRequest) -> StepOutcome {
        classify("card", self.rail.capture(request).await)
    }
}
