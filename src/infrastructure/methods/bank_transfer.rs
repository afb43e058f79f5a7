use super::{check_common, classify, declined, has_minor_units_at_most};
use crate::domain::handler::{PaymentMethodHandler, StepOutcome};
use crate::domain::payment::{PartyRef, PaymentRequest};
use crate::domain::ports::RailClientRef;
use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

pub const MINIMUM_TRANSFER: Decimal = dec!(1.00);

/// Account-to-account transfers. Both parties are account identifiers
/// (IBAN or domestic account number, 8 to 34 alphanumerics).
pub struct BankTransferHandler {
    rail: RailClientRef,
}

impl BankTransferHandler {
    pub fn new(rail: RailClientRef) -> Self {
        Self { rail }
    }
}

fn is_account(party: &PartyRef) -> bool {
    let account = party.as_str();
    (8..=34).contains(&account.len()) && account.chars().all(|c| c.is_ascii_alphanumeric())
}

#[async_trait]
impl PaymentMethodHandler for BankTransferHandler {
    fn validate(&self, request: &PaymentRequest) -> StepOutcome {
        let amount = match check_common(request) {
            Ok(amount) => amount,
            Err(reason) => return declined(reason),
        };
        if amount.value() < MINIMUM_TRANSFER {
            return declined(format!(
                "bank transfers start at {MINIMUM_TRANSFER} {}",
                request.amount.currency
            ));
        }
        if !has_minor_units_at_most(amount.value(), 2) {
            return declined("transfer amounts carry at most two decimal places");
        }
        if !is_account(&request.payer) || !is_account(&request.payee) {
            return declined("payer and payee must be bank account identifiers");
        }
        StepOutcome::Success
    }

    async fn authorize(&self, request: &PaymentRequest) -> StepOutcome {
        classify("bank", self.rail.authorize(request).await)
    }

    async fn capture(&self, request: &PaymentRequest) -> StepOutcome {
        classify("bank", self.rail.capture(request).await)
    }
}
