//! Built-in payment rail handlers.
//!
//! Each handler validates requests against its rail's rules and translates
//! the rail client's answers into step outcomes. Raw rail responses never
//! travel past this boundary.

pub mod bank_transfer;
pub mod card;
pub mod upi;

use crate::application::registry::MethodRegistry;
use crate::domain::handler::{HandlerRef, StepOutcome};
use crate::domain::payment::{Amount, PaymentRequest};
use crate::domain::ports::{RailClientRef, RailResponse};
use crate::error::Result;
use rust_decimal::Decimal;
use std::sync::Arc;

pub use bank_transfer::BankTransferHandler;
pub use card::CardHandler;
pub use upi::UpiHandler;

pub const UPI: &str = "UPI";
pub const CARD: &str = "CARD";
pub const BANK_TRANSFER: &str = "BANK_TRANSFER";

/// Rail clients backing the built-in handlers.
#[derive(Clone)]
pub struct RailClients {
    pub upi: RailClientRef,
    pub card: RailClientRef,
    pub bank_transfer: RailClientRef,
}

/// Registers the UPI, CARD, and BANK_TRANSFER handlers.
pub fn register_builtin(registry: &MethodRegistry, rails: &RailClients) -> Result<()> {
    let upi = Arc::clone(&rails.upi);
    registry.register(UPI, move || Arc::new(UpiHandler::new(Arc::clone(&upi))) as HandlerRef)?;

    let card = Arc::clone(&rails.card);
    registry.register(CARD, move || Arc::new(CardHandler::new(Arc::clone(&card))) as HandlerRef)?;

    let bank = Arc::clone(&rails.bank_transfer);
    registry.register(BANK_TRANSFER, move || {
        Arc::new(BankTransferHandler::new(Arc::clone(&bank))) as HandlerRef
    })?;
    Ok(())
}

/// Checks every rail applies, returning the validated amount.
pub(crate) fn check_common(request: &PaymentRequest) -> std::result::Result<Amount, String> {
    let amount =
        Amount::new(request.amount.value).map_err(|_| "Amount must be positive".to_string())?;
    if !request.amount.currency.is_well_formed() {
        return Err(format!(
            "malformed currency code '{}'",
            request.amount.currency
        ));
    }
    if request.idempotency_key.as_str().trim().is_empty() {
        return Err("missing idempotency key".to_string());
    }
    if request.payer.as_str().trim().is_empty() || request.payee.as_str().trim().is_empty() {
        return Err("payer and payee are required".to_string());
    }
    if request.payer == request.payee {
        return Err("payer and payee must differ".to_string());
    }
    Ok(amount)
}

pub(crate) fn has_minor_units_at_most(value: Decimal, places: u32) -> bool {
    value.normalize().scale() <= places
}

/// Maps a rail answer onto a step outcome.
pub(crate) fn classify(rail: &str, response: RailResponse) -> StepOutcome {
    match response {
        RailResponse::Success => StepOutcome::Success,
        RailResponse::RetryableFailure(reason) => {
            StepOutcome::TransientFailure(format!("{rail}: {reason}"))
        }
        RailResponse::FatalFailure(reason) => StepOutcome::Declined(format!("{rail}: {reason}")),
    }
}

pub(crate) fn declined(reason: impl Into<String>) -> StepOutcome {
    StepOutcome::Declined(reason.into())
}
