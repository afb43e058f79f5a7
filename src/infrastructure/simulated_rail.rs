use crate::domain::payment::{IdempotencyKey, PaymentRequest};
use crate::domain::ports::{RailClient, RailResponse};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Fault injection for a [`SimulatedRail`].
#[derive(Debug, Clone, Default)]
pub struct RailBehavior {
    /// Calls per idempotency key and operation that time out before the rail answers.
    pub transient_failures: u32,
    /// Capture calls per key whose effect is applied but whose response is lost.
    pub ambiguous_captures: u32,
    /// Authorizations above this amount are declined.
    pub decline_above: Option<Decimal>,
    pub latency: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RailOperation {
    Authorize,
    Capture,
}

#[derive(Debug, Default)]
struct Ledger {
    authorizations: HashMap<IdempotencyKey, Decimal>,
    captures: HashMap<IdempotencyKey, Decimal>,
    calls: HashMap<(RailOperation, IdempotencyKey), u32>,
}

/// An in-process stand-in for an external settlement network.
///
/// Authorizations and captures are keyed on the idempotency key, so a
/// capture repeated for the same key settles funds only once.
#[derive(Debug)]
pub struct SimulatedRail {
    name: String,
    behavior: RailBehavior,
    ledger: Mutex<Ledger>,
}

impl SimulatedRail {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_behavior(name, RailBehavior::default())
    }

    pub fn with_behavior(name: impl Into<String>, behavior: RailBehavior) -> Self {
        Self {
            name: name.into(),
            behavior,
            ledger: Mutex::new(Ledger::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn ledger(&self) -> MutexGuard<'_, Ledger> {
        self.ledger.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of times `operation` was requested for `key`.
    pub fn calls(&self, operation: RailOperation, key: &IdempotencyKey) -> u32 {
        self.ledger()
            .calls
            .get(&(operation, key.clone()))
            .copied()
            .unwrap_or(0)
    }

    pub fn authorized_amount(&self, key: &IdempotencyKey) -> Option<Decimal> {
        self.ledger().authorizations.get(key).copied()
    }

    pub fn captured_amount(&self, key: &IdempotencyKey) -> Option<Decimal> {
        self.ledger().captures.get(key).copied()
    }

    /// Total funds settled across all keys.
    pub fn total_captured(&self) -> Decimal {
        self.ledger().captures.values().copied().sum()
    }

    /// Distinct captures applied.
    pub fn capture_count(&self) -> usize {
        self.ledger().captures.len()
    }

    fn count_call(&self, operation: RailOperation, key: &IdempotencyKey) -> u32 {
        let mut ledger = self.ledger();
        let calls = ledger.calls.entry((operation, key.clone())).or_insert(0);
        *calls += 1;
        *calls
    }

    async fn simulate_latency(&self) {
        if !self.behavior.latency.is_zero() {
            tokio::time::sleep(self.behavior.latency).await;
        }
    }
}

#[async_trait]
impl RailClient for SimulatedRail {
    async fn authorize(&self, request: &PaymentRequest) -> RailResponse {
        self.simulate_latency().await;
        let key = &request.idempotency_key;
        let call = self.count_call(RailOperation::Authorize, key);
        if call <= self.behavior.transient_failures {
            return RailResponse::RetryableFailure(format!("{} timed out", self.name));
        }
        if let Some(limit) = self.behavior.decline_above
            && request.amount.value > limit
        {
            return RailResponse::FatalFailure("insufficient funds".to_string());
        }
        self.ledger()
            .authorizations
            .entry(key.clone())
            .or_insert(request.amount.value);
        RailResponse::Success
    }

    async fn capture(&self, request: &PaymentRequest) -> RailResponse {
        self.simulate_latency().await;
        let key = &request.idempotency_key;
        let call = self.count_call(RailOperation::Capture, key);
        if call <= self.behavior.transient_failures {
            return RailResponse::RetryableFailure(format!("{} timed out", self.name));
        }

        let mut ledger = self.ledger();
        let Some(amount) = ledger.authorizations.get(key).copied() else {
            return RailResponse::FatalFailure("no authorization for idempotency key".to_string());
        };
        ledger.captures.entry(key.clone()).or_insert(amount);
        drop(ledger);

        if call <= self.behavior.transient_failures + self.behavior.ambiguous_captures {
            return RailResponse::RetryableFailure(format!("{} response lost", self.name));
        }
        RailResponse::Success
    }
}
