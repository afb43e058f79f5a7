#![allow(dead_code)]

use async_trait::async_trait;
use paygate::application::gateway::PaymentGateway;
use paygate::application::registry::MethodRegistry;
use paygate::application::retry::RetryPolicy;
use paygate::config::RetryPolicies;
use paygate::domain::handler::{PaymentMethodHandler, StepOutcome};
use paygate::domain::payment::{Money, PaymentRequest};
use paygate::infrastructure::in_memory::InMemoryTransactionStore;
use paygate::infrastructure::notifier::LogNotifier;
use rust_decimal_macros::dec;
use std::collections::VecDeque;
use std::fs::File;
use std::io::Error;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

pub const HEADER: [&str; 7] = [
    "request_id",
    "method",
    "amount",
    "currency",
    "payer",
    "payee",
    "idempotency_key",
];

/// Writes `rows` UPI payments with distinct idempotency keys.
pub fn generate_csv(path: &Path, rows: usize) -> Result<(), Error> {
    let file = File::create(path)?;
    let mut wtr = csv::WriterBuilder::new().from_writer(file);

    wtr.write_record(HEADER)?;

    for i in 1..=rows {
        wtr.write_record([
            format!("r-{i}").as_str(),
            "UPI",
            "1.00",
            "INR",
            "alice@okbank",
            "bob@ybl",
            format!("key-{i}").as_str(),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}

/// Handler that plays back queued outcomes (defaulting to success) and
/// counts its calls. Authorize or capture can be held open until released.
#[derive(Default)]
pub struct ScriptedHandler {
    validate: Mutex<VecDeque<StepOutcome>>,
    authorize: Mutex<VecDeque<StepOutcome>>,
    capture: Mutex<VecDeque<StepOutcome>>,
    pub authorize_calls: AtomicU32,
    pub capture_calls: AtomicU32,
    gate: Option<StepGate>,
    capture_gate: Option<StepGate>,
}

pub struct StepGate {
    pub entered: Arc<Notify>,
    pub release: Arc<Notify>,
}

impl ScriptedHandler {
    pub fn always_succeeds() -> Self {
        Self::default()
    }

    pub fn authorize_with(self, outcomes: impl IntoIterator<Item = StepOutcome>) -> Self {
        self.authorize.lock().unwrap().extend(outcomes);
        self
    }

    pub fn capture_with(self, outcomes: impl IntoIterator<Item = StepOutcome>) -> Self {
        self.capture.lock().unwrap().extend(outcomes);
        self
    }

    pub fn validate_with(self, outcome: StepOutcome) -> Self {
        self.validate.lock().unwrap().push_back(outcome);
        self
    }

    /// Authorization signals `entered` and then waits for `release`.
    pub fn gated(mut self, gate: StepGate) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Capture signals `entered` and then waits for `release`.
    pub fn gated_capture(mut self, gate: StepGate) -> Self {
        self.capture_gate = Some(gate);
        self
    }

    pub fn authorize_calls(&self) -> u32 {
        self.authorize_calls.load(Ordering::SeqCst)
    }

    pub fn capture_calls(&self) -> u32 {
        self.capture_calls.load(Ordering::SeqCst)
    }

    fn next(queue: &Mutex<VecDeque<StepOutcome>>) -> StepOutcome {
        queue
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(StepOutcome::Success)
    }
}

#[async_trait]
impl PaymentMethodHandler for ScriptedHandler {
    fn validate(&self, request: &PaymentRequest) -> StepOutcome {
        if request.amount.value <= dec!(0) {
            return StepOutcome::Declined("Amount must be positive".to_string());
        }
        Self::next(&self.validate)
    }

    async fn authorize(&self, _request: &PaymentRequest) -> StepOutcome {
        self.authorize_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }
        Self::next(&self.authorize)
    }

    async fn capture(&self, _request: &PaymentRequest) -> StepOutcome {
        self.capture_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.capture_gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }
        Self::next(&self.capture)
    }
}

pub fn fast_policies(max_attempts: u32) -> RetryPolicies {
    RetryPolicies::new(
        RetryPolicy::new(
            max_attempts,
            Duration::from_millis(1),
            Duration::from_millis(5),
            0.0,
        )
        .unwrap(),
    )
}

/// Gateway with `handler` registered as UPI, an in-memory store, and a
/// log notifier.
pub fn gateway_with(handler: Arc<ScriptedHandler>) -> PaymentGateway {
    let registry = MethodRegistry::new();
    registry
        .register("UPI", move || Arc::clone(&handler) as Arc<dyn PaymentMethodHandler>)
        .unwrap();
    PaymentGateway::new(
        Arc::new(registry),
        fast_policies(3),
        Box::new(InMemoryTransactionStore::new()),
        Arc::new(LogNotifier),
    )
}

pub fn upi_request(amount: rust_decimal::Decimal, key: &str) -> PaymentRequest {
    PaymentRequest::new(
        "UPI",
        Money::new(amount, "INR"),
        "alice@okbank",
        "bob@ybl",
        key,
    )
}
