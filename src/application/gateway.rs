use crate::application::registry::MethodRegistry;
use crate::application::retry::{Attempt, RetryController, RetryError, RetryPolicy};
use crate::config::RetryPolicies;
use crate::domain::handler::{HandlerRef, StepOutcome};
use crate::domain::payment::{IdempotencyKey, MethodId, PaymentRequest, RequestId};
use crate::domain::ports::{NotifierRef, TransactionStoreBox};
use crate::domain::transaction::{Transaction, TransactionId, TransactionState};
use crate::error::{PaymentError, Result};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tracing::{Instrument, debug, error, info, info_span, warn};

pub const UNKNOWN_METHOD_REASON: &str = "unknown method";
pub const CANCELLED_REASON: &str = "cancelled by request";
pub const KEY_CONFLICT_REASON: &str = "idempotency key conflict";
pub const ABANDONED_REASON: &str = "submission abandoned";

/// Settled idempotency keys remembered for replay unless configured otherwise.
pub const DEFAULT_REPLAY_CAPACITY: usize = 100_000;

/// What the caller gets back from [`PaymentGateway::process_payment`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentOutcome {
    pub transaction_id: TransactionId,
    pub request_id: RequestId,
    pub method: MethodId,
    pub final_state: TransactionState,
    pub reason: Option<String>,
    /// Handler invocations spent on the retried steps.
    pub attempts: u32,
    /// Degraded-but-non-fatal conditions, such as failed persistence.
    pub warnings: Vec<String>,
}

impl PaymentOutcome {
    fn from_transaction(tx: &Transaction, warnings: Vec<String>) -> Self {
        Self {
            transaction_id: tx.id(),
            request_id: tx.request().request_id.clone(),
            method: tx.request().method.clone(),
            final_state: tx.state(),
            reason: tx.final_reason().map(str::to_string),
            attempts: tx.attempts(),
            warnings,
        }
    }

    fn abandoned(transaction_id: TransactionId, request: &PaymentRequest) -> Self {
        Self {
            transaction_id,
            request_id: request.request_id.clone(),
            method: request.method.clone(),
            final_state: TransactionState::Failed,
            reason: Some(ABANDONED_REASON.to_string()),
            attempts: 0,
            warnings: Vec::new(),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.final_state == TransactionState::Succeeded
    }
}

/// The two pipeline steps that go through the retry controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RetriedStep {
    Authorize,
    Capture,
}

impl fmt::Display for RetriedStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetriedStep::Authorize => f.write_str("authorize"),
            RetriedStep::Capture => f.write_str("capture"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum StepFailure {
    Declined(String),
    Transient(String),
    Cancelled,
}

impl fmt::Display for StepFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepFailure::Declined(reason) | StepFailure::Transient(reason) => f.write_str(reason),
            StepFailure::Cancelled => f.write_str(CANCELLED_REASON),
        }
    }
}

/// Shared between the task that owns a transaction and callers that want
/// to cancel it. Transitions are applied under this lock so a cancellation
/// either lands before the terminal transition or is refused after it.
#[derive(Debug)]
struct TransactionControl {
    inner: Mutex<ControlState>,
    cancelled: watch::Sender<bool>,
}

#[derive(Debug)]
struct ControlState {
    state: TransactionState,
    cancel_requested: bool,
}

enum Applied {
    Moved,
    Cancelled,
}

impl TransactionControl {
    fn new() -> Self {
        Self {
            inner: Mutex::new(ControlState {
                state: TransactionState::Created,
                cancel_requested: false,
            }),
            cancelled: watch::Sender::new(false),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ControlState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn request_cancel(&self) -> Result<()> {
        let mut control = self.lock();
        if !control.state.can_transition_to(TransactionState::Cancelled) {
            return Err(PaymentError::InvalidTransition {
                from: control.state,
                to: TransactionState::Cancelled,
            });
        }
        control.cancel_requested = true;
        self.cancelled.send_replace(true);
        Ok(())
    }

    fn is_cancel_requested(&self) -> bool {
        self.lock().cancel_requested
    }

    /// Completes once cancellation has been requested.
    async fn cancelled(&self) {
        let mut requested = self.cancelled.subscribe();
        // The sender lives in `self`, so this only ends when the flag is set.
        let _ = requested.wait_for(|requested| *requested).await;
    }

    fn apply(
        &self,
        tx: &mut Transaction,
        next: TransactionState,
        reason: Option<String>,
    ) -> Result<Applied> {
        let mut control = self.lock();
        if control.cancel_requested && !tx.is_terminal() {
            tx.transition(
                TransactionState::Cancelled,
                Some(CANCELLED_REASON.to_string()),
            )?;
            control.state = tx.state();
            return Ok(Applied::Cancelled);
        }
        match (next, reason) {
            (TransactionState::Failed, Some(reason)) => tx.fail(reason)?,
            (next, reason) => tx.transition(next, reason)?,
        }
        control.state = tx.state();
        Ok(Applied::Moved)
    }
}

enum KeySlot {
    InFlight {
        transaction_id: TransactionId,
        request: PaymentRequest,
        done: watch::Receiver<Option<PaymentOutcome>>,
    },
    Settled {
        request: PaymentRequest,
        outcome: PaymentOutcome,
    },
}

/// Idempotency slots by key. Settled entries are kept for replay up to
/// `capacity`, evicting the oldest first; an evicted key is treated as new.
struct KeyTable {
    slots: HashMap<IdempotencyKey, KeySlot>,
    settled: VecDeque<IdempotencyKey>,
    capacity: usize,
}

impl KeyTable {
    fn new(capacity: usize) -> Self {
        Self {
            slots: HashMap::new(),
            settled: VecDeque::new(),
            capacity,
        }
    }

    fn settle(&mut self, key: IdempotencyKey, request: PaymentRequest, outcome: PaymentOutcome) {
        self.slots
            .insert(key.clone(), KeySlot::Settled { request, outcome });
        self.settled.push_back(key);
        while self.settled.len() > self.capacity
            && let Some(oldest) = self.settled.pop_front()
        {
            if matches!(self.slots.get(&oldest), Some(KeySlot::Settled { .. })) {
                self.slots.remove(&oldest);
            }
        }
    }
}

enum Admission {
    Run(Ticket),
    Join(TransactionId, watch::Receiver<Option<PaymentOutcome>>),
    Replay(PaymentOutcome),
    Conflict,
}

struct Ticket {
    id: TransactionId,
    control: Arc<TransactionControl>,
    done: watch::Sender<Option<PaymentOutcome>>,
}

/// Marker for a pipeline that has reached a terminal state.
struct Halted;

type Progress = std::result::Result<(), Halted>;

/// Working state of one transaction, owned by the task processing it.
struct Run {
    tx: Transaction,
    control: Arc<TransactionControl>,
    warnings: Vec<String>,
}

/// Releases the idempotency slot if processing is dropped before it settles.
struct AdmissionGuard<'a> {
    gateway: &'a PaymentGateway,
    key: IdempotencyKey,
    id: TransactionId,
    settled: bool,
}

impl Drop for AdmissionGuard<'_> {
    fn drop(&mut self) {
        if !self.settled {
            warn!(transaction_id = %self.id, "Payment processing dropped before settling");
            self.gateway.lock_keys().slots.remove(&self.key);
            self.gateway.lock_controls().remove(&self.id);
        }
    }
}

/// Entry point of the payment core.
///
/// Resolves a handler per request, drives the transaction through
/// validate, authorize, and capture, retries the network steps, and
/// persists every transition. Each request is processed on the caller's
/// task; unrelated requests never wait on each other.
pub struct PaymentGateway {
    registry: Arc<MethodRegistry>,
    policies: RetryPolicies,
    retry: RetryController,
    store: TransactionStoreBox,
    notifier: NotifierRef,
    keys: Mutex<KeyTable>,
    controls: Mutex<HashMap<TransactionId, Arc<TransactionControl>>>,
}

impl PaymentGateway {
    /// Creates a new `PaymentGateway`.
    ///
    /// # Arguments
    ///
    /// * `registry` - Payment methods available to requests.
    /// * `policies` - Retry policy per payment method.
    /// * `store` - Where every transaction transition is saved.
    /// * `notifier` - Told about terminal states.
    pub fn new(
        registry: Arc<MethodRegistry>,
        policies: RetryPolicies,
        store: TransactionStoreBox,
        notifier: NotifierRef,
    ) -> Self {
        Self {
            registry,
            policies,
            retry: RetryController::new(),
            store,
            notifier,
            keys: Mutex::new(KeyTable::new(DEFAULT_REPLAY_CAPACITY)),
            controls: Mutex::new(HashMap::new()),
        }
    }

    /// Bounds how many settled idempotency keys are remembered for replay.
    pub fn with_replay_capacity(self, capacity: usize) -> Self {
        self.lock_keys().capacity = capacity;
        self
    }

    pub fn registry(&self) -> &MethodRegistry {
        &self.registry
    }

    /// Processes one payment to a terminal state.
    ///
    /// Never fails: every problem is reported through the outcome's state
    /// and reason. A request whose idempotency key is already in flight
    /// waits for and shares that outcome; one already settled replays it.
    pub async fn process_payment(&self, request: PaymentRequest) -> PaymentOutcome {
        let ticket = match self.admit(&request) {
            Admission::Run(ticket) => ticket,
            Admission::Replay(outcome) => {
                debug!(transaction_id = %outcome.transaction_id, "Replaying settled outcome");
                return outcome;
            }
            Admission::Join(id, done) => return Self::join(id, &request, done).await,
            Admission::Conflict => return self.reject_conflict(request).await,
        };

        let mut guard = AdmissionGuard {
            gateway: self,
            key: request.idempotency_key.clone(),
            id: ticket.id,
            settled: false,
        };

        let span = info_span!(
            "payment",
            transaction_id = %ticket.id,
            method = %request.method,
            request_id = %request.request_id,
        );
        let mut run = Run {
            tx: Transaction::new(ticket.id, request.clone()),
            control: Arc::clone(&ticket.control),
            warnings: Vec::new(),
        };
        self.drive(&mut run).instrument(span).await;

        let outcome = self.settle(run, request, &ticket);
        guard.settled = true;
        outcome
    }

    /// Requests cancellation of a transaction that has not started capturing.
    ///
    /// A live transaction moves to `Cancelled` at its next step boundary, or
    /// at once if it is waiting out a retry delay. No handler call starts
    /// after this returns, and the result of an authorization already in
    /// flight is discarded. Once capture has begun the request is refused
    /// with [`PaymentError::InvalidTransition`]; the capture result settles
    /// the transaction.
    pub async fn cancel_payment(&self, id: TransactionId) -> Result<()> {
        let control = self.lock_controls().get(&id).cloned();
        if let Some(control) = control {
            control.request_cancel()?;
            info!(transaction_id = %id, "Cancellation requested");
            return Ok(());
        }

        // Not owned by any task: cancel the stored record directly.
        let mut tx = self
            .store
            .load(id)
            .await?
            .ok_or(PaymentError::TransactionNotFound(id))?;
        tx.transition(
            TransactionState::Cancelled,
            Some(CANCELLED_REASON.to_string()),
        )?;
        self.store.save(&tx).await?;
        info!(transaction_id = %id, "Cancelled orphaned transaction");
        self.notify(id, TransactionState::Cancelled);
        Ok(())
    }

    /// The transaction created for `key`, if any.
    pub fn transaction_id_for(&self, key: &IdempotencyKey) -> Option<TransactionId> {
        self.lock_keys().slots.get(key).map(|slot| match slot {
            KeySlot::InFlight { transaction_id, .. } => *transaction_id,
            KeySlot::Settled { outcome, .. } => outcome.transaction_id,
        })
    }

    /// Loads a transaction record from the store.
    pub async fn transaction(&self, id: TransactionId) -> Result<Option<Transaction>> {
        self.store.load(id).await
    }

    pub async fn transactions(&self) -> Result<Vec<Transaction>> {
        self.store.all_transactions().await
    }

    fn lock_keys(&self) -> MutexGuard<'_, KeyTable> {
        self.keys.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_controls(&self) -> MutexGuard<'_, HashMap<TransactionId, Arc<TransactionControl>>> {
        self.controls.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn admit(&self, request: &PaymentRequest) -> Admission {
        let mut keys = self.lock_keys();
        match keys.slots.get(&request.idempotency_key) {
            Some(KeySlot::InFlight {
                transaction_id,
                request: first,
                done,
            }) => {
                if first.same_payment_as(request) {
                    Admission::Join(*transaction_id, done.clone())
                } else {
                    Admission::Conflict
                }
            }
            Some(KeySlot::Settled {
                request: first,
                outcome,
            }) => {
                if first.same_payment_as(request) {
                    Admission::Replay(outcome.clone())
                } else {
                    Admission::Conflict
                }
            }
            None => {
                let id = TransactionId::generate();
                let (done, receiver) = watch::channel(None);
                let control = Arc::new(TransactionControl::new());
                keys.slots.insert(
                    request.idempotency_key.clone(),
                    KeySlot::InFlight {
                        transaction_id: id,
                        request: request.clone(),
                        done: receiver,
                    },
                );
                self.lock_controls().insert(id, Arc::clone(&control));
                Admission::Run(Ticket { id, control, done })
            }
        }
    }

    async fn join(
        id: TransactionId,
        request: &PaymentRequest,
        mut done: watch::Receiver<Option<PaymentOutcome>>,
    ) -> PaymentOutcome {
        debug!(transaction_id = %id, "Coalescing duplicate submission");
        match done.wait_for(Option::is_some).await {
            Ok(outcome) => outcome
                .clone()
                .unwrap_or_else(|| PaymentOutcome::abandoned(id, request)),
            Err(_) => PaymentOutcome::abandoned(id, request),
        }
    }

    async fn reject_conflict(&self, request: PaymentRequest) -> PaymentOutcome {
        warn!(
            idempotency_key = %request.idempotency_key,
            "Idempotency key reused with a different payment"
        );
        let mut run = Run {
            tx: Transaction::new(TransactionId::generate(), request),
            control: Arc::new(TransactionControl::new()),
            warnings: Vec::new(),
        };
        run.tx.record_error(KEY_CONFLICT_REASON);
        let _ = self
            .advance(
                &mut run,
                TransactionState::Failed,
                Some(KEY_CONFLICT_REASON.to_string()),
            )
            .await;
        self.notify(run.tx.id(), run.tx.state());
        PaymentOutcome::from_transaction(&run.tx, run.warnings)
    }

    async fn drive(&self, run: &mut Run) {
        self.persist(run).await;
        // Every early exit below has already reached a terminal state.
        let _ = self.pipeline(run).await;
    }

    async fn pipeline(&self, run: &mut Run) -> Progress {
        let method = run.tx.request().method.clone();
        let handler = match self.registry.resolve(&method) {
            Ok(handler) => handler,
            Err(e) => {
                run.tx.record_error(e.to_string());
                return self
                    .advance(
                        run,
                        TransactionState::Failed,
                        Some(UNKNOWN_METHOD_REASON.to_string()),
                    )
                    .await;
            }
        };

        self.advance(run, TransactionState::Validating, None).await?;
        match handler.validate(run.tx.request()) {
            StepOutcome::Success => {}
            StepOutcome::Declined(reason) | StepOutcome::TransientFailure(reason) => {
                return self.fail(run, format!("validation failed: {reason}")).await;
            }
        }
        self.advance(run, TransactionState::Validated, None).await?;

        let policy = self.policies.for_method(&method);

        self.advance(run, TransactionState::Authorizing, None)
            .await?;
        self.retried_step(run, RetriedStep::Authorize, &handler, policy)
            .await?;
        self.advance(run, TransactionState::Authorized, None).await?;

        self.advance(run, TransactionState::Capturing, None).await?;
        self.retried_step(run, RetriedStep::Capture, &handler, policy)
            .await?;
        self.advance(run, TransactionState::Succeeded, None).await
    }

    async fn retried_step(
        &self,
        run: &mut Run,
        step: RetriedStep,
        handler: &HandlerRef,
        policy: &RetryPolicy,
    ) -> Progress {
        let request = run.tx.request().clone();
        let control = Arc::clone(&run.control);
        let (request, control) = (&request, &*control);

        let retried = self
            .retry
            .execute_until(policy, control.cancelled(), |attempt| async move {
                if control.is_cancel_requested() {
                    return Attempt::FatalFailure(StepFailure::Cancelled);
                }
                debug!(%step, attempt, "Invoking handler");
                let outcome = match step {
                    RetriedStep::Authorize => handler.authorize(request).await,
                    RetriedStep::Capture => handler.capture(request).await,
                };
                match outcome {
                    StepOutcome::Success => Attempt::Success(()),
                    StepOutcome::Declined(reason) => {
                        Attempt::FatalFailure(StepFailure::Declined(reason))
                    }
                    StepOutcome::TransientFailure(reason) => {
                        Attempt::RetryableFailure(StepFailure::Transient(reason))
                    }
                }
            })
            .await;

        run.tx.record_attempts(retried.attempts);
        match retried.result {
            Ok(()) => Ok(()),
            Err(RetryError::Fatal(StepFailure::Cancelled) | RetryError::Aborted(_)) => {
                self.advance(
                    run,
                    TransactionState::Cancelled,
                    Some(CANCELLED_REASON.to_string()),
                )
                .await
            }
            Err(RetryError::Fatal(StepFailure::Declined(reason))) => {
                self.fail(run, format!("{step} declined: {reason}")).await
            }
            Err(RetryError::Fatal(StepFailure::Transient(reason))) => {
                self.fail(run, format!("{step} failed: {reason}")).await
            }
            Err(RetryError::Exhausted(failure)) => {
                let exhausted = PaymentError::RetriesExhausted {
                    attempts: retried.attempts,
                    reason: failure.to_string(),
                };
                run.tx.record_error(exhausted.to_string());
                self.fail(run, format!("{step} retries exhausted: {failure}"))
                    .await
            }
        }
    }

    async fn fail(&self, run: &mut Run, reason: String) -> Progress {
        let _ = self
            .advance(run, TransactionState::Failed, Some(reason))
            .await;
        Err(Halted)
    }

    /// Applies one transition, persists it, and reports whether the
    /// pipeline may continue.
    async fn advance(
        &self,
        run: &mut Run,
        next: TransactionState,
        reason: Option<String>,
    ) -> Progress {
        let from = run.tx.state();
        match run.control.apply(&mut run.tx, next, reason) {
            Ok(Applied::Moved) => debug!(%from, to = %next, "Transition"),
            Ok(Applied::Cancelled) => info!(%from, "Transaction cancelled"),
            Err(e) => {
                error!(error = %e, "Rejected transition");
                if !run.tx.is_terminal() {
                    let _ = run.control.apply(
                        &mut run.tx,
                        TransactionState::Failed,
                        Some(format!("internal error: {e}")),
                    );
                }
            }
        }
        self.persist(run).await;

        if run.tx.is_terminal() {
            Err(Halted)
        } else {
            Ok(())
        }
    }

    async fn persist(&self, run: &mut Run) {
        if let Err(e) = self.store.save(&run.tx).await {
            warn!(transaction_id = %run.tx.id(), error = %e, "Failed to persist transaction");
            let warning = format!("persistence degraded: {e}");
            if !run.warnings.contains(&warning) {
                run.warnings.push(warning);
            }
        }
    }

    fn settle(&self, run: Run, request: PaymentRequest, ticket: &Ticket) -> PaymentOutcome {
        let outcome = PaymentOutcome::from_transaction(&run.tx, run.warnings);
        info!(
            transaction_id = %outcome.transaction_id,
            state = %outcome.final_state,
            attempts = outcome.attempts,
            reason = outcome.reason.as_deref().unwrap_or(""),
            "Payment settled"
        );

        self.lock_keys()
            .settle(request.idempotency_key.clone(), request, outcome.clone());
        self.lock_controls().remove(&ticket.id);
        ticket.done.send_replace(Some(outcome.clone()));

        self.notify(outcome.transaction_id, outcome.final_state);
        outcome
    }

    /// Fire-and-forget: failures are logged and never reach the caller.
    fn notify(&self, id: TransactionId, state: TransactionState) {
        let notifier = Arc::clone(&self.notifier);
        tokio::spawn(async move {
            if let Err(e) = notifier.notify(id, state).await {
                warn!(transaction_id = %id, error = %e, "Notification failed");
            }
        });
    }
}
