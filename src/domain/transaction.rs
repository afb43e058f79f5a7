use super::payment::PaymentRequest;
use crate::error::{PaymentError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TransactionId(Uuid);

impl TransactionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl From<Uuid> for TransactionId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Lifecycle of a payment transaction.
///
/// ```text
/// Created -> Validating -> Validated -> Authorizing -> Authorized -> Capturing -> Succeeded
///               |                           |                           |
///               +--------> Failed <---------+---------------------------+
///
/// any non-terminal state except Capturing -> Cancelled
/// ```
///
/// Capture is never cancelled: once it is in flight the rail may already
/// have moved funds, so only the capture result settles the transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionState {
    Created,
    Validating,
    Validated,
    Authorizing,
    Authorized,
    Capturing,
    Succeeded,
    Failed,
    Cancelled,
}

impl TransactionState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TransactionState::Succeeded | TransactionState::Failed | TransactionState::Cancelled
        )
    }

    /// Whether a handler call is in progress while in this state.
    pub fn is_in_progress(self) -> bool {
        matches!(
            self,
            TransactionState::Validating
                | TransactionState::Authorizing
                | TransactionState::Capturing
        )
    }

    pub fn can_transition_to(self, next: TransactionState) -> bool {
        use TransactionState::*;
        match (self, next) {
            (Created, Validating)
            | (Validating, Validated)
            | (Validated, Authorizing)
            | (Authorizing, Authorized)
            | (Authorized, Capturing)
            | (Capturing, Succeeded) => true,
            // Resolution failures (unknown method) settle before validation starts.
            (Created | Validating | Authorizing | Capturing, Failed) => true,
            (Capturing, Cancelled) => false,
            (from, Cancelled) => !from.is_terminal(),
            _ => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TransactionState::Created => "created",
            TransactionState::Validating => "validating",
            TransactionState::Validated => "validated",
            TransactionState::Authorizing => "authorizing",
            TransactionState::Authorized => "authorized",
            TransactionState::Capturing => "capturing",
            TransactionState::Succeeded => "succeeded",
            TransactionState::Failed => "failed",
            TransactionState::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of a transaction's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    /// `None` for the entry recorded at creation.
    pub from: Option<TransactionState>,
    pub to: TransactionState,
    pub at: DateTime<Utc>,
    pub reason: Option<String>,
}

/// The mutable record of one payment as it moves through the pipeline.
///
/// History is append-only and always ends with the current state. Once a
/// terminal state is reached every further mutation is rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    id: TransactionId,
    request: PaymentRequest,
    state: TransactionState,
    history: Vec<Transition>,
    attempts: u32,
    last_error: Option<String>,
}

impl Transaction {
    pub fn new(id: TransactionId, request: PaymentRequest) -> Self {
        Self {
            id,
            request,
            state: TransactionState::Created,
            history: vec![Transition {
                from: None,
                to: TransactionState::Created,
                at: Utc::now(),
                reason: None,
            }],
            attempts: 0,
            last_error: None,
        }
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn request(&self) -> &PaymentRequest {
        &self.request
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn history(&self) -> &[Transition] {
        &self.history
    }

    /// The sequence of states visited, creation included.
    pub fn states(&self) -> Vec<TransactionState> {
        self.history.iter().map(|t| t.to).collect()
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// The reason recorded with the terminal transition, if any.
    pub fn final_reason(&self) -> Option<&str> {
        if !self.is_terminal() {
            return None;
        }
        self.history.last().and_then(|t| t.reason.as_deref())
    }

    /// Moves to `next`, appending to history.
    pub fn transition(&mut self, next: TransactionState, reason: Option<String>) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(PaymentError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        self.history.push(Transition {
            from: Some(self.state),
            to: next,
            at: Utc::now(),
            reason,
        });
        self.state = next;
        Ok(())
    }

    /// Moves to `Failed`. `reason` becomes the last error unless a more
    /// specific one was recorded earlier.
    pub fn fail(&mut self, reason: impl Into<String>) -> Result<()> {
        let reason = reason.into();
        self.transition(TransactionState::Failed, Some(reason.clone()))?;
        self.last_error.get_or_insert(reason);
        Ok(())
    }

    pub fn record_attempts(&mut self, attempts: u32) {
        if !self.is_terminal() {
            self.attempts += attempts;
        }
    }

    pub fn record_error(&mut self, error: impl Into<String>) {
        if !self.is_terminal() {
            self.last_error = Some(error.into());
        }
    }
}
