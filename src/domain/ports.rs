use super::payment::PaymentRequest;
use super::transaction::{Transaction, TransactionId, TransactionState};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

#[async_trait]
pub trait TransactionStore: Send + Sync {
    async fn save(&self, tx: &Transaction) -> Result<()>;
    async fn load(&self, id: TransactionId) -> Result<Option<Transaction>>;
    async fn all_transactions(&self) -> Result<Vec<Transaction>>;
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, id: TransactionId, state: TransactionState) -> Result<()>;
}

/// What an external rail answered for one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RailResponse {
    Success,
    RetryableFailure(String),
    FatalFailure(String),
}

/// Network client for one settlement rail.
#[async_trait]
pub trait RailClient: Send + Sync {
    async fn authorize(&self, request: &PaymentRequest) -> RailResponse;
    async fn capture(&self, request: &PaymentRequest) -> RailResponse;
}

pub type TransactionStoreBox = Box<dyn TransactionStore>;
pub type NotifierRef = Arc<dyn Notifier>;
pub type RailClientRef = Arc<dyn RailClient>;
