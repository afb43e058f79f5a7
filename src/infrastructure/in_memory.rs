use crate::domain::ports::TransactionStore;
use crate::domain::transaction::{Transaction, TransactionId};
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A thread-safe in-memory store for transactions.
///
/// Uses `Arc<RwLock<HashMap<TransactionId, Transaction>>>` for shared concurrent access.
/// Clones share the same underlying map.
#[derive(Default, Clone)]
pub struct InMemoryTransactionStore {
    transactions: Arc<RwLock<HashMap<TransactionId, Transaction>>>,
}

impl InMemoryTransactionStore {
    /// Creates a new, empty in-memory transaction store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TransactionStore for InMemoryTransactionStore {
    async fn save(&self, tx: &Transaction) -> Result<()> {
        let mut transactions = self.transactions.write().await;
        transactions.insert(tx.id(), tx.clone());
        Ok(())
    }

    async fn load(&self, id: TransactionId) -> Result<Option<Transaction>> {
        let transactions = self.transactions.read().await;
        Ok(transactions.get(&id).cloned())
    }

    async fn all_transactions(&self) -> Result<Vec<Transaction>> {
        let transactions = self.transactions.read().await;
        Ok(transactions.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::payment::{Money, PaymentRequest};
    use crate::domain::transaction::TransactionState;
    use rust_decimal_macros::dec;

    fn transaction() -> Transaction {
        let request = PaymentRequest::new(
            "CARD",
            Money::new(dec!(25.00), "USD"),
            "tok_visa",
            "merchant-1",
            "key-1",
        );
        Transaction::new(TransactionId::generate(), request)
    }

    #[tokio::test]
    async fn test_in_memory_transaction_store() {
        let store = InMemoryTransactionStore::new();
        let tx = transaction();

        store.save(&tx).await.unwrap();
        let retrieved = store.load(tx.id()).await.unwrap().unwrap();
        assert_eq!(retrieved, tx);

        assert!(
            store
                .load(TransactionId::generate())
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_save_overwrites_with_latest_state() {
        let store = InMemoryTransactionStore::new();
        let mut tx = transaction();
        store.save(&tx).await.unwrap();

        tx.transition(TransactionState::Validating, None).unwrap();
        store.save(&tx).await.unwrap();

        let all = store.all_transactions().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].state(), TransactionState::Validating);
    }

    #[tokio::test]
    async fn test_store_as_trait_object_across_tasks() {
        let store: crate::domain::ports::TransactionStoreBox =
            Box::new(InMemoryTransactionStore::new());
        let tx = transaction();
        let id = tx.id();

        let handle = tokio::spawn(async move {
            store.save(&tx).await.unwrap();
            store.load(id).await.unwrap().unwrap()
        });

        assert_eq!(handle.await.unwrap().id(), id);
    }
}
