use crate::domain::ports::Notifier;
use crate::domain::transaction::{TransactionId, TransactionState};
use crate::error::Result;
use async_trait::async_trait;

/// Notifier that records terminal states in the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, id: TransactionId, state: TransactionState) -> Result<()> {
        tracing::info!(transaction_id = %id, %state, "Payment notification");
        Ok(())
    }
}
