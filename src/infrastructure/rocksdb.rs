use crate::domain::ports::TransactionStore;
use crate::domain::transaction::{Transaction, TransactionId};
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, IteratorMode, Options};
use std::path::Path;
use std::sync::Arc;

/// Column Family for storing transaction records.
pub const CF_TRANSACTIONS: &str = "transactions";

/// A persistent transaction store backed by RocksDB.
///
/// Records are JSON-encoded and keyed by the transaction's UUID bytes.
/// `Clone` shares the underlying `Arc<DB>`.
#[derive(Clone)]
pub struct RocksDbTransactionStore {
    db: Arc<DB>,
}

impl RocksDbTransactionStore {
    /// Opens or creates a RocksDB instance at the specified path.
    ///
    /// Ensures that the "transactions" column family exists.
    ///
    /// # Arguments
    ///
    /// * `path` - The filesystem path where the database will be stored.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_transactions = ColumnFamilyDescriptor::new(CF_TRANSACTIONS, Options::default());
        let db = DB::open_cf_descriptors(&opts, path, vec![cf_transactions])?;

        Ok(Self { db: Arc::new(db) })
    }

    fn transactions_cf(&self) -> Result<&ColumnFamily> {
        self.db.cf_handle(CF_TRANSACTIONS).ok_or_else(|| {
            PaymentError::InternalError(Box::new(std::io::Error::other(
                "Transactions column family not found",
            )))
        })
    }
}

fn decode(bytes: &[u8]) -> Result<Transaction> {
    serde_json::from_slice(bytes).map_err(|e| {
        PaymentError::InternalError(Box::new(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("Deserialization error: {}", e),
        )))
    })
}

#[async_trait]
impl TransactionStore for RocksDbTransactionStore {
    async fn save(&self, tx: &Transaction) -> Result<()> {
        let cf = self.transactions_cf()?;
        let value = serde_json::to_vec(tx)?;
        self.db.put_cf(cf, tx.id().as_uuid().as_bytes(), value)?;
        Ok(())
    }

    async fn load(&self, id: TransactionId) -> Result<Option<Transaction>> {
        let cf = self.transactions_cf()?;
        match self.db.get_pinned_cf(cf, id.as_uuid().as_bytes())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn all_transactions(&self) -> Result<Vec<Transaction>> {
        let cf = self.transactions_cf()?;
        let mut transactions = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_key, value) = item?;
            transactions.push(decode(&value)?);
        }
        Ok(transactions)
    }
}
