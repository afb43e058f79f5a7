use crate::domain::payment::{IdempotencyKey, Money, PaymentRequest, RequestId};
use crate::error::{PaymentError, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Read;

/// One row of a payment batch file.
///
/// `request_id` and `idempotency_key` may be left blank, in which case fresh
/// values are generated.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentRecord {
    #[serde(default)]
    pub request_id: Option<String>,
    pub method: String,
    pub amount: Decimal,
    pub currency: String,
    pub payer: String,
    pub payee: String,
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl From<PaymentRecord> for PaymentRequest {
    fn from(record: PaymentRecord) -> Self {
        let key = non_blank(record.idempotency_key)
            .map(IdempotencyKey::from)
            .unwrap_or_else(IdempotencyKey::generate);
        let request_id = non_blank(record.request_id)
            .map(RequestId::from)
            .unwrap_or_else(RequestId::generate);
        PaymentRequest::new(
            record.method,
            Money::new(record.amount, record.currency),
            record.payer,
            record.payee,
            key,
        )
        .with_request_id(request_id)
    }
}

/// Reads payment requests from a CSV source.
///
/// Wraps `csv::Reader`, trimming whitespace and accepting rows with missing
/// trailing columns.
pub struct PaymentRequestReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> PaymentRequestReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Lazily deserializes one request per row.
    pub fn requests(self) -> impl Iterator<Item = Result<PaymentRequest>> {
        self.reader.into_deserialize().map(|result| {
            result
                .map(|record: PaymentRecord| PaymentRequest::from(record))
                .map_err(PaymentError::from)
        })
    }
}
