use crate::error::PaymentError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A strictly positive monetary amount.
///
/// Requests carry raw `Money` so that non-positive values can reach the
/// validation step and be rejected there; handlers convert into `Amount`
/// once a request has been checked.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Amount(Decimal);

impl Amount {
    pub fn new(value: Decimal) -> Result<Self, PaymentError> {
        if value > Decimal::ZERO {
            Ok(Self(value))
        } else {
            Err(PaymentError::ValidationError(
                "Amount must be positive".to_string(),
            ))
        }
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = PaymentError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

/// ISO-4217 style currency code, normalised to upper case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Currency(String);

impl Currency {
    pub fn new(code: impl AsRef<str>) -> Self {
        Self(code.as_ref().trim().to_ascii_uppercase())
    }

    pub fn code(&self) -> &str {
        &self.0
    }

    /// Three ASCII letters.
    pub fn is_well_formed(&self) -> bool {
        self.0.len() == 3 && self.0.chars().all(|c| c.is_ascii_uppercase())
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A fixed-point value tagged with its currency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Money {
    pub value: Decimal,
    pub currency: Currency,
}

impl Money {
    pub fn new(value: Decimal, currency: impl AsRef<str>) -> Self {
        Self {
            value,
            currency: Currency::new(currency),
        }
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.value, self.currency)
    }
}

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_id!(
    /// Identifier of a payment rail as registered with the method registry.
    MethodId
);
string_id!(
    /// Caller-supplied (or generated) identifier of a payment request.
    RequestId
);
string_id!(
    /// Opaque reference to a payer or payee on the rail.
    PartyRef
);
string_id!(
    /// Token identifying one logical payment attempt.
    IdempotencyKey
);

impl RequestId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl IdempotencyKey {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

/// An immutable request to move money over one payment rail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub request_id: RequestId,
    pub method: MethodId,
    pub amount: Money,
    pub payer: PartyRef,
    pub payee: PartyRef,
    pub idempotency_key: IdempotencyKey,
}

impl PaymentRequest {
    pub fn new(
        method: impl Into<MethodId>,
        amount: Money,
        payer: impl Into<PartyRef>,
        payee: impl Into<PartyRef>,
        idempotency_key: impl Into<IdempotencyKey>,
    ) -> Self {
        Self {
            request_id: RequestId::generate(),
            method: method.into(),
            amount,
            payer: payer.into(),
            payee: payee.into(),
            idempotency_key: idempotency_key.into(),
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<RequestId>) -> Self {
        self.request_id = request_id.into();
        self
    }

    /// Whether `other` describes the same logical payment, ignoring the request ID.
    pub fn same_payment_as(&self, other: &PaymentRequest) -> bool {
        self.method == other.method
            && self.amount == other.amount
            && self.payer == other.payer
            && self.payee == other.payee
            && self.idempotency_key == other.idempotency_key
    }
}
