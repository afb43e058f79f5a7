//! Domain layer: payment requests, the transaction state machine, and the
//! ports the application layer drives (handlers, persistence, notification,
//! external rails).

pub mod handler;
pub mod payment;
pub mod ports;
pub mod transaction;
