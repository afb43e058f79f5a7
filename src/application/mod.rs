//! Application layer: the payment orchestration core.
//!
//! `gateway` drives each request through the transaction state machine,
//! resolving handlers from the `registry` and wrapping the network steps
//! in the `retry` controller.

pub mod gateway;
pub mod registry;
pub mod retry;
