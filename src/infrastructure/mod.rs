//! Adapters for the domain ports: storage backends, notification, the
//! payment rail handlers, and a simulated rail network.

pub mod in_memory;
pub mod methods;
pub mod notifier;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;
pub mod simulated_rail;
