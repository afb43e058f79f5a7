use crate::domain::handler::{HandlerConstructor, HandlerRef, PaymentMethodHandler};
use crate::domain::payment::MethodId;
use crate::error::{PaymentError, Result};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Maps payment method identifiers to handler constructors.
///
/// Registration is append-only and normally happens at startup; resolution
/// takes a shared read lock so any number of requests can resolve at once.
#[derive(Default)]
pub struct MethodRegistry {
    constructors: RwLock<HashMap<MethodId, HandlerConstructor>>,
}

impl MethodRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `constructor` under `id`.
    ///
    /// Fails with [`PaymentError::DuplicateMethod`] if `id` is already taken.
    pub fn register<F>(&self, id: impl Into<MethodId>, constructor: F) -> Result<()>
    where
        F: Fn() -> HandlerRef + Send + Sync + 'static,
    {
        let id = id.into();
        let mut constructors = self
            .constructors
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if constructors.contains_key(&id) {
            return Err(PaymentError::DuplicateMethod(id.to_string()));
        }
        tracing::debug!(method = %id, "Registered payment method");
        constructors.insert(id, Arc::new(constructor));
        Ok(())
    }

    /// Registers a single shared handler instance under `id`.
    pub fn register_shared<H>(&self, id: impl Into<MethodId>, handler: H) -> Result<()>
    where
        H: PaymentMethodHandler + 'static,
    {
        let handler: HandlerRef = Arc::new(handler);
        self.register(id, move || Arc::clone(&handler))
    }

    /// Builds the handler registered under `id`.
    pub fn resolve(&self, id: &MethodId) -> Result<HandlerRef> {
        let constructor = self
            .constructors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
            .ok_or_else(|| PaymentError::UnknownMethod(id.to_string()))?;
        Ok(constructor())
    }

    pub fn contains(&self, id: &MethodId) -> bool {
        self.constructors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(id)
    }

    /// Registered identifiers in sorted order.
    pub fn methods(&self) -> Vec<MethodId> {
        let mut ids: Vec<_> = self
            .constructors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }
}
