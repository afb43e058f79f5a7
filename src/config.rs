//! Retry policy configuration, per payment method.
//!
//! Loaded from a JSON document such as:
//!
//! ```json
//! {
//!   "default_policy": { "max_attempts": 3, "base_delay_ms": 100, "max_delay_ms": 2000, "jitter": 0.2 },
//!   "methods": {
//!     "UPI": { "max_attempts": 4, "base_delay_ms": 200, "max_delay_ms": 3000, "jitter": 0.1,
//!              "max_elapsed_ms": 15000, "fatal_reasons": ["invalid vpa"] }
//!   }
//! }
//! ```

use crate::application::gateway::DEFAULT_REPLAY_CAPACITY;
use crate::application::retry::RetryPolicy;
use crate::domain::payment::MethodId;
use crate::error::{PaymentError, Result};
use crate::infrastructure::methods::{BANK_TRANSFER, CARD, UPI};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicyConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    #[serde(default)]
    pub jitter: f64,
    #[serde(default)]
    pub max_elapsed_ms: Option<u64>,
    /// Failure descriptions containing any of these are never retried.
    #[serde(default)]
    pub fatal_reasons: Vec<String>,
}

impl RetryPolicyConfig {
    pub fn build(&self) -> Result<RetryPolicy> {
        let mut policy = RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.base_delay_ms),
            Duration::from_millis(self.max_delay_ms),
            self.jitter,
        )?;
        if let Some(ms) = self.max_elapsed_ms {
            policy = policy.with_max_elapsed(Duration::from_millis(ms));
        }
        if !self.fatal_reasons.is_empty() {
            let fatal: Vec<String> = self
                .fatal_reasons
                .iter()
                .map(|r| r.to_ascii_lowercase())
                .collect();
            policy = policy.with_classifier(move |reason| {
                let reason = reason.to_ascii_lowercase();
                !fatal.iter().any(|f| reason.contains(f.as_str()))
            });
        }
        Ok(policy)
    }
}

impl Default for RetryPolicyConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 100,
            max_delay_ms: 2_000,
            jitter: 0.2,
            max_elapsed_ms: Some(10_000),
            fatal_reasons: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub default_policy: RetryPolicyConfig,
    #[serde(default)]
    pub methods: HashMap<String, RetryPolicyConfig>,
    /// Settled idempotency keys remembered for replay.
    #[serde(default = "default_replay_capacity")]
    pub replay_capacity: usize,
}

fn default_replay_capacity() -> usize {
    DEFAULT_REPLAY_CAPACITY
}

impl Default for GatewayConfig {
    fn default() -> Self {
        let mut methods = HashMap::new();
        methods.insert(
            UPI.to_string(),
            RetryPolicyConfig {
                max_attempts: 3,
                base_delay_ms: 200,
                max_delay_ms: 2_000,
                jitter: 0.2,
                max_elapsed_ms: Some(10_000),
                fatal_reasons: Vec::new(),
            },
        );
        methods.insert(
            CARD.to_string(),
            RetryPolicyConfig {
                max_attempts: 4,
                base_delay_ms: 100,
                max_delay_ms: 1_600,
                jitter: 0.25,
                max_elapsed_ms: Some(8_000),
                fatal_reasons: Vec::new(),
            },
        );
        methods.insert(
            BANK_TRANSFER.to_string(),
            RetryPolicyConfig {
                max_attempts: 5,
                base_delay_ms: 500,
                max_delay_ms: 8_000,
                jitter: 0.1,
                max_elapsed_ms: Some(30_000),
                fatal_reasons: Vec::new(),
            },
        );
        Self {
            default_policy: RetryPolicyConfig::default(),
            methods,
            replay_capacity: DEFAULT_REPLAY_CAPACITY,
        }
    }
}

impl GatewayConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    /// Validates every entry and builds the policy table.
    pub fn policies(&self) -> Result<RetryPolicies> {
        let default = self.default_policy.build()?;
        let mut per_method = HashMap::with_capacity(self.methods.len());
        for (method, config) in &self.methods {
            let policy = config.build().map_err(|e| {
                PaymentError::ConfigError(format!("policy for method {method}: {e}"))
            })?;
            per_method.insert(MethodId::from(method.as_str()), policy);
        }
        Ok(RetryPolicies {
            default,
            per_method,
        })
    }
}

/// Retry policies keyed by payment method, with a fallback.
#[derive(Debug, Clone, Default)]
pub struct RetryPolicies {
    default: RetryPolicy,
    per_method: HashMap<MethodId, RetryPolicy>,
}

impl RetryPolicies {
    pub fn new(default: RetryPolicy) -> Self {
        Self {
            default,
            per_method: HashMap::new(),
        }
    }

    pub fn with_method(mut self, method: impl Into<MethodId>, policy: RetryPolicy) -> Self {
        self.per_method.insert(method.into(), policy);
        self
    }

    pub fn for_method(&self, method: &MethodId) -> &RetryPolicy {
        self.per_method.get(method).unwrap_or(&self.default)
    }
}
