//! Resource provider contract

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

/// Attributes reported by a provider (IP, endpoint, ARN, ...)
pub type Attributes = HashMap<String, serde_json::Value>;

/// Resource provider abstraction
///
/// The engine treats every operation as opaque and idempotent on retry.
/// Implementations report transient conditions (throttling, eventual
/// consistency) as [`ProviderError::Transient`] so the engine can retry them.
#[async_trait]
pub trait ResourceProvider: Send + Sync {
    /// Returns the provider name (e.g., "memory")
    fn name(&self) -> &str;

    /// Create the resource and return its physical id
    async fn create(&self, request: &ResourceRequest) -> ProviderResult<Provisioned>;

    /// Read the current attributes of an existing resource
    async fn read(&self, kind: &str, physical_id: &str) -> ProviderResult<Attributes>;

    /// Update an existing resource in place. Providers may hand back a new
    /// physical id (e.g. a new revision).
    async fn update(
        &self,
        physical_id: &str,
        request: &ResourceRequest,
    ) -> ProviderResult<Provisioned>;

    /// Delete a resource
    async fn delete(&self, kind: &str, physical_id: &str) -> ProviderResult<()>;

    /// Whether the resource has settled after a create or update
    async fn is_stable(&self, kind: &str, physical_id: &str) -> ProviderResult<bool>;
}

/// Provider errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("Transient provider error: {0}")]
    Transient(String),

    #[error("Provider error: {0}")]
    Permanent(String),

    #[error("Resource not found: {0}")]
    NotFound(String),
}

impl ProviderError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProviderError::Transient(_))
    }
}

pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

/// Desired state of one resource, with every expression already evaluated
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceRequest {
    /// Logical name in the stack
    pub logical_id: String,

    /// Resource kind (e.g., "AWS::RDS::DBInstance")
    pub kind: String,

    /// Resolved properties
    pub properties: serde_json::Value,
}

impl ResourceRequest {
    pub fn new(
        logical_id: impl Into<String>,
        kind: impl Into<String>,
        properties: serde_json::Value,
    ) -> Self {
        Self {
            logical_id: logical_id.into(),
            kind: kind.into(),
            properties,
        }
    }

    /// Get a property value as a specific type
    pub fn get_property<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.properties
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}

/// Result of a create or update
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Provisioned {
    pub physical_id: String,
    pub attributes: Attributes,
}

impl Provisioned {
    pub fn new(physical_id: impl Into<String>) -> Self {
        Self {
            physical_id: physical_id.into(),
            attributes: Attributes::new(),
        }
    }

    pub fn with_attributes(mut self, attributes: Attributes) -> Self {
        self.attributes = attributes;
        self
    }
}

/// Retry configuration for provider operations
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one
    pub max_attempts: u32,

    /// Initial delay between retries
    pub initial_delay: Duration,

    /// Maximum delay between retries
    pub max_delay: Duration,

    /// Backoff multiplier
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Retry without waiting; handy for tests
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
        }
    }

    /// Delay before retry number `attempt` (0-based)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        backoff(
            self.initial_delay,
            self.max_delay,
            self.backoff_multiplier,
            attempt,
        )
    }
}

/// Polling configuration while waiting for a resource to stabilize
#[derive(Debug, Clone)]
pub struct WaitConfig {
    /// Maximum number of `is_stable` polls
    pub max_polls: u32,

    /// Delay after the first unstable poll
    pub initial_delay: Duration,

    /// Maximum delay between polls
    pub max_delay: Duration,

    /// Backoff multiplier
    pub multiplier: f64,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            max_polls: 30,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
        }
    }
}

impl WaitConfig {
    /// Poll without waiting; handy for tests
    pub fn immediate(max_polls: u32) -> Self {
        Self {
            max_polls: max_polls.max(1),
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            multiplier: 1.0,
        }
    }

    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        backoff(self.initial_delay, self.max_delay, self.multiplier, attempt)
    }
}

fn backoff(initial: Duration, max: Duration, multiplier: f64, attempt: u32) -> Duration {
    let factor = multiplier.max(1.0).powi(attempt.min(64) as i32);
    let delay = initial.as_secs_f64() * factor;
    if !delay.is_finite() || delay >= max.as_secs_f64() {
        max
    } else {
        Duration::from_secs_f64(delay)
    }
}
