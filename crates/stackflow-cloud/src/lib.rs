//! StackFlow reconciliation
//!
//! Turns a validated [`Stack`](stackflow_core::Stack) into provisioned
//! resources through a [`ResourceProvider`].
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                  stack CLI                      │
//! │           (plan / apply / destroy)              │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │               stackflow-cloud                   │
//! │  ┌──────────────────────────────────────────┐   │
//! │  │   Reconciler (waves, retry, stabilize)   │   │
//! │  └──────────────────────────────────────────┘   │
//! │  ┌──────────────┐  ┌──────────────┐             │
//! │  │  Plan/Report │  │  State Mgmt  │             │
//! │  └──────────────┘  └──────────────┘             │
//! └───────┬─────────────────────────────────────────┘
//!         │ trait ResourceProvider
//! ┌───────▼────────┐ ┌────────────────┐
//! │ProviderRegistry│─► MemoryProvider │
//! └────────────────┘ └────────────────┘
//! ```

pub mod action;
pub mod engine;
pub mod error;
pub mod memory;
pub mod provider;
pub mod registry;
pub mod report;
pub mod state;

// Re-exports
pub use action::{Action, ActionType, Plan, PlanSummary};
pub use engine::{CancelFlag, Reconciler};
pub use error::{CloudError, Result};
pub use memory::{MemoryProvider, Operation, ProviderCall, StoredResource};
pub use provider::{
    Attributes, ProviderError, ProviderResult, Provisioned, ResourceProvider, ResourceRequest,
    RetryConfig, WaitConfig,
};
pub use registry::ProviderRegistry;
pub use report::{ResourceOutcome, RunKind, RunReport};
pub use state::{
    ResourceRecord, ResourceStatus, STATE_DIR, StackState, StateLock, StateManager, fingerprint,
};
