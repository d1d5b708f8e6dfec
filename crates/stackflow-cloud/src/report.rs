//! Run reports

use crate::action::ActionType;
use crate::state::ResourceStatus;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Which direction a run went
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunKind {
    Apply,
    Destroy,
}

/// Terminal outcome of one resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceOutcome {
    /// Logical name
    pub name: String,

    /// Resource kind
    pub kind: String,

    /// Final status in this run
    pub status: ResourceStatus,

    /// What was done to reach it
    pub action: ActionType,

    /// Physical id, when one exists
    pub physical_id: Option<String>,

    /// Attempts spent on the mutating call
    pub attempts: u32,

    /// Failure or skip reason; sensitive values are masked
    pub error: Option<String>,
}

impl ResourceOutcome {
    pub fn pending(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            status: ResourceStatus::Pending,
            action: ActionType::NoOp,
            physical_id: None,
            attempts: 0,
            error: None,
        }
    }

    pub fn with_status(mut self, status: ResourceStatus, action: ActionType) -> Self {
        self.status = status;
        self.action = action;
        self
    }

    pub fn with_physical_id(mut self, physical_id: impl Into<String>) -> Self {
        self.physical_id = Some(physical_id.into());
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Result of an apply or destroy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub kind: RunKind,

    pub stack_name: String,

    /// Per-resource outcomes, in declaration order
    pub resources: IndexMap<String, ResourceOutcome>,

    /// Projected outputs; only set after a fully successful apply
    pub outputs: Option<IndexMap<String, serde_json::Value>>,

    /// Why output projection failed
    pub output_error: Option<String>,

    /// The run stopped early on request
    pub cancelled: bool,

    /// Total execution time in milliseconds
    pub duration_ms: u64,
}

impl RunReport {
    pub fn new(kind: RunKind, stack_name: impl Into<String>) -> Self {
        Self {
            kind,
            stack_name: stack_name.into(),
            resources: IndexMap::new(),
            outputs: None,
            output_error: None,
            cancelled: false,
            duration_ms: 0,
        }
    }

    /// Record the outcome of a resource, replacing any previous one
    pub fn record(&mut self, outcome: ResourceOutcome) {
        self.resources.insert(outcome.name.clone(), outcome);
    }

    pub fn status_of(&self, name: &str) -> Option<ResourceStatus> {
        self.resources.get(name).map(|o| o.status)
    }

    /// Every resource reached the goal status of the run and nothing else went wrong
    pub fn is_success(&self) -> bool {
        let goal = match self.kind {
            RunKind::Apply => ResourceStatus::Available,
            RunKind::Destroy => ResourceStatus::Deleted,
        };
        !self.cancelled
            && self.output_error.is_none()
            && self
                .resources
                .values()
                .all(|o| o.status == goal || o.status == ResourceStatus::Deleted)
    }

    fn names_with(&self, status: ResourceStatus) -> Vec<&str> {
        self.resources
            .values()
            .filter(|o| o.status == status)
            .map(|o| o.name.as_str())
            .collect()
    }

    pub fn available(&self) -> Vec<&str> {
        self.names_with(ResourceStatus::Available)
    }

    pub fn deleted(&self) -> Vec<&str> {
        self.names_with(ResourceStatus::Deleted)
    }

    pub fn failed(&self) -> Vec<&str> {
        self.names_with(ResourceStatus::Failed)
    }

    pub fn skipped(&self) -> Vec<&str> {
        self.names_with(ResourceStatus::Skipped)
    }

    /// Resources the run never brought to a final status
    pub fn pending(&self) -> Vec<&str> {
        self.resources
            .values()
            .filter(|o| !o.status.is_terminal())
            .map(|o| o.name.as_str())
            .collect()
    }

    /// Number of resources on which a given action was taken
    pub fn count(&self, action: ActionType) -> usize {
        self.resources
            .values()
            .filter(|o| o.action == action && o.status != ResourceStatus::Skipped)
            .count()
    }
}

impl std::fmt::Display for RunReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            RunKind::Apply => write!(
                f,
                "{} created, {} updated, {} unchanged, {} deleted, {} failed, {} skipped",
                self.count(ActionType::Create),
                self.count(ActionType::Update),
                self.count(ActionType::NoOp),
                self.count(ActionType::Delete),
                self.failed().len(),
                self.skipped().len()
            )?,
            RunKind::Destroy => write!(
                f,
                "{} deleted, {} failed, {} skipped",
                self.deleted().len(),
                self.failed().len(),
                self.skipped().len()
            )?,
        }
        if self.cancelled {
            write!(f, " (cancelled, {} pending)", self.pending().len())?;
        }
        Ok(())
    }
}
