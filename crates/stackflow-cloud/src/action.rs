//! Planned actions (check mode)

use crate::error::Result;
use crate::state::{ResourceRecord, ResourceStatus, StackState, deletion_order, fingerprint};
use serde::{Deserialize, Serialize};
use stackflow_core::{DependencyGraph, ParameterValues, Scope, Stack};
use std::collections::HashMap;

/// A planned action for one resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    /// Logical name of the resource
    pub id: String,

    /// Type of action to perform
    pub action_type: ActionType,

    /// Resource kind (e.g., "AWS::ECS::Service")
    pub resource_type: String,

    /// Physical id, empty when the resource does not exist yet
    pub resource_id: String,

    /// Description of the action
    pub description: String,

    /// Additional details about the action
    pub details: HashMap<String, serde_json::Value>,
}

impl Action {
    fn new(
        id: impl Into<String>,
        action_type: ActionType,
        resource_type: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            action_type,
            resource_type: resource_type.into(),
            resource_id: String::new(),
            description: description.into(),
            details: HashMap::new(),
        }
    }

    fn with_resource_id(mut self, resource_id: impl Into<String>) -> Self {
        self.resource_id = resource_id.into();
        self
    }

    fn with_detail(mut self, key: &str, value: serde_json::Value) -> Self {
        self.details.insert(key.to_string(), value);
        self
    }
}

/// Type of action to perform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    /// Create a new resource
    Create,
    /// Update an existing resource
    Update,
    /// Delete a resource
    Delete,
    /// No changes needed
    NoOp,
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionType::Create => write!(f, "create"),
            ActionType::Update => write!(f, "update"),
            ActionType::Delete => write!(f, "delete"),
            ActionType::NoOp => write!(f, "no-op"),
        }
    }
}

/// Plan containing all actions an apply would perform
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    /// Actions in apply order, deletions of undeclared resources last
    pub actions: Vec<Action>,

    /// Whether the plan has any changes
    pub has_changes: bool,
}

impl Plan {
    pub fn new(actions: Vec<Action>) -> Self {
        let has_changes = actions.iter().any(|a| a.action_type != ActionType::NoOp);
        Self {
            actions,
            has_changes,
        }
    }

    /// Compare the declared stack with persisted state.
    ///
    /// Makes no provider call. Properties that read attributes of resources
    /// not yet available are reported as changing.
    #[tracing::instrument(skip_all, fields(stack = %state.stack_name))]
    pub fn compute(stack: &Stack, parameters: &ParameterValues, state: &StackState) -> Result<Self> {
        let graph = DependencyGraph::new(stack)?;
        let waves = graph.waves()?;
        let resolved = state.resolved_resources();
        let scope = Scope::new(parameters, &resolved);
        let mut actions = Vec::new();

        for (wave_index, wave) in waves.iter().enumerate() {
            for name in wave {
                let Some(resource) = stack.resource(name) else {
                    continue;
                };
                let Some(record) = state.get_resource(name) else {
                    actions.push(
                        Action::new(name, ActionType::Create, &resource.kind, "create")
                            .with_detail("wave", wave_index.into()),
                    );
                    continue;
                };

                let action = if record.kind != resource.kind {
                    Action::new(
                        name,
                        ActionType::Create,
                        &resource.kind,
                        format!("replace ({} -> {})", record.kind, resource.kind),
                    )
                } else if record.status != ResourceStatus::Available {
                    Action::new(
                        name,
                        ActionType::Update,
                        &resource.kind,
                        format!("retry (last status: {})", record.status),
                    )
                } else {
                    match scope.evaluate_properties(&resource.properties) {
                        Ok(properties) if fingerprint(&properties) == record.fingerprint => {
                            Action::new(name, ActionType::NoOp, &resource.kind, "up to date")
                        }
                        Ok(_) => Action::new(
                            name,
                            ActionType::Update,
                            &resource.kind,
                            "properties changed",
                        ),
                        Err(_) => Action::new(
                            name,
                            ActionType::Update,
                            &resource.kind,
                            "properties known after apply",
                        ),
                    }
                };
                actions.push(
                    action
                        .with_resource_id(&record.physical_id)
                        .with_detail("wave", wave_index.into()),
                );
            }
        }

        let orphans: Vec<(String, ResourceRecord)> = state
            .resources
            .iter()
            .filter(|(name, _)| stack.resource(name).is_none())
            .map(|(name, record)| (name.clone(), record.clone()))
            .collect();
        for (name, record) in deletion_order(orphans) {
            actions.push(
                Action::new(&name, ActionType::Delete, &record.kind, "no longer declared")
                    .with_resource_id(&record.physical_id),
            );
        }

        let plan = Self::new(actions);
        tracing::info!("Plan: {}", plan.summary());
        Ok(plan)
    }

    /// Get actions by type
    pub fn actions_by_type(&self, action_type: ActionType) -> Vec<&Action> {
        self.actions
            .iter()
            .filter(|a| a.action_type == action_type)
            .collect()
    }

    /// Summary of the plan
    pub fn summary(&self) -> PlanSummary {
        PlanSummary {
            create: self.actions_by_type(ActionType::Create).len(),
            update: self.actions_by_type(ActionType::Update).len(),
            delete: self.actions_by_type(ActionType::Delete).len(),
            no_change: self.actions_by_type(ActionType::NoOp).len(),
        }
    }
}

/// Summary of planned actions
#[derive(Debug, Clone)]
pub struct PlanSummary {
    pub create: usize,
    pub update: usize,
    pub delete: usize,
    pub no_change: usize,
}

impl std::fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} to create, {} to update, {} to delete, {} unchanged",
            self.create, self.update, self.delete, self.no_change
        )
    }
}
