//! Resource definitions

use super::expression::Expression;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// What happens to the physical resource when the stack is destroyed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeletionPolicy {
    #[default]
    Delete,
    /// Forget the resource without deleting it
    Retain,
}

impl DeletionPolicy {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Delete" => Some(Self::Delete),
            "Retain" => Some(Self::Retain),
            _ => None,
        }
    }
}

/// A declared resource: a node of the dependency graph
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    /// Logical name, unique within the stack
    pub name: String,
    /// Opaque resource kind, e.g. `AWS::RDS::DBInstance`
    pub kind: String,
    pub properties: IndexMap<String, Expression>,
    /// Explicit `DependsOn` entries
    pub depends_on: Vec<String>,
    /// All resources this one depends on: references found in the
    /// properties followed by explicit `DependsOn` entries
    pub dependencies: Vec<String>,
    pub deletion_policy: DeletionPolicy,
}

impl Resource {
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            properties: IndexMap::new(),
            depends_on: Vec::new(),
            dependencies: Vec::new(),
            deletion_policy: DeletionPolicy::default(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: Expression) -> Self {
        self.properties.insert(key.into(), value);
        self.refresh_dependencies();
        self
    }

    pub fn with_depends_on(mut self, name: impl Into<String>) -> Self {
        self.depends_on.push(name.into());
        self.refresh_dependencies();
        self
    }

    /// Recompute `dependencies` from the properties and `depends_on`
    pub fn refresh_dependencies(&mut self) {
        let mut dependencies: Vec<String> = Vec::new();
        let implicit = self
            .properties
            .values()
            .flat_map(|expr| expr.resource_references());
        let explicit = self.depends_on.iter().map(String::as_str);
        for name in implicit.chain(explicit) {
            if !dependencies.iter().any(|d| d == name) {
                dependencies.push(name.to_string());
            }
        }
        self.dependencies = dependencies;
    }
}
