//! Stack definition

use super::output::Output;
use super::parameter::{PSEUDO_PARAMETERS, Parameter};
use super::resource::Resource;
use indexmap::IndexMap;

/// Stack - one set of parameters, resources and outputs applied as a unit
///
/// All maps keep declaration order; the resolver relies on it for
/// reproducible wave ordering.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Stack {
    pub description: Option<String>,
    pub parameters: IndexMap<String, Parameter>,
    pub resources: IndexMap<String, Resource>,
    pub outputs: IndexMap<String, Output>,
}

impl Stack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resource(&self, name: &str) -> Option<&Resource> {
        self.resources.get(name)
    }

    /// Declaration index of a resource
    pub fn resource_index(&self, name: &str) -> Option<usize> {
        self.resources.get_index_of(name)
    }

    /// Whether `name` is a declared or pseudo parameter
    pub fn has_parameter(&self, name: &str) -> bool {
        self.parameters.contains_key(name) || PSEUDO_PARAMETERS.contains(&name)
    }

    pub fn sensitive_parameters(&self) -> impl Iterator<Item = &Parameter> {
        self.parameters.values().filter(|p| p.sensitive)
    }
}
