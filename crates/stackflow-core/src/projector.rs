//! Output projector

use crate::error::{Result, StackError};
use crate::eval::{ResolvedResource, Scope};
use crate::model::Stack;
use crate::params::{ParameterValues, REDACTED};
use indexmap::IndexMap;
use serde_json::Value;
use std::collections::HashMap;

/// Resolve every declared output against the final resource attributes.
///
/// Only meaningful once every resource is available. Outputs that read a
/// sensitive parameter are masked.
pub fn project_outputs(
    stack: &Stack,
    parameters: &ParameterValues,
    resources: &HashMap<String, ResolvedResource>,
) -> Result<IndexMap<String, Value>> {
    let scope = Scope::new(parameters, resources);
    let mut outputs = IndexMap::new();

    for (name, output) in &stack.outputs {
        let reads_secret = output
            .value
            .parameter_references()
            .iter()
            .any(|p| parameters.is_sensitive(p));

        let value = scope
            .evaluate(&output.value)
            .map_err(|source| StackError::UnresolvedOutput {
                output: name.clone(),
                source,
            })?;

        let value = if reads_secret {
            Value::String(REDACTED.to_string())
        } else {
            value
        };
        tracing::debug!(output = %name, "Resolved output");
        outputs.insert(name.clone(), value);
    }

    Ok(outputs)
}
