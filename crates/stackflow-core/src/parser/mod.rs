//! Template parser (resource graph builder)
//!
//! Parses a YAML or JSON stack template into a validated [`Stack`].
//! Each section is handled by its own module. Parsing happens in two
//! passes: declared names are collected first, then every expression is
//! parsed against them so that dangling references are rejected here,
//! before anything is provisioned.

mod expression;
mod output;
mod parameter;
mod resource;

use output::parse_output;
use parameter::parse_parameter;
use resource::parse_resource;

use crate::error::{Result, StackError};
use crate::model::{PSEUDO_PARAMETERS, Stack};
use expression::NameTable;
use serde_yaml::{Mapping, Value as YamlValue};
use std::fs;
use std::path::Path;
use tracing::debug;

/// Parse a template file
pub fn parse_template_file<P: AsRef<Path>>(path: P) -> Result<Stack> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|e| StackError::Io {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    parse_template_str(&content)
}

/// Parse a template from a string
#[tracing::instrument(skip_all)]
pub fn parse_template_str(content: &str) -> Result<Stack> {
    let doc: YamlValue =
        serde_yaml::from_str(content).map_err(|e| StackError::Parse(e.to_string()))?;
    let root = doc
        .as_mapping()
        .ok_or_else(|| StackError::Parse("template must be a mapping".to_string()))?;

    let mut stack = Stack::new();
    let mut parameters_node = None;
    let mut resources_node = None;
    let mut outputs_node = None;

    for (key, value) in root {
        let key = key
            .as_str()
            .ok_or_else(|| StackError::Parse("section names must be strings".to_string()))?;
        match key {
            "Description" => {
                stack.description = Some(
                    value
                        .as_str()
                        .ok_or_else(|| {
                            StackError::Parse("Description must be a string".to_string())
                        })?
                        .to_string(),
                );
            }
            "Parameters" => parameters_node = section(key, value)?,
            "Resources" => resources_node = section(key, value)?,
            "Outputs" => outputs_node = section(key, value)?,
            other => {
                // AWSTemplateFormatVersion, Mappings and the like carry no graph information
                debug!(section = other, "Skipping unsupported template section");
            }
        }
    }

    let resources_node = resources_node
        .filter(|r| !r.is_empty())
        .ok_or_else(|| StackError::Parse("template declares no Resources".to_string()))?;

    // First pass: declared names
    let mut names = NameTable::default();
    if let Some(node) = parameters_node {
        for (key, value) in node {
            let name = entry_name("Parameters", key)?;
            if PSEUDO_PARAMETERS.contains(&name) {
                return Err(StackError::Parse(format!(
                    "parameter '{}' shadows a pseudo parameter",
                    name
                )));
            }
            stack
                .parameters
                .insert(name.to_string(), parse_parameter(name, value)?);
            names.parameters.insert(name.to_string());
        }
    }
    for key in resources_node.keys() {
        let name = entry_name("Resources", key)?;
        if names.parameters.contains(name) || PSEUDO_PARAMETERS.contains(&name) {
            return Err(StackError::Parse(format!(
                "name '{}' is declared both as a parameter and a resource",
                name
            )));
        }
        names.resources.insert(name.to_string());
    }

    // Second pass: expressions
    for (key, value) in resources_node {
        let name = entry_name("Resources", key)?;
        let resource = parse_resource(name, value, &names)?;
        stack.resources.insert(name.to_string(), resource);
    }
    if let Some(node) = outputs_node {
        for (key, value) in node {
            let name = entry_name("Outputs", key)?;
            stack
                .outputs
                .insert(name.to_string(), parse_output(name, value, &names)?);
        }
    }

    debug!(
        parameters = stack.parameters.len(),
        resources = stack.resources.len(),
        outputs = stack.outputs.len(),
        "Parsed stack template"
    );
    Ok(stack)
}

fn section<'a>(name: &str, value: &'a YamlValue) -> Result<Option<&'a Mapping>> {
    match value {
        YamlValue::Null => Ok(None),
        YamlValue::Mapping(mapping) => Ok(Some(mapping)),
        _ => Err(StackError::Parse(format!("{} must be a mapping", name))),
    }
}

fn entry_name<'a>(section: &str, key: &'a YamlValue) -> Result<&'a str> {
    key.as_str()
        .filter(|k| !k.is_empty())
        .ok_or_else(|| StackError::Parse(format!("{} entries need non-empty string names", section)))
}

/// Render a YAML scalar in its textual form
pub(crate) fn scalar_to_string(value: &YamlValue) -> Option<String> {
    match value {
        YamlValue::String(s) => Some(s.clone()),
        YamlValue::Number(n) => Some(n.to_string()),
        YamlValue::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
