//! Resource declaration parsing

use super::expression::{ExpressionParser, NameTable, Owner};
use crate::error::{Result, StackError};
use crate::model::{DeletionPolicy, Resource};
use serde_yaml::Value as YamlValue;

/// Parse one entry of the `Resources` section
pub(crate) fn parse_resource(name: &str, node: &YamlValue, names: &NameTable) -> Result<Resource> {
    let mapping = node
        .as_mapping()
        .ok_or_else(|| StackError::Parse(format!("resource '{}' must be a mapping", name)))?;

    let kind = mapping
        .get("Type")
        .and_then(YamlValue::as_str)
        .filter(|k| !k.trim().is_empty())
        .ok_or_else(|| StackError::Parse(format!("resource '{}' requires a Type", name)))?;

    let mut resource = Resource::new(name, kind);
    let parser = ExpressionParser::new(names, Owner::Resource(name));

    for (key, value) in mapping {
        match key.as_str().unwrap_or_default() {
            "Type" => {}
            "Properties" => match value {
                YamlValue::Null => {}
                YamlValue::Mapping(properties) => {
                    for (prop_key, prop_value) in properties {
                        let prop_name = prop_key.as_str().ok_or_else(|| {
                            StackError::Parse(format!(
                                "resource '{}': property names must be strings",
                                name
                            ))
                        })?;
                        let expr = parser.parse(prop_value)?;
                        resource.properties.insert(prop_name.to_string(), expr);
                    }
                }
                _ => {
                    return Err(StackError::Parse(format!(
                        "resource '{}': Properties must be a mapping",
                        name
                    )));
                }
            },
            "DependsOn" => {
                resource.depends_on = parse_depends_on(name, value)?;
                for target in &resource.depends_on {
                    parser.check_resource(target)?;
                }
            }
            "DeletionPolicy" => {
                resource.deletion_policy = value
                    .as_str()
                    .and_then(DeletionPolicy::parse)
                    .ok_or_else(|| {
                        StackError::Parse(format!(
                            "resource '{}': DeletionPolicy must be Delete or Retain",
                            name
                        ))
                    })?;
            }
            other => {
                tracing::debug!(resource = name, key = other, "Ignoring resource attribute");
            }
        }
    }

    resource.refresh_dependencies();
    Ok(resource)
}

fn parse_depends_on(name: &str, value: &YamlValue) -> Result<Vec<String>> {
    let malformed = || {
        StackError::Parse(format!(
            "resource '{}': DependsOn must be a name or a list of names",
            name
        ))
    };
    match value {
        YamlValue::String(target) => Ok(vec![target.clone()]),
        YamlValue::Sequence(items) => items
            .iter()
            .map(|item| item.as_str().map(str::to_string).ok_or_else(malformed))
            .collect(),
        _ => Err(malformed()),
    }
}
