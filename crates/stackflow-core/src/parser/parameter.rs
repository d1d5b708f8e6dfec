//! Parameter declaration parsing

use super::scalar_to_string;
use crate::error::{Result, StackError};
use crate::model::{Parameter, ParameterType};
use serde_yaml::Value as YamlValue;

/// Parse one entry of the `Parameters` section
pub fn parse_parameter(name: &str, node: &YamlValue) -> Result<Parameter> {
    let mapping = node.as_mapping().ok_or_else(|| {
        StackError::Parse(format!("parameter '{}' must be a mapping", name))
    })?;

    let type_name = mapping
        .get("Type")
        .and_then(YamlValue::as_str)
        .ok_or_else(|| StackError::Parse(format!("parameter '{}' requires a Type", name)))?;
    let param_type = ParameterType::parse(type_name).ok_or_else(|| {
        StackError::Parse(format!(
            "parameter '{}' has unknown type '{}'",
            name, type_name
        ))
    })?;

    let mut parameter = Parameter::new(name, param_type);

    for (key, value) in mapping {
        match key.as_str().unwrap_or_default() {
            "Type" => {}
            "Description" => {
                parameter.description = Some(
                    value
                        .as_str()
                        .ok_or_else(|| invalid(name, "Description must be a string"))?
                        .to_string(),
                );
            }
            "Default" => {
                parameter.default = Some(default_to_string(name, value)?);
            }
            "AllowedValues" => {
                let values = value
                    .as_sequence()
                    .ok_or_else(|| invalid(name, "AllowedValues must be a list"))?;
                parameter.allowed_values = values
                    .iter()
                    .map(|v| scalar_to_string(v).ok_or_else(|| invalid(name, "AllowedValues must be scalars")))
                    .collect::<Result<Vec<_>>>()?;
            }
            "NoEcho" => {
                parameter.sensitive = match value {
                    YamlValue::Bool(b) => *b,
                    YamlValue::String(s) => s.eq_ignore_ascii_case("true"),
                    _ => return Err(invalid(name, "NoEcho must be a boolean")),
                };
            }
            other => {
                // ConstraintDescription, MinLength and friends are accepted but not enforced
                tracing::debug!(parameter = name, key = other, "Ignoring parameter attribute");
            }
        }
    }

    Ok(parameter)
}

/// Defaults are stored in their textual form; list defaults may be given as
/// a YAML sequence or as a comma separated string.
fn default_to_string(name: &str, value: &YamlValue) -> Result<String> {
    if let Some(items) = value.as_sequence() {
        let parts = items
            .iter()
            .map(|item| scalar_to_string(item).ok_or_else(|| invalid(name, "Default list items must be scalars")))
            .collect::<Result<Vec<_>>>()?;
        return Ok(parts.join(","));
    }
    scalar_to_string(value).ok_or_else(|| invalid(name, "Default must be a scalar or a list"))
}

fn invalid(name: &str, message: &str) -> StackError {
    StackError::Parse(format!("parameter '{}': {}", name, message))
}
