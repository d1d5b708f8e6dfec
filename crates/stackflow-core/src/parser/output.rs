//! Output declaration parsing

use super::expression::{ExpressionParser, NameTable, Owner};
use crate::error::{Result, StackError};
use crate::model::Output;
use serde_yaml::Value as YamlValue;

/// Parse one entry of the `Outputs` section
pub(crate) fn parse_output(name: &str, node: &YamlValue, names: &NameTable) -> Result<Output> {
    let mapping = node
        .as_mapping()
        .ok_or_else(|| StackError::Parse(format!("output '{}' must be a mapping", name)))?;

    let value = mapping
        .get("Value")
        .ok_or_else(|| StackError::Parse(format!("output '{}' requires a Value", name)))?;

    let parser = ExpressionParser::new(names, Owner::Output(name));
    let mut output = Output::new(name, parser.parse(value)?);
    output.description = mapping
        .get("Description")
        .and_then(YamlValue::as_str)
        .map(str::to_string);

    Ok(output)
}
