//! Parameter binding
//!
//! Binds supplied textual values to the declared parameters of a stack,
//! applying defaults, type conversion and `AllowedValues`. Values of
//! sensitive parameters are tracked so they can be masked anywhere they
//! might surface.

use crate::error::{Result, StackError};
use crate::model::{
    Parameter, ParameterType, REGION_PARAMETER, STACK_NAME_PARAMETER, Stack,
};
use indexmap::IndexMap;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Replacement text for sensitive values
pub const REDACTED: &str = "****";

/// Values known from the run rather than from the template
#[derive(Debug, Clone)]
pub struct RunContext {
    pub stack_name: String,
    pub region: String,
}

impl RunContext {
    pub fn new(stack_name: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            stack_name: stack_name.into(),
            region: region.into(),
        }
    }
}

/// Bound parameter values, immutable for the duration of a run
#[derive(Clone, Default)]
pub struct ParameterValues {
    values: IndexMap<String, Value>,
    sensitive: HashSet<String>,
}

impl ParameterValues {
    /// Bind `supplied` values to the parameters declared by `stack`
    pub fn bind(
        stack: &Stack,
        supplied: &HashMap<String, String>,
        context: &RunContext,
    ) -> Result<Self> {
        if let Some(unknown) = supplied
            .keys()
            .find(|name| !stack.parameters.contains_key(name.as_str()))
        {
            return Err(StackError::UnknownParameter(unknown.clone()));
        }

        let mut bound = Self::default();
        bound.values.insert(
            STACK_NAME_PARAMETER.to_string(),
            Value::String(context.stack_name.clone()),
        );
        bound.values.insert(
            REGION_PARAMETER.to_string(),
            Value::String(context.region.clone()),
        );

        for (name, parameter) in &stack.parameters {
            let raw = supplied
                .get(name)
                .or(parameter.default.as_ref())
                .ok_or_else(|| StackError::MissingParameter(name.clone()))?;
            let value = convert(parameter, raw)?;
            if parameter.sensitive {
                bound.sensitive.insert(name.clone());
            }
            bound.values.insert(name.clone(), value);
        }

        Ok(bound)
    }

    /// Insert a value directly; used by tests and embedders
    pub fn insert(&mut self, name: impl Into<String>, value: Value, sensitive: bool) {
        let name = name.into();
        if sensitive {
            self.sensitive.insert(name.clone());
        }
        self.values.insert(name, value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn is_sensitive(&self, name: &str) -> bool {
        self.sensitive.contains(name)
    }

    /// Mask every sensitive value occurring in `text`
    pub fn redact(&self, text: &str) -> String {
        let mut result = text.to_string();
        for name in &self.sensitive {
            let Some(value) = self.values.get(name) else {
                continue;
            };
            for secret in secret_strings(value) {
                if !secret.is_empty() {
                    result = result.replace(&secret, REDACTED);
                }
            }
        }
        result
    }

    /// Values safe to display: sensitive ones are masked
    pub fn display_values(&self) -> IndexMap<String, Value> {
        self.values
            .iter()
            .map(|(name, value)| {
                let shown = if self.is_sensitive(name) {
                    Value::String(REDACTED.to_string())
                } else {
                    value.clone()
                };
                (name.clone(), shown)
            })
            .collect()
    }
}

impl fmt::Debug for ParameterValues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.display_values()).finish()
    }
}

fn secret_strings(value: &Value) -> Vec<String> {
    match value {
        Value::String(s) => vec![s.clone()],
        Value::Array(items) => items.iter().flat_map(secret_strings).collect(),
        Value::Null => Vec::new(),
        other => vec![other.to_string()],
    }
}

fn convert(parameter: &Parameter, raw: &str) -> Result<Value> {
    let name = &parameter.name;
    let items: Vec<&str> = if parameter.param_type.is_list() {
        raw.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect()
    } else {
        vec![raw]
    };

    if !parameter.allowed_values.is_empty() {
        if let Some(bad) = items
            .iter()
            .find(|item| !parameter.allowed_values.iter().any(|a| a == *item))
        {
            let reason = if parameter.sensitive {
                "value is not one of the allowed values".to_string()
            } else {
                format!(
                    "'{}' is not one of [{}]",
                    bad,
                    parameter.allowed_values.join(", ")
                )
            };
            return Err(StackError::InvalidParameter {
                name: name.clone(),
                reason,
            });
        }
    }

    let to_value = |item: &str| -> Result<Value> {
        if parameter.param_type.is_numeric() {
            parse_number(item).ok_or_else(|| StackError::InvalidParameter {
                name: name.clone(),
                reason: if parameter.sensitive {
                    "value is not a number".to_string()
                } else {
                    format!("'{}' is not a number", item)
                },
            })
        } else {
            Ok(Value::String(item.to_string()))
        }
    };

    match parameter.param_type {
        ParameterType::String | ParameterType::Number | ParameterType::CloudId(_) => {
            to_value(raw)
        }
        ParameterType::CommaDelimitedList
        | ParameterType::NumberList
        | ParameterType::CloudIdList(_) => items
            .into_iter()
            .map(to_value)
            .collect::<Result<Vec<_>>>()
            .map(Value::Array),
    }
}

fn parse_number(s: &str) -> Option<Value> {
    let s = s.trim();
    if let Ok(i) = s.parse::<i64>() {
        return Some(Value::from(i));
    }
    s.parse::<f64>()
        .ok()
        .and_then(serde_json::Number::from_f64)
        .map(Value::Number)
}
