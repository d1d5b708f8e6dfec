//! Expression parsing
//!
//! Turns YAML property values into [`Expression`] trees. Both the long form
//! (`{ "Fn::GetAtt": [Db, Endpoint.Address] }`) and the short tags
//! (`!GetAtt Db.Endpoint.Address`) are accepted.

use crate::error::{Result, StackError};
use crate::model::{Expression, PSEUDO_PARAMETERS};
use indexmap::IndexMap;
use serde_yaml::Value as YamlValue;
use std::collections::HashSet;
use std::fmt;

/// Declared names, collected before any expression is parsed so that `Ref`
/// can be classified as a parameter or resource reference.
#[derive(Debug, Default)]
pub(crate) struct NameTable {
    pub parameters: HashSet<String>,
    pub resources: HashSet<String>,
}

impl NameTable {
    fn is_parameter(&self, name: &str) -> bool {
        self.parameters.contains(name) || PSEUDO_PARAMETERS.contains(&name)
    }

    fn is_resource(&self, name: &str) -> bool {
        self.resources.contains(name)
    }
}

/// Where an expression lives; used for error messages and self-reference checks
#[derive(Debug, Clone, Copy)]
pub(crate) enum Owner<'a> {
    Resource(&'a str),
    Output(&'a str),
}

impl fmt::Display for Owner<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Owner::Resource(name) => write!(f, "resource '{}'", name),
            Owner::Output(name) => write!(f, "output '{}'", name),
        }
    }
}

pub(crate) struct ExpressionParser<'a> {
    names: &'a NameTable,
    owner: Owner<'a>,
}

impl<'a> ExpressionParser<'a> {
    pub fn new(names: &'a NameTable, owner: Owner<'a>) -> Self {
        Self { names, owner }
    }

    pub fn parse(&self, value: &YamlValue) -> Result<Expression> {
        match value {
            YamlValue::Null => Ok(Expression::Literal(serde_json::Value::Null)),
            YamlValue::Bool(b) => Ok(Expression::literal(*b)),
            YamlValue::Number(n) => Ok(Expression::Literal(yaml_number_to_json(n))),
            YamlValue::String(s) => Ok(Expression::literal(s.as_str())),
            YamlValue::Sequence(items) => items
                .iter()
                .map(|item| self.parse(item))
                .collect::<Result<Vec<_>>>()
                .map(Expression::List),
            YamlValue::Mapping(mapping) => {
                if mapping.len() == 1
                    && let Some((key, arg)) = mapping.iter().next()
                    && let Some(function) = key.as_str()
                    && (function == "Ref" || function.starts_with("Fn::"))
                {
                    return self.parse_intrinsic(function, arg);
                }
                let mut entries = IndexMap::new();
                for (key, value) in mapping {
                    let key = key.as_str().ok_or_else(|| {
                        StackError::Parse(format!("{}: map keys must be strings", self.owner))
                    })?;
                    entries.insert(key.to_string(), self.parse(value)?);
                }
                Ok(Expression::Map(entries))
            }
            YamlValue::Tagged(tagged) => {
                let tag = tagged.tag.to_string();
                let function = match tag.trim_start_matches('!') {
                    "Ref" => "Ref",
                    "GetAtt" => "Fn::GetAtt",
                    "Join" => "Fn::Join",
                    "Base64" => "Fn::Base64",
                    other => {
                        return Err(StackError::Parse(format!(
                            "{}: unsupported tag '!{}'",
                            self.owner, other
                        )));
                    }
                };
                self.parse_intrinsic(function, &tagged.value)
            }
        }
    }

    fn parse_intrinsic(&self, function: &str, arg: &YamlValue) -> Result<Expression> {
        match function {
            "Ref" => {
                let target = arg.as_str().ok_or_else(|| self.malformed("Ref", "expects a name"))?;
                self.reference(target)
            }
            "Fn::GetAtt" => {
                let (resource, attribute) = match arg {
                    YamlValue::String(path) => path
                        .split_once('.')
                        .map(|(r, a)| (r.to_string(), a.to_string()))
                        .ok_or_else(|| {
                            self.malformed("Fn::GetAtt", "expects 'Resource.Attribute'")
                        })?,
                    YamlValue::Sequence(items) if items.len() == 2 => {
                        match (items[0].as_str(), items[1].as_str()) {
                            (Some(r), Some(a)) => (r.to_string(), a.to_string()),
                            _ => {
                                return Err(self.malformed(
                                    "Fn::GetAtt",
                                    "expects [Resource, Attribute] strings",
                                ));
                            }
                        }
                    }
                    _ => {
                        return Err(
                            self.malformed("Fn::GetAtt", "expects [Resource, Attribute]")
                        );
                    }
                };
                if resource.is_empty() || attribute.is_empty() {
                    return Err(self.malformed("Fn::GetAtt", "empty resource or attribute"));
                }
                self.check_resource(&resource)?;
                Ok(Expression::AttributeRef {
                    resource,
                    attribute,
                })
            }
            "Fn::Join" => {
                let items = match arg {
                    YamlValue::Sequence(items) if items.len() == 2 => items,
                    _ => return Err(self.malformed("Fn::Join", "expects [delimiter, values]")),
                };
                let delimiter = items[0]
                    .as_str()
                    .ok_or_else(|| self.malformed("Fn::Join", "delimiter must be a string"))?
                    .to_string();
                let values = self.parse(&items[1])?;
                Ok(Expression::Join {
                    delimiter,
                    values: Box::new(values),
                })
            }
            "Fn::Base64" => Ok(Expression::Base64(Box::new(self.parse(arg)?))),
            other => Err(StackError::Parse(format!(
                "{}: unsupported intrinsic function '{}'",
                self.owner, other
            ))),
        }
    }

    fn reference(&self, target: &str) -> Result<Expression> {
        if self.names.is_parameter(target) {
            return Ok(Expression::ParameterRef(target.to_string()));
        }
        self.check_resource(target)?;
        Ok(Expression::ResourceRef(target.to_string()))
    }

    pub fn check_resource(&self, target: &str) -> Result<()> {
        if let Owner::Resource(name) = self.owner
            && name == target
        {
            return Err(StackError::SelfReference(name.to_string()));
        }
        if !self.names.is_resource(target) {
            return Err(StackError::Reference {
                owner: self.owner.to_string(),
                target: target.to_string(),
            });
        }
        Ok(())
    }

    fn malformed(&self, function: &str, message: &str) -> StackError {
        StackError::Parse(format!("{}: {} {}", self.owner, function, message))
    }
}

fn yaml_number_to_json(n: &serde_yaml::Number) -> serde_json::Value {
    if let Some(i) = n.as_i64() {
        serde_json::Value::from(i)
    } else if let Some(u) = n.as_u64() {
        serde_json::Value::from(u)
    } else {
        n.as_f64()
            .and_then(serde_json::Number::from_f64)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null)
    }
}
