//! Expression interpreter
//!
//! Evaluates [`Expression`] trees against bound parameters and the
//! resources already provisioned in the current run.

use crate::error::EvalError;
use crate::model::Expression;
use crate::params::ParameterValues;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// A provisioned resource as seen by expressions
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResolvedResource {
    /// Provider-assigned identifier (what `Ref` evaluates to)
    pub physical_id: String,
    /// Attributes reported by the provider (what `Fn::GetAtt` reads)
    #[serde(default)]
    pub attributes: HashMap<String, Value>,
}

impl ResolvedResource {
    pub fn new(physical_id: impl Into<String>) -> Self {
        Self {
            physical_id: physical_id.into(),
            attributes: HashMap::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    /// Look up an attribute by its exact name, falling back to a dotted path
    /// into nested objects (`Endpoint.Address`).
    pub fn attribute(&self, name: &str) -> Option<&Value> {
        if let Some(value) = self.attributes.get(name) {
            return Some(value);
        }
        let mut parts = name.split('.');
        let mut current = self.attributes.get(parts.next()?)?;
        for part in parts {
            current = current.as_object()?.get(part)?;
        }
        Some(current)
    }
}

/// Evaluation scope for one resource or output
pub struct Scope<'a> {
    parameters: &'a ParameterValues,
    resources: &'a HashMap<String, ResolvedResource>,
}

impl<'a> Scope<'a> {
    pub fn new(
        parameters: &'a ParameterValues,
        resources: &'a HashMap<String, ResolvedResource>,
    ) -> Self {
        Self {
            parameters,
            resources,
        }
    }

    pub fn evaluate(&self, expr: &Expression) -> Result<Value, EvalError> {
        match expr {
            Expression::Literal(value) => Ok(value.clone()),
            Expression::List(items) => items
                .iter()
                .map(|item| self.evaluate(item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Expression::Map(entries) => {
                let mut object = Map::new();
                for (key, value) in entries {
                    object.insert(key.clone(), self.evaluate(value)?);
                }
                Ok(Value::Object(object))
            }
            Expression::ParameterRef(name) => self
                .parameters
                .get(name)
                .cloned()
                .ok_or_else(|| EvalError::UnboundParameter(name.clone())),
            Expression::ResourceRef(name) => self
                .resource(name)
                .map(|r| Value::String(r.physical_id.clone())),
            Expression::AttributeRef {
                resource,
                attribute,
            } => self
                .resource(resource)?
                .attribute(attribute)
                .cloned()
                .ok_or_else(|| EvalError::UnresolvedAttribute {
                    resource: resource.clone(),
                    attribute: attribute.clone(),
                }),
            Expression::Join { delimiter, values } => {
                let values = self.evaluate(values)?;
                let items = values.as_array().ok_or_else(|| EvalError::TypeMismatch {
                    function: "Fn::Join",
                    message: "expected a list of values".to_string(),
                })?;
                let parts = items
                    .iter()
                    .map(|item| scalar_text("Fn::Join", item))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Value::String(parts.join(delimiter)))
            }
            Expression::Base64(inner) => {
                let value = self.evaluate(inner)?;
                let text = scalar_text("Fn::Base64", &value)?;
                Ok(Value::String(STANDARD.encode(text)))
            }
        }
    }

    /// Evaluate a property map into a JSON object
    pub fn evaluate_properties(
        &self,
        properties: &IndexMap<String, Expression>,
    ) -> Result<Value, EvalError> {
        let mut object = Map::new();
        for (key, expr) in properties {
            object.insert(key.clone(), self.evaluate(expr)?);
        }
        Ok(Value::Object(object))
    }

    fn resource(&self, name: &str) -> Result<&ResolvedResource, EvalError> {
        self.resources
            .get(name)
            .ok_or_else(|| EvalError::UnresolvedResource(name.to_string()))
    }
}

fn scalar_text(function: &'static str, value: &Value) -> Result<String, EvalError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(EvalError::TypeMismatch {
            function,
            message: format!("cannot convert {} to a string", type_name(other)),
        }),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "a map",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fixtures() -> (ParameterValues, HashMap<String, ResolvedResource>) {
        let mut params = ParameterValues::default();
        params.insert("Env", json!("prod"), false);
        params.insert("Subnets", json!(["subnet-a", "subnet-b"]), false);
        params.insert("Password", json!("s3cret"), true);

        let mut resources = HashMap::new();
        resources.insert(
            "Db".to_string(),
            ResolvedResource::new("db-0001")
                .with_attribute("Endpoint.Address", json!("db.internal"))
                .with_attribute("Endpoint", json!({ "Port": 5432 })),
        );
        resources.insert(
            "Lb".to_string(),
            ResolvedResource::new("lb-0001").with_attribute("DNSName", json!("lb.example.com")),
        );
        (params, resources)
    }

    #[test]
    fn test_evaluate_references() {
        let (params, resources) = fixtures();
        let scope = Scope::new(&params, &resources);

        assert_eq!(
            scope.evaluate(&Expression::ResourceRef("Db".into())).unwrap(),
            json!("db-0001")
        );
        assert_eq!(
            scope
                .evaluate(&Expression::AttributeRef {
                    resource: "Db".into(),
                    attribute: "Endpoint.Address".into(),
                })
                .unwrap(),
            json!("db.internal")
        );
        // falls back to a dotted path into nested objects
        assert_eq!(
            scope
                .evaluate(&Expression::AttributeRef {
                    resource: "Db".into(),
                    attribute: "Endpoint.Port".into(),
                })
                .unwrap(),
            json!(5432)
        );
        assert_eq!(
            scope
                .evaluate(&Expression::ParameterRef("Subnets".into()))
                .unwrap(),
            json!(["subnet-a", "subnet-b"])
        );
    }

    #[test]
    fn test_evaluate_join_and_base64() {
        let (params, resources) = fixtures();
        let scope = Scope::new(&params, &resources);

        let join = Expression::Join {
            delimiter: "".into(),
            values: Box::new(Expression::List(vec![
                Expression::literal("http://"),
                Expression::AttributeRef {
                    resource: "Lb".into(),
                    attribute: "DNSName".into(),
                },
                Expression::literal(":"),
                Expression::literal(80),
            ])),
        };
        assert_eq!(scope.evaluate(&join).unwrap(), json!("http://lb.example.com:80"));

        let list_param = Expression::Join {
            delimiter: ",".into(),
            values: Box::new(Expression::ParameterRef("Subnets".into())),
        };
        assert_eq!(scope.evaluate(&list_param).unwrap(), json!("subnet-a,subnet-b"));

        let encoded = Expression::Base64(Box::new(Expression::Join {
            delimiter: "".into(),
            values: Box::new(Expression::List(vec![
                Expression::literal("ENV="),
                Expression::ParameterRef("Env".into()),
            ])),
        }));
        assert_eq!(scope.evaluate(&encoded).unwrap(), json!("RU5WPXByb2Q="));
    }

    #[test]
    fn test_evaluate_unresolved() {
        let (params, resources) = fixtures();
        let scope = Scope::new(&params, &resources);

        assert_eq!(
            scope.evaluate(&Expression::AttributeRef {
                resource: "Lb".into(),
                attribute: "CanonicalHostedZoneID".into(),
            }),
            Err(EvalError::UnresolvedAttribute {
                resource: "Lb".into(),
                attribute: "CanonicalHostedZoneID".into(),
            })
        );
        assert_eq!(
            scope.evaluate(&Expression::ResourceRef("Cluster".into())),
            Err(EvalError::UnresolvedResource("Cluster".into()))
        );
    }

    #[test]
    fn test_join_rejects_non_list() {
        let (params, resources) = fixtures();
        let scope = Scope::new(&params, &resources);

        let join = Expression::Join {
            delimiter: ",".into(),
            values: Box::new(Expression::ParameterRef("Env".into())),
        };
        assert!(matches!(
            scope.evaluate(&join),
            Err(EvalError::TypeMismatch { function: "Fn::Join", .. })
        ));
    }

    #[test]
    fn test_evaluate_properties_keeps_structure() {
        let (params, resources) = fixtures();
        let scope = Scope::new(&params, &resources);

        let mut properties = IndexMap::new();
        properties.insert(
            "Subnets".to_string(),
            Expression::List(vec![
                Expression::literal("subnet-x"),
                Expression::ResourceRef("Lb".into()),
            ]),
        );
        properties.insert(
            "Tags".to_string(),
            Expression::Map(IndexMap::from([(
                "Env".to_string(),
                Expression::ParameterRef("Env".into()),
            )])),
        );

        assert_eq!(
            scope.evaluate_properties(&properties).unwrap(),
            json!({ "Subnets": ["subnet-x", "lb-0001"], "Tags": { "Env": "prod" } })
        );
    }
}
