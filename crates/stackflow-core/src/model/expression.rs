//! Property expressions

use indexmap::IndexMap;
use serde_json::Value;

/// A property value as written in the template.
///
/// Expressions are kept symbolic until the owning resource is about to be
/// reconciled; see [`crate::eval::Scope`] for the interpreter.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// A scalar literal (string, number, bool or null)
    Literal(Value),
    /// A list whose items are independent expressions
    List(Vec<Expression>),
    /// A map whose values are independent expressions
    Map(IndexMap<String, Expression>),
    /// `Ref` to a parameter (including pseudo parameters)
    ParameterRef(String),
    /// `Ref` to a resource, evaluating to its physical id
    ResourceRef(String),
    /// `Fn::GetAtt` of a resource attribute
    AttributeRef { resource: String, attribute: String },
    /// `Fn::Join` of a list-valued expression
    Join {
        delimiter: String,
        values: Box<Expression>,
    },
    /// `Fn::Base64` of a string-valued expression
    Base64(Box<Expression>),
}

impl Expression {
    pub fn literal(value: impl Into<Value>) -> Self {
        Expression::Literal(value.into())
    }

    /// Names of all resources this expression depends on, in the order they
    /// appear, without duplicates.
    pub fn resource_references(&self) -> Vec<&str> {
        let mut names = Vec::new();
        self.walk(&mut |expr| {
            let name = match expr {
                Expression::ResourceRef(name) => name.as_str(),
                Expression::AttributeRef { resource, .. } => resource.as_str(),
                _ => return,
            };
            if !names.contains(&name) {
                names.push(name);
            }
        });
        names
    }

    /// Names of all parameters this expression reads.
    pub fn parameter_references(&self) -> Vec<&str> {
        let mut names = Vec::new();
        self.walk(&mut |expr| {
            if let Expression::ParameterRef(name) = expr
                && !names.contains(&name.as_str())
            {
                names.push(name.as_str());
            }
        });
        names
    }

    fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a Expression)) {
        visit(self);
        match self {
            Expression::List(items) => items.iter().for_each(|item| item.walk(visit)),
            Expression::Map(entries) => entries.values().for_each(|value| value.walk(visit)),
            Expression::Join { values, .. } => values.walk(visit),
            Expression::Base64(inner) => inner.walk(visit),
            Expression::Literal(_)
            | Expression::ParameterRef(_)
            | Expression::ResourceRef(_)
            | Expression::AttributeRef { .. } => {}
        }
    }
}
