//! Stack outputs

use super::expression::Expression;

/// A named expression resolved after every resource is available
#[derive(Debug, Clone, PartialEq)]
pub struct Output {
    pub name: String,
    pub value: Expression,
    pub description: Option<String>,
}

impl Output {
    pub fn new(name: impl Into<String>, value: Expression) -> Self {
        Self {
            name: name.into(),
            value,
            description: None,
        }
    }
}
