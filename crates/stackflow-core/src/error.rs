use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StackError {
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Failed to read template: {path}\nReason: {message}")]
    Io { path: PathBuf, message: String },

    #[error("Reference error: {owner} refers to undeclared name '{target}'")]
    Reference { owner: String, target: String },

    #[error("Reference error: resource '{0}' refers to itself")]
    SelfReference(String),

    #[error("Dependency cycle between resources: {}", .0.join(", "))]
    Cycle(Vec<String>),

    #[error("Missing value for parameter '{0}'")]
    MissingParameter(String),

    #[error("Invalid value for parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("Unknown parameter supplied: {0}")]
    UnknownParameter(String),

    #[error("Output '{output}' could not be resolved: {source}")]
    UnresolvedOutput {
        output: String,
        #[source]
        source: EvalError,
    },
}

impl StackError {
    /// Errors raised before any provisioning side effect can happen.
    pub fn is_validation_error(&self) -> bool {
        matches!(
            self,
            StackError::Parse(_)
                | StackError::Io { .. }
                | StackError::Reference { .. }
                | StackError::SelfReference(_)
                | StackError::Cycle(_)
        )
    }
}

/// Errors raised while evaluating an expression.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    #[error("parameter '{0}' has no bound value")]
    UnboundParameter(String),

    #[error("resource '{0}' has not been provisioned")]
    UnresolvedResource(String),

    #[error("attribute '{attribute}' of resource '{resource}' was never reported")]
    UnresolvedAttribute { resource: String, attribute: String },

    #[error("{function}: {message}")]
    TypeMismatch {
        function: &'static str,
        message: String,
    },
}

pub type Result<T> = std::result::Result<T, StackError>;
