//! Model definitions
//!
//! Data types describing a parsed stack template. Each concern lives in
//! its own module.

mod expression;
mod output;
mod parameter;
mod resource;
mod stack;

// Re-exports
pub use expression::*;
pub use output::*;
pub use parameter::*;
pub use resource::*;
pub use stack::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stack_creation() {
        let mut stack = Stack::new();
        stack.parameters.insert(
            "DbPassword".to_string(),
            Parameter::new("DbPassword", ParameterType::String).sensitive(),
        );
        stack.resources.insert(
            "Db".to_string(),
            Resource::new("Db", "AWS::RDS::DBInstance"),
        );
        stack.resources.insert(
            "Cluster".to_string(),
            Resource::new("Cluster", "AWS::ECS::Cluster"),
        );

        assert_eq!(stack.resource_index("Cluster"), Some(1));
        assert!(stack.resource("Db").is_some());
        assert!(stack.has_parameter("DbPassword"));
        assert!(stack.has_parameter(REGION_PARAMETER));
        assert!(!stack.has_parameter("Db"));
        assert_eq!(stack.sensitive_parameters().count(), 1);
    }
}
