//! Stack parameters

use serde::{Deserialize, Serialize};
use std::fmt;

/// Pseudo parameter holding the stack name
pub const STACK_NAME_PARAMETER: &str = "AWS::StackName";
/// Pseudo parameter holding the target region
pub const REGION_PARAMETER: &str = "AWS::Region";

/// Pseudo parameters that every stack may reference without declaring them.
pub const PSEUDO_PARAMETERS: [&str; 2] = [STACK_NAME_PARAMETER, REGION_PARAMETER];

/// Declared type of a parameter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum ParameterType {
    String,
    Number,
    CommaDelimitedList,
    NumberList,
    /// An enumerated cloud identifier such as `AWS::EC2::KeyPair::KeyName`
    CloudId(String),
    /// `List<...>` of cloud identifiers
    CloudIdList(String),
}

impl ParameterType {
    /// Parse the `Type` field of a parameter declaration
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        match s {
            "String" => return Some(Self::String),
            "Number" => return Some(Self::Number),
            "CommaDelimitedList" => return Some(Self::CommaDelimitedList),
            "List<Number>" => return Some(Self::NumberList),
            _ => {}
        }
        if let Some(inner) = s.strip_prefix("List<").and_then(|r| r.strip_suffix('>')) {
            return is_cloud_id(inner).then(|| Self::CloudIdList(inner.to_string()));
        }
        is_cloud_id(s).then(|| Self::CloudId(s.to_string()))
    }

    pub fn is_list(&self) -> bool {
        matches!(
            self,
            Self::CommaDelimitedList | Self::NumberList | Self::CloudIdList(_)
        )
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Number | Self::NumberList)
    }
}

fn is_cloud_id(s: &str) -> bool {
    let parts: Vec<&str> = s.split("::").collect();
    parts.len() >= 2 && parts.iter().all(|p| !p.is_empty())
}

impl fmt::Display for ParameterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String => write!(f, "String"),
            Self::Number => write!(f, "Number"),
            Self::CommaDelimitedList => write!(f, "CommaDelimitedList"),
            Self::NumberList => write!(f, "List<Number>"),
            Self::CloudId(id) => write!(f, "{}", id),
            Self::CloudIdList(id) => write!(f, "List<{}>", id),
        }
    }
}

/// A named, typed input supplied at apply time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub param_type: ParameterType,
    #[serde(default)]
    pub description: Option<String>,
    /// Default in its textual form (lists are comma separated)
    #[serde(default)]
    pub default: Option<String>,
    #[serde(default)]
    pub allowed_values: Vec<String>,
    /// `NoEcho`: the value never appears in logs, errors or results
    #[serde(default)]
    pub sensitive: bool,
}

impl Parameter {
    pub fn new(name: impl Into<String>, param_type: ParameterType) -> Self {
        Self {
            name: name.into(),
            param_type,
            description: None,
            default: None,
            allowed_values: Vec::new(),
            sensitive: false,
        }
    }

    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }

    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }
}
