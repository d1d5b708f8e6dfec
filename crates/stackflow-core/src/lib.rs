//! StackFlow core
//!
//! Everything that can be decided before a single provider call is made:
//!
//! - [`parser`]: builds a validated [`Stack`] from a YAML/JSON template
//! - [`graph`]: orders resources into concurrently applicable waves
//! - [`params`]: binds parameter values and masks sensitive ones
//! - [`eval`]: evaluates property and output expressions
//! - [`projector`]: resolves stack outputs after a successful apply

pub mod error;
pub mod eval;
pub mod graph;
pub mod model;
pub mod params;
pub mod parser;
pub mod projector;

pub use error::{EvalError, Result, StackError};
pub use eval::{ResolvedResource, Scope};
pub use graph::{DependencyGraph, Wave, resolve_waves};
pub use model::*;
pub use params::{ParameterValues, REDACTED, RunContext};
pub use parser::{parse_template_file, parse_template_str};
pub use projector::project_outputs;
