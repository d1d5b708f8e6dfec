use crate::StackArgs;
use colored::Colorize;
use indexmap::IndexMap;
use stackflow_cloud::{
    ActionType, MemoryProvider, Plan, ProviderRegistry, Reconciler, ResourceStatus, RetryConfig,
    RunReport, StackState, StateManager, WaitConfig,
};
use stackflow_config::Settings;
use stackflow_core::{ParameterValues, RunContext, Stack, StackError};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// A stack as the command line names it, not yet parsed
pub struct Target {
    pub template: PathBuf,
    pub stack_name: String,
    pub region: String,
    pub settings: Settings,
    pub state: StateManager,
}

impl Target {
    pub fn resolve(args: &StackArgs) -> anyhow::Result<Self> {
        let settings = stackflow_config::load_settings()?;
        let template = stackflow_config::find_template_file(args.template.as_deref())?;

        let stack_name = match &args.stack_name {
            Some(name) => name.clone(),
            None => default_stack_name(&template),
        };
        validate_stack_name(&stack_name)?;

        let region = args
            .region
            .clone()
            .unwrap_or_else(|| settings.region.clone());

        let state = match args.state_dir.as_ref().or(settings.state_dir.as_ref()) {
            Some(dir) => StateManager::new(dir),
            None => StateManager::for_template(&template),
        };

        Ok(Self {
            template,
            stack_name,
            region,
            settings,
            state,
        })
    }

    pub fn print_header(&self) {
        println!("Template: {}", self.template.display().to_string().cyan());
        println!("Stack: {} ({})", self.stack_name.cyan(), self.region);
    }

    pub fn load_stack(&self) -> stackflow_core::Result<Stack> {
        stackflow_core::parse_template_file(&self.template)
    }

    pub fn bind_parameters(&self, stack: &Stack, args: &StackArgs) -> anyhow::Result<ParameterValues> {
        let supplied = collect_parameters(args)?;
        let context = RunContext::new(&self.stack_name, &self.region);
        Ok(ParameterValues::bind(stack, &supplied, &context)?)
    }

    /// Reconciler backed by the simulated provider, seeded from `state`
    pub fn reconciler(&self, state: &StackState) -> Reconciler {
        let simulated = MemoryProvider::simulated(&self.region);
        simulated.seed_from_state(state);
        let registry = ProviderRegistry::new().register("AWS::*", Arc::new(simulated));

        let retry = &self.settings.retry;
        let stabilize = &self.settings.stabilize;
        Reconciler::new(Arc::new(registry))
            .with_retry(RetryConfig {
                max_attempts: retry.max_attempts,
                initial_delay: Duration::from_millis(retry.initial_delay_ms),
                max_delay: Duration::from_millis(retry.max_delay_ms),
                backoff_multiplier: retry.multiplier,
            })
            .with_wait(WaitConfig {
                max_polls: stabilize.max_polls,
                initial_delay: Duration::from_millis(stabilize.initial_delay_ms),
                max_delay: Duration::from_millis(stabilize.max_delay_ms),
                multiplier: stabilize.multiplier,
            })
    }
}

/// `web.stack.yaml` -> `web`
pub fn default_stack_name(template: &Path) -> String {
    template
        .file_name()
        .and_then(|name| name.to_str())
        .and_then(|name| name.split('.').find(|part| !part.is_empty()))
        .unwrap_or("stack")
        .to_string()
}

/// Stack names start with a letter and contain letters, digits and hyphens
pub fn validate_stack_name(name: &str) -> anyhow::Result<()> {
    let mut chars = name.chars();
    let valid = chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '-');
    if !valid {
        anyhow::bail!(
            "Invalid stack name '{}': use letters, digits and hyphens, starting with a letter",
            name
        );
    }
    Ok(())
}

/// `KEY=VALUE` -> (KEY, VALUE)
pub fn parse_param_arg(arg: &str) -> anyhow::Result<(String, String)> {
    match arg.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => anyhow::bail!("Invalid parameter '{}': expected KEY=VALUE", arg),
    }
}

/// Read a YAML mapping of parameter values; lists become comma separated
pub fn read_params_file(path: &Path) -> anyhow::Result<HashMap<String, String>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", path.display(), e))?;
    let values: IndexMap<String, serde_yaml::Value> = serde_yaml::from_str(&content)
        .map_err(|e| anyhow::anyhow!("Invalid parameters file {}: {}", path.display(), e))?;

    let mut params = HashMap::new();
    for (name, value) in values {
        let text = match &value {
            serde_yaml::Value::Sequence(items) => items
                .iter()
                .map(scalar_text)
                .collect::<Option<Vec<_>>>()
                .map(|items| items.join(",")),
            other => scalar_text(other),
        };
        let Some(text) = text else {
            anyhow::bail!(
                "Parameter '{}' in {} must be a scalar or a list of scalars",
                name,
                path.display()
            );
        };
        params.insert(name, text);
    }
    Ok(params)
}

fn scalar_text(value: &serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Values from `--params-file`, overridden by `-p`
pub fn collect_parameters(args: &StackArgs) -> anyhow::Result<HashMap<String, String>> {
    let mut params = match &args.params_file {
        Some(path) => read_params_file(path)?,
        None => HashMap::new(),
    };
    for arg in &args.params {
        let (key, value) = parse_param_arg(arg)?;
        params.insert(key, value);
    }
    Ok(params)
}

/// Print a template error and exit
pub fn exit_invalid(error: &StackError) -> ! {
    eprintln!();
    eprintln!("{}", "✗ Invalid template".red().bold());
    eprintln!("  {}", error);
    std::process::exit(1);
}

pub fn print_plan(plan: &Plan) {
    println!();
    for action in &plan.actions {
        let marker = match action.action_type {
            ActionType::Create => "+".green(),
            ActionType::Update => "~".yellow(),
            ActionType::Delete => "-".red(),
            ActionType::NoOp => " ".normal(),
        };
        let line = format!("{} {} ({})", marker, action.id, action.resource_type);
        if action.action_type == ActionType::NoOp {
            println!("  {}", line.dimmed());
        } else {
            println!("  {}: {}", line, action.description);
        }
    }
    println!();
    println!("Plan: {}", plan.summary());
}

pub fn print_report(report: &RunReport) {
    println!();
    for outcome in report.resources.values() {
        let marker = match outcome.status {
            ResourceStatus::Available | ResourceStatus::Deleted => "✓".green(),
            ResourceStatus::Failed => "✗".red(),
            ResourceStatus::Skipped => "-".yellow(),
            _ => "…".dimmed(),
        };
        let detail = match (&outcome.error, &outcome.physical_id) {
            (Some(error), _) => error.clone(),
            (None, Some(id)) => id.clone(),
            (None, None) => String::new(),
        };
        let verb = match outcome.status {
            ResourceStatus::Failed | ResourceStatus::Skipped | ResourceStatus::Pending => {
                outcome.status.to_string()
            }
            _ => outcome.action.to_string(),
        };
        println!("  {} {} {} {}", marker, outcome.name.cyan(), verb, detail);
    }
    println!();

    let summary = format!("{} in {}ms", report, report.duration_ms);
    if report.is_success() {
        println!("{}", summary.green().bold());
    } else {
        println!("{}", summary.red().bold());
    }
    if let Some(error) = &report.output_error {
        println!("{} {}", "Outputs not resolved:".red(), error);
    }
}

pub fn print_outputs(outputs: &IndexMap<String, serde_json::Value>) {
    if outputs.is_empty() {
        return;
    }
    println!();
    println!("Outputs:");
    for (name, value) in outputs {
        let text = match value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        println!("  {} = {}", name.cyan(), text);
    }
}
