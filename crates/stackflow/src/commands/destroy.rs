use crate::StackArgs;
use crate::utils::{self, Target};
use colored::Colorize;
use stackflow_core::{DeletionPolicy, ParameterValues};

/// Returns whether every resource was deleted or retained
pub async fn handle(args: &StackArgs, yes: bool) -> anyhow::Result<bool> {
    println!("{}", "Destroying stack...".blue());

    let target = Target::resolve(args)?;
    target.print_header();

    let stack = target
        .load_stack()
        .unwrap_or_else(|e| utils::exit_invalid(&e));
    // Nothing is evaluated on destroy; values only serve to mask errors
    let parameters = match target.bind_parameters(&stack, args) {
        Ok(parameters) => parameters,
        Err(e) => {
            tracing::warn!("Parameters not bound: {}", e);
            ParameterValues::default()
        }
    };

    let lock = target.state.acquire_lock(&target.stack_name).await?;
    let mut state = target.state.load(&target.stack_name).await?;

    if state.resources.is_empty() {
        println!("{}", "Nothing to destroy".yellow());
        lock.release().await?;
        return Ok(true);
    }

    if !yes {
        println!();
        println!("Resources in state:");
        for (name, record) in state.resources.iter().rev() {
            let retained = stack
                .resource(name)
                .is_some_and(|r| r.deletion_policy == DeletionPolicy::Retain);
            let note = if retained {
                " (retained)".yellow().to_string()
            } else if stack.resource(name).is_none() {
                " (no longer declared)".dimmed().to_string()
            } else {
                String::new()
            };
            println!(
                "  - {} {} {}{}",
                name.cyan(),
                record.kind,
                record.physical_id,
                note
            );
        }
        println!();
        println!("{}", "⚠ Nothing was deleted.".yellow().bold());
        println!("Run with {} to destroy the stack.", "--yes".cyan());
        lock.release().await?;
        return Ok(true);
    }

    let reconciler = target.reconciler(&state);
    let cancel = reconciler.cancel_flag();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!(
                "{}",
                "Interrupted, stopping after the current wave...".yellow()
            );
            cancel.cancel();
        }
    });
    let result = reconciler.destroy(&stack, &parameters, &mut state).await;
    interrupt.abort();
    let report = result?;

    target.state.save(&state).await?;
    lock.release().await?;

    utils::print_report(&report);

    Ok(report.is_success())
}
