use crate::StackArgs;
use crate::utils::{self, Target};
use colored::Colorize;

/// Returns whether every resource ended up available
pub async fn handle(args: &StackArgs, yes: bool) -> anyhow::Result<bool> {
    println!("{}", "Applying stack...".blue());

    let target = Target::resolve(args)?;
    target.print_header();

    let stack = target
        .load_stack()
        .unwrap_or_else(|e| utils::exit_invalid(&e));
    let parameters = target.bind_parameters(&stack, args)?;

    let lock = target.state.acquire_lock(&target.stack_name).await?;
    let mut state = target.state.load(&target.stack_name).await?;
    let reconciler = target.reconciler(&state);

    let plan = reconciler.plan(&stack, &parameters, &state)?;
    utils::print_plan(&plan);

    if !yes {
        println!();
        println!("{}", "⚠ Nothing was applied.".yellow().bold());
        println!("Run with {} to apply the plan.", "--yes".cyan());
        lock.release().await?;
        return Ok(true);
    }

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
    let result = reconciler.apply(&stack, &parameters, &mut state).await;
    interrupt.abort();
    let report = result?;

    target.state.save(&state).await?;
    lock.release().await?;

    utils::print_report(&report);
    if let Some(outputs) = &report.outputs {
        utils::print_outputs(outputs);
    }

    Ok(report.is_success())
}
