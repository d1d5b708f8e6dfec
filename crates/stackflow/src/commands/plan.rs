use crate::StackArgs;
use crate::utils::{self, Target};
use colored::Colorize;

pub async fn handle(args: &StackArgs) -> anyhow::Result<()> {
    println!("{}", "Planning...".blue());

    let target = Target::resolve(args)?;
    target.print_header();

    let stack = target
        .load_stack()
        .unwrap_or_else(|e| utils::exit_invalid(&e));
    let parameters = target.bind_parameters(&stack, args)?;
    let state = target.state.load(&target.stack_name).await?;

    let plan = target.reconciler(&state).plan(&stack, &parameters, &state)?;
    utils::print_plan(&plan);

    if !plan.has_changes {
        println!("{}", "✓ Stack is up to date".green().bold());
    }

    Ok(())
}
