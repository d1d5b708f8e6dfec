use crate::StackArgs;
use crate::utils::{self, Target};
use colored::Colorize;

pub async fn handle(args: &StackArgs) -> anyhow::Result<()> {
    let target = Target::resolve(args)?;
    let state = target.state.load(&target.stack_name).await?;

    if state.outputs.is_empty() {
        println!(
            "{} {}",
            "No outputs recorded for".yellow(),
            target.stack_name.cyan()
        );
        println!("Outputs are recorded by a fully successful `stack apply --yes`.");
        return Ok(());
    }

    utils::print_outputs(&state.outputs);
    Ok(())
}
