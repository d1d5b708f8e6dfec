mod commands;
mod utils;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "stack")]
#[command(about = "Declarative resource stacks, reconciled wave by wave", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Options shared by every command working on a stack
#[derive(Args, Debug, Clone, Default)]
pub struct StackArgs {
    /// Template file (YAML or JSON); searched for when omitted
    pub template: Option<PathBuf>,

    /// Stack name (defaults to the template file name)
    #[arg(short = 'n', long, env = "STACKFLOW_STACK")]
    pub stack_name: Option<String>,

    /// Parameter value, may be repeated
    #[arg(short = 'p', long = "param", value_name = "KEY=VALUE")]
    pub params: Vec<String>,

    /// YAML file mapping parameter names to values
    #[arg(long, value_name = "FILE")]
    pub params_file: Option<PathBuf>,

    /// Directory holding state and lock files
    #[arg(long, env = "STACKFLOW_STATE_DIR", value_name = "DIR")]
    pub state_dir: Option<PathBuf>,

    /// Region bound to AWS::Region
    #[arg(long, env = "STACKFLOW_REGION")]
    pub region: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a template and show its apply waves
    Validate {
        /// Template file (YAML or JSON); searched for when omitted
        template: Option<PathBuf>,
    },
    /// Show what an apply would change
    Plan(StackArgs),
    /// Create or update the stack's resources
    Apply {
        #[command(flatten)]
        stack: StackArgs,
        /// Skip the confirmation and apply
        #[arg(short, long)]
        yes: bool,
    },
    /// Delete the stack's resources
    Destroy {
        #[command(flatten)]
        stack: StackArgs,
        /// Skip the confirmation and destroy
        #[arg(short, long)]
        yes: bool,
    },
    /// Show the outputs of the last successful apply
    Outputs(StackArgs),
    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // stdout carries command output, logs go to stderr
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    match cli.command {
        Commands::Version => {
            println!("stackflow {}", env!("CARGO_PKG_VERSION"));
        }
        Commands::Validate { template } => {
            commands::validate::handle(template.as_deref())?;
        }
        Commands::Plan(args) => {
            commands::plan::handle(&args).await?;
        }
        Commands::Apply { stack, yes } => {
            if !commands::apply::handle(&stack, yes).await? {
                std::process::exit(1);
            }
        }
        Commands::Destroy { stack, yes } => {
            if !commands::destroy::handle(&stack, yes).await? {
                std::process::exit(1);
            }
        }
        Commands::Outputs(args) => {
            commands::outputs::handle(&args).await?;
        }
    }

    Ok(())
}
