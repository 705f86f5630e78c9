use anyhow::Result;
use clap::{Parser, Subcommand};
use cmd::commands::{FillArgs, fill_command};
use gapfill::FillMode;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(name = "tsfill")]
/// Fill gaps in grouped time series
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fill gaps between each group's first and last observation
    Gaps(FillArgs),
    /// Extend each group from its first observation to a target time
    Forward {
        /// Target time: an integer, date or timestamp literal
        #[arg(long)]
        target: Option<String>,

        #[command(flatten)]
        args: FillArgs,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    diagnostics::init_diagnostics();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Gaps(args) => fill_command(FillMode::Gaps, args, None, None).await,
        Commands::Forward { target, args } => {
            fill_command(FillMode::Forward, args, target.as_deref(), None).await
        }
    }
}
