use clap::Parser;
use std::path::PathBuf;

mod commands;
mod output;

use commands::Commands;

#[derive(Parser)]
#[command(name = "cachevol")]
#[command(about = "Attach and detach cache pools in front of logical volumes", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Volume group to operate on
    #[arg(long, global = true, default_value = "vg0")]
    vg: String,

    /// Directory holding volume group metadata
    #[arg(long, global = true)]
    metadata_dir: Option<PathBuf>,

    /// Config file (defaults to CACHEVOL_CONFIG or the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Milliseconds between dirty-block checks while flushing
    #[arg(long, global = true, value_parser = clap::value_parser!(u64).range(1..))]
    flush_interval_ms: Option<u64>,

    /// Give up flushing after this many seconds (0 waits forever)
    #[arg(long, global = true)]
    flush_timeout_secs: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    color_eyre::install()?;
    cachevol_utils::tracing::init("info").map_err(|e| eyre::eyre!(e))?;

    let cli = Cli::parse();
    let result = commands::run(cli).await;

    if let Err(report) = &result {
        if let Some(error) = report.downcast_ref::<cachevol_core::Error>() {
            tracing::error!(
                class = ?error.class(),
                hint = ?error.recovery_hint(),
                "{error}"
            );
        }
    }
    result
}
