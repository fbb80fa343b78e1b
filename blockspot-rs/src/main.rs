mod detect;

use clap::{Parser, Subcommand};
use flexi_logger::{Logger, LoggerHandle};
use std::io::{self, Write};

#[derive(Parser)]
#[command(name = "blockspot", about = "blockspot CLI: blockwise spot detection in large 3-D volumes")]
struct Cli {
    /// Log filter, e.g. "info" or "blockspot=debug" (RUST_LOG takes precedence)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    Detect(detect::DetectArgs),
}

fn progress(prog: f64, msg: &str) {
    let _ = writeln!(
        io::stderr(),
        "{}",
        serde_json::json!({"progress": prog, "message": msg})
    );
    let _ = io::stderr().flush();
}

fn setup_logging(base_level: &str) -> Result<LoggerHandle, flexi_logger::FlexiLoggerError> {
    Logger::try_with_env_or_str(base_level)?
        .log_to_stderr()
        .start()
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let _logger = setup_logging(&cli.log_level)?;
    match cli.command {
        Commands::Detect(args) => detect::run(args, progress)?,
    }
    Ok(())
}
