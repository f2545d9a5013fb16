use clap::Parser;

use apriltag_telemetry::{run_cli, Cli, DEFAULT_LOG_FILTER};

fn main() -> eyre::Result<()> {
    let cli = Cli::parse();
    let log_file = cli.log_file.clone();
    let _tracing_guard = env_tracing_logger::initiate_logging(
        log_file.as_ref(),
        false,
        DEFAULT_LOG_FILTER,
    )
    .map_err(|e| eyre::eyre!(e))?;
    run_cli(cli)
}
