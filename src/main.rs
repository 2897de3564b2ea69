use clap::Parser;
use std::process::ExitCode;
use toolsync::{init_logging, run, CliArgs, LoggingConfig};

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(error) = init_logging(LoggingConfig::from_env()) {
        eprintln!("failed to initialize logging: {error:#}");
        return ExitCode::FAILURE;
    }

    let args = CliArgs::parse();
    run(args).await
}
