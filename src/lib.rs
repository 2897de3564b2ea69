pub mod changelog;
pub mod config;
pub mod coverage;
pub mod diff;
pub mod error;
pub mod inventory;
pub mod logging;
pub mod matcher;
pub mod model;
pub mod pipeline;
pub mod report;
pub mod spec;
pub mod store;

pub use config::{CliArgs, Command, CommonArgs, MatcherConfig, ScanConfig, SyncConfig};
pub use error::{Result, SyncError};
pub use logging::{init_logging, LoggingConfig};
pub use pipeline::{run_bootstrap, run_coverage, run_diff, run_sync, Collaborators, SyncOptions, SyncOutcome};
pub use report::SyncReport;
pub use store::ArtifactStore;

use tracing::info;

/// Execute the CLI command. Returns the process exit code.
pub async fn run(args: CliArgs) -> std::process::ExitCode {
    let config = match SyncConfig::from_args(&args.common) {
        Ok(config) => config,
        Err(error) => {
            eprintln!("configuration error: {error:#}");
            return std::process::ExitCode::FAILURE;
        }
    };

    let result = dispatch(&config, args.command).await;
    match result {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(error) => {
            tracing::error!(category = error.category(), "{error}");
            eprintln!("error ({}): {error}", error.category());
            std::process::ExitCode::FAILURE
        }
    }
}

async fn dispatch(config: &SyncConfig, command: Command) -> Result<()> {
    match command {
        Command::Sync {
            force,
            remap,
            release,
        } => {
            let collaborators = Collaborators::from_config(config);
            let options = SyncOptions {
                force,
                remap,
                release,
            };
            match run_sync(config, &collaborators, &options).await? {
                SyncOutcome::NoOp { version } => {
                    info!(version, "already synced; use --force to re-run");
                }
                SyncOutcome::Completed { version, report } => {
                    info!(version, "sync complete");
                    print!("{}", report.render_markdown());
                }
            }
            Ok(())
        }
        Command::Bootstrap { release } => {
            let stats = run_bootstrap(config, release.as_deref()).await?;
            info!(
                mapped = stats.tools_mapped,
                unmapped = stats.tools_unmapped,
                low_confidence = stats.low_confidence.len(),
                "bootstrap complete"
            );
            for flagged in &stats.low_confidence {
                println!(
                    "low confidence: {} -> {} (score {})",
                    flagged.tool, flagged.endpoint, flagged.score
                );
            }
            Ok(())
        }
        Command::Coverage => {
            let analysis = run_coverage(config)?;
            println!(
                "coverage: {:.1}% ({}/{})",
                analysis.global_percent, analysis.covered_endpoints, analysis.total_endpoints
            );
            for domain in &analysis.domains {
                println!(
                    "  {}: {:.1}% ({}/{})",
                    domain.domain, domain.percent, domain.mapped, domain.total
                );
            }
            Ok(())
        }
        Command::Diff { release } => {
            let collaborators = Collaborators::from_config(config);
            let report = run_diff(config, &collaborators, release.as_deref()).await?;
            print!("{}", report.render_markdown());
            Ok(())
        }
    }
}
