//! AMI Publisher CLI
//!
//! Publishes a stemcell's machine image to every configured region and
//! prints the updated manifest on success.

use ami_publisher::{
    ConfigLoader, DispatchPolicy, LogFormat, Manifest, Orchestrator, ProviderDriverFactory,
    RunError, init_logging,
};
use anyhow::{Context, Result};
use clap::Parser;
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tracing::{Level, error, info};

/// Multi-region AMI publisher
#[derive(Parser)]
#[command(name = "ami-publisher")]
#[command(version)]
#[command(about = "Publish a machine image to multiple regions concurrently", long_about = None)]
struct Cli {
    /// Run configuration (JSON)
    #[arg(short, long, value_name = "PATH")]
    config: PathBuf,

    /// Machine image to publish
    #[arg(long, value_name = "PATH")]
    image: PathBuf,

    /// Stemcell manifest to update
    #[arg(long, value_name = "PATH")]
    manifest: PathBuf,

    /// Log line format
    #[arg(long, value_enum, default_value_t = LogFormat::Plain)]
    log_format: LogFormat,

    /// Default log level when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: Level,

    /// Abort remaining regions after the first failure
    #[arg(long)]
    fail_fast: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    match run(cli).await {
        Ok(()) => process::exit(0),
        Err(e) => {
            match e.downcast_ref::<RunError>() {
                Some(RunError::RegionsFailed { errors }) => {
                    for err in errors {
                        error!(
                            region = err.region(),
                            code = err.code(),
                            actions = ?err.suggested_actions(),
                            "{}",
                            err
                        );
                    }
                }
                _ => error!("{:#}", e),
            }
            process::exit(1);
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    if !cli.image.is_file() {
        return Err(RunError::SourceImage(cli.image.display().to_string()).into());
    }

    let env: HashMap<String, String> = std::env::vars().collect();
    let config_file = File::open(&cli.config)
        .with_context(|| format!("opening config {}", cli.config.display()))?;
    let config = ConfigLoader::load(BufReader::new(config_file), &env)?;

    let manifest_file = File::open(&cli.manifest)
        .with_context(|| format!("opening manifest {}", cli.manifest.display()))?;
    let mut manifest = Manifest::from_reader(BufReader::new(manifest_file))?;

    let policy = if cli.fail_fast {
        DispatchPolicy::FailFast
    } else {
        DispatchPolicy::WaitForAll
    };
    info!(
        regions = config.ami_regions.len(),
        image = %cli.image.display(),
        "publishing stemcell {} {}",
        manifest.name,
        manifest.version
    );

    let orchestrator =
        Orchestrator::new(Arc::new(ProviderDriverFactory::new())).with_policy(policy);
    orchestrator
        .publish(config, &cli.image, &mut manifest)
        .await?;

    let mut stdout = io::stdout().lock();
    manifest.write_to(&mut stdout)?;
    stdout.flush()?;

    Ok(())
}
