//! Boot a framework from a config file and inspect it
//!
//! Installs the configured bootstrap bundles (plus any given on the command
//! line), starts those flagged, and prints bundle state, revisions and
//! wiring as JSON.

use anyhow::Context;
use bllvm_framework::framework::BundleManifest;
use bllvm_framework::utils::init_logging_from_config;
use bllvm_framework::{BundleId, Framework, FrameworkConfig, LoggingConfig, StartOptions};
use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "frameworkctl", version, about = "Inspect a bundle framework")]
struct Cli {
    /// Framework config (JSON); defaults apply when omitted
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Log filter, overridden by RUST_LOG
    #[arg(long)]
    log: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the effective configuration
    Config,
    /// Parse a bundle manifest and print its metadata
    Manifest { path: PathBuf },
    /// Bootstrap, then print every bundle
    Bundles {
        /// Extra bundle manifests to install and start
        #[arg(long = "install")]
        install: Vec<PathBuf>,
    },
    /// Bootstrap, then print one bundle's revisions and wiring
    Wiring { id: u64 },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => FrameworkConfig::from_json_file(path)
            .with_context(|| format!("Cannot load config {:?}", path))?,
        None => FrameworkConfig::default(),
    };
    if let Some(filter) = cli.log.clone() {
        config.logging.get_or_insert_with(LoggingConfig::default).filter = Some(filter);
    }
    config.validate()?;
    init_logging_from_config(config.logging.as_ref());

    match cli.command {
        Command::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        Command::Manifest { path } => {
            let metadata = BundleManifest::from_file(&path)?.to_metadata()?;
            let value = json!({
                "symbolic_name": metadata.symbolic_name,
                "version": metadata.version.to_string(),
                "capabilities": metadata.capabilities().iter().map(|c| c.to_string()).collect::<Vec<_>>(),
                "requirements": metadata.requirements().iter().map(|r| r.to_string()).collect::<Vec<_>>(),
            });
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        Command::Bundles { install } => {
            let framework = boot(config)?;
            for path in install {
                let location = format!("file:{}", path.display());
                let id = framework.install(&location, None)?;
                if let Err(e) = framework.start(id, StartOptions::default()) {
                    eprintln!("Cannot start {}: {}", location, e);
                }
            }
            println!("{}", serde_json::to_string_pretty(&framework.bundles())?);
            framework.shutdown();
        }
        Command::Wiring { id } => {
            let framework = boot(config)?;
            let id = BundleId(id);
            let value = json!({
                "bundle": framework.bundle(id),
                "revisions": framework.revisions(id)?,
                "wires": framework.wiring(id)?,
                "dependents": framework.dependents(id)?,
            });
            println!("{}", serde_json::to_string_pretty(&value)?);
            framework.shutdown();
        }
    }
    Ok(())
}

fn boot(config: FrameworkConfig) -> anyhow::Result<Framework> {
    let framework = Framework::new(config)?;
    framework.bootstrap()?;
    Ok(framework)
}
