//! Mockdata command line tool.
//!
//! Loads playbook templates from one or more directories, optionally dumps
//! the merged configuration, and uploads pending steps to their endpoints.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mockdata_core::{binder, Engine, Loader, RunOptions};

#[derive(Parser)]
#[command(name = "mockdata")]
#[command(version, about = "Generate and upload test fixtures from YAML playbooks", long_about = None)]
struct Cli {
    /// Path to a template directory (can be specified multiple times)
    #[arg(short = 't', long = "templates", value_name = "DIR", required = true)]
    templates: Vec<PathBuf>,

    /// Index or main template file name within each directory
    #[arg(long, value_name = "FILE", default_value = "index.yaml")]
    index_file: String,

    /// Number of retries to resolve !ref dependencies or HTTP errors
    #[arg(long, default_value_t = 10)]
    retries: u32,

    /// Dump the merged configuration as YAML to stdout
    #[arg(long)]
    dump: bool,

    /// Dump the merged configuration as pretty JSON to stdout
    #[arg(long)]
    dump_json: bool,

    /// Prepare every request but do not upload any data
    #[arg(long)]
    dry_run: bool,

    /// Upload to endpoints even when dumping
    #[arg(long)]
    upload: bool,

    /// Keep running steps after a failure
    #[arg(long)]
    force: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so dump output on stdout stays clean.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if dotenvy::dotenv().is_err() {
        tracing::debug!("no .env file loaded");
    }

    let cli = Cli::parse();

    let loader = Loader::new(cli.index_file.as_str());
    let mut config = loader
        .load(&cli.templates)
        .context("failed to load templates")?;

    if cli.dump || cli.dump_json {
        // Bind so references resolve in the dump output.
        binder::bind(&mut config);
        if cli.dump {
            print!("{}", serde_yaml::to_string(&config)?);
        }
        if cli.dump_json {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        if !cli.upload {
            return Ok(());
        }
    }

    let options = RunOptions {
        retries: cli.retries,
        dry_run: cli.dry_run,
        force: cli.force,
    };
    let engine = Engine::new(options)?;
    let report = engine
        .run(&mut config)
        .await
        .context("failed to run playbooks")?;

    tracing::info!(
        passes = report.passes,
        completed = report.completed(),
        attempts = report.attempts.len(),
        "run finished"
    );
    Ok(())
}
