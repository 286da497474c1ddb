//! tandem-replay binary.
//!
//! Replays a scenario file against an in-memory document and prints one JSON
//! report per step. Settings come from `replay.toml` (or the path given with
//! `--config`) and `TANDEM_`-prefixed environment variables, e.g.
//! `TANDEM_DOCUMENT__USER_ID=alice`.

use std::path::PathBuf;

use anyhow::Context as _;
use clap::Parser;
use tandem_replay::{ReplayConfig, Scenario};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Replay an editing scenario against an in-memory document")]
struct Cli {
  /// Path to the JSON scenario.
  #[arg(short, long)]
  scenario: PathBuf,

  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "replay.toml")]
  config: PathBuf,

  /// Pretty-print the reports.
  #[arg(long)]
  pretty: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Logs go to stderr; stdout carries the reports.
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .with_writer(std::io::stderr)
    .init();

  let cli = Cli::parse();

  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(config::Environment::with_prefix("TANDEM").separator("__"))
    .build()
    .context("failed to read config file")?;

  let replay_cfg: ReplayConfig = settings
    .try_deserialize()
    .context("failed to deserialise ReplayConfig")?;

  let scenario = Scenario::from_path(&cli.scenario)
    .with_context(|| format!("failed to load scenario {:?}", cli.scenario))?;

  let reports = tandem_replay::run(&replay_cfg.document, &scenario).await;
  for report in reports {
    let line = if cli.pretty || replay_cfg.pretty {
      serde_json::to_string_pretty(&report)
    } else {
      serde_json::to_string(&report)
    }
    .context("failed to serialise report")?;
    println!("{line}");
  }

  Ok(())
}
