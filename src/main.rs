mod cache;
mod clients;
mod config;
mod event;
mod fetch;
mod host;
mod net;
mod notify;
mod push;
mod worker;

use std::sync::Arc;

use clap::Parser;
use color_eyre::Result;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "standby")]
#[command(about = "A background worker for offline caching and push notifications")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/standby/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Cache generation tag to run as, overriding the configured one
  #[arg(short, long)]
  generation: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // stdout carries the wire protocol; logs go to stderr.
  let (stderr, _guard) = tracing_appender::non_blocking(std::io::stderr());
  tracing_subscriber::fmt()
    .with_writer(stderr)
    .with_env_filter(EnvFilter::from_default_env())
    .init();

  // Load configuration
  let config = config::WorkerConfig::load(args.config.as_deref())?;

  // Override the generation tag if specified on the command line
  let config = if let Some(version) = args.generation {
    config::WorkerConfig { version, ..config }
  } else {
    config
  };

  let (commands_tx, commands_rx) = mpsc::unbounded_channel();

  let cache = cache::SqliteCacheStore::open()?;
  let network = net::HttpNetwork::new(&config.origin)?;
  let surface = Arc::new(notify::HostSurface::new(commands_tx.clone()));
  let clients = Arc::new(clients::HostClients::new(commands_tx.clone()));

  let worker = Arc::new(worker::Worker::new(
    config,
    cache,
    network,
    surface,
    Arc::clone(&clients),
  ));

  host::run(worker, clients, commands_tx, commands_rx).await?;

  Ok(())
}
