//! `blobctl` — inspect and populate a content-addressed blob store.
//!
//! Usage:
//!   blobctl --backend file --path /var/lib/artifacts/blobs put capture.raw
//!   blobctl -c blobs.toml wait <id> <id> --timeout-secs 30

mod commands;

use std::path::PathBuf;

use anyhow::Context as _;
use artifact_blob::{BackendKind, BlobStoreConfig, PollMetrics};
use clap::{Parser, Subcommand};
use prometheus::{Encoder, Registry, TextEncoder};
use tracing::info;

/// Blob store CLI.
#[derive(Parser, Debug)]
#[command(name = "blobctl", about = "Content-addressed blob store CLI")]
struct Cli {
    /// Path to a TOML store config. Flags below override it.
    #[arg(short = 'c', long = "config", global = true)]
    config: Option<PathBuf>,

    /// Backend: memory, file or redb.
    #[arg(long, global = true)]
    backend: Option<BackendKind>,

    /// Blob directory (file) or database path (redb).
    #[arg(long, global = true)]
    path: Option<PathBuf>,

    /// Skip the argument-validating wrapper.
    #[arg(long = "no-validate", global = true)]
    no_validate: bool,

    /// Print poll metrics to stderr (Prometheus text format) on exit.
    #[arg(long, global = true)]
    metrics: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Store files; prints one id per file, in argument order.
    Put {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Read a blob.
    Get {
        id: String,
        /// Write to a file instead of stdout.
        #[arg(short = 'o', long = "output")]
        output: Option<PathBuf>,
    },

    /// Check which blobs exist.
    Exists {
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// Wait for blobs to appear.
    Wait {
        #[arg(required = true)]
        ids: Vec<String>,
        /// Give up once a new poll would start after this many seconds.
        #[arg(long = "timeout-secs", default_value_t = 10)]
        timeout_secs: u64,
    },
}

impl Cli {
    fn store_config(&self) -> anyhow::Result<BlobStoreConfig> {
        let mut config = match &self.config {
            Some(path) => BlobStoreConfig::load(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => BlobStoreConfig::default(),
        };
        if let Some(backend) = self.backend {
            config.backend = backend;
        }
        if let Some(path) = &self.path {
            config.path = Some(path.clone());
        }
        if self.no_validate {
            config.validate = false;
        }
        Ok(config)
    }
}

fn main() -> anyhow::Result<()> {
    // Logs go to stderr so blob contents on stdout stay clean.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = cli.store_config()?;
    info!("using {} backend", config.backend);

    let registry = Registry::new();
    let metrics = PollMetrics::register(&registry)?;
    let store = artifact_blob::open_store(&config, Some(metrics))?;
    let mut stdout = std::io::stdout().lock();

    let result = match cli.command {
        Commands::Put { files } => commands::put(store.as_ref(), &files, &mut stdout),
        Commands::Get { id, output } => {
            commands::get(store.as_ref(), &id, output.as_deref(), &mut stdout)
        }
        Commands::Exists { ids } => commands::exists(store.as_ref(), &ids, &mut stdout),
        Commands::Wait { ids, timeout_secs } => commands::wait(
            store.as_ref(),
            &ids,
            std::time::Duration::from_secs(timeout_secs),
            &mut stdout,
        ),
    };

    if cli.metrics {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&registry.gather(), &mut buf)?;
        eprint!("{}", String::from_utf8_lossy(&buf));
    }
    result
}
