use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::BlobError;
use crate::file::FileBlobStore;
use crate::memory::MemoryBlobStore;
use crate::metrics::PollMetrics;
use crate::redb::RedbBlobStore;
use crate::traits::BlobStore;
use crate::validate::ValidatingBlobStore;
use crate::wait::{PollPolicy, PollingWaiter, WaitingBlobStore};

/// Which backend holds the blobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Process-local, lost on exit. Useful for tests.
    #[default]
    Memory,
    /// One file per blob under `path`.
    File,
    /// Embedded redb database at `path`.
    Redb,
}

impl FromStr for BackendKind {
    type Err = BlobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "memory" => Ok(BackendKind::Memory),
            "file" => Ok(BackendKind::File),
            "redb" => Ok(BackendKind::Redb),
            other => Err(BlobError::Config(format!("unknown blob backend: {:?}", other))),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BackendKind::Memory => "memory",
            BackendKind::File => "file",
            BackendKind::Redb => "redb",
        };
        f.write_str(name)
    }
}

/// Blob store configuration.
///
/// Loaded from TOML:
///
/// ```toml
/// backend = "file"
/// path = "/var/lib/artifacts/blobs"
/// validate = true
///
/// [poll]
/// initial_interval_ms = 100
/// max_interval_ms = 5000
/// multiplier = 2.0
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlobStoreConfig {
    pub backend: BackendKind,

    /// Directory (file) or database file (redb). Unused for memory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    /// Wrap the backend in a [`ValidatingBlobStore`].
    pub validate: bool,

    /// Backoff used by [`BlobStoreConfig::waiter`].
    pub poll: PollPolicy,
}

impl Default for BlobStoreConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Memory,
            path: None,
            validate: true,
            poll: PollPolicy::default(),
        }
    }
}

impl BlobStoreConfig {
    /// Parse configuration from command-line arguments.
    ///
    /// Supported flags:
    /// - `--backend=memory|file|redb`
    /// - `--path=PATH`
    /// - `--no-validate`
    /// - `--poll-initial-ms=N`
    /// - `--poll-max-ms=N`
    pub fn from_args(args: &[String]) -> Result<Self, BlobError> {
        let mut config = BlobStoreConfig::default();

        for arg in args {
            if let Some(val) = arg.strip_prefix("--backend=") {
                config.backend = val.parse()?;
            } else if let Some(val) = arg.strip_prefix("--path=") {
                config.path = Some(PathBuf::from(val));
            } else if arg == "--no-validate" {
                config.validate = false;
            } else if let Some(val) = arg.strip_prefix("--poll-initial-ms=") {
                config.poll.initial_interval_ms = parse_ms(arg, val)?;
            } else if let Some(val) = arg.strip_prefix("--poll-max-ms=") {
                config.poll.max_interval_ms = parse_ms(arg, val)?;
            }
        }

        config.poll.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, BlobError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| BlobError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, BlobError> {
        let config: Self =
            toml::from_str(content).map_err(|e| BlobError::Config(e.to_string()))?;
        config.poll.validate()?;
        Ok(config)
    }

    /// A waiter using the configured backoff.
    pub fn waiter(&self) -> PollingWaiter {
        PollingWaiter::new(self.poll.clone())
    }

    fn require_path(&self) -> Result<&Path, BlobError> {
        self.path
            .as_deref()
            .ok_or_else(|| BlobError::Config(format!("backend {} requires a path", self.backend)))
    }
}

fn parse_ms(arg: &str, val: &str) -> Result<u64, BlobError> {
    val.parse()
        .map_err(|_| BlobError::Config(format!("invalid milliseconds in {:?}", arg)))
}

/// Build the configured blob store.
///
/// Call once at startup and hand the result to every consumer. The store's
/// `read_and_wait_for_blobs` uses the configured backoff and records poll
/// hits into `metrics` when given.
pub fn open_store(
    config: &BlobStoreConfig,
    metrics: Option<PollMetrics>,
) -> Result<Arc<dyn BlobStore>, BlobError> {
    config.poll.validate()?;
    info!(
        "opening {} blob store (validate={}, metrics={})",
        config.backend,
        config.validate,
        metrics.is_some()
    );

    let mut waiter = config.waiter();
    if let Some(metrics) = metrics {
        waiter = waiter.with_metrics(metrics);
    }

    let store = match config.backend {
        BackendKind::Memory => finish(MemoryBlobStore::new(), config.validate, waiter),
        BackendKind::File => finish(
            FileBlobStore::open(config.require_path()?)?,
            config.validate,
            waiter,
        ),
        BackendKind::Redb => finish(
            RedbBlobStore::open(config.require_path()?)?,
            config.validate,
            waiter,
        ),
    };
    Ok(store)
}

fn finish<S: BlobStore + 'static>(
    store: S,
    validate: bool,
    waiter: PollingWaiter,
) -> Arc<dyn BlobStore> {
    if validate {
        Arc::new(WaitingBlobStore::new(ValidatingBlobStore::new(store), waiter))
    } else {
        Arc::new(WaitingBlobStore::new(store, waiter))
    }
}
