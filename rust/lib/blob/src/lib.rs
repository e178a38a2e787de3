//! Content-addressed storage for uploaded artifacts.
//!
//! Blobs are identified by the SHA-256 of their bytes ([`BlobId`]) and stored
//! through the [`BlobStore`] trait. Backends implement three bulk primitives;
//! single-blob helpers, unknown-hash writes and the wait loop for lagging
//! backends ([`PollingWaiter`]) are built on top of them.

pub mod config;
pub mod error;
pub mod file;
pub mod id;
pub mod memory;
pub mod metrics;
pub mod redb;
pub mod traits;
pub mod validate;
pub mod wait;

pub use config::{BackendKind, BlobStoreConfig, open_store};
pub use error::BlobError;
pub use file::FileBlobStore;
pub use id::{BLOB_ID_LEN, BlobId};
pub use memory::MemoryBlobStore;
pub use metrics::PollMetrics;
pub use self::redb::RedbBlobStore;
pub use traits::BlobStore;
pub use validate::ValidatingBlobStore;
pub use wait::{PollPolicy, PollingWaiter, WaitingBlobStore};
