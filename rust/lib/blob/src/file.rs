use std::collections::HashMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::BlobError;
use crate::id::BlobId;
use crate::traits::BlobStore;

/// FileBlobStore is a BlobStore backed by the local filesystem.
///
/// Each blob is one file named by its hex id, sharded by the first byte:
///   id "e3b0c442…" → `{base_dir}/e3/e3b0c442…`
///
/// Blobs are written to a uniquely named temporary file in the same
/// directory, synced, and renamed into place, so a reader sees either nothing
/// or the complete blob, also after a crash. A batch is committed entry by
/// entry: if one entry fails, the entries before it stay written.
pub struct FileBlobStore {
    base_dir: PathBuf,
}

impl FileBlobStore {
    /// Create a new FileBlobStore rooted at `base_dir`.
    /// The directory is created if it doesn't exist.
    pub fn open(base_dir: &Path) -> Result<Self, BlobError> {
        fs::create_dir_all(base_dir).map_err(|e| BlobError::Io(e.to_string()))?;
        Ok(Self {
            base_dir: base_dir.to_path_buf(),
        })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn blob_path(&self, id: &BlobId) -> PathBuf {
        let hex = id.to_hex();
        self.base_dir.join(&hex[..2]).join(hex)
    }

    /// Whether `path` already holds exactly the blob `id`.
    fn is_intact(path: &Path, id: &BlobId, len: usize) -> Result<bool, BlobError> {
        match fs::metadata(path) {
            Ok(meta) if meta.is_file() && meta.len() == len as u64 => {}
            Ok(_) => return Ok(false),
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(BlobError::Io(e.to_string())),
        }
        let existing = fs::read(path).map_err(|e| BlobError::Io(e.to_string()))?;
        Ok(BlobId::of(&existing) == *id)
    }

    fn write_one(&self, id: &BlobId, data: &[u8]) -> Result<(), BlobError> {
        let path = self.blob_path(id);
        if Self::is_intact(&path, id, data.len())? {
            debug!("blob {} already stored, skipping write", id);
            return Ok(());
        }
        if path.exists() {
            warn!("blob {} on disk does not match its id, rewriting", id);
        }

        let dir = path
            .parent()
            .ok_or_else(|| BlobError::Io(format!("no parent directory for {:?}", path)))?;
        fs::create_dir_all(dir).map_err(|e| BlobError::Io(e.to_string()))?;

        // The temp file is removed on drop, so every error path below cleans up.
        let mut tmp = NamedTempFile::new_in(dir).map_err(|e| BlobError::Io(e.to_string()))?;
        tmp.write_all(data)
            .map_err(|e| BlobError::Io(e.to_string()))?;
        tmp.as_file()
            .sync_all()
            .map_err(|e| BlobError::Io(e.to_string()))?;

        if let Err(e) = tmp.persist(&path) {
            // A concurrent writer of the same id got there first.
            if Self::is_intact(&path, id, data.len())? {
                debug!("blob {} written concurrently", id);
                return Ok(());
            }
            return Err(BlobError::Io(e.error.to_string()));
        }
        sync_dir(dir)
    }
}

/// Make the rename itself durable.
#[cfg(unix)]
fn sync_dir(dir: &Path) -> Result<(), BlobError> {
    fs::File::open(dir)
        .and_then(|d| d.sync_all())
        .map_err(|e| BlobError::Io(e.to_string()))
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> Result<(), BlobError> {
    Ok(())
}

impl BlobStore for FileBlobStore {
    fn write_blobs(&self, blobs: &HashMap<BlobId, &[u8]>) -> Result<(), BlobError> {
        for (id, data) in blobs {
            self.write_one(id, data)?;
        }
        Ok(())
    }

    fn read_blobs(&self, ids: &[BlobId]) -> Result<HashMap<BlobId, Option<Vec<u8>>>, BlobError> {
        let mut results = HashMap::with_capacity(ids.len());
        for id in ids {
            let data = match fs::read(self.blob_path(id)) {
                Ok(data) => Some(data),
                Err(e) if e.kind() == ErrorKind::NotFound => None,
                Err(e) => return Err(BlobError::Io(e.to_string())),
            };
            results.insert(*id, data);
        }
        Ok(results)
    }

    fn check_blobs_exist(&self, ids: &[BlobId]) -> Result<HashMap<BlobId, bool>, BlobError> {
        let mut results = HashMap::with_capacity(ids.len());
        for id in ids {
            let found = match fs::metadata(self.blob_path(id)) {
                Ok(meta) => meta.is_file(),
                Err(e) if e.kind() == ErrorKind::NotFound => false,
                Err(e) => return Err(BlobError::Io(e.to_string())),
            };
            results.insert(*id, found);
        }
        Ok(results)
    }
}
