use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::BlobError;
use crate::id::BlobId;
use crate::traits::BlobStore;

/// MemoryBlobStore keeps blobs in a process-local map.
///
/// A batch write holds the lock for the whole batch, so it is all-or-nothing
/// and readers never see half of it.
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<BlobId, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct blobs stored.
    pub fn len(&self) -> Result<usize, BlobError> {
        let blobs = self
            .blobs
            .read()
            .map_err(|e| BlobError::Storage(e.to_string()))?;
        Ok(blobs.len())
    }

    pub fn is_empty(&self) -> Result<bool, BlobError> {
        Ok(self.len()? == 0)
    }
}

impl BlobStore for MemoryBlobStore {
    fn write_blobs(&self, blobs: &HashMap<BlobId, &[u8]>) -> Result<(), BlobError> {
        let mut stored = self
            .blobs
            .write()
            .map_err(|e| BlobError::Storage(e.to_string()))?;
        for (id, data) in blobs {
            stored.insert(*id, data.to_vec());
        }
        Ok(())
    }

    fn read_blobs(&self, ids: &[BlobId]) -> Result<HashMap<BlobId, Option<Vec<u8>>>, BlobError> {
        let stored = self
            .blobs
            .read()
            .map_err(|e| BlobError::Storage(e.to_string()))?;
        Ok(ids.iter().map(|id| (*id, stored.get(id).cloned())).collect())
    }

    fn check_blobs_exist(&self, ids: &[BlobId]) -> Result<HashMap<BlobId, bool>, BlobError> {
        let stored = self
            .blobs
            .read()
            .map_err(|e| BlobError::Storage(e.to_string()))?;
        Ok(ids.iter().map(|id| (*id, stored.contains_key(id))).collect())
    }
}
