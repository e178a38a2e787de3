use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::error::BlobError;
use crate::id::BlobId;
use crate::wait::PollingWaiter;

/// BlobStore stores immutable binary artifacts (collected files, memory
/// captures, execution outputs) addressed by the hash of their content.
///
/// Backends implement the three bulk primitives. Everything else is provided
/// on top of them and should not need overriding, except by wrappers that
/// forward to another store.
///
/// Absence is never an error: reads report missing blobs as `None`.
pub trait BlobStore: Send + Sync {
    /// Create or overwrite blobs. Every key is expected to be the id of its
    /// value. Whether a failing batch leaves earlier entries committed is up
    /// to the backend.
    fn write_blobs(&self, blobs: &HashMap<BlobId, &[u8]>) -> Result<(), BlobError>;

    /// Read blobs. Every requested id is a key of the result; missing blobs
    /// map to `None`.
    fn read_blobs(&self, ids: &[BlobId]) -> Result<HashMap<BlobId, Option<Vec<u8>>>, BlobError>;

    /// Check which blobs exist without transferring their contents.
    fn check_blobs_exist(&self, ids: &[BlobId]) -> Result<HashMap<BlobId, bool>, BlobError>;

    /// Write blobs whose ids are not known yet. Returns one id per input, in
    /// input order; duplicate inputs yield duplicate ids.
    fn write_blobs_with_unknown_hashes(&self, blobs: &[&[u8]]) -> Result<Vec<BlobId>, BlobError> {
        let ids: Vec<BlobId> = blobs.iter().map(|data| BlobId::of(data)).collect();
        let batch: HashMap<BlobId, &[u8]> = ids.iter().copied().zip(blobs.iter().copied()).collect();
        self.write_blobs(&batch)?;
        Ok(ids)
    }

    fn write_blob_with_unknown_hash(&self, blob: &[u8]) -> Result<BlobId, BlobError> {
        let ids = self.write_blobs_with_unknown_hashes(&[blob])?;
        ids.into_iter()
            .next()
            .ok_or_else(|| BlobError::Storage("write returned no blob id".into()))
    }

    /// Read a single blob. Returns None if it does not exist.
    fn read_blob(&self, id: &BlobId) -> Result<Option<Vec<u8>>, BlobError> {
        Ok(self.read_blobs(std::slice::from_ref(id))?.remove(id).flatten())
    }

    fn check_blob_exists(&self, id: &BlobId) -> Result<bool, BlobError> {
        let exists = self.check_blobs_exist(std::slice::from_ref(id))?;
        Ok(exists.get(id).copied().unwrap_or(false))
    }

    /// Read blobs, polling until they all show up or `timeout` passes.
    ///
    /// `timeout` bounds the start of the last read, not its end. Blobs still
    /// missing at the deadline are returned as `None`. Uses the default
    /// [`PollingWaiter`]; build one explicitly to control backoff, metrics or
    /// cancellation.
    fn read_and_wait_for_blobs(
        &self,
        ids: &[BlobId],
        timeout: Duration,
    ) -> Result<HashMap<BlobId, Option<Vec<u8>>>, BlobError> {
        PollingWaiter::default().wait(self, ids, timeout)
    }
}

/// Shared stores forward everything, so a wrapper's overrides survive being
/// put behind an `Arc`.
impl<S: BlobStore + ?Sized> BlobStore for Arc<S> {
    fn write_blobs(&self, blobs: &HashMap<BlobId, &[u8]>) -> Result<(), BlobError> {
        (**self).write_blobs(blobs)
    }

    fn read_blobs(&self, ids: &[BlobId]) -> Result<HashMap<BlobId, Option<Vec<u8>>>, BlobError> {
        (**self).read_blobs(ids)
    }

    fn check_blobs_exist(&self, ids: &[BlobId]) -> Result<HashMap<BlobId, bool>, BlobError> {
        (**self).check_blobs_exist(ids)
    }

    fn write_blobs_with_unknown_hashes(&self, blobs: &[&[u8]]) -> Result<Vec<BlobId>, BlobError> {
        (**self).write_blobs_with_unknown_hashes(blobs)
    }

    fn write_blob_with_unknown_hash(&self, blob: &[u8]) -> Result<BlobId, BlobError> {
        (**self).write_blob_with_unknown_hash(blob)
    }

    fn read_blob(&self, id: &BlobId) -> Result<Option<Vec<u8>>, BlobError> {
        (**self).read_blob(id)
    }

    fn check_blob_exists(&self, id: &BlobId) -> Result<bool, BlobError> {
        (**self).check_blob_exists(id)
    }

    fn read_and_wait_for_blobs(
        &self,
        ids: &[BlobId],
        timeout: Duration,
    ) -> Result<HashMap<BlobId, Option<Vec<u8>>>, BlobError> {
        (**self).read_and_wait_for_blobs(ids, timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBlobStore;

    #[test]
    fn test_round_trip_unknown_hash() {
        let store = MemoryBlobStore::new();
        let data = b"\x7fELF collected binary".to_vec();
        let id = store.write_blob_with_unknown_hash(&data).unwrap();
        assert_eq!(id, BlobId::of(&data));
        assert_eq!(store.read_blob(&id).unwrap(), Some(data));
    }

    #[test]
    fn test_unknown_hashes_keep_order_and_duplicates() {
        let store = MemoryBlobStore::new();
        let blobs: [&[u8]; 3] = [b"first", b"second", b"first"];
        let ids = store.write_blobs_with_unknown_hashes(&blobs).unwrap();
        assert_eq!(
            ids,
            vec![BlobId::of(b"first"), BlobId::of(b"second"), BlobId::of(b"first")]
        );
        assert_eq!(store.len().unwrap(), 2);
    }

    #[test]
    fn test_empty_unknown_hash_batch() {
        let store = MemoryBlobStore::new();
        assert!(store.write_blobs_with_unknown_hashes(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_missing_blob_is_absent_not_error() {
        let store = MemoryBlobStore::new();
        let id = BlobId::of(b"never written");
        assert_eq!(store.read_blob(&id).unwrap(), None);
        assert!(!store.check_blob_exists(&id).unwrap());

        let results = store.read_blobs(&[id]).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[&id], None);
    }

    #[test]
    fn test_exists_after_write() {
        let store = MemoryBlobStore::new();
        let id = store.write_blob_with_unknown_hash(b"registry hive").unwrap();
        assert!(store.check_blob_exists(&id).unwrap());

        let other = BlobId::of(b"other");
        let exists = store.check_blobs_exist(&[id, other]).unwrap();
        assert_eq!(exists.len(), 2);
        assert!(exists[&id]);
        assert!(!exists[&other]);
    }

    #[test]
    fn test_concurrent_identical_writes() {
        let store = Arc::new(MemoryBlobStore::new());
        let data = vec![0xCDu8; 64 * 1024];

        let ids: Vec<BlobId> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..2)
                .map(|_| {
                    let store = Arc::clone(&store);
                    let data = &data;
                    s.spawn(move || store.write_blob_with_unknown_hash(data).unwrap())
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(ids[0], ids[1]);
        assert_eq!(store.read_blob(&ids[0]).unwrap(), Some(data));
    }

    #[test]
    fn test_arc_dyn_store() {
        let store: Arc<dyn BlobStore> = Arc::new(MemoryBlobStore::new());
        let id = store.write_blob_with_unknown_hash(b"shared").unwrap();
        assert_eq!(
            store.read_and_wait_for_blobs(&[id], Duration::ZERO).unwrap()[&id],
            Some(b"shared".to_vec())
        );
    }
}
