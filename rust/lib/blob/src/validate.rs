use std::collections::HashMap;
use std::time::Duration;

use tracing::warn;

use crate::error::BlobError;
use crate::id::BlobId;
use crate::traits::BlobStore;

/// ValidatingBlobStore guards another store against malformed calls.
///
/// Argument shapes (raw bytes, fixed-length ids) are already enforced by the
/// types. What is left to check at runtime is that every written entry is
/// keyed by the content address of its own bytes. The whole batch is checked
/// before the delegate is called, so a rejected batch never reaches it.
pub struct ValidatingBlobStore<S: BlobStore> {
    delegate: S,
}

impl<S: BlobStore> ValidatingBlobStore<S> {
    pub fn new(delegate: S) -> Self {
        Self { delegate }
    }

    pub fn delegate(&self) -> &S {
        &self.delegate
    }

    pub fn into_inner(self) -> S {
        self.delegate
    }
}

/// Check that each key is the id of its value.
fn check_batch(blobs: &HashMap<BlobId, &[u8]>) -> Result<(), BlobError> {
    for (id, data) in blobs {
        let actual = BlobId::of(data);
        if actual != *id {
            warn!("rejecting blob batch: key {} does not match content {}", id, actual);
            return Err(BlobError::ContractViolation(format!(
                "blob keyed by {} has content hashing to {}",
                id, actual
            )));
        }
    }
    Ok(())
}

impl<S: BlobStore> BlobStore for ValidatingBlobStore<S> {
    fn write_blobs(&self, blobs: &HashMap<BlobId, &[u8]>) -> Result<(), BlobError> {
        check_batch(blobs)?;
        self.delegate.write_blobs(blobs)
    }

    fn read_blobs(&self, ids: &[BlobId]) -> Result<HashMap<BlobId, Option<Vec<u8>>>, BlobError> {
        self.delegate.read_blobs(ids)
    }

    fn check_blobs_exist(&self, ids: &[BlobId]) -> Result<HashMap<BlobId, bool>, BlobError> {
        self.delegate.check_blobs_exist(ids)
    }

    // Ids derived here are correct by construction; forward as-is so the
    // delegate's own implementations are used.

    fn write_blobs_with_unknown_hashes(&self, blobs: &[&[u8]]) -> Result<Vec<BlobId>, BlobError> {
        self.delegate.write_blobs_with_unknown_hashes(blobs)
    }

    fn write_blob_with_unknown_hash(&self, blob: &[u8]) -> Result<BlobId, BlobError> {
        self.delegate.write_blob_with_unknown_hash(blob)
    }

    fn read_blob(&self, id: &BlobId) -> Result<Option<Vec<u8>>, BlobError> {
        self.delegate.read_blob(id)
    }

    fn check_blob_exists(&self, id: &BlobId) -> Result<bool, BlobError> {
        self.delegate.check_blob_exists(id)
    }

    fn read_and_wait_for_blobs(
        &self,
        ids: &[BlobId],
        timeout: Duration,
    ) -> Result<HashMap<BlobId, Option<Vec<u8>>>, BlobError> {
        self.delegate.read_and_wait_for_blobs(ids, timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::memory::MemoryBlobStore;

    /// Counts every primitive call that reaches the backend.
    #[derive(Default)]
    struct CountingStore {
        inner: MemoryBlobStore,
        calls: AtomicUsize,
    }

    impl CountingStore {
        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl BlobStore for CountingStore {
        fn write_blobs(&self, blobs: &HashMap<BlobId, &[u8]>) -> Result<(), BlobError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.write_blobs(blobs)
        }

        fn read_blobs(
            &self,
            ids: &[BlobId],
        ) -> Result<HashMap<BlobId, Option<Vec<u8>>>, BlobError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.read_blobs(ids)
        }

        fn check_blobs_exist(&self, ids: &[BlobId]) -> Result<HashMap<BlobId, bool>, BlobError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.check_blobs_exist(ids)
        }
    }

    #[test]
    fn test_mismatched_entry_rejected_before_backend() {
        let store = ValidatingBlobStore::new(CountingStore::default());

        let good: &[u8] = b"good chunk";
        let mut batch = HashMap::new();
        batch.insert(BlobId::of(good), good);
        batch.insert(BlobId::of(b"claimed"), b"actual".as_slice());

        let err = store.write_blobs(&batch).unwrap_err();
        assert!(matches!(err, BlobError::ContractViolation(_)));
        assert_eq!(store.delegate().calls(), 0);
        // Nothing from the batch was applied.
        assert!(store.delegate().inner.is_empty().unwrap());
    }

    #[test]
    fn test_valid_batch_passes_through() {
        let store = ValidatingBlobStore::new(CountingStore::default());

        let data: &[u8] = b"prefetch file";
        let id = BlobId::of(data);
        store.write_blobs(&HashMap::from([(id, data)])).unwrap();
        assert_eq!(store.delegate().calls(), 1);

        assert_eq!(store.read_blob(&id).unwrap(), Some(data.to_vec()));
        assert!(store.check_blob_exists(&id).unwrap());
        assert_eq!(store.delegate().calls(), 3);
    }

    #[test]
    fn test_unknown_hash_writes_delegate_once() {
        let store = ValidatingBlobStore::new(CountingStore::default());
        let ids = store
            .write_blobs_with_unknown_hashes(&[b"a".as_slice(), b"b".as_slice()])
            .unwrap();
        assert_eq!(ids, vec![BlobId::of(b"a"), BlobId::of(b"b")]);
        assert_eq!(store.delegate().calls(), 1);
    }

    #[test]
    fn test_wait_forwards_to_delegate() {
        let store = ValidatingBlobStore::new(CountingStore::default());
        let id = store.write_blob_with_unknown_hash(b"mft").unwrap();
        let results = store.read_and_wait_for_blobs(&[id], Duration::ZERO).unwrap();
        assert_eq!(results[&id], Some(b"mft".to_vec()));
        assert_eq!(store.delegate().calls(), 2);
    }
}
