use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use redb::{Database, TableDefinition};

use crate::error::BlobError;
use crate::id::BlobId;
use crate::traits::BlobStore;

const TABLE: TableDefinition<&[u8], &[u8]> = TableDefinition::new("blobs");

/// RedbBlobStore is a BlobStore backed by redb, keyed by the raw 32-byte id.
///
/// A batch is written in a single transaction: either every entry commits or
/// none does.
pub struct RedbBlobStore {
    db: Arc<Database>,
}

impl RedbBlobStore {
    /// Open or create a redb database at the given path.
    pub fn open(path: &Path) -> Result<Self, BlobError> {
        let db = Database::create(path).map_err(|e| BlobError::Storage(e.to_string()))?;

        // Ensure the table exists so reads on a fresh database succeed.
        let write_txn = db
            .begin_write()
            .map_err(|e| BlobError::Storage(e.to_string()))?;
        {
            let _table = write_txn
                .open_table(TABLE)
                .map_err(|e| BlobError::Storage(e.to_string()))?;
        }
        write_txn
            .commit()
            .map_err(|e| BlobError::Storage(e.to_string()))?;

        Ok(Self { db: Arc::new(db) })
    }
}

impl BlobStore for RedbBlobStore {
    fn write_blobs(&self, blobs: &HashMap<BlobId, &[u8]>) -> Result<(), BlobError> {
        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| BlobError::Storage(e.to_string()))?;
        {
            let mut table = write_txn
                .open_table(TABLE)
                .map_err(|e| BlobError::Storage(e.to_string()))?;
            for (id, data) in blobs {
                table
                    .insert(id.as_bytes().as_slice(), *data)
                    .map_err(|e| BlobError::Storage(e.to_string()))?;
            }
        }
        write_txn
            .commit()
            .map_err(|e| BlobError::Storage(e.to_string()))?;
        Ok(())
    }

    fn read_blobs(&self, ids: &[BlobId]) -> Result<HashMap<BlobId, Option<Vec<u8>>>, BlobError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| BlobError::Storage(e.to_string()))?;
        let table = read_txn
            .open_table(TABLE)
            .map_err(|e| BlobError::Storage(e.to_string()))?;

        let mut results = HashMap::with_capacity(ids.len());
        for id in ids {
            let data = table
                .get(id.as_bytes().as_slice())
                .map_err(|e| BlobError::Storage(e.to_string()))?
                .map(|guard| guard.value().to_vec());
            results.insert(*id, data);
        }
        Ok(results)
    }

    fn check_blobs_exist(&self, ids: &[BlobId]) -> Result<HashMap<BlobId, bool>, BlobError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| BlobError::Storage(e.to_string()))?;
        let table = read_txn
            .open_table(TABLE)
            .map_err(|e| BlobError::Storage(e.to_string()))?;

        let mut results = HashMap::with_capacity(ids.len());
        for id in ids {
            // The guard borrows the page; the value is never copied out.
            let found = table
                .get(id.as_bytes().as_slice())
                .map_err(|e| BlobError::Storage(e.to_string()))?
                .is_some();
            results.insert(*id, found);
        }
        Ok(results)
    }
}
