use std::fmt;
use std::str::FromStr;

use sha2::{Digest, Sha256};

use crate::error::BlobError;

/// Length of a blob id in bytes (SHA-256 digest).
pub const BLOB_ID_LEN: usize = 32;

/// BlobId is the content address of a blob: the SHA-256 digest of its bytes.
///
/// Identical bytes always map to the same id, so an id is permanently bound to
/// the content that produced it. Ids can only be built by hashing data or by
/// parsing a digest of the right length.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlobId([u8; BLOB_ID_LEN]);

impl BlobId {
    /// Derive the id of `data`.
    pub fn of(data: &[u8]) -> Self {
        let digest = Sha256::digest(data);
        let mut bytes = [0u8; BLOB_ID_LEN];
        bytes.copy_from_slice(&digest);
        Self(bytes)
    }

    /// Build an id from a raw digest, e.g. a chunk hash reported by an agent.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, BlobError> {
        let arr: [u8; BLOB_ID_LEN] = bytes.try_into().map_err(|_| {
            BlobError::ContractViolation(format!(
                "blob id must be {} bytes, got {}",
                BLOB_ID_LEN,
                bytes.len()
            ))
        })?;
        Ok(Self(arr))
    }

    pub fn as_bytes(&self) -> &[u8; BLOB_ID_LEN] {
        &self.0
    }

    /// Lowercase hex rendering, 64 characters.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl From<[u8; BLOB_ID_LEN]> for BlobId {
    fn from(bytes: [u8; BLOB_ID_LEN]) -> Self {
        Self(bytes)
    }
}

impl FromStr for BlobId {
    type Err = BlobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s)
            .map_err(|e| BlobError::ContractViolation(format!("invalid blob id {:?}: {}", s, e)))?;
        Self::from_bytes(&bytes)
    }
}

impl fmt::Display for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlobId({})", self.to_hex())
    }
}
