use thiserror::Error;

#[derive(Error, Debug)]
pub enum BlobError {
    /// Malformed call: rejected before any backend is touched.
    #[error("contract violation: {0}")]
    ContractViolation(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("config error: {0}")]
    Config(String),
}
