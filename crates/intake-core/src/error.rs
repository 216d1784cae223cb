use thiserror::Error;

/// Core error type shared across Intake crates.
#[derive(Debug, Error)]
pub enum Error {
    /// The field schema violates internal invariants.
    #[error("invalid schema: {0}")]
    InvalidSchema(String),
    /// A record type name or source key could not be resolved.
    #[error("unknown record type: {0}")]
    UnknownRecordType(String),
}

/// Convenience alias for results returned by Intake crates.
pub type Result<T> = std::result::Result<T, Error>;
