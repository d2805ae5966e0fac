use bincode::error::{DecodeError, EncodeError};
use feoxdb::FeoxError;
use thiserror::Error;

/// Errors raised by a [`Store`](crate::Store) or while encoding the values
/// kept in it.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An error from the underlying FeOxDB database.
    #[error("FeOxDB error: {0}")]
    FeOxDb(#[from] FeoxError),

    /// Failed to serialize a stored value.
    #[error("Serialization error: {0}")]
    Serialization(#[from] EncodeError),

    /// Failed to deserialize a stored value.
    #[error("Deserialization error: {0}")]
    Deserialization(#[from] DecodeError),

    /// The store was used without being opened.
    #[error("store is not open")]
    NotOpen,

    /// The store was opened twice without being closed.
    #[error("store is already open")]
    AlreadyOpen,

    /// A transaction was started inside another one.
    #[error("a transaction is already active")]
    TransactionActive,

    /// A transaction was ended without being started.
    #[error("no active transaction")]
    NoTransaction,
}
