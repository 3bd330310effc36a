//! Provides the errors reported by tables and the registry.
//!
//! Both "key not found" errors are expected outcomes of normal operation rather than faults.
//! Note that errors raised by callbacks (panics) are not caught. As callbacks never run while a
//! table lock is held, they leave the table in a consistent state.
use thiserror::Error;

/// Enumerates the errors which can be reported by a [Table](crate::table::Table) or the
/// [Registry](crate::registry::Registry).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// The requested key isn't present (and no data loader is installed).
    #[error("Key not found in cache")]
    KeyNotFound,

    /// The requested key isn't present and the data loader didn't provide a value for it.
    #[error("Key not found and could not be loaded into cache")]
    KeyNotFoundOrLoadable,

    /// A table was requested using other key or value types than it has been created with.
    #[error("The table {name} already exists using different key or value types")]
    TableTypeMismatch {
        /// The name of the requested table.
        name: String,
    },
}

/// Shorthand for results of cache operations.
pub type CacheResult<T> = Result<T, CacheError>;
