//! Error types for the slot cache engine.

/// Errors from cache operations.
///
/// Recoverable kinds ([`InvalidInput`](CacheError::InvalidInput),
/// [`Busy`](CacheError::Busy), [`Full`](CacheError::Full),
/// [`OutOfOrderInsert`](CacheError::OutOfOrderInsert),
/// [`Unordered`](CacheError::Unordered)) leave the handle usable; the caller
/// may retry with different inputs or after releasing the writer.
///
/// Terminal kinds ([`Closed`](CacheError::Closed),
/// [`Invalidated`](CacheError::Invalidated),
/// [`Incompatible`](CacheError::Incompatible),
/// [`Corrupt`](CacheError::Corrupt)) require a new handle or a new file.
///
/// [`Writeback`](CacheError::Writeback) is informational: the logical state
/// was applied and published, only its durability is unknown.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// An argument violates a declared constraint.
    #[error("invalid input: {reason}")]
    InvalidInput { reason: String },

    /// The handle was closed.
    #[error("handle is closed")]
    Closed,

    /// A writer session is currently live on this handle.
    #[error("a writer is already active")]
    Busy,

    /// Commit would exceed the fixed slot capacity.
    #[error("slot capacity exhausted")]
    Full,

    /// Ordered-mode commit would insert a key below the current tail.
    #[error("ordered-mode insert below the current tail key")]
    OutOfOrderInsert,

    /// A range scan was requested on an unordered-keys file.
    #[error("range scans require ordered keys")]
    Unordered,

    /// The file is in the terminal invalidated state.
    #[error("file is invalidated")]
    Invalidated,

    /// An on-disk invariant failed at open or during a lookup.
    #[error("corrupt file: {reason}")]
    Corrupt { reason: String },

    /// Open options do not match the preexisting file.
    #[error("incompatible options: {field} does not match the file")]
    Incompatible { field: &'static str },

    /// A flush failed after the logical state was already applied.
    #[error("committed but not durable: {source}")]
    Writeback { source: std::io::Error },

    /// Underlying OS I/O error.
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

impl CacheError {
    pub(crate) fn invalid_input(reason: impl Into<String>) -> Self {
        CacheError::InvalidInput {
            reason: reason.into(),
        }
    }

    pub(crate) fn corrupt(reason: impl Into<String>) -> Self {
        CacheError::Corrupt {
            reason: reason.into(),
        }
    }

    /// Returns the kind of this error, for matching without its payload.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CacheError::InvalidInput { .. } => ErrorKind::InvalidInput,
            CacheError::Closed => ErrorKind::Closed,
            CacheError::Busy => ErrorKind::Busy,
            CacheError::Full => ErrorKind::Full,
            CacheError::OutOfOrderInsert => ErrorKind::OutOfOrderInsert,
            CacheError::Unordered => ErrorKind::Unordered,
            CacheError::Invalidated => ErrorKind::Invalidated,
            CacheError::Corrupt { .. } => ErrorKind::Corrupt,
            CacheError::Incompatible { .. } => ErrorKind::Incompatible,
            CacheError::Writeback { .. } => ErrorKind::Writeback,
            CacheError::Io { .. } => ErrorKind::Io,
        }
    }
}

/// Payload-free discriminant of [`CacheError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidInput,
    Closed,
    Busy,
    Full,
    OutOfOrderInsert,
    Unordered,
    Invalidated,
    Corrupt,
    Incompatible,
    Writeback,
    Io,
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, CacheError>;
