//! Error types for the metadata writer.

use std::io;
use thiserror::Error;

/// Errors raised while laying out or emitting chunks.
#[derive(Debug, Error)]
pub enum Error {
    /// A heap name plus its NUL terminator does not fit the 32-byte name field.
    #[error("heap name '{name}' is > 32 bytes")]
    HeapNameTooLong { name: String },

    /// `write_to` was called on a chunk that was never positioned.
    #[error("chunk written before its offset was set")]
    NotPositioned,

    /// `set_offset` was called on a chunk that already has a position.
    #[error("chunk offset already set")]
    AlreadyPositioned,

    /// More heaps than the 16-bit heap count can describe.
    #[error("{count} heaps do not fit the 16-bit heap count")]
    TooManyHeaps { count: usize },

    /// A heap sits at a lower file offset than the header describing it.
    #[error("heap '{name}' is placed before the metadata header")]
    HeapBeforeHeader { name: String },

    /// A chunk emitted a different number of bytes than it measured.
    #[error("chunk length mismatch: measured {expected:#x} bytes, wrote {actual:#x}")]
    LengthMismatch { expected: u64, actual: u64 },

    /// The output sink failed.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Result type alias for metadata writer operations.
pub type Result<T> = std::result::Result<T, Error>;
