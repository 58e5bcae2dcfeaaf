//! Error types for Cascade operations.
//!
//! A single error enum covers every failure mode of the compressed-stream
//! engine: I/O failures on the underlying byte streams, invalid caller
//! arguments, malformed bitstreams detected during decoding, and per-block
//! pipeline failures.

use std::io;
use thiserror::Error;

/// The main error type for Cascade operations.
#[derive(Debug, Error)]
pub enum CascadeError {
    /// I/O error from the underlying byte sink or source.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Invalid argument supplied by the caller (bad block size, jobs out of
    /// range, buffer too small).
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Description of the rejected argument.
        message: String,
    },

    /// Malformed compressed stream: header mismatch, impossible frequency
    /// table, symbol index outside the alphabet, bad mode byte.
    #[error("Invalid bitstream: {message}")]
    InvalidBitstream {
        /// Description of the corruption.
        message: String,
    },

    /// A block task failed inside the pipeline.
    #[error("Block {block_id} failed: {message}")]
    BlockFailed {
        /// Identifier of the offending block.
        block_id: u64,
        /// Description of the failure.
        message: String,
    },

    /// Block checksum verification failed during decoding.
    #[error("Checksum mismatch in block {block_id}: expected {expected:#010x}, computed {computed:#010x}")]
    ChecksumMismatch {
        /// Identifier of the offending block.
        block_id: u64,
        /// Checksum transmitted in the stream.
        expected: u32,
        /// Checksum computed over the decoded block.
        computed: u32,
    },

    /// The bit reader ran out of data.
    #[error("Unexpected end of bitstream")]
    EndOfStream,

    /// Read or write attempted on a closed bit stream.
    #[error("Bit stream is closed")]
    StreamClosed,
}

/// Result type alias for Cascade operations.
pub type Result<T> = std::result::Result<T, CascadeError>;

impl From<CascadeError> for io::Error {
    fn from(err: CascadeError) -> Self {
        match err {
            CascadeError::Io(inner) => inner,
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        }
    }
}

impl CascadeError {
    /// Create an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Create an invalid bitstream error.
    pub fn invalid_bitstream(message: impl Into<String>) -> Self {
        Self::InvalidBitstream {
            message: message.into(),
        }
    }

    /// Create a block failure error.
    pub fn block_failed(block_id: u64, message: impl Into<String>) -> Self {
        Self::BlockFailed {
            block_id,
            message: message.into(),
        }
    }

    /// Create a checksum mismatch error.
    pub fn checksum_mismatch(block_id: u64, expected: u32, computed: u32) -> Self {
        Self::ChecksumMismatch {
            block_id,
            expected,
            computed,
        }
    }
}
