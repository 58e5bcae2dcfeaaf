//! # Cascade Stream
//!
//! The block-parallel compressed stream engine: a 96-bit stream header,
//! self-describing block frames, and encode/decode pipelines that fan
//! block work across worker threads while the shared bit stream is written
//! and read in strict block order.
//!
//! ## Example
//!
//! ```
//! use cascade_stream::{WriterConfig, compress, decompress};
//!
//! let config = WriterConfig::default();
//! let data = b"an example payload, repeated a few times ".repeat(50);
//! let packed = compress(&data, &config).unwrap();
//! assert_eq!(decompress(&packed).unwrap(), data);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod block;
pub mod event;
pub mod header;
pub mod reader;
pub mod writer;

use cascade_core::error::{CascadeError, Result};
pub use cascade_entropy::EntropyKind;
pub use cascade_transform::TransformKind;

pub use block::SMALL_BLOCK_SIZE;
pub use event::{Event, EventKind, Listener};
pub use header::StreamHeader;
pub use reader::CompressedReader;
pub use writer::CompressedWriter;

/// Stream magic, "CKZ1".
pub const STREAM_MAGIC: u32 = 0x434B_5A31;

/// Current format version (7-bit field).
pub const STREAM_VERSION: u8 = 1;

/// Smallest accepted block size.
pub const MIN_BLOCK_SIZE: usize = 1024;

/// Largest accepted block size: the header field carries `block_size >> 4`
/// in 26 bits.
pub const MAX_BLOCK_SIZE: usize = (1 << 30) - 16;

/// Default block size.
pub const DEFAULT_BLOCK_SIZE: usize = 1 << 20;

/// Largest accepted worker count.
pub const MAX_JOBS: usize = 16;

/// Transform slots carried by the stream header.
pub const MAX_HEADER_TRANSFORMS: usize = 4;

pub(crate) fn validate_jobs(jobs: usize) -> Result<()> {
    if !(1..=MAX_JOBS).contains(&jobs) {
        return Err(CascadeError::invalid_argument(format!(
            "jobs {jobs} out of range [1..{MAX_JOBS}]"
        )));
    }
    Ok(())
}

/// Encoder configuration.
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Uncompressed bytes per block; multiple of 16 in
    /// `[MIN_BLOCK_SIZE, MAX_BLOCK_SIZE]`.
    pub block_size: usize,
    /// Worker threads, `[1..=MAX_JOBS]`.
    pub jobs: usize,
    /// Entropy coder applied to every block payload.
    pub entropy: EntropyKind,
    /// Transform stack applied to every block, up to
    /// [`MAX_HEADER_TRANSFORMS`] slots.
    pub transforms: Vec<TransformKind>,
    /// Attach a 32-bit checksum to every block frame.
    pub checksum: bool,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            jobs: 1,
            entropy: EntropyKind::Huffman,
            transforms: vec![TransformKind::Bwt, TransformKind::Rank, TransformKind::Zrlt],
            checksum: false,
        }
    }
}

impl WriterConfig {
    /// Validate every field.
    pub fn validate(&self) -> Result<()> {
        header::validate_block_size(self.block_size)?;
        validate_jobs(self.jobs)?;
        if self.transforms.len() > MAX_HEADER_TRANSFORMS {
            return Err(CascadeError::invalid_argument(format!(
                "{} transforms exceed the {MAX_HEADER_TRANSFORMS}-slot limit",
                self.transforms.len()
            )));
        }
        Ok(())
    }
}

/// Compress `data` into a self-describing stream.
pub fn compress(data: &[u8], config: &WriterConfig) -> Result<Vec<u8>> {
    let mut writer = CompressedWriter::new(Vec::new(), config.clone())?;
    writer.write_bytes(data)?;
    writer.into_inner()
}

/// Decompress a stream produced by [`compress`] or [`CompressedWriter`].
pub fn decompress(data: &[u8]) -> Result<Vec<u8>> {
    decompress_with_jobs(data, 1)
}

/// Decompress with a specific decode worker count.
pub fn decompress_with_jobs(data: &[u8], jobs: usize) -> Result<Vec<u8>> {
    let mut reader = CompressedReader::new(std::io::Cursor::new(data.to_vec()), jobs)?;
    let mut out = Vec::new();
    while let Some(block) = reader.next_block()? {
        out.extend_from_slice(&block);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        WriterConfig::default().validate().unwrap();
    }

    #[test]
    fn test_config_rejects_bad_values() {
        let mut config = WriterConfig::default();
        config.block_size = 100;
        assert!(config.validate().is_err());

        let mut config = WriterConfig::default();
        config.jobs = 0;
        assert!(config.validate().is_err());

        let mut config = WriterConfig::default();
        config.jobs = MAX_JOBS + 1;
        assert!(config.validate().is_err());

        let mut config = WriterConfig::default();
        config.transforms = vec![TransformKind::Mtft; MAX_HEADER_TRANSFORMS + 1];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_compress_decompress_smoke() {
        let data = b"smoke test payload ".repeat(200);
        let packed = compress(&data, &WriterConfig::default()).unwrap();
        assert_eq!(decompress(&packed).unwrap(), data);
    }
}
