//! Stream header codec.
//!
//! The 96-bit prologue, transmitted once per stream:
//!
//! ```text
//! magic(32) version(7) checksum(1) entropy(5) transforms(16) blockSize>>4(26) reserved(9)
//! ```
//!
//! The transform field holds four 4-bit tags, slot 0 in the highest
//! nibble; unused slots carry the `None` tag and are trimmed on read.

use crate::{MAX_BLOCK_SIZE, MAX_HEADER_TRANSFORMS, MIN_BLOCK_SIZE, STREAM_MAGIC, STREAM_VERSION};
use cascade_core::bitstream::{BitReader, BitWriter};
use cascade_core::error::{CascadeError, Result};
use cascade_entropy::EntropyKind;
use cascade_transform::TransformKind;
use std::io::{Read, Write};

/// Decoded stream prologue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamHeader {
    /// Format version.
    pub version: u8,
    /// Whether block checksums follow each frame.
    pub checksum: bool,
    /// Entropy coder for every block.
    pub entropy: EntropyKind,
    /// Transform stack for every block.
    pub transforms: Vec<TransformKind>,
    /// Uncompressed block size.
    pub block_size: usize,
}

/// Validate a block size against the header field range.
pub fn validate_block_size(block_size: usize) -> Result<()> {
    if block_size % 16 != 0 || !(MIN_BLOCK_SIZE..=MAX_BLOCK_SIZE).contains(&block_size) {
        return Err(CascadeError::invalid_argument(format!(
            "block size {block_size} must be a multiple of 16 in [{MIN_BLOCK_SIZE}, {MAX_BLOCK_SIZE}]"
        )));
    }
    Ok(())
}

/// Write the stream prologue.
pub fn write_header<W: Write>(bs: &mut BitWriter<W>, header: &StreamHeader) -> Result<()> {
    validate_block_size(header.block_size)?;
    if header.transforms.len() > MAX_HEADER_TRANSFORMS {
        return Err(CascadeError::invalid_argument(format!(
            "{} transforms exceed the {MAX_HEADER_TRANSFORMS}-slot header field",
            header.transforms.len()
        )));
    }

    bs.write_bits(u64::from(STREAM_MAGIC), 32)?;
    bs.write_bits(u64::from(header.version), 7)?;
    bs.write_bit(header.checksum)?;
    bs.write_bits(u64::from(header.entropy.tag()), 5)?;

    let mut mask = 0u64;
    for slot in 0..MAX_HEADER_TRANSFORMS {
        let tag = header
            .transforms
            .get(slot)
            .map_or(0, |&kind| kind.tag());
        mask = (mask << 4) | u64::from(tag);
    }
    bs.write_bits(mask, 16)?;

    bs.write_bits((header.block_size >> 4) as u64, 26)?;
    bs.write_bits(0, 9)?;
    Ok(())
}

/// Read and validate the stream prologue.
pub fn read_header<R: Read>(bs: &mut BitReader<R>) -> Result<StreamHeader> {
    let magic = bs.read_bits(32)? as u32;
    if magic != STREAM_MAGIC {
        return Err(CascadeError::invalid_bitstream(format!(
            "bad magic {magic:#010x}, expected {STREAM_MAGIC:#010x}"
        )));
    }
    let version = bs.read_bits(7)? as u8;
    if version != STREAM_VERSION {
        return Err(CascadeError::invalid_bitstream(format!(
            "unsupported stream version {version}"
        )));
    }
    let checksum = bs.read_bit()?;
    let entropy = EntropyKind::from_tag(bs.read_bits(5)? as u8)?;

    let mask = bs.read_bits(16)?;
    let mut transforms = Vec::with_capacity(MAX_HEADER_TRANSFORMS);
    for slot in 0..MAX_HEADER_TRANSFORMS {
        let tag = ((mask >> (4 * (MAX_HEADER_TRANSFORMS - 1 - slot))) & 0x0F) as u8;
        transforms.push(TransformKind::from_tag(tag)?);
    }
    while transforms.last() == Some(&TransformKind::None) {
        transforms.pop();
    }

    let block_size = (bs.read_bits(26)? as usize) << 4;
    validate_block_size(block_size)
        .map_err(|_| CascadeError::invalid_bitstream(format!("bad block size {block_size}")))?;

    let reserved = bs.read_bits(9)?;
    if reserved != 0 {
        return Err(CascadeError::invalid_bitstream("nonzero reserved bits"));
    }

    Ok(StreamHeader {
        version,
        checksum,
        entropy,
        transforms,
        block_size,
    })
}
