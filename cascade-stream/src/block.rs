//! Per-block framing: the mode byte, payload length, checksum, and the
//! transform/entropy stages around them.
//!
//! ```text
//! Frame       := Mode(8) [PayloadLen(8·sz)] [Checksum(32)] Payload
//! SmallMode   := 1 xxx llll          literal length 0..15, raw payload
//! RegularMode := 0 s5..s0 ll         slot i skip at bit 2+i, ll = sz-1
//! Terminator  := 0x80
//! ```
//!
//! The transform stage runs outside the ordering token; everything that
//! touches the shared bit stream runs inside it.

use crate::WriterConfig;
use crate::header::StreamHeader;
use cascade_core::bitstream::{BitReader, BitWriter};
use cascade_core::error::{CascadeError, Result};
use cascade_core::xxhash::xxhash32;
use cascade_entropy::{EntropyDecoder, EntropyEncoder, EntropyKind};
use cascade_transform::TransformSequence;
use std::io::{Read, Write};

/// Largest payload carried by a small (copy) frame.
pub const SMALL_BLOCK_SIZE: usize = 15;

/// Mode bit marking a small frame.
pub const SMALL_BLOCK_MASK: u8 = 0x80;

/// The end-of-stream frame: a small block of length zero.
pub const TERMINATOR_MODE: u8 = SMALL_BLOCK_MASK;

/// A block after checksum and transform, ready for its turn on the shared
/// bit writer.
#[derive(Debug)]
pub(crate) struct PreparedBlock {
    pub block_id: u64,
    pub mode: u8,
    pub payload: Vec<u8>,
    pub checksum: Option<u32>,
    pub small: bool,
}

fn length_bytes(post_len: usize) -> u32 {
    match post_len {
        0..=0xFF => 1,
        0x100..=0xFFFF => 2,
        0x1_0000..=0xFF_FFFF => 3,
        _ => 4,
    }
}

/// Checksum + transform stage (runs in parallel across blocks).
pub(crate) fn prepare_block(
    block_id: u64,
    data: &[u8],
    config: &WriterConfig,
) -> Result<PreparedBlock> {
    let checksum = config.checksum.then(|| xxhash32(data, 0));

    if data.len() <= SMALL_BLOCK_SIZE {
        return Ok(PreparedBlock {
            block_id,
            mode: SMALL_BLOCK_MASK | data.len() as u8,
            payload: data.to_vec(),
            checksum,
            small: true,
        });
    }

    let mut sequence = TransformSequence::new(&config.transforms)?;
    let mut payload = Vec::new();
    sequence
        .forward(data, &mut payload)
        .map_err(|e| CascadeError::block_failed(block_id, e.to_string()))?;
    let sz = length_bytes(payload.len());
    let mode = (sequence.skip_flags() << 2) | (sz - 1) as u8;

    Ok(PreparedBlock {
        block_id,
        mode,
        payload,
        checksum,
        small: false,
    })
}

/// Frame emission stage (runs under the ordering token).
pub(crate) fn write_block<W: Write>(
    bs: &mut BitWriter<W>,
    block: &PreparedBlock,
    entropy: EntropyKind,
) -> Result<()> {
    bs.write_bits(u64::from(block.mode), 8)?;
    if !block.small {
        let sz = (block.mode & 0x03) as u32 + 1;
        bs.write_bits(block.payload.len() as u64, 8 * sz)?;
    }
    if let Some(checksum) = block.checksum {
        bs.write_bits(u64::from(checksum), 32)?;
    }

    if block.small {
        bs.write_array(&block.payload, block.payload.len() as u64 * 8)?;
    } else {
        let mut encoder = entropy.encoder(bs)?;
        let consumed = encoder.encode(&block.payload)?;
        if consumed != block.payload.len() {
            return Err(CascadeError::block_failed(
                block.block_id,
                format!(
                    "entropy coder consumed {consumed} of {} bytes",
                    block.payload.len()
                ),
            ));
        }
        encoder.dispose()?;
    }
    Ok(())
}

/// Write the end-of-stream frame.
pub(crate) fn write_terminator<W: Write>(bs: &mut BitWriter<W>) -> Result<()> {
    bs.write_bits(u64::from(TERMINATOR_MODE), 8)
}

/// A frame as read off the stream, before inverse transforms.
#[derive(Debug)]
pub(crate) struct RawFrame {
    pub block_id: u64,
    pub skip_flags: u8,
    pub payload: Vec<u8>,
    pub expected_checksum: Option<u32>,
    pub small: bool,
}

/// Frame reading + entropy decoding stage (runs under the ordering token).
/// Returns `None` on the terminator frame.
pub(crate) fn read_block<R: Read>(
    bs: &mut BitReader<R>,
    header: &StreamHeader,
    block_id: u64,
) -> Result<Option<RawFrame>> {
    let mode = bs.read_bits(8)? as u8;
    if mode == TERMINATOR_MODE {
        return Ok(None);
    }

    let (small, skip_flags, post_len) = if mode & SMALL_BLOCK_MASK != 0 {
        (true, 0u8, (mode & 0x0F) as usize)
    } else {
        let sz = (mode & 0x03) as u32 + 1;
        let skip_flags = (mode >> 2) & 0x3F;
        let post_len = bs.read_bits(8 * sz)? as usize;
        if post_len == 0 {
            return Err(CascadeError::invalid_bitstream(format!(
                "empty payload in block {block_id}"
            )));
        }
        (false, skip_flags, post_len)
    };

    if !small {
        let bound = TransformSequence::new(&header.transforms)?.max_encoded_len(header.block_size);
        if post_len > bound {
            return Err(CascadeError::invalid_bitstream(format!(
                "payload of {post_len} bytes exceeds the {bound}-byte bound in block {block_id}"
            )));
        }
    }

    let expected_checksum = if header.checksum {
        Some(bs.read_bits(32)? as u32)
    } else {
        None
    };

    let mut payload = vec![0u8; post_len];
    if small {
        bs.read_array(&mut payload, post_len as u64 * 8)?;
    } else {
        let mut decoder = header.entropy.decoder(bs)?;
        let produced = decoder.decode(&mut payload)?;
        if produced != post_len {
            return Err(CascadeError::block_failed(
                block_id,
                format!("entropy coder produced {produced} of {post_len} bytes"),
            ));
        }
        decoder.dispose()?;
    }

    Ok(Some(RawFrame {
        block_id,
        skip_flags,
        payload,
        expected_checksum,
        small,
    }))
}

/// Inverse transform + checksum verification stage (parallel).
pub(crate) fn restore_block(frame: RawFrame, header: &StreamHeader) -> Result<Vec<u8>> {
    let data = if frame.small {
        frame.payload
    } else {
        let mut sequence = TransformSequence::new(&header.transforms)?;
        let mut data = Vec::new();
        sequence
            .inverse(&frame.payload, &mut data, frame.skip_flags, header.block_size)
            .map_err(|e| match e {
                CascadeError::InvalidBitstream { message } => CascadeError::invalid_bitstream(
                    format!("block {}: {message}", frame.block_id),
                ),
                other => other,
            })?;
        data
    };

    if data.len() > header.block_size {
        return Err(CascadeError::invalid_bitstream(format!(
            "block {} decoded to {} bytes, above the {}-byte block size",
            frame.block_id,
            data.len(),
            header.block_size
        )));
    }

    if let Some(expected) = frame.expected_checksum {
        let computed = xxhash32(&data, 0);
        if computed != expected {
            return Err(CascadeError::checksum_mismatch(
                frame.block_id,
                expected,
                computed,
            ));
        }
    }
    Ok(data)
}
