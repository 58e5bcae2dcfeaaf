//! Packed bit-level I/O over byte streams.
//!
//! `BitWriter` and `BitReader` move bits MSB-first through a 64-bit
//! accumulator backed by an 8-aligned byte buffer. The first bit written
//! lands in bit 63 of the accumulator; full accumulators are stored
//! big-endian, so byte arrays copied through the aligned fast path keep
//! their natural byte order on the wire.
//!
//! # Example
//!
//! ```
//! use cascade_core::bitstream::{BitReader, BitWriter};
//! use std::io::Cursor;
//!
//! let mut output = Vec::new();
//! let mut writer = BitWriter::new(&mut output);
//! writer.write_bits(0b101, 3).unwrap();
//! writer.write_bits(0x5A, 8).unwrap();
//! writer.close().unwrap();
//!
//! let mut reader = BitReader::new(Cursor::new(&output));
//! assert_eq!(reader.read_bits(3).unwrap(), 0b101);
//! assert_eq!(reader.read_bits(8).unwrap(), 0x5A);
//! ```

use crate::error::{CascadeError, Result};
use std::io::{Read, Write};

/// Default internal buffer size in bytes.
pub const DEFAULT_BUFFER_SIZE: usize = 65536;

/// Smallest accepted internal buffer size.
pub const MIN_BUFFER_SIZE: usize = 1024;

/// Largest accepted internal buffer size.
pub const MAX_BUFFER_SIZE: usize = 1 << 29;

fn clamp_buffer_size(size: usize) -> usize {
    size.clamp(MIN_BUFFER_SIZE, MAX_BUFFER_SIZE) & !7
}

/// A bit-level writer packing bits MSB-first into a byte sink.
///
/// Bits accumulate in a 64-bit register; each full register is stored
/// big-endian into the internal buffer, and the buffer is flushed to the
/// sink when it fills. `close()` pads the final partial register to a byte
/// boundary and permanently seals the stream.
#[derive(Debug)]
pub struct BitWriter<W: Write> {
    sink: W,
    buffer: Vec<u8>,
    /// Next free byte index in `buffer`.
    position: usize,
    /// Bit accumulator; pending bits occupy the top `64 - avail` bits.
    current: u64,
    /// Free bits remaining in `current` (1..=64 between calls).
    avail: u32,
    /// Bits already handed to the sink.
    flushed: u64,
    closed: bool,
}

impl<W: Write> BitWriter<W> {
    /// Create a writer with the default buffer size.
    pub fn new(sink: W) -> Self {
        Self::with_buffer_size(sink, DEFAULT_BUFFER_SIZE)
    }

    /// Create a writer with a specific buffer size.
    ///
    /// The size is clamped to `[MIN_BUFFER_SIZE, MAX_BUFFER_SIZE]` and
    /// rounded down to a multiple of 8.
    pub fn with_buffer_size(sink: W, size: usize) -> Self {
        let size = clamp_buffer_size(size);
        Self {
            sink,
            buffer: vec![0u8; size],
            position: 0,
            current: 0,
            avail: 64,
            flushed: 0,
            closed: false,
        }
    }

    /// Total bits written so far, padding included once closed.
    ///
    /// Invariant: `written() == flushed + position*8 + (64 - avail)`.
    pub fn written(&self) -> u64 {
        self.flushed + (self.position as u64) * 8 + u64::from(64 - self.avail)
    }

    /// Whether the writer has been closed.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Write a single bit.
    #[inline]
    pub fn write_bit(&mut self, bit: bool) -> Result<()> {
        if self.closed {
            return Err(CascadeError::StreamClosed);
        }
        self.avail -= 1;
        self.current |= u64::from(bit) << self.avail;
        if self.avail == 0 {
            self.push_current()?;
        }
        Ok(())
    }

    /// Write the low `count` bits of `value`, MSB first, `count` in 1..=64.
    #[inline]
    pub fn write_bits(&mut self, value: u64, count: u32) -> Result<()> {
        if self.closed {
            return Err(CascadeError::StreamClosed);
        }
        if count == 0 || count > 64 {
            return Err(CascadeError::invalid_argument(format!(
                "bit count {count} out of range [1..64]"
            )));
        }
        let value = if count == 64 {
            value
        } else {
            value & ((1u64 << count) - 1)
        };

        if count < self.avail {
            self.avail -= count;
            self.current |= value << self.avail;
        } else {
            let remaining = count - self.avail;
            // remaining < 64 because avail >= 1 between calls
            self.current |= value >> remaining;
            self.push_current()?;
            if remaining > 0 {
                self.avail = 64 - remaining;
                self.current = value << self.avail;
            }
        }
        Ok(())
    }

    /// Write the first `count` bits of `src`, tolerating a 1..7 bit tail.
    ///
    /// When the accumulator is byte-aligned the whole-byte body is copied
    /// directly into the buffer; otherwise the source is streamed 64 bits at
    /// a time big-endian through the accumulator.
    pub fn write_array(&mut self, src: &[u8], count: u64) -> Result<()> {
        if self.closed {
            return Err(CascadeError::StreamClosed);
        }
        if count > (src.len() as u64) * 8 {
            return Err(CascadeError::invalid_argument(format!(
                "bit count {count} exceeds source length {}",
                src.len()
            )));
        }
        if count == 0 {
            return Ok(());
        }

        let whole_bytes = (count / 8) as usize;
        let tail_bits = (count % 8) as u32;

        if self.avail % 8 == 0 {
            // Byte-aligned: drain accumulator bytes, then memcpy.
            while self.avail < 64 {
                let byte = (self.current >> 56) as u8;
                self.current <<= 8;
                self.avail += 8;
                self.push_byte(byte)?;
            }
            self.current = 0;
            let mut offset = 0;
            while offset < whole_bytes {
                if self.position == self.buffer.len() {
                    self.flush_buffer()?;
                }
                let n = (whole_bytes - offset).min(self.buffer.len() - self.position);
                self.buffer[self.position..self.position + n]
                    .copy_from_slice(&src[offset..offset + n]);
                self.position += n;
                offset += n;
            }
        } else {
            let mut offset = 0;
            while offset + 8 <= whole_bytes {
                let chunk: [u8; 8] = src[offset..offset + 8].try_into().unwrap();
                self.write_bits(u64::from_be_bytes(chunk), 64)?;
                offset += 8;
            }
            for &byte in &src[offset..whole_bytes] {
                self.write_bits(u64::from(byte), 8)?;
            }
        }

        if tail_bits > 0 {
            let last = src[whole_bytes];
            self.write_bits(u64::from(last >> (8 - tail_bits)), tail_bits)?;
        }
        Ok(())
    }

    /// Flush the pending accumulator and buffer, padding the final byte,
    /// then seal the stream. Idempotent.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        let pending_bits = 64 - self.avail;
        let pending_bytes = pending_bits.div_ceil(8);
        for i in 0..pending_bytes {
            let byte = (self.current >> (56 - 8 * i)) as u8;
            self.push_byte(byte)?;
        }
        self.current = 0;
        self.avail = 64;
        self.flush_buffer()?;
        self.sink.flush()?;
        self.closed = true;
        Ok(())
    }

    /// Consume the writer, closing it, and return the sink.
    pub fn into_inner(mut self) -> Result<W> {
        self.close()?;
        Ok(self.sink)
    }

    #[inline]
    fn push_current(&mut self) -> Result<()> {
        if self.position == self.buffer.len() {
            self.flush_buffer()?;
        }
        self.buffer[self.position..self.position + 8].copy_from_slice(&self.current.to_be_bytes());
        self.position += 8;
        self.current = 0;
        self.avail = 64;
        Ok(())
    }

    fn push_byte(&mut self, byte: u8) -> Result<()> {
        if self.position == self.buffer.len() {
            self.flush_buffer()?;
        }
        self.buffer[self.position] = byte;
        self.position += 1;
        Ok(())
    }

    /// Hand the buffered bytes to the sink. Counters are updated only after
    /// the sink accepts the data, so a failed flush can be retried.
    fn flush_buffer(&mut self) -> Result<()> {
        if self.position == 0 {
            return Ok(());
        }
        self.sink.write_all(&self.buffer[..self.position])?;
        self.flushed += (self.position as u64) * 8;
        self.position = 0;
        Ok(())
    }
}

/// A bit-level reader pulling bits MSB-first from a byte source.
///
/// The reader pulls 8 source bytes at a time into its accumulator; at end
/// of source it pulls the remaining 1..7 bytes and left-aligns them so the
/// high bits of the accumulator are the last real bits. Reading past the
/// tail fails with `EndOfStream`.
#[derive(Debug)]
pub struct BitReader<R: Read> {
    source: R,
    buffer: Vec<u8>,
    /// Next byte to consume in `buffer`.
    position: usize,
    /// Number of valid bytes in `buffer`.
    max_position: usize,
    /// Bit accumulator; unread bits occupy the top `avail` bits.
    current: u64,
    avail: u32,
    /// Bits consumed so far.
    read: u64,
    source_done: bool,
    closed: bool,
}

impl<R: Read> BitReader<R> {
    /// Create a reader with the default buffer size.
    pub fn new(source: R) -> Self {
        Self::with_buffer_size(source, DEFAULT_BUFFER_SIZE)
    }

    /// Create a reader with a specific buffer size (clamped like the writer).
    pub fn with_buffer_size(source: R, size: usize) -> Self {
        let size = clamp_buffer_size(size);
        Self {
            source,
            buffer: vec![0u8; size],
            position: 0,
            max_position: 0,
            current: 0,
            avail: 0,
            read: 0,
            source_done: false,
            closed: false,
        }
    }

    /// Total bits consumed so far.
    pub fn read_so_far(&self) -> u64 {
        self.read
    }

    /// Read a single bit.
    #[inline]
    pub fn read_bit(&mut self) -> Result<bool> {
        if self.closed {
            return Err(CascadeError::StreamClosed);
        }
        if self.avail == 0 {
            self.pull()?;
        }
        let bit = (self.current >> 63) & 1;
        self.current <<= 1;
        self.avail -= 1;
        self.read += 1;
        Ok(bit != 0)
    }

    /// Read `count` bits, `count` in 1..=64, returned right-aligned.
    #[inline]
    pub fn read_bits(&mut self, count: u32) -> Result<u64> {
        if self.closed {
            return Err(CascadeError::StreamClosed);
        }
        if count == 0 || count > 64 {
            return Err(CascadeError::invalid_argument(format!(
                "bit count {count} out of range [1..64]"
            )));
        }

        let value = if count <= self.avail {
            take_bits(&mut self.current, &mut self.avail, count)
        } else {
            let upper_count = self.avail;
            let upper = if upper_count > 0 {
                take_bits(&mut self.current, &mut self.avail, upper_count)
            } else {
                0
            };
            self.pull()?;
            let rest = count - upper_count;
            if rest > self.avail {
                return Err(CascadeError::EndOfStream);
            }
            let lower = take_bits(&mut self.current, &mut self.avail, rest);
            if rest == 64 { lower } else { (upper << rest) | lower }
        };
        self.read += u64::from(count);
        Ok(value)
    }

    /// Read `count` bits into `dst`, MSB-first, tolerating a 1..7 bit tail.
    pub fn read_array(&mut self, dst: &mut [u8], count: u64) -> Result<()> {
        if count > (dst.len() as u64) * 8 {
            return Err(CascadeError::invalid_argument(format!(
                "bit count {count} exceeds destination length {}",
                dst.len()
            )));
        }
        let whole_bytes = (count / 8) as usize;
        let tail_bits = (count % 8) as u32;

        let mut offset = 0;
        while offset + 8 <= whole_bytes {
            let value = self.read_bits(64)?;
            dst[offset..offset + 8].copy_from_slice(&value.to_be_bytes());
            offset += 8;
        }
        for byte in dst.iter_mut().take(whole_bytes).skip(offset) {
            *byte = self.read_bits(8)? as u8;
        }
        if tail_bits > 0 {
            let value = self.read_bits(tail_bits)? as u8;
            dst[whole_bytes] = value << (8 - tail_bits);
        }
        Ok(())
    }

    /// Whether at least one more bit can be read.
    pub fn has_more_to_read(&mut self) -> bool {
        if self.closed {
            return false;
        }
        if self.avail > 0 || self.position < self.max_position {
            return true;
        }
        if self.source_done {
            return false;
        }
        self.refill_buffer().map(|n| n > 0).unwrap_or(false)
    }

    /// Seal the reader; further reads fail with `StreamClosed`.
    pub fn close(&mut self) {
        self.closed = true;
    }

    /// Refill the internal buffer, setting `source_done` at end of source.
    fn refill_buffer(&mut self) -> Result<usize> {
        self.position = 0;
        self.max_position = 0;
        while self.max_position < self.buffer.len() {
            let n = self.source.read(&mut self.buffer[self.max_position..])?;
            if n == 0 {
                self.source_done = true;
                break;
            }
            self.max_position += n;
        }
        Ok(self.max_position)
    }

    /// Reload the accumulator with up to 8 bytes, left-aligned.
    fn pull(&mut self) -> Result<()> {
        debug_assert_eq!(self.avail, 0);
        if self.max_position - self.position >= 8 {
            let chunk: [u8; 8] = self.buffer[self.position..self.position + 8]
                .try_into()
                .unwrap();
            self.current = u64::from_be_bytes(chunk);
            self.position += 8;
            self.avail = 64;
            return Ok(());
        }

        let mut value = 0u64;
        let mut loaded = 0u32;
        while loaded < 8 {
            if self.position == self.max_position {
                if self.source_done {
                    break;
                }
                if self.refill_buffer()? == 0 {
                    break;
                }
            }
            value = (value << 8) | u64::from(self.buffer[self.position]);
            self.position += 1;
            loaded += 1;
        }
        if loaded == 0 {
            return Err(CascadeError::EndOfStream);
        }
        self.avail = loaded * 8;
        self.current = value << (64 - self.avail);
        Ok(())
    }
}

/// Remove the top `count` bits of a left-aligned accumulator.
#[inline]
fn take_bits(current: &mut u64, avail: &mut u32, count: u32) -> u64 {
    debug_assert!(count <= *avail);
    let value = if count == 64 {
        std::mem::take(current)
    } else {
        let v = *current >> (64 - count);
        *current <<= count;
        v
    };
    *avail -= count;
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;
    use std::io::Cursor;

    #[test]
    fn test_msb_first_packing() {
        let mut output = Vec::new();
        let mut writer = BitWriter::new(&mut output);
        writer.write_bits(0b101, 3).unwrap();
        writer.write_bits(0b11001, 5).unwrap();
        writer.close().unwrap();
        // 101 then 11001 -> 0b10111001
        assert_eq!(output, vec![0b1011_1001]);
    }

    #[test]
    fn test_single_bits() {
        let mut output = Vec::new();
        let mut writer = BitWriter::new(&mut output);
        for bit in [true, false, true, true, false, false, true, false] {
            writer.write_bit(bit).unwrap();
        }
        writer.close().unwrap();
        assert_eq!(output, vec![0b1011_0010]);
    }

    #[test]
    fn test_close_pads_partial_byte() {
        let mut output = Vec::new();
        let mut writer = BitWriter::new(&mut output);
        writer.write_bits(0b11, 2).unwrap();
        writer.close().unwrap();
        // Idempotent.
        writer.close().unwrap();
        assert!(writer.write_bit(true).is_err());
        assert_eq!(output, vec![0b1100_0000]);
    }

    #[test]
    fn test_written_invariant() {
        let mut writer = BitWriter::new(Vec::new());
        assert_eq!(writer.written(), 0);
        writer.write_bits(0xFFFF, 16).unwrap();
        assert_eq!(writer.written(), 16);
        writer.write_bits(1, 1).unwrap();
        assert_eq!(writer.written(), 17);
        writer.write_bits(u64::MAX, 64).unwrap();
        assert_eq!(writer.written(), 81);
    }

    #[test]
    fn test_roundtrip_sequence() {
        let values: Vec<(u64, u32)> = vec![
            (0b1, 1),
            (0xFF, 8),
            (0x1234, 16),
            (u64::MAX, 64),
            (0, 7),
            (42, 13),
            (0xDEADBEEF, 32),
        ];
        let mut output = Vec::new();
        let mut writer = BitWriter::new(&mut output);
        for &(v, n) in &values {
            writer.write_bits(v, n).unwrap();
        }
        writer.close().unwrap();

        let mut reader = BitReader::new(Cursor::new(&output));
        for &(v, n) in &values {
            let mask = if n == 64 { u64::MAX } else { (1 << n) - 1 };
            assert_eq!(reader.read_bits(n).unwrap(), v & mask, "width {n}");
        }
    }

    #[test]
    fn test_random_roundtrip() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let values: Vec<(u64, u32)> = (0..5000)
            .map(|_| {
                let n = rng.gen_range(1..=64u32);
                let mask = if n == 64 { u64::MAX } else { (1 << n) - 1 };
                (rng.r#gen::<u64>() & mask, n)
            })
            .collect();

        let mut output = Vec::new();
        let mut writer = BitWriter::with_buffer_size(&mut output, 1024);
        for &(v, n) in &values {
            writer.write_bits(v, n).unwrap();
        }
        let total: u64 = values.iter().map(|&(_, n)| u64::from(n)).sum();
        writer.close().unwrap();
        // Up to 7 padding bits.
        assert!(output.len() as u64 * 8 >= total);
        assert!(output.len() as u64 * 8 < total + 8);

        let mut reader = BitReader::with_buffer_size(Cursor::new(&output), 1024);
        for &(v, n) in &values {
            assert_eq!(reader.read_bits(n).unwrap(), v);
        }
    }

    #[test]
    fn test_write_array_aligned_and_not() {
        let payload: Vec<u8> = (0..=255u8).cycle().take(1000).collect();

        // Aligned path.
        let mut output = Vec::new();
        let mut writer = BitWriter::new(&mut output);
        writer.write_array(&payload, payload.len() as u64 * 8).unwrap();
        writer.close().unwrap();
        assert_eq!(output, payload);

        // Unaligned path with a 3-bit tail.
        let mut output = Vec::new();
        let mut writer = BitWriter::new(&mut output);
        writer.write_bits(0b10, 2).unwrap();
        writer.write_array(&payload, payload.len() as u64 * 8 - 5).unwrap();
        writer.close().unwrap();

        let mut reader = BitReader::new(Cursor::new(&output));
        assert_eq!(reader.read_bits(2).unwrap(), 0b10);
        let mut back = vec![0u8; payload.len()];
        reader.read_array(&mut back, payload.len() as u64 * 8 - 5).unwrap();
        assert_eq!(&back[..payload.len() - 1], &payload[..payload.len() - 1]);
        assert_eq!(back[payload.len() - 1] >> 5, payload[payload.len() - 1] >> 5);
    }

    #[test]
    fn test_reader_end_of_stream() {
        let mut reader = BitReader::new(Cursor::new(vec![0xAB]));
        assert!(reader.has_more_to_read());
        assert_eq!(reader.read_bits(8).unwrap(), 0xAB);
        assert!(!reader.has_more_to_read());
        assert!(matches!(
            reader.read_bits(1),
            Err(CascadeError::EndOfStream)
        ));
    }

    #[test]
    fn test_reader_partial_tail() {
        // 3 bytes: the tail pull loads fewer than 8 bytes.
        let mut reader = BitReader::new(Cursor::new(vec![0x12, 0x34, 0x56]));
        assert_eq!(reader.read_bits(12).unwrap(), 0x123);
        assert_eq!(reader.read_bits(12).unwrap(), 0x456);
        assert!(matches!(
            reader.read_bits(1),
            Err(CascadeError::EndOfStream)
        ));
    }

    #[test]
    fn test_reader_closed() {
        let mut reader = BitReader::new(Cursor::new(vec![0xFF]));
        reader.close();
        assert!(matches!(
            reader.read_bit(),
            Err(CascadeError::StreamClosed)
        ));
    }

    #[test]
    fn test_read_crossing_pull_boundary() {
        let mut rng = ChaCha8Rng::seed_from_u64(99);
        let bytes: Vec<u8> = (0..64).map(|_| rng.r#gen()).collect();
        let mut reader = BitReader::new(Cursor::new(bytes.clone()));
        // 13-bit reads repeatedly straddle 64-bit pulls.
        let mut bits_left = bytes.len() as u64 * 8;
        let mut collected: Vec<(u64, u32)> = Vec::new();
        while bits_left >= 13 {
            collected.push((reader.read_bits(13).unwrap(), 13));
            bits_left -= 13;
        }
        if bits_left > 0 {
            collected.push((reader.read_bits(bits_left as u32).unwrap(), bits_left as u32));
        }
        // Rebuild and compare.
        let mut output = Vec::new();
        let mut writer = BitWriter::new(&mut output);
        for &(v, n) in &collected {
            writer.write_bits(v, n).unwrap();
        }
        writer.close().unwrap();
        assert_eq!(output, bytes);
    }
}
