//! Carry-propagating range coder over normalized frequency tables.
//!
//! The coder keeps a 32-bit range and a 64-bit low accumulator whose bits
//! 32..39 hold the pending carry; emitted bytes pass through a cache so a
//! late carry can still ripple into them. Renormalization emits a byte
//! whenever the range drops below 2^24. Chunks carry the same
//! alphabet/frequency header as the ANS coder.

use crate::alphabet::{
    MIN_LOG_RANGE, decode_alphabet, decode_frequencies, encode_alphabet, encode_frequencies,
    normalize_frequencies,
};
use crate::{EntropyDecoder, EntropyEncoder};
use cascade_core::bitstream::{BitReader, BitWriter};
use cascade_core::error::{CascadeError, Result};
use cascade_core::math::histogram_order0;
use std::io::{Read, Write};

/// Renormalization threshold.
const TOP: u32 = 1 << 24;

/// Default frequency scale log, lowered for small chunks.
pub const DEFAULT_LOG_RANGE: u32 = 12;

/// Chunk size processed with one frequency table.
pub const CHUNK_SIZE: usize = 1 << 15;

fn chunk_log_range(len: usize) -> u32 {
    let mut log_range = DEFAULT_LOG_RANGE;
    while log_range > MIN_LOG_RANGE && (1usize << log_range) > len {
        log_range -= 1;
    }
    log_range
}

/// Encoder-side interval state with LZMA-style carry resolution. Shared
/// with the binary arithmetic coder.
pub(crate) struct IntervalEncoder {
    pub(crate) low: u64,
    pub(crate) range: u32,
    cache: u8,
    cache_size: u64,
}

impl IntervalEncoder {
    pub(crate) fn new() -> Self {
        Self {
            low: 0,
            range: u32::MAX,
            cache: 0,
            cache_size: 1,
        }
    }

    pub(crate) fn shift_low<W: Write>(&mut self, bs: &mut BitWriter<W>) -> Result<()> {
        if self.low < 0xFF00_0000 || self.low > 0xFFFF_FFFF {
            let carry = (self.low >> 32) as u8;
            let mut pending = self.cache;
            loop {
                bs.write_bits(u64::from(pending.wrapping_add(carry)), 8)?;
                pending = 0xFF;
                self.cache_size -= 1;
                if self.cache_size == 0 {
                    break;
                }
            }
            self.cache = (self.low >> 24) as u8;
        }
        self.cache_size += 1;
        self.low = (self.low << 8) & 0xFFFF_FFFF;
        Ok(())
    }

    fn encode_symbol<W: Write>(
        &mut self,
        bs: &mut BitWriter<W>,
        cum: u32,
        freq: u32,
        log_range: u32,
    ) -> Result<()> {
        let r = self.range >> log_range;
        self.low += u64::from(r) * u64::from(cum);
        self.range = (u64::from(r) * u64::from(freq)) as u32;
        while self.range < TOP {
            self.shift_low(bs)?;
            self.range <<= 8;
        }
        Ok(())
    }

    pub(crate) fn flush<W: Write>(&mut self, bs: &mut BitWriter<W>) -> Result<()> {
        for _ in 0..5 {
            self.shift_low(bs)?;
        }
        Ok(())
    }
}

/// Range encoder over 32 KiB chunks.
pub struct RangeEncoder<'a, W: Write> {
    bs: &'a mut BitWriter<W>,
}

impl<'a, W: Write> RangeEncoder<'a, W> {
    /// Create an encoder over the given bit writer.
    pub fn new(bs: &'a mut BitWriter<W>) -> Self {
        Self { bs }
    }

    fn encode_chunk(&mut self, chunk: &[u8]) -> Result<()> {
        let log_range = chunk_log_range(chunk.len());
        let mut freqs = histogram_order0(chunk);
        let alphabet = normalize_frequencies(&mut freqs, chunk.len() as u32, 1 << log_range)?;
        encode_alphabet(self.bs, &alphabet)?;
        encode_frequencies(self.bs, &freqs, &alphabet, log_range)?;

        let mut cum = [0u32; 256];
        let mut running = 0u32;
        for &s in &alphabet {
            cum[s as usize] = running;
            running += freqs[s as usize];
        }

        let mut interval = IntervalEncoder::new();
        for &b in chunk {
            interval.encode_symbol(self.bs, cum[b as usize], freqs[b as usize], log_range)?;
        }
        interval.flush(self.bs)
    }
}

impl<W: Write> EntropyEncoder for RangeEncoder<'_, W> {
    fn encode(&mut self, block: &[u8]) -> Result<usize> {
        for chunk in block.chunks(CHUNK_SIZE) {
            self.encode_chunk(chunk)?;
        }
        Ok(block.len())
    }

    fn dispose(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Range decoder over 32 KiB chunks.
pub struct RangeDecoder<'a, R: Read> {
    bs: &'a mut BitReader<R>,
}

impl<'a, R: Read> RangeDecoder<'a, R> {
    /// Create a decoder over the given bit reader.
    pub fn new(bs: &'a mut BitReader<R>) -> Self {
        Self { bs }
    }

    fn decode_chunk(&mut self, chunk: &mut [u8]) -> Result<()> {
        let alphabet = decode_alphabet(self.bs)?;
        if alphabet.is_empty() {
            return Err(CascadeError::invalid_bitstream("empty range-coder alphabet"));
        }
        let (log_range, freqs) = decode_frequencies(self.bs, &alphabet)?;
        let scale = 1u32 << log_range;

        let mut cum = [0u32; 256];
        let mut running = 0u32;
        let mut slots = vec![0u8; scale as usize];
        for &s in &alphabet {
            cum[s as usize] = running;
            let f = freqs[s as usize];
            slots[running as usize..(running + f) as usize].fill(s);
            running += f;
        }

        // The first emitted byte is the empty carry cache.
        let _ = self.bs.read_bits(8)?;
        let mut code = self.bs.read_bits(32)? as u32;
        let mut range = u32::MAX;

        for slot in chunk.iter_mut() {
            let r = range >> log_range;
            let dv = (code / r).min(scale - 1);
            let s = slots[dv as usize];
            let base = (u64::from(r) * u64::from(cum[s as usize])) as u32;
            if code < base {
                return Err(CascadeError::invalid_bitstream(
                    "range coder interval underflow",
                ));
            }
            code -= base;
            range = (u64::from(r) * u64::from(freqs[s as usize])) as u32;
            while range < TOP {
                code = (code << 8) | self.bs.read_bits(8)? as u32;
                range <<= 8;
            }
            *slot = s;
        }
        Ok(())
    }
}

impl<R: Read> EntropyDecoder for RangeDecoder<'_, R> {
    fn decode(&mut self, block: &mut [u8]) -> Result<usize> {
        for chunk in block.chunks_mut(CHUNK_SIZE) {
            self.decode_chunk(chunk)?;
        }
        Ok(block.len())
    }

    fn dispose(&mut self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;
    use std::io::Cursor;

    fn roundtrip(block: &[u8]) {
        let mut out = Vec::new();
        let mut writer = BitWriter::new(&mut out);
        let mut enc = RangeEncoder::new(&mut writer);
        assert_eq!(enc.encode(block).unwrap(), block.len());
        enc.dispose().unwrap();
        writer.close().unwrap();

        let mut reader = BitReader::new(Cursor::new(&out));
        let mut dec = RangeDecoder::new(&mut reader);
        let mut back = vec![0u8; block.len()];
        assert_eq!(dec.decode(&mut back).unwrap(), block.len());
        dec.dispose().unwrap();
        assert_eq!(back, block);
    }

    #[test]
    fn test_roundtrip_empty() {
        roundtrip(b"");
    }

    #[test]
    fn test_roundtrip_single_byte() {
        roundtrip(b"q");
    }

    #[test]
    fn test_roundtrip_constant() {
        roundtrip(&[0u8; 70_000]);
    }

    #[test]
    fn test_roundtrip_text() {
        let block = b"a rose is a rose is a rose".repeat(500);
        roundtrip(&block);
    }

    #[test]
    fn test_roundtrip_random_multi_chunk() {
        let mut rng = ChaCha8Rng::seed_from_u64(31);
        let block: Vec<u8> = (0..2 * CHUNK_SIZE + 77).map(|_| rng.r#gen()).collect();
        roundtrip(&block);
    }

    #[test]
    fn test_roundtrip_skewed() {
        let mut rng = ChaCha8Rng::seed_from_u64(37);
        let block: Vec<u8> = (0..50_000)
            .map(|_| if rng.gen_range(0..100) < 95 { 0 } else { rng.r#gen() })
            .collect();
        roundtrip(&block);
    }
}
