//! Binary arithmetic coder driven by a pluggable bit predictor.
//!
//! The coder reuses the carry-propagating interval machinery of the range
//! coder: the interval is split at `low + ((range * p) >> 12)` where `p` is
//! the predictor's 12-bit probability that the next bit is one. Bytes are
//! processed MSB-first, one predictor per block, no state carried across
//! blocks.

use crate::range::IntervalEncoder;
use crate::{EntropyDecoder, EntropyEncoder};
use cascade_core::bitstream::{BitReader, BitWriter};
use cascade_core::error::Result;
use std::io::{Read, Write};

const TOP: u32 = 1 << 24;

/// Adaptive model feeding the binary arithmetic coder.
///
/// `predict` returns the 12-bit probability that the next bit is one;
/// `update` feeds the actual bit back. The coder calls them strictly
/// alternating, so implementations may stash prediction state in `predict`.
pub trait Predictor {
    /// Probability that the next bit is 1, in `[0, 4095]`.
    fn predict(&mut self) -> i32;
    /// Adapt to the observed bit (0 or 1).
    fn update(&mut self, bit: u8);
}

/// Binary arithmetic encoder over a predictor.
pub struct BinaryEncoder<'a, W: Write, P: Predictor> {
    bs: &'a mut BitWriter<W>,
    predictor: P,
    interval: IntervalEncoder,
    disposed: bool,
}

impl<'a, W: Write, P: Predictor> BinaryEncoder<'a, W, P> {
    /// Create an encoder over the given bit writer and predictor.
    pub fn new(bs: &'a mut BitWriter<W>, predictor: P) -> Self {
        Self {
            bs,
            predictor,
            interval: IntervalEncoder::new(),
            disposed: false,
        }
    }

    #[inline]
    fn encode_bit(&mut self, bit: u8) -> Result<()> {
        let p = self.predictor.predict().clamp(1, 4095) as u32;
        let bound = (self.interval.range >> 12) * p;
        if bit == 1 {
            self.interval.range = bound;
        } else {
            self.interval.low += u64::from(bound);
            self.interval.range -= bound;
        }
        self.predictor.update(bit);
        while self.interval.range < TOP {
            self.interval.shift_low(self.bs)?;
            self.interval.range <<= 8;
        }
        Ok(())
    }
}

impl<W: Write, P: Predictor> EntropyEncoder for BinaryEncoder<'_, W, P> {
    fn encode(&mut self, block: &[u8]) -> Result<usize> {
        for &byte in block {
            for shift in (0..8).rev() {
                self.encode_bit((byte >> shift) & 1)?;
            }
        }
        Ok(block.len())
    }

    fn dispose(&mut self) -> Result<()> {
        if !self.disposed {
            self.interval.flush(self.bs)?;
            self.disposed = true;
        }
        Ok(())
    }
}

/// Binary arithmetic decoder over a predictor.
pub struct BinaryDecoder<'a, R: Read, P: Predictor> {
    bs: &'a mut BitReader<R>,
    predictor: P,
    range: u32,
    code: u32,
    primed: bool,
}

impl<'a, R: Read, P: Predictor> BinaryDecoder<'a, R, P> {
    /// Create a decoder over the given bit reader and predictor.
    pub fn new(bs: &'a mut BitReader<R>, predictor: P) -> Self {
        Self {
            bs,
            predictor,
            range: u32::MAX,
            code: 0,
            primed: false,
        }
    }

    #[inline]
    fn decode_bit(&mut self) -> Result<u8> {
        let p = self.predictor.predict().clamp(1, 4095) as u32;
        let bound = (self.range >> 12) * p;
        let bit = if self.code < bound {
            self.range = bound;
            1
        } else {
            self.code -= bound;
            self.range -= bound;
            0
        };
        self.predictor.update(bit);
        while self.range < TOP {
            self.code = (self.code << 8) | self.bs.read_bits(8)? as u32;
            self.range <<= 8;
        }
        Ok(bit)
    }
}

impl<R: Read, P: Predictor> EntropyDecoder for BinaryDecoder<'_, R, P> {
    fn decode(&mut self, block: &mut [u8]) -> Result<usize> {
        if !self.primed && !block.is_empty() {
            // The first emitted byte is the empty carry cache.
            let _ = self.bs.read_bits(8)?;
            self.code = self.bs.read_bits(32)? as u32;
            self.primed = true;
        }
        for slot in block.iter_mut() {
            let mut byte = 0u8;
            for _ in 0..8 {
                byte = (byte << 1) | self.decode_bit()?;
            }
            *slot = byte;
        }
        Ok(block.len())
    }

    fn dispose(&mut self) -> Result<()> {
        Ok(())
    }
}
