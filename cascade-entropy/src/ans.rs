//! Range-variant ANS coder (rANS), orders 0 and 1.
//!
//! 64-bit state, 32-bit renormalization. Encoding runs in reverse:
//! `C(s, x) = ((x / f) << log_range) + (x mod f) + c`; the encoder emits 32
//! bits whenever the pre-encode state reaches
//! `((RANS_TOP >> log_range) << 32) * f`. Each chunk transmits its
//! alphabet/frequency header, the final encoder state as 64 bits, and the
//! renormalization words in decoding order.
//!
//! Order 1 conditions the model on the previous byte: 256 independent
//! tables transmitted in ascending context order, sharing one state.

use crate::alphabet::{
    MIN_LOG_RANGE, decode_alphabet, decode_frequencies, encode_alphabet, encode_frequencies,
    normalize_frequencies,
};
use crate::{EntropyDecoder, EntropyEncoder};
use cascade_core::bitstream::{BitReader, BitWriter};
use cascade_core::error::{CascadeError, Result};
use cascade_core::math::{histogram_order0, histogram_order1};
use std::io::{Read, Write};

/// Lower bound of the encoder state interval.
const RANS_TOP: u64 = 1 << 31;

/// Default frequency scale log, lowered for small chunks.
pub const DEFAULT_LOG_RANGE: u32 = 12;

const CHUNK_BASE: usize = 1 << 14;

fn chunk_size(order: u8) -> usize {
    CHUNK_BASE * (usize::from(order) + 1)
}

fn chunk_log_range(len: usize) -> u32 {
    let mut log_range = DEFAULT_LOG_RANGE;
    while log_range > MIN_LOG_RANGE && (1usize << log_range) > len {
        log_range -= 1;
    }
    log_range
}

fn validate_order(order: u8) -> Result<()> {
    if order > 1 {
        return Err(CascadeError::invalid_argument(format!(
            "ANS order {order} out of range [0..1]"
        )));
    }
    Ok(())
}

/// Cumulative frequencies over the alphabet, ascending symbol order.
fn cumulative(freqs: &[u32; 256], alphabet: &[u8]) -> [u32; 256] {
    let mut cum = [0u32; 256];
    let mut running = 0u32;
    for &s in alphabet {
        cum[s as usize] = running;
        running += freqs[s as usize];
    }
    cum
}

/// Slot-to-symbol table of size `scale`.
fn slot_table(freqs: &[u32; 256], alphabet: &[u8], scale: u32) -> Vec<u8> {
    let mut table = vec![0u8; scale as usize];
    let mut slot = 0usize;
    for &s in alphabet {
        let f = freqs[s as usize] as usize;
        table[slot..slot + f].fill(s);
        slot += f;
    }
    table
}

/// rANS encoder, order 0 or 1.
pub struct AnsEncoder<'a, W: Write> {
    bs: &'a mut BitWriter<W>,
    order: u8,
}

impl<'a, W: Write> AnsEncoder<'a, W> {
    /// Create an encoder; `order` must be 0 or 1.
    pub fn new(bs: &'a mut BitWriter<W>, order: u8) -> Result<Self> {
        validate_order(order)?;
        Ok(Self { bs, order })
    }

    fn encode_chunk_order0(&mut self, chunk: &[u8]) -> Result<()> {
        let log_range = chunk_log_range(chunk.len());
        let scale = 1u32 << log_range;
        let mut freqs = histogram_order0(chunk);
        let alphabet = normalize_frequencies(&mut freqs, chunk.len() as u32, scale)?;
        encode_alphabet(self.bs, &alphabet)?;
        encode_frequencies(self.bs, &freqs, &alphabet, log_range)?;
        let cum = cumulative(&freqs, &alphabet);

        let mut x = RANS_TOP;
        let mut words: Vec<u32> = Vec::new();
        for &b in chunk.iter().rev() {
            let f = u64::from(freqs[b as usize]);
            let x_max = ((RANS_TOP >> log_range) << 32) * f;
            if x >= x_max {
                words.push(x as u32);
                x >>= 32;
            }
            x = ((x / f) << log_range) + (x % f) + u64::from(cum[b as usize]);
        }
        self.bs.write_bits(x, 64)?;
        for &w in words.iter().rev() {
            self.bs.write_bits(u64::from(w), 32)?;
        }
        Ok(())
    }

    fn encode_chunk_order1(&mut self, chunk: &[u8]) -> Result<()> {
        let log_range = chunk_log_range(chunk.len());
        let scale = 1u32 << log_range;

        let mut freqs = histogram_order1(chunk);
        let mut totals = [0u32; 256];
        for (ctx, table) in freqs.iter().enumerate() {
            totals[ctx] = table.iter().sum();
        }

        let mut alphabets: Vec<Vec<u8>> = Vec::with_capacity(256);
        for ctx in 0..256 {
            if totals[ctx] == 0 {
                encode_alphabet(self.bs, &[])?;
                alphabets.push(Vec::new());
                continue;
            }
            let alphabet = normalize_frequencies(&mut freqs[ctx], totals[ctx], scale)?;
            encode_alphabet(self.bs, &alphabet)?;
            encode_frequencies(self.bs, &freqs[ctx], &alphabet, log_range)?;
            alphabets.push(alphabet);
        }
        let cums: Vec<[u32; 256]> = (0..256)
            .map(|ctx| cumulative(&freqs[ctx], &alphabets[ctx]))
            .collect();

        let mut x = RANS_TOP;
        let mut words: Vec<u32> = Vec::new();
        for i in (0..chunk.len()).rev() {
            let ctx = if i == 0 { 0 } else { chunk[i - 1] as usize };
            let b = chunk[i] as usize;
            let f = u64::from(freqs[ctx][b]);
            let x_max = ((RANS_TOP >> log_range) << 32) * f;
            if x >= x_max {
                words.push(x as u32);
                x >>= 32;
            }
            x = ((x / f) << log_range) + (x % f) + u64::from(cums[ctx][b]);
        }
        self.bs.write_bits(x, 64)?;
        for &w in words.iter().rev() {
            self.bs.write_bits(u64::from(w), 32)?;
        }
        Ok(())
    }
}

impl<W: Write> EntropyEncoder for AnsEncoder<'_, W> {
    fn encode(&mut self, block: &[u8]) -> Result<usize> {
        for chunk in block.chunks(chunk_size(self.order)) {
            if self.order == 0 {
                self.encode_chunk_order0(chunk)?;
            } else {
                self.encode_chunk_order1(chunk)?;
            }
        }
        Ok(block.len())
    }

    fn dispose(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Per-context decoding model.
struct AnsModel {
    freqs: [u32; 256],
    cum: [u32; 256],
    slots: Vec<u8>,
    log_range: u32,
}

impl AnsModel {
    fn read<R: Read>(bs: &mut BitReader<R>) -> Result<Option<Self>> {
        let alphabet = decode_alphabet(bs)?;
        if alphabet.is_empty() {
            return Ok(None);
        }
        let (log_range, freqs) = decode_frequencies(bs, &alphabet)?;
        let cum = cumulative(&freqs, &alphabet);
        let slots = slot_table(&freqs, &alphabet, 1 << log_range);
        Ok(Some(Self {
            freqs,
            cum,
            slots,
            log_range,
        }))
    }

    #[inline]
    fn decode_symbol<R: Read>(&self, bs: &mut BitReader<R>, x: &mut u64) -> Result<u8> {
        let mask = (1u64 << self.log_range) - 1;
        let slot = (*x & mask) as u32;
        let s = self.slots[slot as usize];
        let f = self.freqs[s as usize];
        *x = u64::from(f) * (*x >> self.log_range) + u64::from(slot)
            - u64::from(self.cum[s as usize]);
        if *x < RANS_TOP {
            *x = (*x << 32) | bs.read_bits(32)?;
        }
        Ok(s)
    }
}

/// rANS decoder, order 0 or 1.
pub struct AnsDecoder<'a, R: Read> {
    bs: &'a mut BitReader<R>,
    order: u8,
}

impl<'a, R: Read> AnsDecoder<'a, R> {
    /// Create a decoder; `order` must be 0 or 1.
    pub fn new(bs: &'a mut BitReader<R>, order: u8) -> Result<Self> {
        validate_order(order)?;
        Ok(Self { bs, order })
    }

    fn decode_chunk_order0(&mut self, chunk: &mut [u8]) -> Result<()> {
        let model = AnsModel::read(self.bs)?
            .ok_or_else(|| CascadeError::invalid_bitstream("empty ANS alphabet"))?;
        let mut x = self.bs.read_bits(64)?;
        for slot in chunk.iter_mut() {
            *slot = model.decode_symbol(self.bs, &mut x)?;
        }
        Ok(())
    }

    fn decode_chunk_order1(&mut self, chunk: &mut [u8]) -> Result<()> {
        let mut models: Vec<Option<AnsModel>> = Vec::with_capacity(256);
        for _ in 0..256 {
            models.push(AnsModel::read(self.bs)?);
        }
        let mut x = self.bs.read_bits(64)?;
        let mut prev = 0usize;
        for slot in chunk.iter_mut() {
            let model = models[prev].as_ref().ok_or_else(|| {
                CascadeError::invalid_bitstream(format!("no ANS model for context {prev}"))
            })?;
            let s = model.decode_symbol(self.bs, &mut x)?;
            *slot = s;
            prev = s as usize;
        }
        Ok(())
    }
}

impl<R: Read> EntropyDecoder for AnsDecoder<'_, R> {
    fn decode(&mut self, block: &mut [u8]) -> Result<usize> {
        for chunk in block.chunks_mut(chunk_size(self.order)) {
            if self.order == 0 {
                self.decode_chunk_order0(chunk)?;
            } else {
                self.decode_chunk_order1(chunk)?;
            }
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

    fn roundtrip(block: &[u8], order: u8) {
        let mut out = Vec::new();
        let mut writer = BitWriter::new(&mut out);
        let mut enc = AnsEncoder::new(&mut writer, order).unwrap();
        assert_eq!(enc.encode(block).unwrap(), block.len());
        enc.dispose().unwrap();
        writer.close().unwrap();

        let mut reader = BitReader::new(Cursor::new(&out));
        let mut dec = AnsDecoder::new(&mut reader, order).unwrap();
        let mut back = vec![0u8; block.len()];
        assert_eq!(dec.decode(&mut back).unwrap(), block.len());
        dec.dispose().unwrap();
        assert_eq!(back, block, "order {order}");
    }

    #[test]
    fn test_order_validation() {
        let mut writer = BitWriter::new(Vec::new());
        assert!(AnsEncoder::new(&mut writer, 2).is_err());
    }

    #[test]
    fn test_roundtrip_empty() {
        roundtrip(b"", 0);
        roundtrip(b"", 1);
    }

    #[test]
    fn test_roundtrip_tiny() {
        roundtrip(b"a", 0);
        roundtrip(b"ab", 1);
    }

    #[test]
    fn test_roundtrip_constant() {
        roundtrip(&[0x5Au8; 10_000], 0);
        roundtrip(&[0x5Au8; 10_000], 1);
    }

    #[test]
    fn test_roundtrip_text() {
        let block = b"it was the best of times, it was the worst of times".repeat(100);
        roundtrip(&block, 0);
        roundtrip(&block, 1);
    }

    #[test]
    fn test_roundtrip_random_multi_chunk() {
        let mut rng = ChaCha8Rng::seed_from_u64(23);
        let block: Vec<u8> = (0..3 * CHUNK_BASE + 111).map(|_| rng.r#gen()).collect();
        roundtrip(&block, 0);
        roundtrip(&block, 1);
    }

    #[test]
    fn test_small_chunk_lowers_log_range() {
        assert_eq!(chunk_log_range(1 << 14), DEFAULT_LOG_RANGE);
        assert_eq!(chunk_log_range(4096), 12);
        assert_eq!(chunk_log_range(4095), 11);
        assert_eq!(chunk_log_range(600), 9);
        assert_eq!(chunk_log_range(300), 8);
        assert_eq!(chunk_log_range(1), 8);
    }

    #[test]
    fn test_missing_symbol_uniform_alphabet() {
        // Symbol 0 absent, symbols 1..=255 near-uniform.
        let mut rng = ChaCha8Rng::seed_from_u64(29);
        let block: Vec<u8> = (0..65_536).map(|_| rng.gen_range(1..=255u8)).collect();
        roundtrip(&block, 0);
    }
}
