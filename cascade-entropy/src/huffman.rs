//! Canonical Huffman coder.
//!
//! The block is processed in 64 KiB chunks. Each chunk transmits its
//! alphabet and per-symbol code lengths (signed Exp-Golomb deltas), then
//! the symbols themselves. Code lengths are computed with the in-place
//! Moffat sibling-merge algorithm and capped at [`MAX_CODE_LENGTH`] by
//! halving the frequencies until the cap holds.

use crate::alphabet::{decode_alphabet, encode_alphabet};
use crate::golomb::{read_exp_golomb_signed, write_exp_golomb_signed};
use crate::{EntropyDecoder, EntropyEncoder};
use cascade_core::bitstream::{BitReader, BitWriter};
use cascade_core::error::{CascadeError, Result};
use cascade_core::math::histogram_order0;
use std::io::{Read, Write};

/// Chunk size processed with one code table.
pub const CHUNK_SIZE: usize = 1 << 16;

/// Longest admissible canonical code.
pub const MAX_CODE_LENGTH: u32 = 24;

/// Canonical Huffman encoder.
pub struct HuffmanEncoder<'a, W: Write> {
    bs: &'a mut BitWriter<W>,
}

impl<'a, W: Write> HuffmanEncoder<'a, W> {
    /// Create an encoder over the given bit writer.
    pub fn new(bs: &'a mut BitWriter<W>) -> Self {
        Self { bs }
    }

    fn encode_chunk(&mut self, chunk: &[u8]) -> Result<()> {
        let freqs = histogram_order0(chunk);
        let alphabet: Vec<u8> = (0u32..256)
            .filter(|&s| freqs[s as usize] > 0)
            .map(|s| s as u8)
            .collect();
        encode_alphabet(self.bs, &alphabet)?;
        if alphabet.len() == 1 {
            // The decoder fills the chunk with the lone symbol.
            return Ok(());
        }

        let lengths = compute_code_lengths(&freqs, &alphabet);
        let mut previous = 0i32;
        for &s in &alphabet {
            let len = i32::from(lengths[s as usize]);
            write_exp_golomb_signed(self.bs, len - previous)?;
            previous = len;
        }

        let codes = canonical_codes(&lengths, &alphabet);
        for &b in chunk {
            let (code, len) = codes[b as usize];
            self.bs.write_bits(u64::from(code), len)?;
        }
        Ok(())
    }
}

impl<W: Write> EntropyEncoder for HuffmanEncoder<'_, W> {
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

/// Canonical Huffman decoder.
pub struct HuffmanDecoder<'a, R: Read> {
    bs: &'a mut BitReader<R>,
}

impl<'a, R: Read> HuffmanDecoder<'a, R> {
    /// Create a decoder over the given bit reader.
    pub fn new(bs: &'a mut BitReader<R>) -> Self {
        Self { bs }
    }

    fn decode_chunk(&mut self, chunk: &mut [u8]) -> Result<()> {
        let alphabet = decode_alphabet(self.bs)?;
        if alphabet.is_empty() {
            return Err(CascadeError::invalid_bitstream("empty Huffman alphabet"));
        }
        if alphabet.len() == 1 {
            chunk.fill(alphabet[0]);
            return Ok(());
        }

        let mut lengths = [0u8; 256];
        let mut previous = 0i32;
        for &s in &alphabet {
            let len = previous + read_exp_golomb_signed(self.bs)?;
            if !(1..=MAX_CODE_LENGTH as i32).contains(&len) {
                return Err(CascadeError::invalid_bitstream(format!(
                    "Huffman code length {len} out of range"
                )));
            }
            lengths[s as usize] = len as u8;
            previous = len;
        }

        let table = DecodingTable::build(&lengths, &alphabet)?;
        for slot in chunk.iter_mut() {
            *slot = table.decode_symbol(self.bs)?;
        }
        Ok(())
    }
}

impl<R: Read> EntropyDecoder for HuffmanDecoder<'_, R> {
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

/// Compute length-limited code lengths for the present symbols.
///
/// Frequencies are halved (floor at 1) and the lengths rebuilt whenever the
/// longest code exceeds [`MAX_CODE_LENGTH`]; halving converges toward a
/// balanced tree of depth 8.
fn compute_code_lengths(freqs: &[u32; 256], alphabet: &[u8]) -> [u8; 256] {
    let mut scaled: Vec<u32> = alphabet.iter().map(|&s| freqs[s as usize]).collect();
    loop {
        // Deterministic order: frequency, then symbol value.
        let mut order: Vec<usize> = (0..alphabet.len()).collect();
        order.sort_by_key(|&i| (scaled[i], alphabet[i]));

        let mut work: Vec<u32> = order.iter().map(|&i| scaled[i]).collect();
        minimum_redundancy(&mut work);

        if work.iter().all(|&len| len <= MAX_CODE_LENGTH) {
            let mut lengths = [0u8; 256];
            for (rank, &i) in order.iter().enumerate() {
                lengths[alphabet[i] as usize] = work[rank] as u8;
            }
            return lengths;
        }
        for f in scaled.iter_mut() {
            *f = (*f + 1) >> 1;
        }
    }
}

/// In-place Moffat sibling-merge: `a` holds frequencies sorted ascending on
/// entry and the matching code lengths on exit.
fn minimum_redundancy(a: &mut [u32]) {
    let n = a.len();
    if n == 0 {
        return;
    }
    if n == 1 {
        a[0] = 1;
        return;
    }

    // Phase 1: merge siblings, leaving parent pointers behind.
    a[0] += a[1];
    let mut root = 0usize;
    let mut leaf = 2usize;
    for next in 1..n - 1 {
        if leaf >= n || a[root] < a[leaf] {
            a[next] = a[root];
            a[root] = next as u32;
            root += 1;
        } else {
            a[next] = a[leaf];
            leaf += 1;
        }
        if leaf >= n || (root < next && a[root] < a[leaf]) {
            a[next] += a[root];
            a[root] = next as u32;
            root += 1;
        } else {
            a[next] += a[leaf];
            leaf += 1;
        }
    }

    // Phase 2: internal node depths.
    a[n - 2] = 0;
    for next in (0..n - 2).rev() {
        a[next] = a[a[next] as usize] + 1;
    }

    // Phase 3: leaf depths from the internal depth profile.
    let mut avail = 1i64;
    let mut used = 0i64;
    let mut depth = 0u32;
    let mut root_i = n as i64 - 2;
    let mut next_i = n as i64 - 1;
    while avail > 0 {
        while root_i >= 0 && a[root_i as usize] == depth {
            used += 1;
            root_i -= 1;
        }
        while avail > used {
            a[next_i as usize] = depth;
            next_i -= 1;
            avail -= 1;
        }
        avail = 2 * used;
        depth += 1;
        used = 0;
    }
}

/// Canonical codes ordered by (length, symbol).
fn canonical_codes(lengths: &[u8; 256], alphabet: &[u8]) -> Vec<(u32, u32)> {
    let mut sorted: Vec<(u8, u8)> = alphabet.iter().map(|&s| (lengths[s as usize], s)).collect();
    sorted.sort_unstable();

    let mut codes = vec![(0u32, 0u32); 256];
    let mut code = 0u32;
    let mut prev_len = u32::from(sorted[0].0);
    for &(len, sym) in &sorted {
        let len = u32::from(len);
        code <<= len - prev_len;
        codes[sym as usize] = (code, len);
        code += 1;
        prev_len = len;
    }
    codes
}

/// Canonical decoding tables: first code, count, and symbol permutation per
/// code length (the bit-peeking walk starts at the shortest length).
struct DecodingTable {
    counts: [u32; MAX_CODE_LENGTH as usize + 1],
    first_code: [u32; MAX_CODE_LENGTH as usize + 1],
    base_index: [u32; MAX_CODE_LENGTH as usize + 1],
    perms: Vec<u8>,
    min_len: u32,
    max_len: u32,
}

impl DecodingTable {
    fn build(lengths: &[u8; 256], alphabet: &[u8]) -> Result<Self> {
        let mut sorted: Vec<(u8, u8)> =
            alphabet.iter().map(|&s| (lengths[s as usize], s)).collect();
        sorted.sort_unstable();

        let min_len = u32::from(sorted[0].0);
        let max_len = u32::from(sorted[sorted.len() - 1].0);

        let mut counts = [0u32; MAX_CODE_LENGTH as usize + 1];
        for &(len, _) in &sorted {
            counts[len as usize] += 1;
        }

        // Kraft check guards against corrupt length tables.
        let mut kraft = 0u64;
        for len in 1..=max_len {
            kraft += u64::from(counts[len as usize]) << (MAX_CODE_LENGTH - len);
        }
        if kraft > 1u64 << MAX_CODE_LENGTH {
            return Err(CascadeError::invalid_bitstream(
                "Huffman lengths violate the Kraft inequality",
            ));
        }

        let mut first_code = [0u32; MAX_CODE_LENGTH as usize + 1];
        let mut base_index = [0u32; MAX_CODE_LENGTH as usize + 1];
        let mut code = 0u32;
        let mut index = 0u32;
        for len in min_len..=max_len {
            first_code[len as usize] = code;
            base_index[len as usize] = index;
            code = (code + counts[len as usize]) << 1;
            index += counts[len as usize];
        }

        let perms: Vec<u8> = sorted.iter().map(|&(_, s)| s).collect();
        Ok(Self {
            counts,
            first_code,
            base_index,
            perms,
            min_len,
            max_len,
        })
    }

    fn decode_symbol<R: Read>(&self, bs: &mut BitReader<R>) -> Result<u8> {
        let mut len = self.min_len;
        let mut code = bs.read_bits(len)? as u32;
        loop {
            let count = self.counts[len as usize];
            let first = self.first_code[len as usize];
            if count > 0 && code >= first && code - first < count {
                let index = self.base_index[len as usize] + (code - first);
                return Ok(self.perms[index as usize]);
            }
            if len == self.max_len {
                return Err(CascadeError::invalid_bitstream("invalid Huffman code"));
            }
            code = (code << 1) | u32::from(bs.read_bit()?);
            len += 1;
        }
    }
}
