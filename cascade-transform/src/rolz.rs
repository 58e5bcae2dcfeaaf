//! Reduced-offset Lempel-Ziv transforms.
//!
//! Matches are referenced by `(context, rank)`: the context is a hash of
//! the previous two bytes selecting a small circular table of recent
//! positions, and the rank picks one of the last 32 positions seen in that
//! context. Both sides insert every position into the table, so ranks
//! resolve identically during decoding and no offsets are transmitted.
//!
//! [`Rolz`] emits a plain byte token stream and leaves entropy coding to
//! the outer stage; [`RolzX`] additionally squeezes flags, literals, ranks
//! and match lengths through an embedded adaptive binary range coder.

use crate::Transform;
use cascade_core::error::{CascadeError, Result};

const CTX_BITS: u32 = 12;
const CTX_COUNT: usize = 1 << CTX_BITS;
const POSITIONS: usize = 32;
const MIN_MATCH: usize = 3;
const MAX_MATCH: usize = MIN_MATCH + 255;
const MIN_BLOCK: usize = 32;
const MAX_LITERAL_RUN: usize = 128;
const MATCH_FLAG: u8 = 0x80;

#[inline]
fn context_of(b1: u8, b0: u8) -> usize {
    let x = (u32::from(b1) << 8) | u32::from(b0);
    (x.wrapping_mul(2654435761) >> (32 - CTX_BITS)) as usize
}

/// Shared position dictionary: a circular table of the last 32 positions
/// per context, stored as `position + 1` so zero means empty.
struct PositionTable {
    slots: Vec<u32>,
    counts: Vec<u32>,
}

impl PositionTable {
    fn new() -> Self {
        Self {
            slots: vec![0u32; CTX_COUNT * POSITIONS],
            counts: vec![0u32; CTX_COUNT],
        }
    }

    #[inline]
    fn insert(&mut self, ctx: usize, pos: usize) {
        let slot = ctx * POSITIONS + (self.counts[ctx] as usize % POSITIONS);
        self.slots[slot] = pos as u32 + 1;
        self.counts[ctx] += 1;
    }

    /// Position stored `rank` insertions ago, if any.
    #[inline]
    fn lookup(&self, ctx: usize, rank: usize) -> Option<usize> {
        if rank as u32 >= self.counts[ctx].min(POSITIONS as u32) {
            return None;
        }
        let newest = (self.counts[ctx] as usize + POSITIONS - 1 - rank) % POSITIONS;
        let stored = self.slots[ctx * POSITIONS + newest];
        if stored == 0 { None } else { Some(stored as usize - 1) }
    }
}

/// Longest-match search over the context ranks; ties keep the lowest rank.
fn find_match(table: &PositionTable, src: &[u8], pos: usize, ctx: usize) -> Option<(usize, usize)> {
    let limit = (src.len() - pos).min(MAX_MATCH);
    if limit < MIN_MATCH {
        return None;
    }
    let mut best: Option<(usize, usize)> = None;
    for rank in 0..POSITIONS {
        let Some(candidate) = table.lookup(ctx, rank) else {
            break;
        };
        if candidate >= pos {
            continue;
        }
        let mut len = 0usize;
        while len < limit && src[candidate + len] == src[pos + len] {
            len += 1;
        }
        if len >= MIN_MATCH && best.map_or(true, |(_, b)| len > b) {
            best = Some((rank, len));
        }
    }
    best
}

/// Reduced-offset LZ with a byte token stream.
///
/// Tokens: `0x00..=0x7F` start a literal run of `token + 1` bytes;
/// `0x80 | rank` is a match, followed by one `length - 3` byte.
#[derive(Debug, Default)]
pub struct Rolz;

impl Rolz {
    /// Create a transform instance.
    pub fn new() -> Self {
        Self
    }
}

fn flush_literals(dst: &mut [u8], out: &mut usize, literals: &[u8]) -> bool {
    for run in literals.chunks(MAX_LITERAL_RUN) {
        if *out + 1 + run.len() > dst.len() {
            return false;
        }
        dst[*out] = (run.len() - 1) as u8;
        *out += 1;
        dst[*out..*out + run.len()].copy_from_slice(run);
        *out += run.len();
    }
    true
}

impl Transform for Rolz {
    fn forward(&mut self, src: &[u8], dst: &mut [u8]) -> Result<Option<(usize, usize)>> {
        let n = src.len();
        if n < MIN_BLOCK {
            return Ok(None);
        }
        let budget = n - 1;
        let dst_len = budget.min(dst.len());
        let dst = &mut dst[..dst_len];

        let mut table = PositionTable::new();
        let mut out = 0usize;
        let mut pos = 0usize;
        let mut literal_start = 0usize;

        while pos < n {
            if pos >= 2 {
                let ctx = context_of(src[pos - 2], src[pos - 1]);
                let found = find_match(&table, src, pos, ctx);
                table.insert(ctx, pos);
                if let Some((rank, len)) = found {
                    if !flush_literals(dst, &mut out, &src[literal_start..pos]) {
                        return Ok(None);
                    }
                    if out + 2 > dst.len() {
                        return Ok(None);
                    }
                    dst[out] = MATCH_FLAG | rank as u8;
                    dst[out + 1] = (len - MIN_MATCH) as u8;
                    out += 2;
                    for q in pos + 1..pos + len {
                        table.insert(context_of(src[q - 2], src[q - 1]), q);
                    }
                    pos += len;
                    literal_start = pos;
                    continue;
                }
            }
            pos += 1;
        }
        if !flush_literals(dst, &mut out, &src[literal_start..]) {
            return Ok(None);
        }
        Ok(Some((n, out)))
    }

    fn inverse(&mut self, src: &[u8], dst: &mut [u8]) -> Result<(usize, usize)> {
        let mut table = PositionTable::new();
        let mut i = 0usize;
        let mut out = 0usize;

        while i < src.len() {
            let token = src[i];
            i += 1;
            if token & MATCH_FLAG == 0 {
                let run = token as usize + 1;
                if i + run > src.len() {
                    return Err(CascadeError::invalid_bitstream("truncated literal run"));
                }
                if out + run > dst.len() {
                    return Err(CascadeError::invalid_bitstream(
                        "literal run exceeds block size",
                    ));
                }
                for k in 0..run {
                    if out >= 2 {
                        table.insert(context_of(dst[out - 2], dst[out - 1]), out);
                    }
                    dst[out] = src[i + k];
                    out += 1;
                }
                i += run;
            } else {
                let rank = (token & 0x1F) as usize;
                if i >= src.len() {
                    return Err(CascadeError::invalid_bitstream("truncated match token"));
                }
                let len = src[i] as usize + MIN_MATCH;
                i += 1;
                if out < 2 {
                    return Err(CascadeError::invalid_bitstream("match before any context"));
                }
                let ctx = context_of(dst[out - 2], dst[out - 1]);
                let candidate = table.lookup(ctx, rank).ok_or_else(|| {
                    CascadeError::invalid_bitstream(format!("empty match rank {rank}"))
                })?;
                if candidate >= out || out + len > dst.len() {
                    return Err(CascadeError::invalid_bitstream("match out of bounds"));
                }
                table.insert(ctx, out);
                for k in 0..len {
                    let q = out + k;
                    if k > 0 {
                        table.insert(context_of(dst[q - 2], dst[q - 1]), q);
                    }
                    dst[q] = dst[candidate + k];
                }
                out += len;
            }
        }
        Ok((src.len(), out))
    }

    fn max_encoded_len(&self, src_len: usize) -> usize {
        src_len + src_len / MAX_LITERAL_RUN + 16
    }
}

// ---------------------------------------------------------------------------
// ROLZ-X: the same match engine behind an adaptive binary range coder.
// ---------------------------------------------------------------------------

const RC_TOP: u32 = 1 << 24;
const PROB_ONE_HALF: u16 = 2048;
const PROB_SHIFT: u32 = 5;

struct BitEncoder {
    low: u64,
    range: u32,
    cache: u8,
    cache_size: u64,
    out: Vec<u8>,
}

impl BitEncoder {
    fn new() -> Self {
        Self {
            low: 0,
            range: u32::MAX,
            cache: 0,
            cache_size: 1,
            out: Vec::new(),
        }
    }

    fn shift_low(&mut self) {
        if self.low < 0xFF00_0000 || self.low > 0xFFFF_FFFF {
            let carry = (self.low >> 32) as u8;
            let mut pending = self.cache;
            loop {
                self.out.push(pending.wrapping_add(carry));
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
    }

    fn encode_bit(&mut self, prob: &mut u16, bit: u8) {
        let bound = (self.range >> 12) * u32::from(*prob);
        if bit == 1 {
            self.range = bound;
            *prob += (4096 - *prob) >> PROB_SHIFT;
        } else {
            self.low += u64::from(bound);
            self.range -= bound;
            *prob -= *prob >> PROB_SHIFT;
        }
        while self.range < RC_TOP {
            self.shift_low();
            self.range <<= 8;
        }
    }

    fn encode_tree(&mut self, probs: &mut [u16], bits: u32, value: u32) {
        let mut index = 1usize;
        for i in (0..bits).rev() {
            let bit = ((value >> i) & 1) as u8;
            self.encode_bit(&mut probs[index], bit);
            index = (index << 1) | usize::from(bit);
        }
    }

    fn finish(mut self) -> Vec<u8> {
        for _ in 0..5 {
            self.shift_low();
        }
        self.out
    }
}

struct BitDecoder<'a> {
    src: &'a [u8],
    pos: usize,
    range: u32,
    code: u32,
}

impl<'a> BitDecoder<'a> {
    fn new(src: &'a [u8]) -> Result<Self> {
        if src.len() < 5 {
            return Err(CascadeError::invalid_bitstream("truncated range payload"));
        }
        let code = u32::from_be_bytes([src[1], src[2], src[3], src[4]]);
        Ok(Self {
            src,
            pos: 5,
            range: u32::MAX,
            code,
        })
    }

    #[inline]
    fn next_byte(&mut self) -> u8 {
        // Reading past the payload pads with zeros, like the bit reader.
        let b = self.src.get(self.pos).copied().unwrap_or(0);
        self.pos += 1;
        b
    }

    fn decode_bit(&mut self, prob: &mut u16) -> u8 {
        let bound = (self.range >> 12) * u32::from(*prob);
        let bit = if self.code < bound {
            self.range = bound;
            *prob += (4096 - *prob) >> PROB_SHIFT;
            1
        } else {
            self.code -= bound;
            self.range -= bound;
            *prob -= *prob >> PROB_SHIFT;
            0
        };
        while self.range < RC_TOP {
            self.code = (self.code << 8) | u32::from(self.next_byte());
            self.range <<= 8;
        }
        bit
    }

    fn decode_tree(&mut self, probs: &mut [u16], bits: u32) -> u32 {
        let mut index = 1usize;
        for _ in 0..bits {
            let bit = self.decode_bit(&mut probs[index]);
            index = (index << 1) | usize::from(bit);
        }
        index as u32 - (1 << bits)
    }
}

struct RolzXModels {
    flag: [u16; 2],
    literal: Vec<[u16; 256]>,
    rank: [u16; 32],
    length: [u16; 256],
}

impl RolzXModels {
    fn new() -> Self {
        Self {
            flag: [PROB_ONE_HALF; 2],
            literal: vec![[PROB_ONE_HALF; 256]; 4],
            rank: [PROB_ONE_HALF; 32],
            length: [PROB_ONE_HALF; 256],
        }
    }
}

/// Reduced-offset LZ with range-coded flags, literals and match lengths.
#[derive(Debug, Default)]
pub struct RolzX;

impl RolzX {
    /// Create a transform instance.
    pub fn new() -> Self {
        Self
    }
}

impl Transform for RolzX {
    fn forward(&mut self, src: &[u8], dst: &mut [u8]) -> Result<Option<(usize, usize)>> {
        let n = src.len();
        if n < MIN_BLOCK {
            return Ok(None);
        }

        let mut table = PositionTable::new();
        let mut models = RolzXModels::new();
        let mut rc = BitEncoder::new();
        let mut last_was_match = 0usize;
        let mut pos = 0usize;

        while pos < n {
            let mut matched = false;
            if pos >= 2 {
                let ctx = context_of(src[pos - 2], src[pos - 1]);
                let found = find_match(&table, src, pos, ctx);
                table.insert(ctx, pos);
                if let Some((rank, len)) = found {
                    rc.encode_bit(&mut models.flag[last_was_match], 1);
                    rc.encode_tree(&mut models.rank, 5, rank as u32);
                    rc.encode_tree(&mut models.length, 8, (len - MIN_MATCH) as u32);
                    for q in pos + 1..pos + len {
                        table.insert(context_of(src[q - 2], src[q - 1]), q);
                    }
                    pos += len;
                    last_was_match = 1;
                    matched = true;
                }
            }
            if !matched {
                rc.encode_bit(&mut models.flag[last_was_match], 0);
                let lit_ctx = if pos > 0 { (src[pos - 1] >> 6) as usize } else { 0 };
                rc.encode_tree(&mut models.literal[lit_ctx], 8, u32::from(src[pos]));
                pos += 1;
                last_was_match = 0;
            }
        }

        let payload = rc.finish();
        let produced = 4 + payload.len();
        if produced >= n || produced > dst.len() {
            return Ok(None);
        }
        dst[..4].copy_from_slice(&(n as u32).to_be_bytes());
        dst[4..produced].copy_from_slice(&payload);
        Ok(Some((n, produced)))
    }

    fn inverse(&mut self, src: &[u8], dst: &mut [u8]) -> Result<(usize, usize)> {
        if src.len() < 4 {
            return Err(CascadeError::invalid_bitstream("truncated header"));
        }
        let n = u32::from_be_bytes([src[0], src[1], src[2], src[3]]) as usize;
        if n > dst.len() {
            return Err(CascadeError::invalid_bitstream(
                "declared length exceeds block size",
            ));
        }

        let mut table = PositionTable::new();
        let mut models = RolzXModels::new();
        let mut rc = BitDecoder::new(&src[4..])?;
        let mut last_was_match = 0usize;
        let mut out = 0usize;

        while out < n {
            if out >= 2 {
                let ctx = context_of(dst[out - 2], dst[out - 1]);
                if rc.decode_bit(&mut models.flag[last_was_match]) == 1 {
                    let rank = rc.decode_tree(&mut models.rank, 5) as usize;
                    let len = rc.decode_tree(&mut models.length, 8) as usize + MIN_MATCH;
                    let candidate = table.lookup(ctx, rank).ok_or_else(|| {
                        CascadeError::invalid_bitstream(format!("empty match rank {rank}"))
                    })?;
                    if candidate >= out || out + len > n {
                        return Err(CascadeError::invalid_bitstream("match out of bounds"));
                    }
                    table.insert(ctx, out);
                    for k in 0..len {
                        let q = out + k;
                        if k > 0 {
                            table.insert(context_of(dst[q - 2], dst[q - 1]), q);
                        }
                        dst[q] = dst[candidate + k];
                    }
                    out += len;
                    last_was_match = 1;
                    continue;
                }
                table.insert(ctx, out);
            } else if rc.decode_bit(&mut models.flag[last_was_match]) == 1 {
                return Err(CascadeError::invalid_bitstream("match before any context"));
            }
            let lit_ctx = if out > 0 { (dst[out - 1] >> 6) as usize } else { 0 };
            dst[out] = rc.decode_tree(&mut models.literal[lit_ctx], 8) as u8;
            out += 1;
            last_was_match = 0;
        }
        Ok((src.len(), n))
    }

    fn max_encoded_len(&self, src_len: usize) -> usize {
        src_len + src_len / 8 + 16
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    fn forward<T: Transform + Default>(src: &[u8]) -> Option<Vec<u8>> {
        let mut t = T::default();
        let mut dst = vec![0u8; t.max_encoded_len(src.len())];
        t.forward(src, &mut dst).unwrap().map(|(_, produced)| {
            dst.truncate(produced);
            dst
        })
    }

    fn inverse<T: Transform + Default>(src: &[u8], original_len: usize) -> Vec<u8> {
        let mut t = T::default();
        let mut dst = vec![0u8; original_len];
        let (_, produced) = t.inverse(src, &mut dst).unwrap();
        dst.truncate(produced);
        dst
    }

    #[test]
    fn test_rolz_refuses_tiny_and_random() {
        assert!(forward::<Rolz>(b"too small").is_none());
        let mut rng = ChaCha8Rng::seed_from_u64(83);
        let noise: Vec<u8> = (0..8192).map(|_| rng.r#gen()).collect();
        assert!(forward::<Rolz>(&noise).is_none());
    }

    #[test]
    fn test_rolz_roundtrip_text() {
        let src = b"reduced offset matching, reduced offset matching, again and again. "
            .repeat(60);
        let encoded = forward::<Rolz>(&src).unwrap();
        assert!(encoded.len() < src.len());
        assert_eq!(inverse::<Rolz>(&encoded, src.len()), src);
    }

    #[test]
    fn test_rolz_roundtrip_structured() {
        let mut rng = ChaCha8Rng::seed_from_u64(89);
        let mut src = Vec::new();
        let words: Vec<Vec<u8>> = (0..16)
            .map(|_| (0..rng.gen_range(3..12)).map(|_| rng.gen_range(b'a'..=b'f')).collect())
            .collect();
        for _ in 0..600 {
            src.extend_from_slice(&words[rng.gen_range(0..words.len())]);
            src.push(b' ');
        }
        let encoded = forward::<Rolz>(&src).unwrap();
        assert_eq!(inverse::<Rolz>(&encoded, src.len()), src);
    }

    #[test]
    fn test_rolzx_roundtrip_text() {
        let src = b"range coded literals compress the residue further. ".repeat(80);
        let encoded = forward::<RolzX>(&src).unwrap();
        assert!(encoded.len() < src.len() / 2);
        assert_eq!(inverse::<RolzX>(&encoded, src.len()), src);
    }

    #[test]
    fn test_rolzx_beats_rolz_on_skewed_literals() {
        let mut rng = ChaCha8Rng::seed_from_u64(97);
        let src: Vec<u8> = (0..20_000)
            .map(|_| if rng.gen_range(0..10) < 8 { b'e' } else { rng.gen_range(b'a'..=b'z') })
            .collect();
        let x = forward::<RolzX>(&src).unwrap();
        assert_eq!(inverse::<RolzX>(&x, src.len()), src);
        if let Some(plain) = forward::<Rolz>(&src) {
            assert!(x.len() < plain.len());
        }
    }

    #[test]
    fn test_rolz_long_runs() {
        let mut src = b"prefix ".to_vec();
        src.extend(std::iter::repeat(b'z').take(4000));
        src.extend_from_slice(b" suffix");
        let encoded = forward::<Rolz>(&src).unwrap();
        assert_eq!(inverse::<Rolz>(&encoded, src.len()), src);
    }
}
