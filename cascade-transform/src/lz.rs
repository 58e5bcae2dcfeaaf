//! LZ codec with the classic LZ4 block layout.
//!
//! Sequences of (token, literal run, offset, match run): the token packs a
//! 4-bit literal length and a 4-bit match length, both extended with
//! 255-bytes when saturated; offsets are 16-bit little-endian, so the
//! window is 64 KiB; matches are at least 4 bytes. The last 5 bytes are
//! always literals and no match may start within the final 12 bytes.

use crate::Transform;
use cascade_core::error::{CascadeError, Result};

const MIN_MATCH: usize = 4;
const MAX_OFFSET: usize = 65535;
const HASH_LOG: u32 = 13;
const LAST_LITERALS: usize = 5;
const MATCH_FIND_LIMIT: usize = 12;
const SKIP_TRIGGER: usize = 6;

#[inline]
fn hash(word: u32) -> usize {
    (word.wrapping_mul(2654435761) >> (32 - HASH_LOG)) as usize
}

#[inline]
fn read_u32(data: &[u8], pos: usize) -> u32 {
    u32::from_le_bytes([data[pos], data[pos + 1], data[pos + 2], data[pos + 3]])
}

/// LZ codec.
#[derive(Debug, Default)]
pub struct Lz;

impl Lz {
    /// Create a transform instance.
    pub fn new() -> Self {
        Self
    }
}

/// Emit one sequence; returns the new output index or `None` on overflow.
fn emit_sequence(
    dst: &mut [u8],
    mut out: usize,
    literals: &[u8],
    match_info: Option<(usize, usize)>,
) -> Option<usize> {
    let lit_len = literals.len();
    let lit_ext = if lit_len >= 15 { 1 + (lit_len - 15) / 255 } else { 0 };
    let match_bytes = match_info.map_or(0, |(_, len)| {
        let coded = len - MIN_MATCH;
        2 + if coded >= 15 { 1 + (coded - 15) / 255 } else { 0 }
    });
    let needed = 1 + lit_ext + lit_len + match_bytes;
    if out + needed > dst.len() {
        return None;
    }

    let token_pos = out;
    out += 1;
    let lit_nibble = if lit_len >= 15 {
        let mut rest = lit_len - 15;
        while rest >= 255 {
            dst[out] = 255;
            out += 1;
            rest -= 255;
        }
        dst[out] = rest as u8;
        out += 1;
        15
    } else {
        lit_len
    };
    dst[out..out + lit_len].copy_from_slice(literals);
    out += lit_len;

    let match_nibble = if let Some((offset, len)) = match_info {
        dst[out..out + 2].copy_from_slice(&(offset as u16).to_le_bytes());
        out += 2;
        let coded = len - MIN_MATCH;
        if coded >= 15 {
            let mut rest = coded - 15;
            while rest >= 255 {
                dst[out] = 255;
                out += 1;
                rest -= 255;
            }
            dst[out] = rest as u8;
            out += 1;
            15
        } else {
            coded
        }
    } else {
        0
    };

    dst[token_pos] = ((lit_nibble as u8) << 4) | match_nibble as u8;
    Some(out)
}

impl Transform for Lz {
    fn forward(&mut self, src: &[u8], dst: &mut [u8]) -> Result<Option<(usize, usize)>> {
        let len = src.len();
        if len < 16 {
            return Ok(None);
        }
        // Output capped just under the input so non-shrinking data bails.
        let budget = len - 1;
        let dst_len = budget.min(dst.len());
        let dst = &mut dst[..dst_len];

        let mut table = vec![0u32; 1 << HASH_LOG];
        let mut out = 0usize;
        let mut anchor = 0usize;
        let mut pos = 1usize;
        let match_limit = len - MATCH_FIND_LIMIT;
        let mut probes = 0usize;

        while pos < match_limit {
            let word = read_u32(src, pos);
            let h = hash(word);
            let candidate = table[h] as usize;
            table[h] = pos as u32;

            let valid = candidate != 0
                && candidate < pos
                && pos - candidate <= MAX_OFFSET
                && read_u32(src, candidate) == word;
            if !valid {
                // Accelerate over incompressible regions.
                probes += 1;
                pos += 1 + (probes >> SKIP_TRIGGER);
                continue;
            }
            probes = 0;

            let mut match_len = MIN_MATCH;
            let end = len - LAST_LITERALS;
            while pos + match_len < end && src[candidate + match_len] == src[pos + match_len] {
                match_len += 1;
            }

            match emit_sequence(dst, out, &src[anchor..pos], Some((pos - candidate, match_len)))
            {
                Some(new_out) => out = new_out,
                None => return Ok(None),
            }
            pos += match_len;
            anchor = pos;
        }

        match emit_sequence(dst, out, &src[anchor..], None) {
            Some(new_out) => out = new_out,
            None => return Ok(None),
        }
        Ok(Some((len, out)))
    }

    fn inverse(&mut self, src: &[u8], dst: &mut [u8]) -> Result<(usize, usize)> {
        let mut i = 0usize;
        let mut out = 0usize;

        while i < src.len() {
            let token = src[i];
            i += 1;

            let mut lit_len = (token >> 4) as usize;
            if lit_len == 15 {
                loop {
                    let b = *src.get(i).ok_or_else(|| {
                        CascadeError::invalid_bitstream("truncated literal length")
                    })?;
                    i += 1;
                    lit_len += b as usize;
                    if b < 255 {
                        break;
                    }
                }
            }
            if i + lit_len > src.len() || out + lit_len > dst.len() {
                return Err(CascadeError::invalid_bitstream("literal run out of bounds"));
            }
            dst[out..out + lit_len].copy_from_slice(&src[i..i + lit_len]);
            i += lit_len;
            out += lit_len;

            if i == src.len() {
                // Final sequence carries no match.
                break;
            }

            if i + 2 > src.len() {
                return Err(CascadeError::invalid_bitstream("truncated match offset"));
            }
            let offset = u16::from_le_bytes([src[i], src[i + 1]]) as usize;
            i += 2;
            if offset == 0 || offset > out {
                return Err(CascadeError::invalid_bitstream(format!(
                    "match offset {offset} outside window"
                )));
            }

            let mut match_len = (token & 0x0F) as usize + MIN_MATCH;
            if token & 0x0F == 15 {
                loop {
                    let b = *src.get(i).ok_or_else(|| {
                        CascadeError::invalid_bitstream("truncated match length")
                    })?;
                    i += 1;
                    match_len += b as usize;
                    if b < 255 {
                        break;
                    }
                }
            }
            if out + match_len > dst.len() {
                return Err(CascadeError::invalid_bitstream("match run out of bounds"));
            }
            // Overlapping copies are legal; copy bytewise.
            for k in 0..match_len {
                dst[out + k] = dst[out + k - offset];
            }
            out += match_len;
        }
        Ok((src.len(), out))
    }

    fn max_encoded_len(&self, src_len: usize) -> usize {
        src_len + src_len / 255 + 16
    }
}
