//! Sorted rank transform.
//!
//! Symbols are ranked by descending frequency (ties toward the smaller byte
//! value) and every input byte is replaced by its rank, concentrating
//! frequent symbols in low ranks. A small header carries the rank-to-symbol
//! mapping.

use crate::Transform;
use cascade_core::error::{CascadeError, Result};
use cascade_core::math::histogram_order0;

/// Sorted rank transform.
#[derive(Debug, Default)]
pub struct Srt;

impl Srt {
    /// Create a transform instance.
    pub fn new() -> Self {
        Self
    }
}

impl Transform for Srt {
    fn forward(&mut self, src: &[u8], dst: &mut [u8]) -> Result<Option<(usize, usize)>> {
        if src.is_empty() {
            return Ok(Some((0, 0)));
        }
        let freqs = histogram_order0(src);
        let mut symbols: Vec<u8> = (0u32..256)
            .filter(|&s| freqs[s as usize] > 0)
            .map(|s| s as u8)
            .collect();
        symbols.sort_by_key(|&s| (std::cmp::Reverse(freqs[s as usize]), s));

        let mut rank_of = [0u8; 256];
        for (rank, &s) in symbols.iter().enumerate() {
            rank_of[s as usize] = rank as u8;
        }

        let header = 1 + symbols.len();
        dst[0] = (symbols.len() - 1) as u8;
        dst[1..header].copy_from_slice(&symbols);
        for (i, &b) in src.iter().enumerate() {
            dst[header + i] = rank_of[b as usize];
        }
        Ok(Some((src.len(), header + src.len())))
    }

    fn inverse(&mut self, src: &[u8], dst: &mut [u8]) -> Result<(usize, usize)> {
        if src.is_empty() {
            return Ok((0, 0));
        }
        let count = src[0] as usize + 1;
        if src.len() < 1 + count {
            return Err(CascadeError::invalid_bitstream("truncated rank header"));
        }
        let symbols = &src[1..1 + count];
        let payload = &src[1 + count..];
        if payload.len() > dst.len() {
            return Err(CascadeError::invalid_bitstream(
                "rank payload exceeds block size",
            ));
        }
        for (i, &rank) in payload.iter().enumerate() {
            if rank as usize >= count {
                return Err(CascadeError::invalid_bitstream(format!(
                    "rank {rank} outside alphabet of {count}"
                )));
            }
            dst[i] = symbols[rank as usize];
        }
        Ok((src.len(), payload.len()))
    }

    fn max_encoded_len(&self, src_len: usize) -> usize {
        src_len + 257
    }
}
