//! Move-to-front transform.
//!
//! Each byte is replaced by its position in a recency list, and the byte
//! moves to the front of the list. Runs of equal bytes become runs of
//! zeros, which is what makes the transform effective right after a BWT.

use crate::Transform;
use cascade_core::error::{CascadeError, Result};

/// Move-to-front transform.
#[derive(Debug, Default)]
pub struct Mtft;

impl Mtft {
    /// Create a transform instance.
    pub fn new() -> Self {
        Self
    }
}

impl Transform for Mtft {
    fn forward(&mut self, src: &[u8], dst: &mut [u8]) -> Result<Option<(usize, usize)>> {
        let mut list = [0u8; 256];
        for (i, slot) in list.iter_mut().enumerate() {
            *slot = i as u8;
        }
        for (i, &byte) in src.iter().enumerate() {
            let mut pos = 0usize;
            while list[pos] != byte {
                pos += 1;
            }
            dst[i] = pos as u8;
            if pos > 0 {
                list.copy_within(0..pos, 1);
                list[0] = byte;
            }
        }
        Ok(Some((src.len(), src.len())))
    }

    fn inverse(&mut self, src: &[u8], dst: &mut [u8]) -> Result<(usize, usize)> {
        if src.len() > dst.len() {
            return Err(CascadeError::invalid_bitstream(
                "move-to-front output exceeds block size",
            ));
        }
        let mut list = [0u8; 256];
        for (i, slot) in list.iter_mut().enumerate() {
            *slot = i as u8;
        }
        for (i, &rank) in src.iter().enumerate() {
            let pos = rank as usize;
            let byte = list[pos];
            dst[i] = byte;
            if pos > 0 {
                list.copy_within(0..pos, 1);
                list[0] = byte;
            }
        }
        Ok((src.len(), src.len()))
    }

    fn max_encoded_len(&self, src_len: usize) -> usize {
        src_len
    }
}
