//! Burrows-Wheeler transform.
//!
//! The forward pass sorts suffixes with SA-IS and emits the last column of
//! the conceptual rotation matrix of `input + guard`, where the guard is a
//! virtual smallest sentinel: the guard's row position (the primary index)
//! is carried in a small in-band header instead of a stored byte. The
//! inverse rebuilds the text right to left through the LF mapping in O(n)
//! with a 256-bucket histogram.

use crate::Transform;
use crate::sais::suffix_array;
use cascade_core::error::{CascadeError, Result};
use cascade_core::math::histogram_order0;

/// Largest block the transform accepts.
pub const MAX_BLOCK_SIZE: usize = 1 << 30;

/// Burrows-Wheeler transform.
#[derive(Debug, Default)]
pub struct Bwt;

impl Bwt {
    /// Create a transform instance.
    pub fn new() -> Self {
        Self
    }
}

fn index_bytes(n: usize) -> usize {
    match n {
        0..=0xFF => 1,
        0x100..=0xFFFF => 2,
        0x1_0000..=0xFF_FFFF => 3,
        _ => 4,
    }
}

impl Transform for Bwt {
    fn forward(&mut self, src: &[u8], dst: &mut [u8]) -> Result<Option<(usize, usize)>> {
        let n = src.len();
        if n > MAX_BLOCK_SIZE {
            return Err(CascadeError::invalid_argument(format!(
                "block of {n} bytes exceeds the transform limit"
            )));
        }
        let nb = index_bytes(n);
        let header = 1 + nb;
        if n <= 1 {
            dst[0] = nb as u8;
            dst[1..header].fill(0);
            dst[header..header + n].copy_from_slice(src);
            return Ok(Some((n, header + n)));
        }

        let sa = suffix_array(src);
        let payload = &mut dst[header..header + n];
        payload[0] = src[n - 1];
        let mut primary_index = 0usize;
        for (i, &p) in sa.iter().enumerate() {
            if p == 0 {
                primary_index = i + 1;
            } else {
                let slot = if primary_index == 0 { i + 1 } else { i };
                payload[slot] = src[p as usize - 1];
            }
        }

        dst[0] = nb as u8;
        for k in 0..nb {
            dst[1 + k] = (primary_index >> (8 * (nb - 1 - k))) as u8;
        }
        Ok(Some((n, header + n)))
    }

    fn inverse(&mut self, src: &[u8], dst: &mut [u8]) -> Result<(usize, usize)> {
        if src.is_empty() {
            return Err(CascadeError::invalid_bitstream("empty BWT payload"));
        }
        let nb = src[0] as usize;
        if !(1..=4).contains(&nb) || src.len() < 1 + nb {
            return Err(CascadeError::invalid_bitstream("bad BWT header"));
        }
        let mut primary_index = 0usize;
        for k in 0..nb {
            primary_index = (primary_index << 8) | src[1 + k] as usize;
        }
        let payload = &src[1 + nb..];
        let n = payload.len();
        if n > dst.len() {
            return Err(CascadeError::invalid_bitstream(
                "BWT output exceeds block size",
            ));
        }
        if n <= 1 {
            dst[..n].copy_from_slice(payload);
            return Ok((src.len(), n));
        }
        if primary_index == 0 || primary_index > n {
            return Err(CascadeError::invalid_bitstream(format!(
                "primary index {primary_index} out of range"
            )));
        }

        // First-column starts; slot 0 belongs to the virtual guard.
        let counts = histogram_order0(payload);
        let mut starts = [0u32; 256];
        let mut sum = 1u32;
        for c in 0..256 {
            starts[c] = sum;
            sum += counts[c];
        }

        // LF over payload positions; a row at or past the primary index is
        // one ahead of its payload slot.
        let mut lf = vec![0u32; n];
        let mut seen = [0u32; 256];
        for (j, &c) in payload.iter().enumerate() {
            lf[j] = starts[c as usize] + seen[c as usize];
            seen[c as usize] += 1;
        }

        let mut j = 0usize;
        for k in (0..n).rev() {
            dst[k] = payload[j];
            let row = lf[j] as usize;
            if k > 0 {
                j = if row < primary_index { row } else { row - 1 };
            }
        }
        Ok((src.len(), n))
    }

    fn max_encoded_len(&self, src_len: usize) -> usize {
        src_len + 5
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    fn forward(src: &[u8]) -> (Vec<u8>, usize) {
        let mut bwt = Bwt::new();
        let mut dst = vec![0u8; bwt.max_encoded_len(src.len())];
        let (_, produced) = bwt.forward(src, &mut dst).unwrap().unwrap();
        dst.truncate(produced);
        let nb = dst[0] as usize;
        let mut pidx = 0usize;
        for k in 0..nb {
            pidx = (pidx << 8) | dst[1 + k] as usize;
        }
        (dst, pidx)
    }

    fn inverse(encoded: &[u8], original_len: usize) -> Vec<u8> {
        let mut bwt = Bwt::new();
        let mut dst = vec![0u8; original_len.max(1)];
        let (_, produced) = bwt.inverse(encoded, &mut dst).unwrap();
        dst.truncate(produced);
        dst
    }

    fn roundtrip(src: &[u8]) {
        let (encoded, _) = forward(src);
        assert_eq!(inverse(&encoded, src.len()), src);
    }

    #[test]
    fn test_mississippi_last_column() {
        let (encoded, pidx) = forward(b"mississippi");
        // Last column of the guard-terminated rotation matrix, guard row
        // elided; the guard would sit at the primary index.
        assert_eq!(&encoded[2..], b"ipssmpissii");
        assert_eq!(pidx, 5);
    }

    #[test]
    fn test_roundtrip_classics() {
        roundtrip(b"");
        roundtrip(b"a");
        roundtrip(b"ab");
        roundtrip(b"banana");
        roundtrip(b"mississippi");
        roundtrip(b"abracadabra abracadabra");
        roundtrip(&[0u8; 300]);
    }

    #[test]
    fn test_roundtrip_random() {
        let mut rng = ChaCha8Rng::seed_from_u64(67);
        for len in [2usize, 255, 256, 257, 5000, 70_000] {
            let data: Vec<u8> = (0..len).map(|_| rng.r#gen()).collect();
            roundtrip(&data);
        }
    }

    #[test]
    fn test_roundtrip_low_entropy() {
        let mut rng = ChaCha8Rng::seed_from_u64(71);
        let data: Vec<u8> = (0..30_000).map(|_| rng.gen_range(b'a'..=b'd')).collect();
        roundtrip(&data);
    }

    #[test]
    fn test_bad_primary_index_rejected() {
        let mut src = forward(b"mississippi").0;
        src[1] = 200; // index beyond the payload
        let mut bwt = Bwt::new();
        let mut dst = vec![0u8; 64];
        assert!(bwt.inverse(&src, &mut dst).is_err());
    }
}
