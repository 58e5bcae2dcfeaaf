//! Bijective Burrows-Wheeler transform.
//!
//! The input is factored into Lyndon words (Duval's algorithm) and all
//! rotations of all factors are sorted as infinite periodic words; the last
//! characters form the output. No primary index is needed: the inverse LF
//! permutation decomposes into one cycle per factor, and the factors come
//! back in increasing lexicographic order, which is reverse factorization
//! order.
//!
//! Two periodic words that agree on `|u| + |v|` characters are equal
//! (Fine and Wilf), which bounds every rotation comparison.

use crate::Transform;
use cascade_core::error::{CascadeError, Result};
use cascade_core::math::histogram_order0;
use std::cmp::Ordering;

/// Bijective Burrows-Wheeler transform.
#[derive(Debug, Default)]
pub struct Bwts;

impl Bwts {
    /// Create a transform instance.
    pub fn new() -> Self {
        Self
    }
}

/// Duval's Lyndon factorization: returns factor start offsets plus a final
/// entry at `n`.
fn lyndon_factors(s: &[u8]) -> Vec<usize> {
    let n = s.len();
    let mut starts = Vec::new();
    let mut i = 0usize;
    while i < n {
        let mut j = i + 1;
        let mut k = i;
        while j < n && s[k] <= s[j] {
            if s[k] < s[j] {
                k = i;
            } else {
                k += 1;
            }
            j += 1;
        }
        while i <= k {
            starts.push(i);
            i += j - k;
        }
    }
    starts.push(n);
    starts
}

impl Transform for Bwts {
    fn forward(&mut self, src: &[u8], dst: &mut [u8]) -> Result<Option<(usize, usize)>> {
        let n = src.len();
        if n <= 1 {
            dst[..n].copy_from_slice(src);
            return Ok(Some((n, n)));
        }

        let starts = lyndon_factors(src);
        // Factor start/length per position.
        let mut factor_start = vec![0u32; n];
        let mut factor_len = vec![0u32; n];
        for w in starts.windows(2) {
            let (begin, end) = (w[0], w[1]);
            for i in begin..end {
                factor_start[i] = begin as u32;
                factor_len[i] = (end - begin) as u32;
            }
        }

        let char_at = |rot: usize, d: usize| -> u8 {
            let begin = factor_start[rot] as usize;
            let len = factor_len[rot] as usize;
            src[begin + (rot - begin + d) % len]
        };

        let mut order: Vec<u32> = (0..n as u32).collect();
        order.sort_unstable_by(|&a, &b| {
            let (a, b) = (a as usize, b as usize);
            let limit = (factor_len[a] + factor_len[b]) as usize;
            for d in 0..limit {
                match char_at(a, d).cmp(&char_at(b, d)) {
                    Ordering::Equal => continue,
                    other => return other,
                }
            }
            Ordering::Equal
        });

        for (i, &rot) in order.iter().enumerate() {
            let rot = rot as usize;
            let begin = factor_start[rot] as usize;
            dst[i] = if rot == begin {
                src[begin + factor_len[rot] as usize - 1]
            } else {
                src[rot - 1]
            };
        }
        Ok(Some((n, n)))
    }

    fn inverse(&mut self, src: &[u8], dst: &mut [u8]) -> Result<(usize, usize)> {
        let n = src.len();
        if n > dst.len() {
            return Err(CascadeError::invalid_bitstream(
                "bijective BWT output exceeds block size",
            ));
        }
        if n <= 1 {
            dst[..n].copy_from_slice(src);
            return Ok((n, n));
        }

        let counts = histogram_order0(src);
        let mut starts = [0u32; 256];
        let mut sum = 0u32;
        for c in 0..256 {
            starts[c] = sum;
            sum += counts[c];
        }
        let mut lf = vec![0u32; n];
        let mut seen = [0u32; 256];
        for (i, &c) in src.iter().enumerate() {
            lf[i] = starts[c as usize] + seen[c as usize];
            seen[c as usize] += 1;
        }

        // Each LF cycle is one Lyndon factor, written back to front; cycles
        // discovered in ascending order fill the output from the end.
        let mut visited = vec![false; n];
        let mut write = n;
        for i in 0..n {
            if visited[i] {
                continue;
            }
            let mut x = i;
            loop {
                visited[x] = true;
                write -= 1;
                dst[write] = src[x];
                x = lf[x] as usize;
                if x == i {
                    break;
                }
            }
        }
        Ok((n, n))
    }

    fn max_encoded_len(&self, src_len: usize) -> usize {
        src_len
    }
}
