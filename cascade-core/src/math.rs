//! Shared math utilities: integer logarithms, the squash/stretch pair used
//! by the binary predictors, and byte histograms with a first-order entropy
//! estimate.
//!
//! The squash/stretch tables are computed once and shared immutably across
//! threads.

use crate::error::{CascadeError, Result};
use std::sync::OnceLock;

/// Floor of log2(x). Fails on 0.
pub fn log2(x: u32) -> Result<u32> {
    if x == 0 {
        return Err(CascadeError::invalid_argument("log2 of zero"));
    }
    Ok(31 - x.leading_zeros())
}

/// log2(x) in 10-bit fixed point (result is `floor(1024 * log2(x))` up to
/// rounding of the fractional expansion). Fails on 0.
pub fn log2_1024(x: u32) -> Result<u32> {
    if x == 0 {
        return Err(CascadeError::invalid_argument("log2 of zero"));
    }
    let integer = 31 - x.leading_zeros();
    // Mantissa in [1, 2) as Q16, fractional bits by iterated squaring.
    let mut m = (u64::from(x) << 16) >> integer;
    let mut frac = 0u32;
    for _ in 0..10 {
        m = (m * m) >> 16;
        frac <<= 1;
        if m >= 0x2_0000 {
            frac |= 1;
            m >>= 1;
        }
    }
    Ok(integer * 1024 + frac)
}

fn prediction_tables() -> &'static (Vec<i32>, Vec<i32>) {
    static TABLES: OnceLock<(Vec<i32>, Vec<i32>)> = OnceLock::new();
    TABLES.get_or_init(|| {
        let mut squash_tab = vec![0i32; 4095];
        for d in -2047i32..=2047 {
            let w = 4096.0 / (1.0 + (-f64::from(d) / 256.0).exp());
            squash_tab[(d + 2047) as usize] = (w.round() as i32).clamp(0, 4095);
        }
        let mut stretch_tab = vec![0i32; 4096];
        let mut p = 0usize;
        for d in -2047i32..=2047 {
            let s = squash_tab[(d + 2047) as usize];
            while p as i32 <= s {
                stretch_tab[p] = d;
                p += 1;
            }
        }
        while p < 4096 {
            stretch_tab[p] = 2047;
            p += 1;
        }
        (squash_tab, stretch_tab)
    })
}

/// Logistic squash: maps a stretched value `d` to a 12-bit probability,
/// `squash(d) = 4096 / (1 + e^(-d/256))`, clamped to `[0, 4095]`.
#[inline]
pub fn squash(d: i32) -> i32 {
    if d >= 2047 {
        return 4095;
    }
    if d <= -2047 {
        return 0;
    }
    prediction_tables().0[(d + 2047) as usize]
}

/// Tabulated inverse of [`squash`] over 12-bit probabilities.
#[inline]
pub fn stretch(p: i32) -> i32 {
    prediction_tables().1[(p & 0xFFF) as usize]
}

/// Order-0 byte histogram.
pub fn histogram_order0(block: &[u8]) -> [u32; 256] {
    let mut freqs = [0u32; 256];
    for &byte in block {
        freqs[byte as usize] += 1;
    }
    freqs
}

/// Order-1 byte histogram: `freqs[previous][current]`. The first byte is
/// counted under context 0.
pub fn histogram_order1(block: &[u8]) -> Vec<[u32; 256]> {
    let mut freqs = vec![[0u32; 256]; 256];
    let mut prev = 0usize;
    for &byte in block {
        freqs[prev][byte as usize] += 1;
        prev = byte as usize;
    }
    freqs
}

/// First-order entropy estimate in 10-bit fixed point bits per symbol
/// (`0..=8192`), from a histogram whose counts sum to `length`.
pub fn first_order_entropy_1024(length: usize, freqs: &[u32; 256]) -> u32 {
    if length == 0 {
        return 0;
    }
    let log_total = log2_1024(length as u32).unwrap_or(0);
    let mut sum = 0u64;
    for &f in freqs.iter() {
        if f == 0 {
            continue;
        }
        let log_f = log2_1024(f).unwrap_or(0);
        sum += u64::from(f) * u64::from(log_total - log_f);
    }
    (sum / length as u64) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log2_powers_of_two() {
        assert_eq!(log2(1).unwrap(), 0);
        assert_eq!(log2(2).unwrap(), 1);
        assert_eq!(log2(255).unwrap(), 7);
        assert_eq!(log2(256).unwrap(), 8);
        assert_eq!(log2(1 << 30).unwrap(), 30);
        assert!(log2(0).is_err());
    }

    #[test]
    fn test_log2_1024_fixed_point() {
        assert_eq!(log2_1024(1).unwrap(), 0);
        assert_eq!(log2_1024(2).unwrap(), 1024);
        assert_eq!(log2_1024(1 << 20).unwrap(), 20 * 1024);
        // log2(3) = 1.58496...; 10-bit fixed point ~ 1623
        let l3 = log2_1024(3).unwrap();
        assert!((1622..=1624).contains(&l3), "log2_1024(3) = {l3}");
    }

    #[test]
    fn test_squash_range_and_monotonic() {
        assert_eq!(squash(-4000), 0);
        assert_eq!(squash(4000), 4095);
        let mid = squash(0);
        assert!((2047..=2049).contains(&mid), "squash(0) = {mid}");
        let mut prev = squash(-2047);
        for d in (-2046..=2047).step_by(13) {
            let s = squash(d);
            assert!(s >= prev);
            prev = s;
        }
    }

    #[test]
    fn test_stretch_inverts_squash() {
        for d in (-2000i32..=2000).step_by(97) {
            let p = squash(d);
            let back = stretch(p);
            assert!((back - d).abs() <= 32, "stretch(squash({d})) = {back}");
        }
    }

    #[test]
    fn test_entropy_constant_block() {
        let block = vec![42u8; 1000];
        let freqs = histogram_order0(&block);
        assert_eq!(first_order_entropy_1024(block.len(), &freqs), 0);
    }

    #[test]
    fn test_entropy_uniform_block() {
        let block: Vec<u8> = (0..=255u8).cycle().take(256 * 16).collect();
        let freqs = histogram_order0(&block);
        let e = first_order_entropy_1024(block.len(), &freqs);
        assert!((8 * 1024 - 16..=8 * 1024).contains(&e), "entropy = {e}");
    }

    #[test]
    fn test_order1_histogram() {
        let freqs = histogram_order1(b"abab");
        assert_eq!(freqs[0][b'a' as usize], 1);
        assert_eq!(freqs[b'a' as usize][b'b' as usize], 2);
        assert_eq!(freqs[b'b' as usize][b'a' as usize], 1);
    }
}
