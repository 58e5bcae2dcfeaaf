//! Alphabet and frequency codec shared by the frequency-table entropy
//! coders (ANS, range).
//!
//! The encoder normalizes raw symbol counts to a power-of-two sum, then
//! transmits the alphabet (bitmap or delta-coded list) and the scaled
//! frequencies. The first symbol's frequency is never transmitted; the
//! decoder infers it from the scale.

use crate::golomb::{read_exp_golomb, write_exp_golomb};
use cascade_core::bitstream::{BitReader, BitWriter};
use cascade_core::error::{CascadeError, Result};
use std::io::{Read, Write};

/// Smallest accepted normalization scale log.
pub const MIN_LOG_RANGE: u32 = 8;

/// Largest accepted normalization scale log.
pub const MAX_LOG_RANGE: u32 = 16;

/// Normalize `freqs` in place so that present symbols sum to `scale`.
///
/// Returns the present symbols in ascending order. Symbols with a raw count
/// of zero stay zero; every other symbol keeps a frequency of at least 1.
/// The rounding error is repaired by repeatedly adjusting the largest
/// bucket, ties broken toward the smallest symbol index, so the result is
/// deterministic.
pub fn normalize_frequencies(freqs: &mut [u32; 256], total: u32, scale: u32) -> Result<Vec<u8>> {
    if !(256..=1 << MAX_LOG_RANGE).contains(&scale) {
        return Err(CascadeError::invalid_argument(format!(
            "normalization scale {scale} out of range [256..65536]"
        )));
    }
    let alphabet: Vec<u8> = (0u32..256)
        .filter(|&s| freqs[s as usize] > 0)
        .map(|s| s as u8)
        .collect();
    if alphabet.is_empty() {
        return Ok(alphabet);
    }
    if alphabet.len() == 1 {
        freqs[alphabet[0] as usize] = scale;
        return Ok(alphabet);
    }

    let mut sum = 0u32;
    for &s in &alphabet {
        let f = freqs[s as usize];
        let scaled = ((u64::from(f) * u64::from(scale) + u64::from(total) / 2)
            / u64::from(total)) as u32;
        let scaled = scaled.max(1);
        freqs[s as usize] = scaled;
        sum += scaled;
    }

    while sum != scale {
        let mut largest = alphabet[0] as usize;
        for &s in &alphabet[1..] {
            if freqs[s as usize] > freqs[largest] {
                largest = s as usize;
            }
        }
        if sum < scale {
            freqs[largest] += 1;
            sum += 1;
        } else {
            // The largest bucket exceeds 1 whenever the sum exceeds the
            // scale, because the alphabet holds at most 256 symbols.
            freqs[largest] -= 1;
            sum -= 1;
        }
    }
    Ok(alphabet)
}

/// Encode the alphabet: a "full" tag, or a bitmap/list representation.
pub fn encode_alphabet<W: Write>(bs: &mut BitWriter<W>, alphabet: &[u8]) -> Result<()> {
    if alphabet.len() == 256 {
        return bs.write_bit(true);
    }
    bs.write_bit(false)?;

    // List representation wins for sparse alphabets.
    if alphabet.len() < 32 {
        bs.write_bit(true)?;
        bs.write_bits(alphabet.len() as u64, 8)?;
        let mut previous = 0u32;
        for (i, &s) in alphabet.iter().enumerate() {
            let gap = if i == 0 {
                u32::from(s)
            } else {
                u32::from(s) - previous - 1
            };
            write_exp_golomb(bs, gap)?;
            previous = u32::from(s);
        }
    } else {
        bs.write_bit(false)?;
        let mut bitmap = [false; 256];
        for &s in alphabet {
            bitmap[s as usize] = true;
        }
        for present in bitmap {
            bs.write_bit(present)?;
        }
    }
    Ok(())
}

/// Decode an alphabet written by [`encode_alphabet`], ascending order.
pub fn decode_alphabet<R: Read>(bs: &mut BitReader<R>) -> Result<Vec<u8>> {
    if bs.read_bit()? {
        return Ok((0u32..256).map(|s| s as u8).collect());
    }
    if bs.read_bit()? {
        let size = bs.read_bits(8)? as usize;
        let mut alphabet = Vec::with_capacity(size);
        let mut previous = 0u32;
        for i in 0..size {
            let gap = read_exp_golomb(bs)?;
            let symbol = if i == 0 { gap } else { previous + 1 + gap };
            if symbol > 255 {
                return Err(CascadeError::invalid_bitstream(
                    "alphabet symbol out of range",
                ));
            }
            alphabet.push(symbol as u8);
            previous = symbol;
        }
        Ok(alphabet)
    } else {
        let mut alphabet = Vec::new();
        for s in 0u32..256 {
            if bs.read_bit()? {
                alphabet.push(s as u8);
            }
        }
        Ok(alphabet)
    }
}

/// Transmit the normalized frequencies of `alphabet` (ascending order).
///
/// Writes `log_range - 8` in 3 bits, then the frequencies of every symbol
/// except the first, grouped in chunks of 8 or 16 symbols with a shared
/// 4-bit width field.
pub fn encode_frequencies<W: Write>(
    bs: &mut BitWriter<W>,
    freqs: &[u32; 256],
    alphabet: &[u8],
    log_range: u32,
) -> Result<()> {
    if !(MIN_LOG_RANGE..=MAX_LOG_RANGE).contains(&log_range) {
        return Err(CascadeError::invalid_argument(format!(
            "log range {log_range} out of range [8..16]"
        )));
    }
    bs.write_bits(u64::from(log_range - MIN_LOG_RANGE), 3)?;

    let inc = if alphabet.len() > 64 { 16 } else { 8 };
    let mut i = 1;
    while i < alphabet.len() {
        let end = (i + inc).min(alphabet.len());
        let max_freq = alphabet[i..end]
            .iter()
            .map(|&s| freqs[s as usize])
            .max()
            .unwrap_or(1)
            .max(1);
        let width = 32 - max_freq.leading_zeros();
        bs.write_bits(u64::from(width - 1), 4)?;
        for &s in &alphabet[i..end] {
            bs.write_bits(u64::from(freqs[s as usize]), width)?;
        }
        i = end;
    }
    Ok(())
}

/// Read frequencies written by [`encode_frequencies`].
///
/// Returns `(log_range, freqs)`. The first symbol's frequency is inferred
/// as `scale - sum(others)`; an inferred value that is non-positive, or
/// equal to or above the scale while other symbols exist, fails with
/// `InvalidBitstream`.
pub fn decode_frequencies<R: Read>(
    bs: &mut BitReader<R>,
    alphabet: &[u8],
) -> Result<(u32, [u32; 256])> {
    let log_range = bs.read_bits(3)? as u32 + MIN_LOG_RANGE;
    let scale = 1u32 << log_range;
    let mut freqs = [0u32; 256];

    if alphabet.is_empty() {
        return Ok((log_range, freqs));
    }

    let inc = if alphabet.len() > 64 { 16 } else { 8 };
    let mut sum = 0u64;
    let mut i = 1;
    while i < alphabet.len() {
        let end = (i + inc).min(alphabet.len());
        let width = bs.read_bits(4)? as u32 + 1;
        for &s in &alphabet[i..end] {
            let f = bs.read_bits(width)? as u32;
            if f == 0 || f >= scale {
                return Err(CascadeError::invalid_bitstream(format!(
                    "frequency {f} of symbol {s} out of range"
                )));
            }
            freqs[s as usize] = f;
            sum += u64::from(f);
        }
        i = end;
    }

    let first = i64::from(scale) - sum as i64;
    if first <= 0 || (first >= i64::from(scale) && alphabet.len() > 1) {
        return Err(CascadeError::invalid_bitstream(format!(
            "inferred frequency {first} of symbol {} out of range",
            alphabet[0]
        )));
    }
    freqs[alphabet[0] as usize] = first as u32;
    Ok((log_range, freqs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_normalize_sums_to_scale() {
        let mut freqs = [0u32; 256];
        freqs[b'a' as usize] = 7;
        freqs[b'b' as usize] = 3;
        freqs[b'z' as usize] = 1;
        let alphabet = normalize_frequencies(&mut freqs, 11, 1 << 12).unwrap();
        assert_eq!(alphabet, vec![b'a', b'b', b'z']);
        let sum: u32 = alphabet.iter().map(|&s| freqs[s as usize]).sum();
        assert_eq!(sum, 1 << 12);
        assert!(freqs[b'z' as usize] >= 1);
    }

    #[test]
    fn test_normalize_single_symbol() {
        let mut freqs = [0u32; 256];
        freqs[0] = 1234;
        let alphabet = normalize_frequencies(&mut freqs, 1234, 256).unwrap();
        assert_eq!(alphabet, vec![0]);
        assert_eq!(freqs[0], 256);
    }

    #[test]
    fn test_normalize_keeps_rare_symbols() {
        // One dominant symbol must not squeeze rare symbols to zero.
        let mut freqs = [0u32; 256];
        freqs[0] = 1_000_000;
        for s in 1..=255usize {
            freqs[s] = 1;
        }
        let total = 1_000_000 + 255;
        let alphabet = normalize_frequencies(&mut freqs, total, 1 << 10).unwrap();
        assert_eq!(alphabet.len(), 256);
        let sum: u32 = freqs.iter().sum();
        assert_eq!(sum, 1 << 10);
        assert!(freqs.iter().all(|&f| f >= 1));
    }

    #[test]
    fn test_alphabet_roundtrip() {
        let cases: Vec<Vec<u8>> = vec![
            (0u32..256).map(|s| s as u8).collect(), // full
            vec![0],
            vec![5, 9, 200, 255],                  // sparse list
            (0u32..100).map(|s| s as u8).collect(), // bitmap
            Vec::new(),
        ];
        for alphabet in cases {
            let mut out = Vec::new();
            let mut writer = BitWriter::new(&mut out);
            encode_alphabet(&mut writer, &alphabet).unwrap();
            writer.close().unwrap();
            let mut reader = BitReader::new(Cursor::new(&out));
            assert_eq!(decode_alphabet(&mut reader).unwrap(), alphabet);
        }
    }

    #[test]
    fn test_frequency_roundtrip() {
        let mut freqs = [0u32; 256];
        for s in 0..256usize {
            freqs[s] = (s as u32 % 17) + 1;
        }
        let total: u32 = freqs.iter().sum();
        let alphabet = normalize_frequencies(&mut freqs, total, 1 << 12).unwrap();

        let mut out = Vec::new();
        let mut writer = BitWriter::new(&mut out);
        encode_alphabet(&mut writer, &alphabet).unwrap();
        encode_frequencies(&mut writer, &freqs, &alphabet, 12).unwrap();
        writer.close().unwrap();

        let mut reader = BitReader::new(Cursor::new(&out));
        let back_alphabet = decode_alphabet(&mut reader).unwrap();
        assert_eq!(back_alphabet, alphabet);
        let (log_range, back) = decode_frequencies(&mut reader, &back_alphabet).unwrap();
        assert_eq!(log_range, 12);
        assert_eq!(back, freqs);
    }

    #[test]
    fn test_inferred_frequency_rejected() {
        // Frequencies of symbols 1..=255 sum to the full scale, forcing the
        // inferred frequency of symbol 0 to zero.
        let alphabet: Vec<u8> = (0u32..256).map(|s| s as u8).collect();
        let mut freqs = [8u32; 256];
        freqs[1] = 16; // sum of others = 254*8 + 16 = 2048 = scale at log 11
        let mut out = Vec::new();
        let mut writer = BitWriter::new(&mut out);
        encode_frequencies(&mut writer, &freqs, &alphabet, 11).unwrap();
        writer.close().unwrap();

        let mut reader = BitReader::new(Cursor::new(&out));
        let err = decode_frequencies(&mut reader, &alphabet).unwrap_err();
        assert!(matches!(err, CascadeError::InvalidBitstream { .. }));
    }
}
