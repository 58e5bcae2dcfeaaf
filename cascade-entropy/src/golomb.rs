//! Exponential-Golomb and Rice-Golomb universal codes.
//!
//! Both coders target small integers. The Exp-Golomb primitives are also
//! reused by the alphabet codec (symbol gaps) and the Huffman length
//! transmission (signed length deltas).

use crate::{EntropyDecoder, EntropyEncoder};
use cascade_core::bitstream::{BitReader, BitWriter};
use cascade_core::error::{CascadeError, Result};
use std::io::{Read, Write};

/// Write an unsigned Exp-Golomb code: `len-1` zero bits followed by the
/// `len`-bit value `v + 1`.
pub fn write_exp_golomb<W: Write>(bs: &mut BitWriter<W>, value: u32) -> Result<()> {
    let x = u64::from(value) + 1;
    let len = 64 - x.leading_zeros();
    if len > 1 {
        bs.write_bits(0, len - 1)?;
    }
    bs.write_bits(x, len)
}

/// Read an unsigned Exp-Golomb code.
pub fn read_exp_golomb<R: Read>(bs: &mut BitReader<R>) -> Result<u32> {
    let mut zeros = 0u32;
    while !bs.read_bit()? {
        zeros += 1;
        if zeros > 31 {
            return Err(CascadeError::invalid_bitstream(
                "Exp-Golomb prefix too long",
            ));
        }
    }
    let x = if zeros == 0 {
        1
    } else {
        (1u64 << zeros) | bs.read_bits(zeros)?
    };
    Ok((x - 1) as u32)
}

/// Write a signed Exp-Golomb code: magnitude, then a sign bit when nonzero.
pub fn write_exp_golomb_signed<W: Write>(bs: &mut BitWriter<W>, value: i32) -> Result<()> {
    write_exp_golomb(bs, value.unsigned_abs())?;
    if value != 0 {
        bs.write_bit(value < 0)?;
    }
    Ok(())
}

/// Read a signed Exp-Golomb code.
pub fn read_exp_golomb_signed<R: Read>(bs: &mut BitReader<R>) -> Result<i32> {
    let magnitude = read_exp_golomb(bs)?;
    if magnitude == 0 {
        return Ok(0);
    }
    let negative = bs.read_bit()?;
    Ok(if negative {
        -(magnitude as i32)
    } else {
        magnitude as i32
    })
}

/// Byte-wise Exp-Golomb encoder.
///
/// In signed mode each byte is interpreted as an `i8` (magnitude plus sign
/// bit); otherwise as its unsigned value.
pub struct ExpGolombEncoder<'a, W: Write> {
    bs: &'a mut BitWriter<W>,
    signed: bool,
}

impl<'a, W: Write> ExpGolombEncoder<'a, W> {
    /// Create an encoder over the given bit writer.
    pub fn new(bs: &'a mut BitWriter<W>, signed: bool) -> Self {
        Self { bs, signed }
    }
}

impl<W: Write> EntropyEncoder for ExpGolombEncoder<'_, W> {
    fn encode(&mut self, block: &[u8]) -> Result<usize> {
        for &byte in block {
            if self.signed {
                write_exp_golomb_signed(self.bs, i32::from(byte as i8))?;
            } else {
                write_exp_golomb(self.bs, u32::from(byte))?;
            }
        }
        Ok(block.len())
    }

    fn dispose(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Byte-wise Exp-Golomb decoder.
pub struct ExpGolombDecoder<'a, R: Read> {
    bs: &'a mut BitReader<R>,
    signed: bool,
}

impl<'a, R: Read> ExpGolombDecoder<'a, R> {
    /// Create a decoder over the given bit reader.
    pub fn new(bs: &'a mut BitReader<R>, signed: bool) -> Self {
        Self { bs, signed }
    }
}

impl<R: Read> EntropyDecoder for ExpGolombDecoder<'_, R> {
    fn decode(&mut self, block: &mut [u8]) -> Result<usize> {
        for byte in block.iter_mut() {
            *byte = if self.signed {
                let v = read_exp_golomb_signed(self.bs)?;
                if !(-128..=127).contains(&v) {
                    return Err(CascadeError::invalid_bitstream(
                        "Exp-Golomb value out of byte range",
                    ));
                }
                v as i8 as u8
            } else {
                let v = read_exp_golomb(self.bs)?;
                if v > 255 {
                    return Err(CascadeError::invalid_bitstream(
                        "Exp-Golomb value out of byte range",
                    ));
                }
                v as u8
            };
        }
        Ok(block.len())
    }

    fn dispose(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Default Rice parameter used by the block coder.
pub const DEFAULT_RICE_PARAMETER: u32 = 3;

/// Byte-wise Rice-Golomb encoder with parameter `k`.
pub struct RiceGolombEncoder<'a, W: Write> {
    bs: &'a mut BitWriter<W>,
    signed: bool,
    k: u32,
}

impl<'a, W: Write> RiceGolombEncoder<'a, W> {
    /// Create an encoder; `k` must lie in `[1, 12]`.
    pub fn new(bs: &'a mut BitWriter<W>, signed: bool, k: u32) -> Result<Self> {
        if !(1..=12).contains(&k) {
            return Err(CascadeError::invalid_argument(format!(
                "Rice parameter {k} out of range [1..12]"
            )));
        }
        Ok(Self { bs, signed, k })
    }
}

impl<W: Write> EntropyEncoder for RiceGolombEncoder<'_, W> {
    fn encode(&mut self, block: &[u8]) -> Result<usize> {
        for &byte in block {
            let (magnitude, negative) = if self.signed {
                let v = byte as i8;
                (u32::from(v.unsigned_abs()), v < 0)
            } else {
                (u32::from(byte), false)
            };
            // Unary quotient, then k remainder bits.
            let quotient = magnitude >> self.k;
            for _ in 0..quotient {
                self.bs.write_bit(true)?;
            }
            self.bs.write_bit(false)?;
            self.bs
                .write_bits(u64::from(magnitude) & ((1 << self.k) - 1), self.k)?;
            if self.signed && magnitude != 0 {
                self.bs.write_bit(negative)?;
            }
        }
        Ok(block.len())
    }

    fn dispose(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Byte-wise Rice-Golomb decoder with parameter `k`.
pub struct RiceGolombDecoder<'a, R: Read> {
    bs: &'a mut BitReader<R>,
    signed: bool,
    k: u32,
}

impl<'a, R: Read> RiceGolombDecoder<'a, R> {
    /// Create a decoder; `k` must lie in `[1, 12]`.
    pub fn new(bs: &'a mut BitReader<R>, signed: bool, k: u32) -> Result<Self> {
        if !(1..=12).contains(&k) {
            return Err(CascadeError::invalid_argument(format!(
                "Rice parameter {k} out of range [1..12]"
            )));
        }
        Ok(Self { bs, signed, k })
    }
}

impl<R: Read> EntropyDecoder for RiceGolombDecoder<'_, R> {
    fn decode(&mut self, block: &mut [u8]) -> Result<usize> {
        for byte in block.iter_mut() {
            let mut quotient = 0u32;
            while self.bs.read_bit()? {
                quotient += 1;
                if quotient > 256 {
                    return Err(CascadeError::invalid_bitstream(
                        "Rice-Golomb quotient too long",
                    ));
                }
            }
            let remainder = self.bs.read_bits(self.k)? as u32;
            let magnitude = (quotient << self.k) | remainder;
            if magnitude > if self.signed { 128 } else { 255 } {
                return Err(CascadeError::invalid_bitstream(
                    "Rice-Golomb value out of byte range",
                ));
            }
            *byte = if self.signed && magnitude != 0 && self.bs.read_bit()? {
                (-(magnitude as i32)) as i8 as u8
            } else {
                magnitude as u8
            };
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
    use std::io::Cursor;

    fn roundtrip_exp(values: &[u32]) {
        let mut out = Vec::new();
        let mut writer = BitWriter::new(&mut out);
        for &v in values {
            write_exp_golomb(&mut writer, v).unwrap();
        }
        writer.close().unwrap();
        let mut reader = BitReader::new(Cursor::new(&out));
        for &v in values {
            assert_eq!(read_exp_golomb(&mut reader).unwrap(), v);
        }
    }

    #[test]
    fn test_exp_golomb_primitives() {
        roundtrip_exp(&[0, 1, 2, 3, 7, 8, 255, 256, 1000, u32::MAX - 1]);
    }

    #[test]
    fn test_exp_golomb_zero_is_one_bit() {
        let mut out = Vec::new();
        let mut writer = BitWriter::new(&mut out);
        write_exp_golomb(&mut writer, 0).unwrap();
        assert_eq!(writer.written(), 1);
        writer.close().unwrap();
        assert_eq!(out, vec![0b1000_0000]);
    }

    #[test]
    fn test_exp_golomb_signed() {
        let values = [0, -1, 1, -128, 127, 42, -42];
        let mut out = Vec::new();
        let mut writer = BitWriter::new(&mut out);
        for &v in &values {
            write_exp_golomb_signed(&mut writer, v).unwrap();
        }
        writer.close().unwrap();
        let mut reader = BitReader::new(Cursor::new(&out));
        for &v in &values {
            assert_eq!(read_exp_golomb_signed(&mut reader).unwrap(), v);
        }
    }

    #[test]
    fn test_exp_golomb_block_roundtrip() {
        let block: Vec<u8> = (0..=255).collect();
        for signed in [false, true] {
            let mut out = Vec::new();
            let mut writer = BitWriter::new(&mut out);
            let mut enc = ExpGolombEncoder::new(&mut writer, signed);
            assert_eq!(enc.encode(&block).unwrap(), block.len());
            enc.dispose().unwrap();
            writer.close().unwrap();

            let mut reader = BitReader::new(Cursor::new(&out));
            let mut dec = ExpGolombDecoder::new(&mut reader, signed);
            let mut back = vec![0u8; block.len()];
            assert_eq!(dec.decode(&mut back).unwrap(), block.len());
            assert_eq!(back, block);
        }
    }

    #[test]
    fn test_rice_golomb_block_roundtrip() {
        let block: Vec<u8> = (0..=255).rev().collect();
        for k in [1, 3, 7] {
            for signed in [false, true] {
                let mut out = Vec::new();
                let mut writer = BitWriter::new(&mut out);
                let mut enc = RiceGolombEncoder::new(&mut writer, signed, k).unwrap();
                enc.encode(&block).unwrap();
                writer.close().unwrap();

                let mut reader = BitReader::new(Cursor::new(&out));
                let mut dec = RiceGolombDecoder::new(&mut reader, signed, k).unwrap();
                let mut back = vec![0u8; block.len()];
                dec.decode(&mut back).unwrap();
                assert_eq!(back, block, "k={k} signed={signed}");
            }
        }
    }

    #[test]
    fn test_rice_parameter_validation() {
        let mut out = Vec::new();
        let mut writer = BitWriter::new(&mut out);
        assert!(RiceGolombEncoder::new(&mut writer, false, 0).is_err());
        assert!(RiceGolombEncoder::new(&mut writer, false, 13).is_err());
    }
}
