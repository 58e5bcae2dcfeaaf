//! # Cascade Entropy
//!
//! Entropy coders for the Cascade block compressor.
//!
//! Every coder obeys the same per-block contract: it is constructed over a
//! borrowed bit stream, encodes or decodes whole byte blocks, and carries no
//! state across blocks. `dispose` flushes coder-private state (the
//! arithmetic coders' final interval bytes).
//!
//! - [`huffman`]: canonical Huffman, 64 KiB chunks, 24-bit length cap
//! - [`ans`]: rANS orders 0 and 1
//! - [`range`]: carry-propagating range coder
//! - [`binary`]: binary arithmetic coder over the [`fpaq`], [`cm`] and
//!   [`tpaq`] predictors
//! - [`golomb`]: Exp-Golomb and Rice-Golomb universal codes
//! - [`alphabet`]: the alphabet/frequency header shared by ANS and range

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod alphabet;
pub mod ans;
pub mod binary;
pub mod cm;
pub mod fpaq;
pub mod golomb;
pub mod huffman;
pub mod range;
pub mod tpaq;

use cascade_core::bitstream::{BitReader, BitWriter};
use cascade_core::error::{CascadeError, Result};
use std::io::{Read, Write};

pub use binary::{BinaryDecoder, BinaryEncoder, Predictor};
pub use cm::CmPredictor;
pub use fpaq::FpaqPredictor;
pub use tpaq::TpaqPredictor;

/// Block entropy encoder contract.
pub trait EntropyEncoder {
    /// Encode a whole block, returning the number of bytes consumed.
    fn encode(&mut self, block: &[u8]) -> Result<usize>;
    /// Flush coder-private state to the bit stream.
    fn dispose(&mut self) -> Result<()>;
}

/// Block entropy decoder contract.
pub trait EntropyDecoder {
    /// Decode exactly `block.len()` bytes into `block`.
    fn decode(&mut self, block: &mut [u8]) -> Result<usize>;
    /// Release coder-private state.
    fn dispose(&mut self) -> Result<()>;
}

/// Entropy coder identifiers, 5-bit tags in the stream header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EntropyKind {
    /// Raw pass-through, no entropy coding.
    None = 0,
    /// Canonical Huffman.
    Huffman = 1,
    /// Binary arithmetic with the order-0 FPAQ predictor.
    Fpaq = 2,
    /// Range coder over frequency tables.
    Range = 3,
    /// rANS, order 0.
    Ans0 = 4,
    /// rANS, order 1 (previous-byte context).
    Ans1 = 5,
    /// Binary arithmetic with the CM predictor.
    Cm = 6,
    /// Binary arithmetic with the TPAQ predictor.
    Tpaq = 7,
    /// Exp-Golomb universal code.
    ExpGolomb = 8,
    /// Rice-Golomb universal code.
    RiceGolomb = 9,
}

impl EntropyKind {
    /// The 5-bit stream tag.
    pub fn tag(self) -> u8 {
        self as u8
    }

    /// Resolve a stream tag.
    pub fn from_tag(tag: u8) -> Result<Self> {
        Ok(match tag {
            0 => Self::None,
            1 => Self::Huffman,
            2 => Self::Fpaq,
            3 => Self::Range,
            4 => Self::Ans0,
            5 => Self::Ans1,
            6 => Self::Cm,
            7 => Self::Tpaq,
            8 => Self::ExpGolomb,
            9 => Self::RiceGolomb,
            _ => {
                return Err(CascadeError::invalid_bitstream(format!(
                    "unknown entropy tag {tag}"
                )));
            }
        })
    }

    /// Display name.
    pub fn name(self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::Huffman => "HUFFMAN",
            Self::Fpaq => "FPAQ",
            Self::Range => "RANGE",
            Self::Ans0 => "ANS0",
            Self::Ans1 => "ANS1",
            Self::Cm => "CM",
            Self::Tpaq => "TPAQ",
            Self::ExpGolomb => "EXPGOLOMB",
            Self::RiceGolomb => "RICEGOLOMB",
        }
    }

    /// Construct the encoder for this kind over `bs`.
    pub fn encoder<'a, W: Write>(self, bs: &'a mut BitWriter<W>) -> Result<AnyEntropyEncoder<'a, W>> {
        Ok(match self {
            Self::None => AnyEntropyEncoder::None(RawEncoder::new(bs)),
            Self::Huffman => AnyEntropyEncoder::Huffman(huffman::HuffmanEncoder::new(bs)),
            Self::Fpaq => {
                AnyEntropyEncoder::Fpaq(BinaryEncoder::new(bs, FpaqPredictor::new()))
            }
            Self::Range => AnyEntropyEncoder::Range(range::RangeEncoder::new(bs)),
            Self::Ans0 => AnyEntropyEncoder::Ans(ans::AnsEncoder::new(bs, 0)?),
            Self::Ans1 => AnyEntropyEncoder::Ans(ans::AnsEncoder::new(bs, 1)?),
            Self::Cm => AnyEntropyEncoder::Cm(BinaryEncoder::new(bs, CmPredictor::new())),
            Self::Tpaq => AnyEntropyEncoder::Tpaq(BinaryEncoder::new(bs, TpaqPredictor::new())),
            Self::ExpGolomb => {
                AnyEntropyEncoder::ExpGolomb(golomb::ExpGolombEncoder::new(bs, false))
            }
            Self::RiceGolomb => AnyEntropyEncoder::RiceGolomb(golomb::RiceGolombEncoder::new(
                bs,
                false,
                golomb::DEFAULT_RICE_PARAMETER,
            )?),
        })
    }

    /// Construct the decoder for this kind over `bs`.
    pub fn decoder<'a, R: Read>(self, bs: &'a mut BitReader<R>) -> Result<AnyEntropyDecoder<'a, R>> {
        Ok(match self {
            Self::None => AnyEntropyDecoder::None(RawDecoder::new(bs)),
            Self::Huffman => AnyEntropyDecoder::Huffman(huffman::HuffmanDecoder::new(bs)),
            Self::Fpaq => {
                AnyEntropyDecoder::Fpaq(BinaryDecoder::new(bs, FpaqPredictor::new()))
            }
            Self::Range => AnyEntropyDecoder::Range(range::RangeDecoder::new(bs)),
            Self::Ans0 => AnyEntropyDecoder::Ans(ans::AnsDecoder::new(bs, 0)?),
            Self::Ans1 => AnyEntropyDecoder::Ans(ans::AnsDecoder::new(bs, 1)?),
            Self::Cm => AnyEntropyDecoder::Cm(BinaryDecoder::new(bs, CmPredictor::new())),
            Self::Tpaq => AnyEntropyDecoder::Tpaq(BinaryDecoder::new(bs, TpaqPredictor::new())),
            Self::ExpGolomb => {
                AnyEntropyDecoder::ExpGolomb(golomb::ExpGolombDecoder::new(bs, false))
            }
            Self::RiceGolomb => AnyEntropyDecoder::RiceGolomb(golomb::RiceGolombDecoder::new(
                bs,
                false,
                golomb::DEFAULT_RICE_PARAMETER,
            )?),
        })
    }
}

/// Pass-through encoder for [`EntropyKind::None`].
pub struct RawEncoder<'a, W: Write> {
    bs: &'a mut BitWriter<W>,
}

impl<'a, W: Write> RawEncoder<'a, W> {
    /// Create an encoder over the given bit writer.
    pub fn new(bs: &'a mut BitWriter<W>) -> Self {
        Self { bs }
    }
}

impl<W: Write> EntropyEncoder for RawEncoder<'_, W> {
    fn encode(&mut self, block: &[u8]) -> Result<usize> {
        self.bs.write_array(block, block.len() as u64 * 8)?;
        Ok(block.len())
    }

    fn dispose(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Pass-through decoder for [`EntropyKind::None`].
pub struct RawDecoder<'a, R: Read> {
    bs: &'a mut BitReader<R>,
}

impl<'a, R: Read> RawDecoder<'a, R> {
    /// Create a decoder over the given bit reader.
    pub fn new(bs: &'a mut BitReader<R>) -> Self {
        Self { bs }
    }
}

impl<R: Read> EntropyDecoder for RawDecoder<'_, R> {
    fn decode(&mut self, block: &mut [u8]) -> Result<usize> {
        let len = block.len();
        self.bs.read_array(block, len as u64 * 8)?;
        Ok(len)
    }

    fn dispose(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Sum-type dispatch over every encoder, avoiding boxed trait objects in
/// the per-block hot path.
pub enum AnyEntropyEncoder<'a, W: Write> {
    /// Raw pass-through.
    None(RawEncoder<'a, W>),
    /// Canonical Huffman.
    Huffman(huffman::HuffmanEncoder<'a, W>),
    /// FPAQ binary arithmetic.
    Fpaq(BinaryEncoder<'a, W, FpaqPredictor>),
    /// Range coder.
    Range(range::RangeEncoder<'a, W>),
    /// rANS (order held by the coder).
    Ans(ans::AnsEncoder<'a, W>),
    /// CM binary arithmetic.
    Cm(BinaryEncoder<'a, W, CmPredictor>),
    /// TPAQ binary arithmetic.
    Tpaq(BinaryEncoder<'a, W, TpaqPredictor>),
    /// Exp-Golomb.
    ExpGolomb(golomb::ExpGolombEncoder<'a, W>),
    /// Rice-Golomb.
    RiceGolomb(golomb::RiceGolombEncoder<'a, W>),
}

impl<W: Write> EntropyEncoder for AnyEntropyEncoder<'_, W> {
    fn encode(&mut self, block: &[u8]) -> Result<usize> {
        match self {
            Self::None(e) => e.encode(block),
            Self::Huffman(e) => e.encode(block),
            Self::Fpaq(e) => e.encode(block),
            Self::Range(e) => e.encode(block),
            Self::Ans(e) => e.encode(block),
            Self::Cm(e) => e.encode(block),
            Self::Tpaq(e) => e.encode(block),
            Self::ExpGolomb(e) => e.encode(block),
            Self::RiceGolomb(e) => e.encode(block),
        }
    }

    fn dispose(&mut self) -> Result<()> {
        match self {
            Self::None(e) => e.dispose(),
            Self::Huffman(e) => e.dispose(),
            Self::Fpaq(e) => e.dispose(),
            Self::Range(e) => e.dispose(),
            Self::Ans(e) => e.dispose(),
            Self::Cm(e) => e.dispose(),
            Self::Tpaq(e) => e.dispose(),
            Self::ExpGolomb(e) => e.dispose(),
            Self::RiceGolomb(e) => e.dispose(),
        }
    }
}

/// Sum-type dispatch over every decoder.
pub enum AnyEntropyDecoder<'a, R: Read> {
    /// Raw pass-through.
    None(RawDecoder<'a, R>),
    /// Canonical Huffman.
    Huffman(huffman::HuffmanDecoder<'a, R>),
    /// FPAQ binary arithmetic.
    Fpaq(BinaryDecoder<'a, R, FpaqPredictor>),
    /// Range coder.
    Range(range::RangeDecoder<'a, R>),
    /// rANS (order held by the coder).
    Ans(ans::AnsDecoder<'a, R>),
    /// CM binary arithmetic.
    Cm(BinaryDecoder<'a, R, CmPredictor>),
    /// TPAQ binary arithmetic.
    Tpaq(BinaryDecoder<'a, R, TpaqPredictor>),
    /// Exp-Golomb.
    ExpGolomb(golomb::ExpGolombDecoder<'a, R>),
    /// Rice-Golomb.
    RiceGolomb(golomb::RiceGolombDecoder<'a, R>),
}

impl<R: Read> EntropyDecoder for AnyEntropyDecoder<'_, R> {
    fn decode(&mut self, block: &mut [u8]) -> Result<usize> {
        match self {
            Self::None(d) => d.decode(block),
            Self::Huffman(d) => d.decode(block),
            Self::Fpaq(d) => d.decode(block),
            Self::Range(d) => d.decode(block),
            Self::Ans(d) => d.decode(block),
            Self::Cm(d) => d.decode(block),
            Self::Tpaq(d) => d.decode(block),
            Self::ExpGolomb(d) => d.decode(block),
            Self::RiceGolomb(d) => d.decode(block),
        }
    }

    fn dispose(&mut self) -> Result<()> {
        match self {
            Self::None(d) => d.dispose(),
            Self::Huffman(d) => d.dispose(),
            Self::Fpaq(d) => d.dispose(),
            Self::Range(d) => d.dispose(),
            Self::Ans(d) => d.dispose(),
            Self::Cm(d) => d.dispose(),
            Self::Tpaq(d) => d.dispose(),
            Self::ExpGolomb(d) => d.dispose(),
            Self::RiceGolomb(d) => d.dispose(),
        }
    }
}

/// All kinds, in tag order. Handy for exhaustive round-trip tests.
pub const ALL_KINDS: [EntropyKind; 10] = [
    EntropyKind::None,
    EntropyKind::Huffman,
    EntropyKind::Fpaq,
    EntropyKind::Range,
    EntropyKind::Ans0,
    EntropyKind::Ans1,
    EntropyKind::Cm,
    EntropyKind::Tpaq,
    EntropyKind::ExpGolomb,
    EntropyKind::RiceGolomb,
];

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_tag_roundtrip() {
        for kind in ALL_KINDS {
            assert_eq!(EntropyKind::from_tag(kind.tag()).unwrap(), kind);
        }
        assert!(EntropyKind::from_tag(10).is_err());
        assert!(EntropyKind::from_tag(31).is_err());
    }

    #[test]
    fn test_every_kind_roundtrips() {
        let block = b"pack my box with five dozen liquor jugs - 0123456789".repeat(40);
        for kind in ALL_KINDS {
            let mut out = Vec::new();
            let mut writer = BitWriter::new(&mut out);
            {
                let mut enc = kind.encoder(&mut writer).unwrap();
                assert_eq!(enc.encode(&block).unwrap(), block.len());
                enc.dispose().unwrap();
            }
            writer.close().unwrap();

            let mut reader = BitReader::new(Cursor::new(&out));
            let mut dec = kind.decoder(&mut reader).unwrap();
            let mut back = vec![0u8; block.len()];
            assert_eq!(dec.decode(&mut back).unwrap(), block.len());
            dec.dispose().unwrap();
            assert_eq!(back, block, "kind {}", kind.name());
        }
    }

    #[test]
    fn test_every_kind_handles_empty() {
        for kind in ALL_KINDS {
            let mut out = Vec::new();
            let mut writer = BitWriter::new(&mut out);
            {
                let mut enc = kind.encoder(&mut writer).unwrap();
                assert_eq!(enc.encode(b"").unwrap(), 0);
                enc.dispose().unwrap();
            }
            writer.close().unwrap();

            let mut reader = BitReader::new(Cursor::new(&out));
            let mut dec = kind.decoder(&mut reader).unwrap();
            let mut back = [0u8; 0];
            assert_eq!(dec.decode(&mut back).unwrap(), 0);
            dec.dispose().unwrap();
        }
    }
}
