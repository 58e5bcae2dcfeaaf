//! # Cascade Transform
//!
//! Reversible byte transforms for the Cascade block compressor, and the
//! sequence combinator that stacks up to eight of them with per-slot skip
//! flags.
//!
//! Every transform implements [`Transform`]: `forward` may refuse to run
//! (a bypass, recorded by the sequence as a skip flag) while `inverse` is
//! total on valid data. Compression-type transforms ([`lz::Lz`],
//! [`rolz::Rolz`], [`rolz::RolzX`], [`rlt::Rlt`], [`zrlt::Zrlt`]) refuse
//! whenever their output stops being strictly shorter than their input;
//! permutation-type transforms ([`bwt::Bwt`], [`bwts::Bwts`],
//! [`mtft::Mtft`], [`sbrt::Sbrt`], [`srt::Srt`]) always run and may add a
//! small header.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod bwt;
pub mod bwts;
pub mod lz;
pub mod mtft;
pub mod rlt;
pub mod rolz;
mod sais;
pub mod sbrt;
pub mod srt;
pub mod zrlt;

pub use sais::suffix_array;

use cascade_core::error::{CascadeError, Result};
use sbrt::SbrtMode;

/// Reversible byte transform contract.
pub trait Transform {
    /// Transform `src` into `dst`. Returns `(consumed, produced)`, or
    /// `None` when the transform refuses to run on this input (the caller
    /// records a skip and passes the data through).
    fn forward(&mut self, src: &[u8], dst: &mut [u8]) -> Result<Option<(usize, usize)>>;

    /// Undo the transform. Returns `(consumed, produced)`.
    fn inverse(&mut self, src: &[u8], dst: &mut [u8]) -> Result<(usize, usize)>;

    /// Upper bound on the forward output size for `src_len` input bytes.
    fn max_encoded_len(&self, src_len: usize) -> usize;
}

/// Identity transform for empty sequence slots.
#[derive(Debug, Default)]
pub struct NoneTransform;

impl Transform for NoneTransform {
    fn forward(&mut self, src: &[u8], dst: &mut [u8]) -> Result<Option<(usize, usize)>> {
        dst[..src.len()].copy_from_slice(src);
        Ok(Some((src.len(), src.len())))
    }

    fn inverse(&mut self, src: &[u8], dst: &mut [u8]) -> Result<(usize, usize)> {
        if src.len() > dst.len() {
            return Err(CascadeError::invalid_bitstream(
                "pass-through output exceeds block size",
            ));
        }
        dst[..src.len()].copy_from_slice(src);
        Ok((src.len(), src.len()))
    }

    fn max_encoded_len(&self, src_len: usize) -> usize {
        src_len
    }
}

/// Transform identifiers, 4-bit tags in the stream header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TransformKind {
    /// Identity.
    None = 0,
    /// Burrows-Wheeler transform.
    Bwt = 1,
    /// Bijective Burrows-Wheeler transform.
    Bwts = 2,
    /// LZ codec (LZ4 block layout).
    Lz = 3,
    /// Reduced-offset LZ, byte tokens.
    Rolz = 4,
    /// Reduced-offset LZ, range-coded.
    RolzX = 5,
    /// Run-length transform.
    Rlt = 6,
    /// Zero run-length transform.
    Zrlt = 7,
    /// Move-to-front.
    Mtft = 8,
    /// Sort-by-rank, α = 1/2.
    Rank = 9,
    /// Sort-by-rank, α = 1.
    Timestamp = 10,
    /// Sorted rank substitution.
    Srt = 11,
}

impl TransformKind {
    /// The 4-bit stream tag.
    pub fn tag(self) -> u8 {
        self as u8
    }

    /// Resolve a stream tag.
    pub fn from_tag(tag: u8) -> Result<Self> {
        Ok(match tag {
            0 => Self::None,
            1 => Self::Bwt,
            2 => Self::Bwts,
            3 => Self::Lz,
            4 => Self::Rolz,
            5 => Self::RolzX,
            6 => Self::Rlt,
            7 => Self::Zrlt,
            8 => Self::Mtft,
            9 => Self::Rank,
            10 => Self::Timestamp,
            11 => Self::Srt,
            _ => {
                return Err(CascadeError::invalid_bitstream(format!(
                    "unknown transform tag {tag}"
                )));
            }
        })
    }

    /// Display name.
    pub fn name(self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::Bwt => "BWT",
            Self::Bwts => "BWTS",
            Self::Lz => "LZ",
            Self::Rolz => "ROLZ",
            Self::RolzX => "ROLZX",
            Self::Rlt => "RLT",
            Self::Zrlt => "ZRLT",
            Self::Mtft => "MTFT",
            Self::Rank => "RANK",
            Self::Timestamp => "TIMESTAMP",
            Self::Srt => "SRT",
        }
    }

    /// Instantiate the transform.
    pub fn instantiate(self) -> AnyTransform {
        match self {
            Self::None => AnyTransform::None(NoneTransform),
            Self::Bwt => AnyTransform::Bwt(bwt::Bwt::new()),
            Self::Bwts => AnyTransform::Bwts(bwts::Bwts::new()),
            Self::Lz => AnyTransform::Lz(lz::Lz::new()),
            Self::Rolz => AnyTransform::Rolz(rolz::Rolz::new()),
            Self::RolzX => AnyTransform::RolzX(rolz::RolzX::new()),
            Self::Rlt => AnyTransform::Rlt(rlt::Rlt::new()),
            Self::Zrlt => AnyTransform::Zrlt(zrlt::Zrlt::new()),
            Self::Mtft => AnyTransform::Mtft(mtft::Mtft::new()),
            Self::Rank => AnyTransform::Sbrt(sbrt::Sbrt::new(SbrtMode::Rank)),
            Self::Timestamp => AnyTransform::Sbrt(sbrt::Sbrt::new(SbrtMode::Timestamp)),
            Self::Srt => AnyTransform::Srt(srt::Srt::new()),
        }
    }
}

/// Sum-type dispatch over every transform.
#[derive(Debug)]
pub enum AnyTransform {
    /// Identity.
    None(NoneTransform),
    /// Burrows-Wheeler.
    Bwt(bwt::Bwt),
    /// Bijective Burrows-Wheeler.
    Bwts(bwts::Bwts),
    /// LZ codec.
    Lz(lz::Lz),
    /// Reduced-offset LZ.
    Rolz(rolz::Rolz),
    /// Reduced-offset LZ, range-coded.
    RolzX(rolz::RolzX),
    /// Run-length.
    Rlt(rlt::Rlt),
    /// Zero run-length.
    Zrlt(zrlt::Zrlt),
    /// Move-to-front.
    Mtft(mtft::Mtft),
    /// Sort-by-rank.
    Sbrt(sbrt::Sbrt),
    /// Sorted rank substitution.
    Srt(srt::Srt),
}

impl Transform for AnyTransform {
    fn forward(&mut self, src: &[u8], dst: &mut [u8]) -> Result<Option<(usize, usize)>> {
        match self {
            Self::None(t) => t.forward(src, dst),
            Self::Bwt(t) => t.forward(src, dst),
            Self::Bwts(t) => t.forward(src, dst),
            Self::Lz(t) => t.forward(src, dst),
            Self::Rolz(t) => t.forward(src, dst),
            Self::RolzX(t) => t.forward(src, dst),
            Self::Rlt(t) => t.forward(src, dst),
            Self::Zrlt(t) => t.forward(src, dst),
            Self::Mtft(t) => t.forward(src, dst),
            Self::Sbrt(t) => t.forward(src, dst),
            Self::Srt(t) => t.forward(src, dst),
        }
    }

    fn inverse(&mut self, src: &[u8], dst: &mut [u8]) -> Result<(usize, usize)> {
        match self {
            Self::None(t) => t.inverse(src, dst),
            Self::Bwt(t) => t.inverse(src, dst),
            Self::Bwts(t) => t.inverse(src, dst),
            Self::Lz(t) => t.inverse(src, dst),
            Self::Rolz(t) => t.inverse(src, dst),
            Self::RolzX(t) => t.inverse(src, dst),
            Self::Rlt(t) => t.inverse(src, dst),
            Self::Zrlt(t) => t.inverse(src, dst),
            Self::Mtft(t) => t.inverse(src, dst),
            Self::Sbrt(t) => t.inverse(src, dst),
            Self::Srt(t) => t.inverse(src, dst),
        }
    }

    fn max_encoded_len(&self, src_len: usize) -> usize {
        match self {
            Self::None(t) => t.max_encoded_len(src_len),
            Self::Bwt(t) => t.max_encoded_len(src_len),
            Self::Bwts(t) => t.max_encoded_len(src_len),
            Self::Lz(t) => t.max_encoded_len(src_len),
            Self::Rolz(t) => t.max_encoded_len(src_len),
            Self::RolzX(t) => t.max_encoded_len(src_len),
            Self::Rlt(t) => t.max_encoded_len(src_len),
            Self::Zrlt(t) => t.max_encoded_len(src_len),
            Self::Mtft(t) => t.max_encoded_len(src_len),
            Self::Sbrt(t) => t.max_encoded_len(src_len),
            Self::Srt(t) => t.max_encoded_len(src_len),
        }
    }
}

/// Largest number of slots in a sequence.
pub const MAX_SEQUENCE_LEN: usize = 8;

/// An ordered stack of transforms with per-slot skip flags.
///
/// On encode, each slot runs in turn; a slot that refuses sets its skip bit
/// (bit `i` for slot `i`) and passes its input through. On decode, the
/// slots run in reverse order and the skip flags select pass-throughs.
#[derive(Debug)]
pub struct TransformSequence {
    kinds: Vec<TransformKind>,
    transforms: Vec<AnyTransform>,
    skip_flags: u8,
}

impl TransformSequence {
    /// Build a sequence from kinds; at most [`MAX_SEQUENCE_LEN`] slots.
    pub fn new(kinds: &[TransformKind]) -> Result<Self> {
        if kinds.len() > MAX_SEQUENCE_LEN {
            return Err(CascadeError::invalid_argument(format!(
                "{} transforms exceed the {MAX_SEQUENCE_LEN}-slot limit",
                kinds.len()
            )));
        }
        Ok(Self {
            kinds: kinds.to_vec(),
            transforms: kinds.iter().map(|&k| k.instantiate()).collect(),
            skip_flags: 0,
        })
    }

    /// The configured kinds.
    pub fn kinds(&self) -> &[TransformKind] {
        &self.kinds
    }

    /// Skip flags recorded by the last [`Self::forward`] call.
    pub fn skip_flags(&self) -> u8 {
        self.skip_flags
    }

    /// Number of slots.
    pub fn len(&self) -> usize {
        self.transforms.len()
    }

    /// Whether the sequence has no slots.
    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }

    /// Upper bound on the output size after every slot ran.
    pub fn max_encoded_len(&self, src_len: usize) -> usize {
        self.transforms
            .iter()
            .fold(src_len, |len, t| t.max_encoded_len(len))
    }

    /// Run the slots in order, leaving the result in `dst` and the skip
    /// flags in [`Self::skip_flags`].
    pub fn forward(&mut self, src: &[u8], dst: &mut Vec<u8>) -> Result<usize> {
        self.skip_flags = 0;
        let mut current: Vec<u8> = src.to_vec();
        let mut scratch: Vec<u8> = Vec::new();

        for (slot, transform) in self.transforms.iter_mut().enumerate() {
            scratch.resize(transform.max_encoded_len(current.len()).max(1), 0);
            match transform.forward(&current, &mut scratch)? {
                Some((_, produced)) => {
                    scratch.truncate(produced);
                    std::mem::swap(&mut current, &mut scratch);
                }
                None => {
                    self.skip_flags |= 1 << slot;
                }
            }
        }
        *dst = current;
        Ok(dst.len())
    }

    /// Run the slots in reverse order, honoring `skip_flags`. `max_len`
    /// bounds every intermediate (the block size at encode time).
    pub fn inverse(
        &mut self,
        src: &[u8],
        dst: &mut Vec<u8>,
        skip_flags: u8,
        max_len: usize,
    ) -> Result<usize> {
        let bound = self.max_encoded_len(max_len);
        let mut current: Vec<u8> = src.to_vec();
        let mut scratch: Vec<u8> = Vec::new();

        for (slot, transform) in self.transforms.iter_mut().enumerate().rev() {
            if skip_flags & (1 << slot) != 0 {
                continue;
            }
            scratch.resize(bound.max(1), 0);
            let (_, produced) = transform.inverse(&current, &mut scratch)?;
            scratch.truncate(produced);
            std::mem::swap(&mut current, &mut scratch);
        }
        *dst = current;
        Ok(dst.len())
    }
}
