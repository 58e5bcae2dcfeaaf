//! # Cascade Core
//!
//! Core components for the Cascade block compressor.
//!
//! This crate provides the fundamental building blocks shared by the
//! entropy, transform, and stream crates:
//!
//! - [`bitstream`]: packed MSB-first bit I/O over byte streams
//! - [`math`]: integer logarithms, squash/stretch tables, histograms
//! - [`xxhash`]: XXH32 block checksum
//! - [`error`]: error types
//!
//! ## Architecture
//!
//! Cascade is layered bottom-up:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │ cascade-stream                                          │
//! │     stream header, block framing, parallel pipeline     │
//! ├────────────────────────────┬────────────────────────────┤
//! │ cascade-transform          │ cascade-entropy            │
//! │     reversible byte        │     entropy coders +       │
//! │     transforms, sequence   │     alphabet/freq codec    │
//! ├────────────────────────────┴────────────────────────────┤
//! │ cascade-core (this crate)                               │
//! │     BitReader/BitWriter, math tables, XXH32, errors     │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust
//! use cascade_core::bitstream::{BitReader, BitWriter};
//! use std::io::Cursor;
//!
//! let mut out = Vec::new();
//! let mut writer = BitWriter::new(&mut out);
//! writer.write_bits(0x1A5, 9).unwrap();
//! writer.close().unwrap();
//!
//! let mut reader = BitReader::new(Cursor::new(&out));
//! assert_eq!(reader.read_bits(9).unwrap(), 0x1A5);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod bitstream;
pub mod error;
pub mod math;
pub mod xxhash;

// Re-exports for convenience
pub use bitstream::{BitReader, BitWriter};
pub use error::{CascadeError, Result};
pub use xxhash::xxhash32;
