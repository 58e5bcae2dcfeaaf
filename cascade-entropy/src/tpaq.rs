//! TPAQ predictor: hashed multi-context models mixed by a bank of neural
//! mixers, refined by an adaptive probability map.
//!
//! Eight inputs feed the mixer: order 0-4 byte contexts, a sparse context,
//! a match model over the block history, and a constant bias. Inputs are
//! stretched predictions; the mixed output is squashed back to a 12-bit
//! probability. Mixer weights are per block and start at zero, so the
//! initial prediction is even odds.

use crate::binary::Predictor;
use cascade_core::math::{squash, stretch};

const HASH_SIZE: usize = 1 << 16;
const HASH_MASK: usize = HASH_SIZE - 1;
const INPUT_COUNT: usize = 8;
const MIXER_COUNT: usize = 4096;
const PSCALE: i32 = 65536;
const MODEL_SHIFT: u32 = 5;
const LEARNING_SHIFT: u32 = 10;
const WEIGHT_LIMIT: i64 = 1 << 20;
const APM_NODES: usize = 33;
const BIAS_INPUT: i32 = 256;

fn hash_bytes(bytes: &[u8], seed: u64) -> usize {
    let mut h = seed ^ 0x9E37_79B9_7F4A_7C15;
    for &b in bytes {
        h = (h ^ u64::from(b)).wrapping_mul(0x0000_0100_0000_01B3);
    }
    (h >> 24) as usize & HASH_MASK
}

/// Multi-context mixing predictor.
pub struct TpaqPredictor {
    order0: Vec<u16>,
    order1: Vec<u16>,
    order2: Vec<u16>,
    order3: Vec<u16>,
    order4: Vec<u16>,
    sparse: Vec<u16>,

    match_conf: Vec<u16>,
    match_table: Vec<u32>,
    history: Vec<u8>,
    match_pos: usize,
    match_len: u32,

    weights: Vec<i32>,
    apm: Vec<u16>,

    // State stashed by `predict` for the following `update`.
    slots: [usize; 6],
    inputs: [i32; INPUT_COUNT],
    mixer_base: usize,
    mixed: i32,
    apm_base: usize,
    apm_weight: i32,
    had_match: bool,
    predicted_bit: u8,

    ctx: usize,
    prev: [u8; 4],
    hash2: usize,
    hash3: usize,
    hash4: usize,
    hash_sparse: usize,
}

impl TpaqPredictor {
    /// Create a predictor with flat models and zeroed mixer weights.
    pub fn new() -> Self {
        let mut apm = vec![0u16; 256 * APM_NODES];
        for ctx in 0..256 {
            for j in 0..APM_NODES {
                apm[ctx * APM_NODES + j] = (squash((j as i32 - 16) * 128) * 16) as u16;
            }
        }
        Self {
            order0: vec![(PSCALE / 2) as u16; 256],
            order1: vec![(PSCALE / 2) as u16; 1 << 16],
            order2: vec![(PSCALE / 2) as u16; HASH_SIZE],
            order3: vec![(PSCALE / 2) as u16; HASH_SIZE],
            order4: vec![(PSCALE / 2) as u16; HASH_SIZE],
            sparse: vec![(PSCALE / 2) as u16; HASH_SIZE],
            match_conf: vec![(PSCALE / 2) as u16; 16],
            match_table: vec![0u32; HASH_SIZE],
            history: Vec::new(),
            match_pos: 0,
            match_len: 0,
            weights: vec![0i32; MIXER_COUNT * INPUT_COUNT],
            apm,
            slots: [0; 6],
            inputs: [0; INPUT_COUNT],
            mixer_base: 0,
            mixed: 2048,
            apm_base: 0,
            apm_weight: 0,
            had_match: false,
            predicted_bit: 0,
            ctx: 1,
            prev: [0; 4],
            hash2: 0,
            hash3: 0,
            hash4: 0,
            hash_sparse: 0,
        }
    }

    #[inline]
    fn model_tables(&mut self) -> [&mut Vec<u16>; 6] {
        [
            &mut self.order0,
            &mut self.order1,
            &mut self.order2,
            &mut self.order3,
            &mut self.order4,
            &mut self.sparse,
        ]
    }

    fn on_byte_boundary(&mut self) {
        let byte = (self.ctx - 256) as u8;
        self.history.push(byte);

        // A live match that survived all eight bit checks extends; anything
        // else looks up a fresh candidate position.
        if self.match_len > 0 && self.match_pos < self.history.len() - 1 {
            self.match_pos += 1;
            self.match_len += 1;
        } else {
            self.match_len = 0;
        }

        self.prev = [byte, self.prev[0], self.prev[1], self.prev[2]];
        self.hash2 = hash_bytes(&self.prev[..2], 2);
        self.hash3 = hash_bytes(&self.prev[..3], 3);
        self.hash4 = hash_bytes(&self.prev[..4], 4);
        self.hash_sparse = hash_bytes(&[self.prev[1], self.prev[3]], 5);

        if self.history.len() >= 4 {
            let h = hash_bytes(&self.prev[..4], 1);
            if self.match_len == 0 {
                let candidate = self.match_table[h] as usize;
                if candidate > 0 && candidate < self.history.len() {
                    self.match_pos = candidate;
                    self.match_len = 1;
                }
            }
            self.match_table[h] = self.history.len() as u32;
        }
        self.ctx = 1;
    }
}

impl Default for TpaqPredictor {
    fn default() -> Self {
        Self::new()
    }
}

impl Predictor for TpaqPredictor {
    fn predict(&mut self) -> i32 {
        let ctx = self.ctx;
        self.slots = [
            ctx,
            (usize::from(self.prev[0]) << 8) | ctx,
            (self.hash2 ^ ctx) & HASH_MASK,
            (self.hash3 ^ ctx) & HASH_MASK,
            (self.hash4 ^ ctx) & HASH_MASK,
            (self.hash_sparse ^ ctx) & HASH_MASK,
        ];
        let slots = self.slots;
        let mut probs = [0i32; 6];
        for (k, table) in self.model_tables().into_iter().enumerate() {
            probs[k] = i32::from(table[slots[k]] >> 4);
        }
        for k in 0..6 {
            self.inputs[k] = stretch(probs[k]);
        }

        self.had_match = self.match_len > 0 && self.match_pos < self.history.len();
        self.inputs[6] = if self.had_match {
            let predicted_byte = self.history[self.match_pos];
            let bits_seen = usize::BITS - 1 - ctx.leading_zeros();
            self.predicted_bit = (predicted_byte >> (7 - bits_seen)) & 1;
            let confidence = i32::from(self.match_conf[self.match_len.min(15) as usize] >> 4);
            let p1 = if self.predicted_bit == 1 {
                confidence
            } else {
                4095 - confidence
            };
            stretch(p1)
        } else {
            0
        };
        self.inputs[7] = BIAS_INPUT;

        self.mixer_base = (((usize::from(self.prev[0]) << 4) | (ctx >> 4)) % MIXER_COUNT)
            * INPUT_COUNT;
        let mut dot = 0i64;
        for k in 0..INPUT_COUNT {
            dot += i64::from(self.weights[self.mixer_base + k]) * i64::from(self.inputs[k]);
        }
        self.mixed = squash(((dot >> 16) as i32).clamp(-2047, 2047));

        // Adaptive probability map with linear interpolation.
        let st = stretch(self.mixed) + 2048;
        let node = (st >> 7) as usize;
        self.apm_weight = st & 127;
        self.apm_base = usize::from(self.prev[0]) * APM_NODES + node;
        let a = i32::from(self.apm[self.apm_base]);
        let b = i32::from(self.apm[self.apm_base + 1]);
        let refined = ((a * (128 - self.apm_weight) + b * self.apm_weight) >> 7) >> 4;

        ((self.mixed + 3 * refined) >> 2).clamp(1, 4094)
    }

    fn update(&mut self, bit: u8) {
        let slots = self.slots;
        for (k, table) in self.model_tables().into_iter().enumerate() {
            let p = i32::from(table[slots[k]]);
            table[slots[k]] = if bit == 1 {
                (p + ((PSCALE - p) >> MODEL_SHIFT)) as u16
            } else {
                (p - (p >> MODEL_SHIFT)) as u16
            };
        }

        if self.had_match {
            let idx = self.match_len.min(15) as usize;
            let correct = bit == self.predicted_bit;
            let c = i32::from(self.match_conf[idx]);
            self.match_conf[idx] = if correct {
                (c + ((PSCALE - c) >> MODEL_SHIFT)) as u16
            } else {
                (c - (c >> MODEL_SHIFT)) as u16
            };
            if !correct {
                self.match_len = 0;
            }
        }

        let err = (i32::from(bit) << 12) - self.mixed;
        for k in 0..INPUT_COUNT {
            let w = i64::from(self.weights[self.mixer_base + k])
                + ((i64::from(self.inputs[k]) * i64::from(err)) >> LEARNING_SHIFT);
            self.weights[self.mixer_base + k] = w.clamp(-WEIGHT_LIMIT, WEIGHT_LIMIT) as i32;
        }

        let target = i32::from(bit) * (PSCALE - 1);
        for offset in 0..2 {
            let a = i32::from(self.apm[self.apm_base + offset]);
            self.apm[self.apm_base + offset] = (a + ((target - a) >> 6)) as u16;
        }

        self.ctx = (self.ctx << 1) | usize::from(bit);
        if self.ctx >= 256 {
            self.on_byte_boundary();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binary::{BinaryDecoder, BinaryEncoder};
    use crate::{EntropyDecoder, EntropyEncoder};
    use cascade_core::bitstream::{BitReader, BitWriter};
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;
    use std::io::Cursor;

    fn roundtrip(block: &[u8]) -> usize {
        let mut out = Vec::new();
        let mut writer = BitWriter::new(&mut out);
        let mut enc = BinaryEncoder::new(&mut writer, TpaqPredictor::new());
        enc.encode(block).unwrap();
        enc.dispose().unwrap();
        writer.close().unwrap();
        let encoded_len = out.len();

        let mut reader = BitReader::new(Cursor::new(&out));
        let mut dec = BinaryDecoder::new(&mut reader, TpaqPredictor::new());
        let mut back = vec![0u8; block.len()];
        dec.decode(&mut back).unwrap();
        assert_eq!(back, block);
        encoded_len
    }

    #[test]
    fn test_initial_prediction_is_even() {
        let mut p = TpaqPredictor::new();
        let first = p.predict();
        assert!((1900..=2200).contains(&first), "first = {first}");
    }

    #[test]
    fn test_roundtrip_text() {
        roundtrip(b"around the rugged rock the ragged rascal ran");
    }

    #[test]
    fn test_roundtrip_binary() {
        let mut rng = ChaCha8Rng::seed_from_u64(41);
        let block: Vec<u8> = (0..20_000).map(|_| rng.r#gen()).collect();
        roundtrip(&block);
    }

    #[test]
    fn test_repetitive_input_compresses_hard() {
        let block = b"abcdefgh".repeat(2048);
        let encoded = roundtrip(&block);
        assert!(encoded < block.len() / 4, "encoded = {encoded}");
    }

    #[test]
    fn test_match_model_tracks_repeats() {
        let mut p = TpaqPredictor::new();
        let data = b"0123456789".repeat(4);
        for &byte in data.iter() {
            for shift in (0..8).rev() {
                let _ = p.predict();
                p.update((byte >> shift) & 1);
            }
        }
        assert!(p.match_len > 8, "match_len = {}", p.match_len);
    }
}
