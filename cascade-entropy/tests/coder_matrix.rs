//! Entropy coder matrix: every coder against a varied corpus, plus the
//! frequency-table bound checks shared by the ANS and range coders.

use cascade_core::bitstream::{BitReader, BitWriter};
use cascade_entropy::{ALL_KINDS, EntropyDecoder, EntropyEncoder, EntropyKind};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::io::Cursor;

fn corpus() -> Vec<Vec<u8>> {
    let mut rng = ChaCha8Rng::seed_from_u64(1234);
    vec![
        Vec::new(),
        vec![42],
        vec![0u8; 20_000],
        (0..=255u8).collect(),
        b"a man a plan a canal panama ".repeat(300),
        (0..40_000).map(|_| rng.r#gen::<u8>()).collect(),
        (0..40_000).map(|_| rng.gen_range(0..4u8) * 60).collect(),
        // Symbol 0 absent, the rest near-uniform.
        (0..30_000).map(|_| rng.gen_range(1..=255u8)).collect(),
    ]
}

fn encode(kind: EntropyKind, block: &[u8]) -> Vec<u8> {
    let mut writer = BitWriter::new(Vec::new());
    {
        let mut encoder = kind.encoder(&mut writer).unwrap();
        assert_eq!(encoder.encode(block).unwrap(), block.len());
        encoder.dispose().unwrap();
    }
    writer.into_inner().unwrap()
}

fn decode(kind: EntropyKind, encoded: &[u8], len: usize) -> Vec<u8> {
    let mut reader = BitReader::new(Cursor::new(encoded.to_vec()));
    let mut block = vec![0u8; len];
    let mut decoder = kind.decoder(&mut reader).unwrap();
    assert_eq!(decoder.decode(&mut block).unwrap(), len);
    decoder.dispose().unwrap();
    block
}

#[test]
fn test_matrix_roundtrip() {
    for block in corpus() {
        for kind in ALL_KINDS {
            let encoded = encode(kind, &block);
            let decoded = decode(kind, &encoded, block.len());
            assert_eq!(decoded, block, "{} on {} bytes", kind.name(), block.len());
        }
    }
}

#[test]
fn test_adaptive_coders_compress_skewed_input() {
    let mut rng = ChaCha8Rng::seed_from_u64(5678);
    let block: Vec<u8> = (0..50_000)
        .map(|_| if rng.gen_range(0..100) < 90 { 7 } else { rng.r#gen() })
        .collect();
    for kind in [
        EntropyKind::Huffman,
        EntropyKind::Range,
        EntropyKind::Ans0,
        EntropyKind::Ans1,
        EntropyKind::Fpaq,
        EntropyKind::Cm,
        EntropyKind::Tpaq,
    ] {
        let encoded = encode(kind, &block);
        assert!(
            encoded.len() < block.len() * 3 / 4,
            "{}: {} -> {}",
            kind.name(),
            block.len(),
            encoded.len()
        );
        assert_eq!(decode(kind, &encoded, block.len()), block);
    }
}

#[test]
fn test_coders_survive_their_own_tail() {
    // Decoding must consume exactly what encoding produced: append a
    // sentinel after the coder output and verify it is still readable.
    let block = b"tail accounting ".repeat(500);
    for kind in ALL_KINDS {
        let mut writer = BitWriter::new(Vec::new());
        {
            let mut encoder = kind.encoder(&mut writer).unwrap();
            encoder.encode(&block).unwrap();
            encoder.dispose().unwrap();
        }
        writer.write_bits(0xA5A5, 16).unwrap();
        let bytes = writer.into_inner().unwrap();

        let mut reader = BitReader::new(Cursor::new(bytes));
        let mut decoded = vec![0u8; block.len()];
        {
            let mut decoder = kind.decoder(&mut reader).unwrap();
            decoder.decode(&mut decoded).unwrap();
            decoder.dispose().unwrap();
        }
        assert_eq!(decoded, block, "{}", kind.name());
        assert_eq!(reader.read_bits(16).unwrap(), 0xA5A5, "{}", kind.name());
    }
}

#[test]
fn test_corrupt_frequency_table_is_rejected() {
    // A stream whose transmitted frequencies already sum to the scale
    // leaves nothing for the first symbol.
    use cascade_entropy::alphabet::{decode_frequencies, encode_frequencies};

    let alphabet: Vec<u8> = (0u32..=255).map(|s| s as u8).collect();
    let mut freqs = [16u32; 256];
    freqs[7] = 16 + 2048; // push the partial sum past the 12-bit scale
    let mut writer = BitWriter::new(Vec::new());
    encode_frequencies(&mut writer, &freqs, &alphabet, 12).unwrap();
    let bytes = writer.into_inner().unwrap();

    let mut reader = BitReader::new(Cursor::new(bytes));
    assert!(decode_frequencies(&mut reader, &alphabet).is_err());
}
