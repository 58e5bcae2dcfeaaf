//! End-to-end pipeline tests: round-trips across the entropy/transform
//! matrix, parallel determinism, checksum detection, and stream framing.

use cascade_stream::{
    CompressedReader, CompressedWriter, EntropyKind, TransformKind, WriterConfig, compress,
    decompress, decompress_with_jobs,
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::io::{Cursor, Read, Write};

fn config(
    entropy: EntropyKind,
    transforms: &[TransformKind],
    block_size: usize,
    jobs: usize,
) -> WriterConfig {
    WriterConfig {
        block_size,
        jobs,
        entropy,
        transforms: transforms.to_vec(),
        checksum: false,
    }
}

fn mixed_payload(len: usize, seed: u64) -> Vec<u8> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut data = Vec::with_capacity(len);
    while data.len() < len {
        match rng.gen_range(0..4) {
            0 => data.extend_from_slice(b"the quick brown fox jumps over the lazy dog. "),
            1 => {
                let run_len = rng.gen_range(10..200);
                let byte = rng.r#gen::<u8>();
                data.extend(std::iter::repeat(byte).take(run_len));
            }
            2 => {
                let noise_len = rng.gen_range(10..100);
                data.extend((0..noise_len).map(|_| rng.r#gen::<u8>()));
            }
            _ => data.extend_from_slice(b"0123456789abcdef"),
        }
    }
    data.truncate(len);
    data
}

#[test]
fn test_empty_input_is_header_plus_terminator() {
    let packed = compress(b"", &WriterConfig::default()).unwrap();
    // 96-bit header then the 0x80 terminator frame.
    assert_eq!(packed.len(), 13);
    assert_eq!(packed[12], 0x80);
    assert_eq!(decompress(&packed).unwrap(), b"");
}

#[test]
fn test_mississippi_bwt_huffman() {
    let cfg = config(EntropyKind::Huffman, &[TransformKind::Bwt], 1024, 1);
    let packed = compress(b"mississippi", &cfg).unwrap();
    assert_eq!(decompress(&packed).unwrap(), b"mississippi");
}

#[test]
fn test_constant_run_rlt_only() {
    let mut data = vec![0x01u8];
    data.extend(std::iter::repeat(0x08).take(66_000));
    let cfg = config(EntropyKind::None, &[TransformKind::Rlt], 1 << 17, 1);
    let packed = compress(&data, &cfg).unwrap();
    assert!(packed.len() < data.len());
    assert_eq!(decompress(&packed).unwrap(), data);
}

#[test]
fn test_random_256k_bwt_stack_counts_blocks() {
    let mut rng = ChaCha8Rng::seed_from_u64(7);
    let data: Vec<u8> = (0..262_144).map(|_| rng.r#gen()).collect();
    let cfg = config(
        EntropyKind::Ans0,
        &[TransformKind::Bwt, TransformKind::Mtft, TransformKind::Zrlt],
        1 << 16,
        4,
    );
    let mut writer = CompressedWriter::new(Vec::new(), cfg).unwrap();
    writer.write_bytes(&data).unwrap();
    writer.close().unwrap();
    assert_eq!(writer.blocks_written(), 4);
    let packed = writer.into_inner().unwrap();
    assert_eq!(decompress(&packed).unwrap(), data);
}

#[test]
fn test_roundtrip_matrix() {
    let data = mixed_payload(120_000, 11);
    let transform_sets: &[&[TransformKind]] = &[
        &[],
        &[TransformKind::Lz],
        &[TransformKind::Bwt, TransformKind::Rank, TransformKind::Zrlt],
        &[TransformKind::Bwts, TransformKind::Mtft],
        &[TransformKind::Rolz],
        &[TransformKind::RolzX, TransformKind::Rlt],
        &[TransformKind::Srt, TransformKind::Timestamp],
    ];
    let kinds = [
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
    for &transforms in transform_sets {
        for kind in kinds {
            for jobs in [1, 4] {
                let cfg = config(kind, transforms, 1 << 16, jobs);
                let packed = compress(&data, &cfg).unwrap();
                assert_eq!(
                    decompress(&packed).unwrap(),
                    data,
                    "entropy {} transforms {transforms:?} jobs {jobs}",
                    kind.name()
                );
            }
        }
    }
}

#[test]
fn test_parallel_determinism() {
    let data = mixed_payload(4 << 20, 23);
    let mut outputs = Vec::new();
    for jobs in [1usize, 2, 4, 8] {
        let cfg = WriterConfig {
            jobs,
            block_size: 1 << 18,
            checksum: true,
            entropy: EntropyKind::Huffman,
            transforms: vec![TransformKind::Lz],
        };
        outputs.push(compress(&data, &cfg).unwrap());
    }
    for pair in outputs.windows(2) {
        assert_eq!(pair[0], pair[1]);
    }
    for jobs in [1usize, 2, 4] {
        assert_eq!(decompress_with_jobs(&outputs[0], jobs).unwrap(), data);
    }
}

#[test]
fn test_checksum_detects_corruption() {
    let data = mixed_payload(100_000, 31);
    let cfg = WriterConfig {
        checksum: true,
        block_size: 1 << 16,
        ..WriterConfig::default()
    };
    let packed = compress(&data, &cfg).unwrap();
    assert_eq!(decompress(&packed).unwrap(), data);

    // Flip one payload bit well inside the first block frame.
    let mut corrupt = packed.clone();
    let target = corrupt.len() / 2;
    corrupt[target] ^= 0x10;
    assert!(decompress(&corrupt).is_err());
}

#[test]
fn test_missing_terminator_fails() {
    let data = mixed_payload(50_000, 37);
    let packed = compress(&data, &WriterConfig::default()).unwrap();
    let truncated = &packed[..packed.len() - 1];
    assert!(decompress(truncated).is_err());
}

#[test]
fn test_io_traits_chunked() {
    let data = mixed_payload(300_000, 41);
    let cfg = config(
        EntropyKind::Ans0,
        &[TransformKind::Lz],
        1 << 14,
        2,
    );
    let mut writer = CompressedWriter::new(Vec::new(), cfg).unwrap();
    // Odd-sized writes land on block boundaries mid-chunk.
    for chunk in data.chunks(1234) {
        writer.write_all(chunk).unwrap();
    }
    writer.close().unwrap();
    let packed = writer.into_inner().unwrap();

    let mut reader = CompressedReader::new(Cursor::new(packed), 3).unwrap();
    let mut back = Vec::new();
    let mut buf = [0u8; 777];
    loop {
        let n = reader.read(&mut buf).unwrap();
        if n == 0 {
            break;
        }
        back.extend_from_slice(&buf[..n]);
    }
    assert_eq!(back, data);
}

#[test]
fn test_small_trailing_block() {
    // A final partial block under 16 bytes takes the copy path.
    let mut data = mixed_payload(1 << 16, 43);
    data.extend_from_slice(b"tail");
    let cfg = config(EntropyKind::Huffman, &[TransformKind::Lz], 1 << 16, 2);
    let packed = compress(&data, &cfg).unwrap();
    assert_eq!(decompress(&packed).unwrap(), data);
}

#[test]
fn test_incompressible_data_roundtrips() {
    let mut rng = ChaCha8Rng::seed_from_u64(47);
    let data: Vec<u8> = (0..200_000).map(|_| rng.r#gen()).collect();
    let cfg = WriterConfig {
        checksum: true,
        block_size: 1 << 16,
        jobs: 4,
        ..WriterConfig::default()
    };
    let packed = compress(&data, &cfg).unwrap();
    assert_eq!(decompress_with_jobs(&packed, 4).unwrap(), data);
}

#[test]
fn test_write_after_close_fails() {
    let mut writer = CompressedWriter::new(Vec::new(), WriterConfig::default()).unwrap();
    writer.write_bytes(b"data").unwrap();
    writer.close().unwrap();
    assert!(writer.write_bytes(b"more").is_err());
}

#[test]
fn test_garbage_stream_rejected() {
    assert!(decompress(b"").is_err());
    assert!(decompress(&[0u8; 64]).is_err());
    assert!(decompress(b"CKZ1 but not really a stream").is_err());
}
