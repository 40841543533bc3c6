//! On-disk format checks: header codec, layout math, and the volume bitmap
//! as seen through a raw encrypted stream — independent of the folder layer.

mod common;

use std::io::{Read, Seek, SeekFrom};

use tempfile::TempDir;
use vaultfs::builder::BlockBuilder;
use vaultfs::crypto::KdfParams;
use vaultfs::stream::ImageStream;
use vaultfs::superblock::{
    self, bitmap_bytes, block_offset, blocks_begin, Header, BITMAP_OFFSET, BLOCK_SIZE,
    HEADER_BYTES,
};
use vaultfs::transformer::{CipherId, EncryptionProperties};
use vaultfs::{CreateOptions, EventSink, Vault};

fn null_props() -> EncryptionProperties {
    EncryptionProperties {
        password: common::PASSWORD.into(),
        iv:       [1, 2, 3, 4],
        cipher:   CipherId::None,
        kdf:      KdfParams { log_n: 8, r: 8, p: 1 },
    }
}

/// Open the raw encrypted stream of an existing pass-through image.
fn raw_stream(path: &std::path::Path) -> ImageStream {
    let file = std::fs::OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .unwrap();
    ImageStream::from_file(file, null_props(), EventSink::none())
}

#[test]
fn header_round_trips_through_its_codec() {
    let header = Header {
        iv:            [0xdead_beef, 42, u64::MAX, 7],
        rounds:        64,
        cipher:        CipherId::Twofish,
        password_hash: [0xAB; 32],
    };
    let mut buf = Vec::new();
    header.write_to(&mut buf).unwrap();
    assert_eq!(buf.len(), HEADER_BYTES as usize);
    // the id byte is repeated seven times at offset 33
    assert!(buf[33..40].iter().all(|&b| b == CipherId::Twofish.id_byte()));

    let back = Header::read_from(&mut &buf[..]).unwrap();
    assert_eq!(back.iv, header.iv);
    assert_eq!(back.rounds, 64);
    assert_eq!(back.cipher, CipherId::Twofish);
    assert_eq!(back.password_hash, header.password_hash);
}

#[test]
fn damaged_cipher_id_bytes_are_rejected() {
    let header = Header {
        iv:            [0; 4],
        rounds:        64,
        cipher:        CipherId::Aes,
        password_hash: [0; 32],
    };
    let mut buf = Vec::new();
    header.write_to(&mut buf).unwrap();
    buf[35] ^= 0xFF;
    assert!(Header::read_from(&mut &buf[..]).is_err());
}

#[test]
fn layout_offsets_follow_the_documented_formula() {
    // blocks begin after header, block count, bitmap, and the legacy count
    assert_eq!(blocks_begin(2048), 72 + 8 + 2048 / 8 + 8);
    assert_eq!(bitmap_bytes(2048), 256);
    assert_eq!(
        block_offset(5, 2048),
        blocks_begin(2048) + 5 * BLOCK_SIZE
    );
}

#[test]
fn bitmap_bits_round_trip_through_the_stream() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bitmap.vault");
    let opts = CreateOptions {
        blocks: 64,
        cipher: CipherId::None,
        kdf: common::test_kdf(),
        ..Default::default()
    };
    drop(Vault::create(&path, common::PASSWORD, &opts).unwrap());

    let mut stream = raw_stream(&path);

    // block 0 is the root folder; everything else is free
    assert!(superblock::is_in_use(&mut stream, 64, 0).unwrap());
    assert!(!superblock::is_in_use(&mut stream, 64, 1).unwrap());
    assert_eq!(superblock::count_allocated(&mut stream, 64).unwrap(), 1);
    assert_eq!(superblock::next_free(&mut stream, 64).unwrap(), Some(1));

    // flip a scattering of bits and read the aggregate views back
    for index in [1u64, 9, 17, 63] {
        superblock::set_in_use(&mut stream, 64, index, true).unwrap();
    }
    assert_eq!(superblock::count_allocated(&mut stream, 64).unwrap(), 5);
    assert_eq!(superblock::next_free(&mut stream, 64).unwrap(), Some(2));
    let free = superblock::first_n_free(&mut stream, 64, 4).unwrap();
    assert_eq!(free, vec![2, 3, 4, 5]);

    superblock::set_in_use(&mut stream, 64, 9, false).unwrap();
    assert!(!superblock::is_in_use(&mut stream, 64, 9).unwrap());
    assert_eq!(superblock::count_allocated(&mut stream, 64).unwrap(), 4);

    // out-of-range indices are structural errors, not silent wraps
    assert!(superblock::is_in_use(&mut stream, 64, 64).is_err());
    assert!(superblock::set_in_use(&mut stream, 64, 64, true).is_err());
}

#[test]
fn a_full_bitmap_reports_no_free_blocks() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("full.vault");
    let opts = CreateOptions {
        blocks: 8,
        cipher: CipherId::None,
        kdf: common::test_kdf(),
        ..Default::default()
    };
    drop(Vault::create(&path, common::PASSWORD, &opts).unwrap());

    let mut stream = raw_stream(&path);
    for index in 0..8 {
        superblock::set_in_use(&mut stream, 8, index, true).unwrap();
    }
    assert_eq!(superblock::next_free(&mut stream, 8).unwrap(), None);
    assert!(superblock::first_n_free(&mut stream, 8, 3).unwrap().is_empty());
}

#[test]
fn builder_seeds_free_indices_in_ascending_order() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("seed.vault");
    let opts = CreateOptions {
        blocks: 32,
        cipher: CipherId::None,
        kdf: common::test_kdf(),
        ..Default::default()
    };
    drop(Vault::create(&path, common::PASSWORD, &opts).unwrap());

    let mut stream = raw_stream(&path);
    superblock::set_in_use(&mut stream, 32, 4, true).unwrap();

    let mut builder = BlockBuilder::seed(&mut stream, 32).unwrap();
    // 0 (root) and 4 are allocated; allocation walks upward around them
    assert_eq!(builder.pop_free(), Some(1));
    assert_eq!(builder.pop_free(), Some(2));
    assert_eq!(builder.pop_free(), Some(3));
    assert_eq!(builder.pop_free(), Some(5));

    // releases come back first (LIFO)
    builder.release(2);
    assert_eq!(builder.pop_free(), Some(2));
    assert_eq!(builder.pop_free(), Some(6));
}

#[test]
fn the_stored_block_count_sits_at_offset_72() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("count.vault");
    let opts = CreateOptions {
        blocks: 2048,
        cipher: CipherId::None,
        kdf: common::test_kdf(),
        ..Default::default()
    };
    drop(Vault::create(&path, common::PASSWORD, &opts).unwrap());

    // pass-through cipher: the raw big-endian u64 is readable directly
    let mut raw = std::fs::File::open(&path).unwrap();
    raw.seek(SeekFrom::Start(HEADER_BYTES)).unwrap();
    let mut buf = [0u8; 8];
    raw.read_exact(&mut buf).unwrap();
    assert_eq!(u64::from_be_bytes(buf), 2048);

    // and the bitmap follows immediately after
    assert_eq!(BITMAP_OFFSET, HEADER_BYTES + 8);
}
