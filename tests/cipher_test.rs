//! Keystream transformer properties: round-trip identity at arbitrary
//! offsets, offset addressability, and the closed identifier set.

use proptest::prelude::*;
use vaultfs::crypto::KdfParams;
use vaultfs::transformer::{build_transformer, CipherError, CipherId, EncryptionProperties};

fn props_with(cipher: CipherId, log_n: u8) -> EncryptionProperties {
    EncryptionProperties {
        password: "test password".into(),
        iv: [
            0x0123_4567_89ab_cdef,
            0xfedc_ba98_7654_3210,
            0x0011_2233_4455_6677,
            0x8899_aabb_ccdd_eeff,
        ],
        cipher,
        kdf: KdfParams { log_n, r: 8, p: 1 },
    }
}

fn props(cipher: CipherId) -> EncryptionProperties {
    props_with(cipher, 12)
}

const BACKED: [CipherId; 6] = [
    CipherId::Aes,
    CipherId::Twofish,
    CipherId::Serpent,
    CipherId::Cast256,
    CipherId::Camellia,
    CipherId::Shacal2,
];

#[test]
fn every_backed_cipher_round_trips_at_arbitrary_offsets() {
    let original: Vec<u8> = (0..4096u32).map(|i| (i % 251) as u8).collect();
    for cipher in BACKED {
        let mut t = build_transformer(&props(cipher)).unwrap();
        for offset in [0u64, 1, 15, 16, 17, 4083, 4084, 1 << 20, (1 << 32) + 5] {
            let mut buf = original.clone();
            t.transform(offset, &mut buf).unwrap();
            assert_ne!(
                buf,
                original,
                "{} produced an identity keystream at offset {offset}",
                cipher.name()
            );
            t.transform(offset, &mut buf).unwrap();
            assert_eq!(buf, original, "{} failed to round-trip", cipher.name());
        }
    }
}

#[test]
fn keystream_is_offset_addressable() {
    // transforming one range must equal transforming it piecewise
    let data: Vec<u8> = (0..2000u32).map(|i| (i * 7 % 256) as u8).collect();
    for cipher in BACKED {
        let mut t = build_transformer(&props(cipher)).unwrap();

        let mut whole = data.clone();
        t.transform(100, &mut whole).unwrap();

        let mut parts = data.clone();
        t.transform(100, &mut parts[..37]).unwrap();
        t.transform(137, &mut parts[37..1000]).unwrap();
        t.transform(1100, &mut parts[1000..]).unwrap();

        assert_eq!(whole, parts, "{} keystream is position-dependent", cipher.name());
    }
}

#[test]
fn transformers_from_identical_properties_agree() {
    let data = vec![0xA5u8; 512];
    let mut a = build_transformer(&props(CipherId::Aes)).unwrap();
    let mut b = build_transformer(&props(CipherId::Aes)).unwrap();
    let mut x = data.clone();
    let mut y = data.clone();
    a.transform(9999, &mut x).unwrap();
    b.transform(9999, &mut y).unwrap();
    assert_eq!(x, y);
}

#[test]
fn different_iv_words_change_the_keystream() {
    let data = vec![0u8; 256];
    let mut base = props(CipherId::Aes);
    let mut a = build_transformer(&base).unwrap();
    base.iv[3] ^= 1;
    let mut b = build_transformer(&base).unwrap();

    let mut x = data.clone();
    let mut y = data;
    a.transform(0, &mut x).unwrap();
    b.transform(0, &mut y).unwrap();
    assert_ne!(x, y);
}

#[test]
fn null_cipher_is_a_passthrough() {
    let mut t = build_transformer(&props(CipherId::None)).unwrap();
    let mut buf = b"plainly visible".to_vec();
    t.transform(12345, &mut buf).unwrap();
    assert_eq!(buf, b"plainly visible");
}

#[test]
fn unavailable_ciphers_fail_open() {
    for cipher in [CipherId::Rc5, CipherId::Rc6, CipherId::Mars] {
        match build_transformer(&props(cipher)) {
            Err(CipherError::Unavailable { name }) => assert_eq!(name, cipher.name()),
            other => panic!("expected Unavailable for {}, got {:?}", cipher.name(), other.is_ok()),
        }
    }
}

#[test]
fn cipher_id_bytes_round_trip() {
    for byte in 0u8..=255 {
        if let Some(id) = CipherId::from_byte(byte) {
            assert_eq!(id.id_byte(), byte);
            assert_eq!(CipherId::from_name(id.name()), Some(id));
        }
    }
    assert_eq!(CipherId::from_byte(0), None);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn aes_round_trips_for_random_ranges(
        offset in 0u64..100_000_000,
        data in prop::collection::vec(any::<u8>(), 1..2048),
    ) {
        let mut t = build_transformer(&props_with(CipherId::Aes, 8)).unwrap();
        let mut buf = data.clone();
        t.transform(offset, &mut buf).unwrap();
        t.transform(offset, &mut buf).unwrap();
        prop_assert_eq!(buf, data);
    }
}
