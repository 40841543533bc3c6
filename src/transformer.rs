//! Cipher registry: frozen identifier bytes + uniform keystream transformers.
//!
//! # Identity rules
//! Every cipher is identified by a single byte, written seven times at header
//! offset 33.  The set is closed and the values are permanent:
//!
//! | id | cipher   | id | cipher   |
//! |----|----------|----|----------|
//! | 1  | AES-256  | 6  | CAST-256 |
//! | 2  | Twofish  | 7  | Camellia |
//! | 3  | Serpent  | 8  | RC5      |
//! | 4  | RC6      | 9  | SHACAL-2 |
//! | 5  | MARS     | 10 | NONE     |
//!
//! Zero is reserved so an all-zero header never decodes as a valid cipher.
//! An id this build cannot supply fails open with
//! [`CipherError::Unavailable`] — no negotiation, no fallback.  RC6, MARS
//! and RC5 are recognized but unavailable: no maintained implementation
//! exists in the RustCrypto block-cipher family this crate builds on.
//!
//! # Keystream addressing
//! All ciphers run in CTR mode with the keystream position equal to the
//! absolute byte offset in the image.  Every byte is therefore independently
//! addressable: a transformer seeks to the offset and XORs, so encrypt and
//! decrypt are the same operation and arbitrary seek+read/write needs no
//! block chaining.  `NONE` is a literal pass-through used for testing.
//!
//! There is no MAC anywhere in the format: a flipped ciphertext byte becomes
//! a flipped plaintext byte without detection.

use cipher::{Iv, Key, KeyIvInit, StreamCipher, StreamCipherSeek};
use thiserror::Error;

use crate::crypto::{derive_key, KdfParams};

// ── Cipher identifiers ───────────────────────────────────────────────────────

/// Closed set of supported cipher identifiers, keyed by the header id byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherId {
    Aes,
    Twofish,
    Serpent,
    Rc6,
    Mars,
    Cast256,
    Camellia,
    Rc5,
    Shacal2,
    /// Pass-through (testing only) — the image is stored in the clear.
    None,
}

impl CipherId {
    /// The frozen on-disk identifier byte.
    #[inline]
    pub fn id_byte(self) -> u8 {
        match self {
            CipherId::Aes      => 1,
            CipherId::Twofish  => 2,
            CipherId::Serpent  => 3,
            CipherId::Rc6      => 4,
            CipherId::Mars     => 5,
            CipherId::Cast256  => 6,
            CipherId::Camellia => 7,
            CipherId::Rc5      => 8,
            CipherId::Shacal2  => 9,
            CipherId::None     => 10,
        }
    }

    /// Resolve an id byte.  Returns `None` for anything outside the set.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1  => Some(CipherId::Aes),
            2  => Some(CipherId::Twofish),
            3  => Some(CipherId::Serpent),
            4  => Some(CipherId::Rc6),
            5  => Some(CipherId::Mars),
            6  => Some(CipherId::Cast256),
            7  => Some(CipherId::Camellia),
            8  => Some(CipherId::Rc5),
            9  => Some(CipherId::Shacal2),
            10 => Some(CipherId::None),
            _  => None,
        }
    }

    /// Human-readable name (diagnostics and CLI parsing).
    pub fn name(self) -> &'static str {
        match self {
            CipherId::Aes      => "aes",
            CipherId::Twofish  => "twofish",
            CipherId::Serpent  => "serpent",
            CipherId::Rc6      => "rc6",
            CipherId::Mars     => "mars",
            CipherId::Cast256  => "cast256",
            CipherId::Camellia => "camellia",
            CipherId::Rc5      => "rc5",
            CipherId::Shacal2  => "shacal2",
            CipherId::None     => "null",
        }
    }

    /// Parse a CLI string.  `null` and `none` both name the pass-through.
    pub fn from_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "aes"            => Some(CipherId::Aes),
            "twofish"        => Some(CipherId::Twofish),
            "serpent"        => Some(CipherId::Serpent),
            "rc6"            => Some(CipherId::Rc6),
            "mars"           => Some(CipherId::Mars),
            "cast256"        => Some(CipherId::Cast256),
            "camellia"       => Some(CipherId::Camellia),
            "rc5"            => Some(CipherId::Rc5),
            "shacal2"        => Some(CipherId::Shacal2),
            "null" | "none"  => Some(CipherId::None),
            _                => None,
        }
    }
}

// ── Encryption properties ────────────────────────────────────────────────────

/// Everything needed to build a transformer for one container.
#[derive(Clone)]
pub struct EncryptionProperties {
    pub password: String,
    /// The four 64-bit IV words from the header.  Word 0 doubles as the
    /// scrypt salt; concatenated big-endian they form the 256-bit cipher IV.
    pub iv:       [u64; 4],
    pub cipher:   CipherId,
    pub kdf:      KdfParams,
}

impl EncryptionProperties {
    /// The 256-bit IV: the four words concatenated big-endian.
    pub fn iv_bytes(&self) -> [u8; 32] {
        let mut out = [0u8; 32];
        for (i, word) in self.iv.iter().enumerate() {
            out[i * 8..i * 8 + 8].copy_from_slice(&word.to_be_bytes());
        }
        out
    }
}

// ── Error type ───────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum CipherError {
    /// The id is part of the format but this build carries no implementation.
    /// The container CANNOT be opened; there is no fallback.
    #[error("Cipher '{name}' is not available in this build — cannot open container")]
    Unavailable { name: String },
    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),
    #[error("Keystream error: {0}")]
    Keystream(String),
}

// ── Transformer trait ────────────────────────────────────────────────────────

/// Uniform interface over every cipher in the registry.
///
/// `transform` XORs the keystream for absolute image offset `start` into
/// `buf` in place.  CTR makes this its own inverse, so the same call serves
/// both encryption and decryption.
pub trait ByteTransformer {
    fn transform(&mut self, start: u64, buf: &mut [u8]) -> Result<(), CipherError>;
}

/// The `NONE` cipher: bytes pass through untouched.
pub struct NullTransformer;

impl ByteTransformer for NullTransformer {
    fn transform(&mut self, _start: u64, _buf: &mut [u8]) -> Result<(), CipherError> {
        Ok(())
    }
}

/// CTR keystream over any block cipher, addressed by image offset.
struct CtrTransformer<S> {
    inner: S,
}

impl<S> ByteTransformer for CtrTransformer<S>
where
    S: StreamCipher + StreamCipherSeek,
{
    fn transform(&mut self, start: u64, buf: &mut [u8]) -> Result<(), CipherError> {
        self.inner
            .try_seek(start)
            .map_err(|e| CipherError::Keystream(e.to_string()))?;
        self.inner
            .try_apply_keystream(buf)
            .map_err(|e| CipherError::Keystream(e.to_string()))?;
        Ok(())
    }
}

// ── Concrete cipher bindings ─────────────────────────────────────────────────

type AesCtr      = ctr::Ctr128BE<aes::Aes256>;
type TwofishCtr  = ctr::Ctr128BE<twofish::Twofish>;
type SerpentCtr  = ctr::Ctr128BE<serpent::Serpent>;
type Cast256Ctr  = ctr::Ctr128BE<cast6::Cast6>;
type CamelliaCtr = ctr::Ctr128BE<camellia::Camellia256>;
type Shacal2Ctr  = ctr::Ctr128BE<shacal2::Shacal2>;

/// Fit the 32-byte derived key and 32-byte IV to whatever sizes the concrete
/// cipher wants.  Shorter targets truncate; longer targets (SHACAL-2's
/// 512-bit key) are zero-padded on the right.
fn build_ctr<S>(key32: &[u8; 32], iv32: &[u8; 32]) -> CtrTransformer<S>
where
    S: KeyIvInit + StreamCipher + StreamCipherSeek,
{
    let mut key = Key::<S>::default();
    let kn = key.len().min(key32.len());
    key[..kn].copy_from_slice(&key32[..kn]);

    let mut iv = Iv::<S>::default();
    let ivn = iv.len().min(iv32.len());
    iv[..ivn].copy_from_slice(&iv32[..ivn]);

    CtrTransformer { inner: S::new(&key, &iv) }
}

// ── Factory ──────────────────────────────────────────────────────────────────

/// Build the transformer for a container, deriving the key as a side effect.
///
/// Key derivation is the slow step; callers are expected to invoke this
/// lazily (on first encrypt/decrypt) and at most once per container.  `NONE`
/// skips derivation entirely.
pub fn build_transformer(
    props: &EncryptionProperties,
) -> Result<Box<dyn ByteTransformer>, CipherError> {
    if props.cipher == CipherId::None {
        return Ok(Box::new(NullTransformer));
    }

    let key = derive_key(&props.password, props.iv[0], &props.kdf)?;
    let iv = props.iv_bytes();

    Ok(match props.cipher {
        CipherId::Aes      => Box::new(build_ctr::<AesCtr>(&key, &iv)),
        CipherId::Twofish  => Box::new(build_ctr::<TwofishCtr>(&key, &iv)),
        CipherId::Serpent  => Box::new(build_ctr::<SerpentCtr>(&key, &iv)),
        CipherId::Cast256  => Box::new(build_ctr::<Cast256Ctr>(&key, &iv)),
        CipherId::Camellia => Box::new(build_ctr::<CamelliaCtr>(&key, &iv)),
        CipherId::Shacal2  => Box::new(build_ctr::<Shacal2Ctr>(&key, &iv)),
        CipherId::Rc6 | CipherId::Mars | CipherId::Rc5 => {
            return Err(CipherError::Unavailable { name: props.cipher.name().to_owned() })
        }
        CipherId::None => unreachable!("handled above"),
    })
}
