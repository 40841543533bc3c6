//! The container handle: one open image, shared by every component.
//!
//! A [`Container`] owns the encrypted stream, the live free-block count, the
//! block builder and the configured root block.  File and folder objects
//! never own it — they borrow it per operation, which keeps ownership flat
//! and makes the single-opener contract explicit in the signatures.
//!
//! Creation formats the image (plaintext header, encrypted superblock
//! region, optionally every block slot) and plants the root folder at block
//! 0 — plus, for dual-volume images, a second hidden root at a caller-chosen
//! block index.  Opening verifies the password hash, reads the block count
//! and reseeds the builder from the bitmap.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use log::{debug, info};
use rand::rngs::OsRng;
use rand::RngCore;

use crate::block::FileBlock;
use crate::builder::BlockBuilder;
use crate::crypto::{hash_password, KdfParams};
use crate::error::{FsError, Result};
use crate::event::EventSink;
use crate::file::OpenMode;
use crate::folder::compound::CompoundFolder;
use crate::stream::ImageStream;
use crate::superblock::{self, Header, BLOCK_SIZE, LEGACY_ROUNDS};
use crate::transformer::{CipherId, EncryptionProperties};

// ── Options ──────────────────────────────────────────────────────────────────

/// Configuration for [`Container::create`].
#[derive(Debug, Clone)]
pub struct CreateOptions {
    /// Total number of 4096-byte blocks.  Must be a positive multiple of 8.
    pub blocks:      u64,
    pub cipher:      CipherId,
    /// Sparse images skip writing the block-slot array at creation; slots
    /// are materialized on first touch.  Chosen at creation, never at
    /// runtime, and incompatible with `hidden_root`.
    pub sparse:      bool,
    /// When set, a second root folder is planted at this block index.  The
    /// resulting sub-volume is opened by passing the same index in
    /// [`OpenOpts::root_block`].
    pub hidden_root: Option<u64>,
    pub kdf:         KdfParams,
}

impl Default for CreateOptions {
    fn default() -> Self {
        CreateOptions {
            blocks:      8192,
            cipher:      CipherId::Aes,
            sparse:      false,
            hidden_root: None,
            kdf:         KdfParams::default(),
        }
    }
}

/// Configuration for [`Container::open`].
#[derive(Debug, Clone)]
pub struct OpenOpts {
    /// Root folder start block: 0 for the main volume, or the hidden-volume
    /// index chosen at creation.
    pub root_block: u64,
    /// Must match the parameters used at creation (they are not stored).
    pub kdf:        KdfParams,
}

impl Default for OpenOpts {
    fn default() -> Self {
        OpenOpts { root_block: 0, kdf: KdfParams::default() }
    }
}

// ── Container ────────────────────────────────────────────────────────────────

pub struct Container {
    path:                   PathBuf,
    pub(crate) stream:      ImageStream,
    blocks:                 u64,
    pub(crate) free_blocks: u64,
    root_block:             u64,
    pub(crate) builder:     BlockBuilder,
    sparse:                 bool,
}

impl Container {
    // ── Creation ─────────────────────────────────────────────────────────────

    /// Build a fresh image at `path` and plant its root folder(s).
    pub fn create<P: AsRef<Path>>(
        path: P,
        password: &str,
        opts: &CreateOptions,
        events: EventSink,
    ) -> Result<Container> {
        let path = path.as_ref().to_owned();
        let blocks = opts.blocks;

        if blocks == 0 || blocks % 8 != 0 {
            return Err(FsError::Unsupported(
                "block count must be a positive multiple of 8",
            ));
        }
        if opts.sparse && opts.hidden_root.is_some() {
            return Err(FsError::Unsupported(
                "sparse images cannot carry a hidden volume",
            ));
        }
        if let Some(hidden) = opts.hidden_root {
            if hidden == 0 || hidden >= blocks {
                return Err(FsError::Unsupported(
                    "hidden root block must be inside the image and not block 0",
                ));
            }
        }

        // IV words come from the OS entropy pool; word 0 doubles as the
        // scrypt salt.
        let mut iv = [0u64; 4];
        for word in iv.iter_mut() {
            *word = OsRng.next_u64();
        }

        let header = Header {
            iv,
            rounds: LEGACY_ROUNDS,
            cipher: opts.cipher,
            password_hash: hash_password(password),
        };

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;
        header.write_to(&mut file)?;

        let props = EncryptionProperties {
            password: password.to_owned(),
            iv,
            cipher: opts.cipher,
            kdf: opts.kdf,
        };
        let mut stream = ImageStream::from_file(file, props, events.clone());

        superblock::format_image(&mut stream, blocks, opts.sparse, &events)?;
        let builder = BlockBuilder::seed(&mut stream, blocks)?;

        let mut io = Container {
            path,
            stream,
            blocks,
            free_blocks: blocks,
            root_block: 0,
            builder,
            sparse: opts.sparse,
        };

        CompoundFolder::create(&mut io, "/", true)?;
        if let Some(hidden) = opts.hidden_root {
            io.root_block = hidden;
            CompoundFolder::create(&mut io, "/", true)?;
            io.root_block = 0;
        }
        io.stream.flush()?;

        info!(
            "created image {} ({} blocks, cipher {}, sparse {})",
            io.path.display(),
            blocks,
            opts.cipher.name(),
            opts.sparse,
        );
        Ok(io)
    }

    // ── Opening ──────────────────────────────────────────────────────────────

    /// Open an existing image.  The password is checked against the stored
    /// SHA-256 before any encrypted byte is touched; a mismatch is reported
    /// as corruption, indistinguishable from a tampered header.
    pub fn open<P: AsRef<Path>>(
        path: P,
        password: &str,
        opts: &OpenOpts,
        events: EventSink,
    ) -> Result<Container> {
        let path = path.as_ref().to_owned();
        let mut file = OpenOptions::new().read(true).write(true).open(&path)?;

        let header = Header::read_from(&mut file)?;
        if hash_password(password) != header.password_hash {
            return Err(FsError::corrupt("password verification failed"));
        }

        let props = EncryptionProperties {
            password: password.to_owned(),
            iv: header.iv,
            cipher: header.cipher,
            kdf: opts.kdf,
        };
        let mut stream = ImageStream::from_file(file, props, events);

        let blocks = superblock::read_block_count(&mut stream)?;
        if blocks == 0 || blocks % 8 != 0 || blocks > u64::MAX / BLOCK_SIZE {
            return Err(FsError::corrupt(format!("implausible block count {blocks}")));
        }
        if stream.len()? < superblock::blocks_begin(blocks) {
            return Err(FsError::corrupt("image is shorter than its superblock"));
        }
        if opts.root_block >= blocks {
            return Err(FsError::corrupt("root block index out of range"));
        }

        let allocated = superblock::count_allocated(&mut stream, blocks)?;
        let builder = BlockBuilder::seed(&mut stream, blocks)?;
        let sparse = stream.len()? < superblock::blocks_begin(blocks) + blocks * BLOCK_SIZE;

        debug!(
            "opened image {} ({} blocks, {} allocated, cipher {})",
            path.display(),
            blocks,
            allocated,
            header.cipher.name(),
        );

        Ok(Container {
            path,
            stream,
            blocks,
            free_blocks: blocks - allocated,
            root_block: opts.root_block,
            builder,
            sparse,
        })
    }

    // ── Accessors ────────────────────────────────────────────────────────────

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[inline]
    pub fn blocks(&self) -> u64 {
        self.blocks
    }

    #[inline]
    pub fn free_blocks(&self) -> u64 {
        self.free_blocks
    }

    #[inline]
    pub fn root_block(&self) -> u64 {
        self.root_block
    }

    #[inline]
    pub fn is_sparse(&self) -> bool {
        self.sparse
    }

    /// First unallocated block per the bitmap, or `None` when full.
    pub fn next_free_block(&mut self) -> Result<Option<u64>> {
        superblock::next_free(&mut self.stream, self.blocks)
    }

    /// Count of allocated blocks per the bitmap (popcount, not the cached
    /// free counter).
    pub fn count_allocated(&mut self) -> Result<u64> {
        superblock::count_allocated(&mut self.stream, self.blocks)
    }

    pub fn flush(&mut self) -> Result<()> {
        self.stream.flush()
    }

    // ── Block factory ────────────────────────────────────────────────────────

    /// Hand out a writable block: the front of the freelist, or the
    /// configured root block when `enforce_root` is set (used only while
    /// planting a root folder).  Sparse slots are materialized before use,
    /// and the block is registered in the bitmap.
    pub(crate) fn allocate_writable(&mut self, enforce_root: bool) -> Result<FileBlock> {
        let index = if enforce_root {
            self.builder.take_index(self.root_block);
            self.root_block
        } else {
            self.builder.pop_free().ok_or(FsError::ImageFull)?
        };
        self.builder.materialize(&mut self.stream, self.blocks, index)?;

        let mut block = FileBlock::create(self, index, OpenMode::Append)?;
        block.register(self)?;
        Ok(block)
    }

    /// Construct a block over an existing, in-use index without touching the
    /// allocator.
    pub(crate) fn open_block(&mut self, index: u64, mode: OpenMode) -> Result<FileBlock> {
        FileBlock::open(self, index, mode)
    }
}
