//! A file: a chain of blocks presenting a seekable byte stream.
//!
//! The chain is held as an ordered list of [`FileBlock`]s; on disk it is
//! linked by each block's next-index, terminated by a block that points at
//! itself.  Opening walks the chain once, summing per-block sizes into the
//! file size — the two are equal by invariant.
//!
//! Write semantics:
//! - **Append** (also `WriteOnly` and post-truncate): bytes land at
//!   end-of-file; when the tail block reaches 4084 payload bytes a fresh
//!   block is allocated and the chain grows.  Next-pointers are wired
//!   lazily at [`BlockFile::flush`] rather than on every allocation.
//! - **Overwrite**: bytes replace payload in place at the cursor.  Reaching
//!   end-of-file transitions the mode to append, so an overwrite that
//!   crosses EOF extends the file instead of truncating it.  This
//!   transition is an observable part of the contract.
//!
//! Seeking out of range (past EOF) is rejected without changing state.
//! `truncate` shrinks in place and returns every dropped block to the
//! bitmap; growing zero-extends through the append path.

use std::cell::RefCell;
use std::io::SeekFrom;
use std::rc::Rc;

use crate::block::FileBlock;
use crate::container::Container;
use crate::error::{FsError, Result};
use crate::folder::EntryInfo;
use crate::superblock::BLOCK_PAYLOAD;

// ── Open modes ───────────────────────────────────────────────────────────────

/// Canonical open dispositions.
///
/// `Truncate` empties the file on open and then behaves as `Append`.
/// `WriteOnly` is append-positioned but refuses reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    ReadOnly,
    Append,
    WriteOnly,
    Overwrite,
    Truncate,
}

impl OpenMode {
    #[inline]
    pub fn readable(self) -> bool {
        self != OpenMode::WriteOnly
    }

    #[inline]
    pub fn writable(self) -> bool {
        self != OpenMode::ReadOnly
    }

    /// Modes whose writes always land at end-of-file.
    #[inline]
    fn append_positioned(self) -> bool {
        matches!(self, OpenMode::Append | OpenMode::WriteOnly | OpenMode::Truncate)
    }

    /// The mode individual blocks are opened with.
    fn block_mode(self) -> OpenMode {
        match self {
            OpenMode::Truncate => OpenMode::Append,
            other => other,
        }
    }
}

// ── BlockFile ────────────────────────────────────────────────────────────────

pub struct BlockFile {
    name:        String,
    size:        u64,
    blocks:      Vec<FileBlock>,
    block_index: usize,
    pos:         u64,
    mode:        OpenMode,
    /// Cached entry info in the owning folder, kept in sync with the size.
    info_sync:   Option<Rc<RefCell<EntryInfo>>>,
}

impl BlockFile {
    // ── Construction ─────────────────────────────────────────────────────────

    /// Create a fresh file with one empty start block, open for append.
    pub fn create(io: &mut Container, name: &str) -> Result<BlockFile> {
        Self::create_inner(io, name, false)
    }

    /// As [`BlockFile::create`], but the start block is forced to the
    /// container's configured root block.  Used only while planting a root
    /// folder.
    pub(crate) fn create_root(io: &mut Container, name: &str) -> Result<BlockFile> {
        Self::create_inner(io, name, true)
    }

    fn create_inner(io: &mut Container, name: &str, enforce_root: bool) -> Result<BlockFile> {
        let block = io.allocate_writable(enforce_root)?;
        Ok(BlockFile {
            name: name.to_owned(),
            size: 0,
            blocks: vec![block],
            block_index: 0,
            pos: 0,
            mode: OpenMode::Append,
            info_sync: None,
        })
    }

    /// Open an existing file by start block, walking the chain to the
    /// self-pointing terminal block.
    pub fn open(
        io: &mut Container,
        name: &str,
        start_block: u64,
        mode: OpenMode,
    ) -> Result<BlockFile> {
        let mut blocks = Vec::new();
        let mut size = 0u64;
        let mut current = start_block;
        loop {
            let block = io.open_block(current, mode.block_mode())?;
            size += block.bytes_written() as u64;
            let next = block.next();
            let own = block.index();
            blocks.push(block);
            if next == own {
                break;
            }
            if blocks.len() as u64 > io.blocks() {
                return Err(FsError::corrupt(format!(
                    "block chain starting at {start_block} does not terminate"
                )));
            }
            current = next;
        }

        let mut file = BlockFile {
            name: name.to_owned(),
            size,
            blocks,
            block_index: 0,
            pos: 0,
            mode: mode.block_mode(),
            info_sync: None,
        };

        match mode {
            OpenMode::Truncate => file.truncate(io, 0)?,
            OpenMode::Append | OpenMode::WriteOnly => {
                file.seek(SeekFrom::End(0))?;
            }
            _ => {}
        }
        Ok(file)
    }

    // ── Accessors ────────────────────────────────────────────────────────────

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn size(&self) -> u64 {
        self.size
    }

    #[inline]
    pub fn tell(&self) -> u64 {
        self.pos
    }

    /// Start block index.  Zero only for a file whose chain was unlinked.
    #[inline]
    pub fn start_block(&self) -> u64 {
        self.blocks.first().map_or(0, |b| b.index())
    }

    /// Register the owning folder's cached entry info; its `size` field
    /// tracks every size change from here on.
    pub(crate) fn set_info_sync(&mut self, info: Rc<RefCell<EntryInfo>>) {
        self.info_sync = Some(info);
    }

    fn sync_info(&self) {
        if let Some(info) = &self.info_sync {
            info.borrow_mut().size = self.size;
        }
    }

    // ── Reading ──────────────────────────────────────────────────────────────

    /// Read into `buf`, clamped to `size - position`.  Returns bytes read.
    pub fn read(&mut self, io: &mut Container, buf: &mut [u8]) -> Result<usize> {
        if !self.mode.readable() {
            return Err(FsError::NotReadable);
        }
        let want = (buf.len() as u64).min(self.size - self.pos) as usize;
        let mut copied = 0usize;
        while copied < want {
            let blk = &self.blocks[self.block_index];
            let avail = blk.bytes_written().saturating_sub(blk.tell()) as usize;
            if avail == 0 {
                if self.block_index + 1 >= self.blocks.len() {
                    break;
                }
                self.block_index += 1;
                self.blocks[self.block_index].seek(0);
                continue;
            }
            let n = avail.min(want - copied);
            let got = self.blocks[self.block_index].read(io, &mut buf[copied..copied + n])?;
            copied += got;
            self.pos += got as u64;
        }
        Ok(copied)
    }

    // ── Writing ──────────────────────────────────────────────────────────────

    /// Write all of `buf` at the current position, growing the chain as
    /// needed.  Returns `buf.len()`.
    pub fn write(&mut self, io: &mut Container, buf: &[u8]) -> Result<usize> {
        if !self.mode.writable() {
            return Err(FsError::NotWritable);
        }
        if self.mode.append_positioned() && self.pos != self.size {
            self.seek(SeekFrom::End(0))?;
        }

        let total = buf.len();
        let mut rest = buf;
        while !rest.is_empty() {
            // the observable overwrite→append transition at EOF
            if self.mode == OpenMode::Overwrite && self.pos == self.size {
                self.mode = OpenMode::Append;
            }
            let appending = self.mode != OpenMode::Overwrite;

            self.ensure_writable_block(io)?;
            let blk = &mut self.blocks[self.block_index];
            let room = (BLOCK_PAYLOAD as u32 - blk.tell()) as usize;
            let mut n = rest.len().min(room);
            if !appending {
                // stop at EOF so the transition happens at the loop head
                n = n.min((self.size - self.pos) as usize);
            }
            blk.write(io, &rest[..n])?;
            if appending {
                self.size += n as u64;
            }
            self.pos += n as u64;
            rest = &rest[n..];
        }
        self.sync_info();
        Ok(total)
    }

    /// Position the cursor on a block with room to write.
    fn ensure_writable_block(&mut self, io: &mut Container) -> Result<()> {
        if self.blocks.is_empty() {
            // only reachable through a previously unlinked file
            let block = io.allocate_writable(false)?;
            self.blocks.push(block);
            self.block_index = 0;
            return Ok(());
        }
        if (self.blocks[self.block_index].tell() as u64) < BLOCK_PAYLOAD {
            return Ok(());
        }
        if self.block_index + 1 < self.blocks.len() {
            // exhausted an interior block while overwriting
            self.block_index += 1;
            self.blocks[self.block_index].seek(0);
            return Ok(());
        }
        // tail is full: grow the chain; the next-pointer is wired at flush
        let block = io.allocate_writable(false)?;
        self.blocks.push(block);
        self.block_index = self.blocks.len() - 1;
        Ok(())
    }

    // ── Seeking ──────────────────────────────────────────────────────────────

    /// Seek within `[0, size]`.  Out-of-range positions are rejected without
    /// changing state.
    pub fn seek(&mut self, from: SeekFrom) -> Result<u64> {
        let target = match from {
            SeekFrom::Start(o) => o as i128,
            SeekFrom::Current(d) => self.pos as i128 + d as i128,
            SeekFrom::End(d) => self.size as i128 + d as i128,
        };
        if target < 0 || target as u64 > self.size {
            return Err(FsError::SeekOutOfRange);
        }
        let target = target as u64;

        if self.blocks.is_empty() {
            self.pos = 0;
            return Ok(0);
        }

        let (bi, within) = Self::locate(target, self.blocks.len());
        self.block_index = bi;
        self.blocks[bi].seek(within);
        self.pos = target;
        Ok(target)
    }

    /// Map a byte position to (block index in list, offset within payload).
    /// A position exactly at a full tail lands at `(last, 4084)` rather than
    /// one block past the end.
    fn locate(pos: u64, nblocks: usize) -> (usize, u32) {
        let mut bi = (pos / BLOCK_PAYLOAD) as usize;
        let mut within = (pos % BLOCK_PAYLOAD) as u32;
        if bi > 0 && within == 0 && bi == nblocks {
            bi -= 1;
            within = BLOCK_PAYLOAD as u32;
        }
        (bi, within)
    }

    // ── Truncation ───────────────────────────────────────────────────────────

    /// Resize to `new_size`.  Shrinking drops and unlinks every block after
    /// the new tail; growing zero-extends through the append path.
    pub fn truncate(&mut self, io: &mut Container, new_size: u64) -> Result<()> {
        if !self.mode.writable() {
            return Err(FsError::NotWritable);
        }
        if new_size == self.size {
            return Ok(());
        }
        if new_size > self.size {
            return self.zero_extend(io, new_size);
        }

        let (last, within) = if new_size == 0 {
            (0usize, 0u32)
        } else {
            let left_over = new_size % BLOCK_PAYLOAD;
            if left_over == 0 {
                ((new_size / BLOCK_PAYLOAD - 1) as usize, BLOCK_PAYLOAD as u32)
            } else {
                ((new_size / BLOCK_PAYLOAD) as usize, left_over as u32)
            }
        };

        let own = self.blocks[last].index();
        self.blocks[last].set_size(io, within)?;
        self.blocks[last].set_next(io, own)?;
        for mut dropped in self.blocks.split_off(last + 1) {
            dropped.unlink(io)?;
        }

        self.size = new_size;
        let pos = self.pos.min(new_size);
        self.seek(SeekFrom::Start(pos))?;
        self.sync_info();
        Ok(())
    }

    fn zero_extend(&mut self, io: &mut Container, new_size: u64) -> Result<()> {
        let saved_mode = self.mode;
        let saved_pos = self.pos;
        self.mode = OpenMode::Append;

        let zeroes = [0u8; BLOCK_PAYLOAD as usize];
        let mut remaining = new_size - self.size;
        while remaining > 0 {
            let n = remaining.min(zeroes.len() as u64) as usize;
            self.write(io, &zeroes[..n])?;
            remaining -= n as u64;
        }

        self.mode = saved_mode;
        self.seek(SeekFrom::Start(saved_pos.min(self.size)))?;
        Ok(())
    }

    // ── Lifecycle ────────────────────────────────────────────────────────────

    /// Persist the chain's next-pointers and flush the backing file.  Wiring
    /// is deferred to here so appends do not rewrite headers per block.
    pub fn flush(&mut self, io: &mut Container) -> Result<()> {
        for i in 0..self.blocks.len().saturating_sub(1) {
            let next_index = self.blocks[i + 1].index();
            if self.blocks[i].next() != next_index {
                self.blocks[i].set_next(io, next_index)?;
            }
        }
        io.stream.flush()
    }

    /// Return every block to the bitmap and reset to an empty, chainless
    /// file.  Used by the owning folder on deletion.
    pub fn unlink(&mut self, io: &mut Container) -> Result<()> {
        for block in &mut self.blocks {
            block.unlink(io)?;
        }
        self.blocks.clear();
        self.size = 0;
        self.pos = 0;
        self.block_index = 0;
        self.sync_info();
        Ok(())
    }
}
