//! One 4096-byte block slot: 12-byte header + 4084-byte payload.
//!
//! # Slot layout (big-endian)
//!
//! ```text
//! offset  size  field
//! 0       4     bytes_written   payload bytes in use (u32, <= 4084)
//! 4       8     next_index      next block in the chain (u64)
//! 12      4084  payload
//! ```
//!
//! A block whose `next_index` equals its own index is the end of its chain.
//! A fresh block persists `bytes_written = 0, next = own index` immediately,
//! so every allocated slot on disk always carries a valid header.
//!
//! The in-memory cursor (`seek_pos`) addresses the payload region only;
//! reads and writes are clamped to it.  Registration and unlinking keep the
//! volume bitmap, the free-block count and the builder's freelist in step:
//! every `register` is paired with exactly one `unlink`.

use crate::container::Container;
use crate::error::{FsError, Result};
use crate::file::OpenMode;
use crate::superblock::{self, BLOCK_META, BLOCK_PAYLOAD};

#[derive(Debug, Clone)]
pub struct FileBlock {
    index:         u64,
    /// Byte offset of the slot in the image (derived from `index`).
    offset:        u64,
    bytes_written: u32,
    next:          u64,
    /// Cursor within the payload region, `0..=4084`.
    seek_pos:      u32,
    mode:          OpenMode,
}

impl FileBlock {
    // ── Construction ─────────────────────────────────────────────────────────

    /// Bind a brand-new block to `index` and persist its initial header
    /// (`bytes_written = 0`, `next = index`).  Does not touch the bitmap;
    /// callers pair this with [`FileBlock::register`].
    pub fn create(io: &mut Container, index: u64, mode: OpenMode) -> Result<FileBlock> {
        let offset = superblock::block_offset(index, io.blocks());
        let mut block = FileBlock {
            index,
            offset,
            bytes_written: 0,
            next: index,
            seek_pos: 0,
            mode,
        };
        block.persist_size(io, 0)?;
        block.persist_next(io, index)?;
        Ok(block)
    }

    /// Open an existing, in-use block and parse its header.
    pub fn open(io: &mut Container, index: u64, mode: OpenMode) -> Result<FileBlock> {
        let blocks = io.blocks();
        if index >= blocks {
            return Err(FsError::corrupt(format!(
                "file block index {index} out of range"
            )));
        }
        let offset = superblock::block_offset(index, blocks);

        let mut header = [0u8; BLOCK_META as usize];
        io.stream.seek_get(offset);
        io.stream.read(&mut header)?;

        let bytes_written = u32::from_be_bytes(header[0..4].try_into().unwrap());
        let next = u64::from_be_bytes(header[4..12].try_into().unwrap());

        if bytes_written as u64 > BLOCK_PAYLOAD {
            return Err(FsError::corrupt(format!(
                "block {index} claims {bytes_written} payload bytes"
            )));
        }
        if next >= blocks {
            return Err(FsError::corrupt(format!(
                "block {index} points past the end of the image (next = {next})"
            )));
        }

        Ok(FileBlock {
            index,
            offset,
            bytes_written,
            next,
            seek_pos: 0,
            mode,
        })
    }

    // ── Accessors ────────────────────────────────────────────────────────────

    #[inline]
    pub fn index(&self) -> u64 {
        self.index
    }

    #[inline]
    pub fn next(&self) -> u64 {
        self.next
    }

    #[inline]
    pub fn bytes_written(&self) -> u32 {
        self.bytes_written
    }

    #[inline]
    pub fn tell(&self) -> u32 {
        self.seek_pos
    }

    /// True when this block terminates its chain.
    #[inline]
    pub fn is_end_of_chain(&self) -> bool {
        self.next == self.index
    }

    // ── Cursor ───────────────────────────────────────────────────────────────

    /// Position the payload cursor.  Callers keep `pos <= 4084`.
    pub fn seek(&mut self, pos: u32) {
        debug_assert!(pos as u64 <= BLOCK_PAYLOAD);
        self.seek_pos = pos.min(BLOCK_PAYLOAD as u32);
    }

    // ── Payload I/O ──────────────────────────────────────────────────────────

    /// Read up to `buf.len()` bytes at the cursor, clamped to the payload
    /// region.  Returns the number of bytes read.
    pub fn read(&mut self, io: &mut Container, buf: &mut [u8]) -> Result<usize> {
        if !self.mode.readable() {
            return Err(FsError::NotReadable);
        }
        let room = (BLOCK_PAYLOAD as u32 - self.seek_pos) as usize;
        let n = buf.len().min(room);
        if n == 0 {
            return Ok(0);
        }
        io.stream.seek_get(self.offset + BLOCK_META + self.seek_pos as u64);
        io.stream.read(&mut buf[..n])?;
        self.seek_pos += n as u32;
        Ok(n)
    }

    /// Write up to `buf.len()` bytes at the cursor, clamped to the payload
    /// region, and persist the updated size field.
    ///
    /// Append mode grows `bytes_written` by the bytes written; overwrite
    /// mode persists `max(bytes_written, cursor + n)`, so an overwrite that
    /// runs past the recorded size extends it.
    pub fn write(&mut self, io: &mut Container, buf: &[u8]) -> Result<usize> {
        if !self.mode.writable() {
            return Err(FsError::NotWritable);
        }
        let room = (BLOCK_PAYLOAD as u32 - self.seek_pos) as usize;
        let n = buf.len().min(room);
        if n == 0 {
            return Ok(0);
        }

        io.stream.seek_put(self.offset + BLOCK_META + self.seek_pos as u64);
        io.stream.write(&buf[..n])?;

        let end = self.seek_pos + n as u32;
        let new_size = match self.mode {
            OpenMode::Overwrite => self.bytes_written.max(end),
            _ => self.bytes_written + n as u32,
        };
        if new_size != self.bytes_written {
            self.persist_size(io, new_size)?;
        }
        self.seek_pos = end;
        Ok(n)
    }

    // ── Header fields ────────────────────────────────────────────────────────

    /// Overwrite the size field, in memory and on disk.
    pub fn set_size(&mut self, io: &mut Container, size: u32) -> Result<()> {
        debug_assert!(size as u64 <= BLOCK_PAYLOAD);
        self.persist_size(io, size)
    }

    /// Overwrite the next-index field, in memory and on disk.
    pub fn set_next(&mut self, io: &mut Container, next: u64) -> Result<()> {
        self.persist_next(io, next)
    }

    fn persist_size(&mut self, io: &mut Container, size: u32) -> Result<()> {
        io.stream.seek_put(self.offset);
        io.stream.write(&size.to_be_bytes())?;
        self.bytes_written = size;
        Ok(())
    }

    fn persist_next(&mut self, io: &mut Container, next: u64) -> Result<()> {
        io.stream.seek_put(self.offset + 4);
        io.stream.write(&next.to_be_bytes())?;
        self.next = next;
        Ok(())
    }

    // ── Allocation bookkeeping ───────────────────────────────────────────────

    /// Mark this block in-use in the volume bitmap and decrement the
    /// free-block count.
    pub fn register(&mut self, io: &mut Container) -> Result<()> {
        let blocks = io.blocks();
        superblock::set_in_use(&mut io.stream, blocks, self.index, true)?;
        io.free_blocks -= 1;
        Ok(())
    }

    /// Return this block to the free pool: clear the bitmap bit, bump the
    /// free count, reset the header to an empty end-of-chain, and hand the
    /// index back to the builder's freelist.
    pub fn unlink(&mut self, io: &mut Container) -> Result<()> {
        let blocks = io.blocks();
        superblock::set_in_use(&mut io.stream, blocks, self.index, false)?;
        io.free_blocks += 1;
        self.persist_next(io, self.index)?;
        self.persist_size(io, 0)?;
        self.seek_pos = 0;
        io.builder.release(self.index);
        Ok(())
    }
}
