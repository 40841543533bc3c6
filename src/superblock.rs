//! Superblock — plaintext header, layout math, and the volume bitmap.
//!
//! # On-disk layout (all integers big-endian)
//!
//! ```text
//! offset  size    field
//! 0       8       IV word 0 (scrypt salt; lo 8 bytes of the cipher IV)
//! 8       8       IV word 1
//! 16      8       IV word 2
//! 24      8       IV word 3
//! 32      1       scrypt rounds (legacy; written as 64, never read back)
//! 33      7       cipher identifier byte, repeated 7 times
//! 40      32      SHA-256 of the password (compared on open)
//! --- from here on every byte is keystream-encrypted ---
//! 72      8       total block count B
//! 80      B/8     volume bitmap, one bit per block (bit i%8 of byte i/8)
//! 80+B/8  8       legacy root-folder entry count (written, unused)
//! 88+B/8  B*4096  block slots
//! ```
//!
//! The bitmap is the allocation ground truth: exactly the blocks reachable
//! from a live folder's start block have their bit set, and the free-block
//! count equals `B - popcount(bitmap)`.  All bitmap access funnels through
//! [`ImageStream`] so the on-disk bits are ciphertext.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

use crate::error::{FsError, Result};
use crate::event::{EventSink, ProgressEvent};
use crate::stream::ImageStream;
use crate::transformer::CipherId;

// ── Layout constants ─────────────────────────────────────────────────────────

/// Bytes of plaintext header before the encrypted region.
pub const HEADER_BYTES: u64 = 72;
/// One block slot: 12-byte header + 4084-byte payload.
pub const BLOCK_SIZE: u64 = 4096;
/// Per-slot header: u32 bytes_written + u64 next_index.
pub const BLOCK_META: u64 = 12;
/// Usable payload bytes per block.
pub const BLOCK_PAYLOAD: u64 = BLOCK_SIZE - BLOCK_META;
/// Filename field width in a folder record.
pub const MAX_FILENAME: usize = 255;

/// Offset of the u64 total block count (first encrypted field).
pub const BLOCK_COUNT_OFFSET: u64 = HEADER_BYTES;
/// Offset of the volume bitmap.
pub const BITMAP_OFFSET: u64 = HEADER_BYTES + 8;

/// The legacy rounds byte written at offset 32.
pub const LEGACY_ROUNDS: u8 = 64;

#[inline]
pub fn bitmap_bytes(blocks: u64) -> u64 {
    blocks / 8
}

/// First byte of the block-slot array.
#[inline]
pub fn blocks_begin(blocks: u64) -> u64 {
    BITMAP_OFFSET + bitmap_bytes(blocks) + 8
}

/// Byte offset of block slot `index`.
#[inline]
pub fn block_offset(index: u64, blocks: u64) -> u64 {
    blocks_begin(blocks) + BLOCK_SIZE * index
}

// ── Plaintext header ─────────────────────────────────────────────────────────

/// The 72-byte plaintext prefix of every image.
#[derive(Debug, Clone)]
pub struct Header {
    pub iv:            [u64; 4],
    pub rounds:        u8,
    pub cipher:        CipherId,
    pub password_hash: [u8; 32],
}

impl Header {
    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<()> {
        for word in &self.iv {
            w.write_u64::<BigEndian>(*word)?;
        }
        w.write_u8(self.rounds)?;
        w.write_all(&[self.cipher.id_byte(); 7])?;
        w.write_all(&self.password_hash)?;
        Ok(())
    }

    /// Read and validate the plaintext header.
    ///
    /// The cipher id byte is stored seven times; disagreement between the
    /// copies means the header region was damaged.
    pub fn read_from<R: Read>(r: &mut R) -> Result<Header> {
        let mut iv = [0u64; 4];
        for word in iv.iter_mut() {
            *word = r.read_u64::<BigEndian>()?;
        }
        let rounds = r.read_u8()?;

        let mut id_bytes = [0u8; 7];
        r.read_exact(&mut id_bytes)?;
        if id_bytes.windows(2).any(|w| w[0] != w[1]) {
            return Err(FsError::corrupt("cipher identifier bytes disagree"));
        }
        let cipher = CipherId::from_byte(id_bytes[0])
            .ok_or_else(|| FsError::corrupt(format!("unknown cipher identifier {}", id_bytes[0])))?;

        let mut password_hash = [0u8; 32];
        r.read_exact(&mut password_hash)?;

        Ok(Header { iv, rounds, cipher, password_hash })
    }
}

// ── Encrypted superblock fields ──────────────────────────────────────────────

pub fn read_block_count(stream: &mut ImageStream) -> Result<u64> {
    let mut buf = [0u8; 8];
    stream.seek_get(BLOCK_COUNT_OFFSET);
    stream.read(&mut buf)?;
    Ok(u64::from_be_bytes(buf))
}

pub fn write_block_count(stream: &mut ImageStream, blocks: u64) -> Result<()> {
    stream.seek_put(BLOCK_COUNT_OFFSET);
    stream.write(&blocks.to_be_bytes())
}

// ── Volume bitmap ────────────────────────────────────────────────────────────

fn check_index(index: u64, blocks: u64) -> Result<()> {
    if index >= blocks {
        return Err(FsError::corrupt(format!(
            "block index {index} out of range (image has {blocks} blocks)"
        )));
    }
    Ok(())
}

/// Read bit `index % 8` of bitmap byte `index / 8`.
pub fn is_in_use(stream: &mut ImageStream, blocks: u64, index: u64) -> Result<bool> {
    check_index(index, blocks)?;
    let mut byte = [0u8; 1];
    stream.seek_get(BITMAP_OFFSET + index / 8);
    stream.read(&mut byte)?;
    Ok(byte[0] & (1 << (index % 8)) != 0)
}

/// Read-modify-write one bitmap byte.
pub fn set_in_use(stream: &mut ImageStream, blocks: u64, index: u64, in_use: bool) -> Result<()> {
    check_index(index, blocks)?;
    let offset = BITMAP_OFFSET + index / 8;
    let mut byte = [0u8; 1];
    stream.seek_get(offset);
    stream.read(&mut byte)?;
    if in_use {
        byte[0] |= 1 << (index % 8);
    } else {
        byte[0] &= !(1 << (index % 8));
    }
    stream.seek_put(offset);
    stream.write(&byte)
}

fn read_bitmap(stream: &mut ImageStream, blocks: u64) -> Result<Vec<u8>> {
    let mut map = vec![0u8; bitmap_bytes(blocks) as usize];
    stream.seek_get(BITMAP_OFFSET);
    stream.read(&mut map)?;
    Ok(map)
}

/// First zero bit in the bitmap, or `None` when the image is full.
pub fn next_free(stream: &mut ImageStream, blocks: u64) -> Result<Option<u64>> {
    let map = read_bitmap(stream, blocks)?;
    for (byte_index, byte) in map.iter().enumerate() {
        if *byte != 0xFF {
            let bit = byte.trailing_ones() as u64;
            return Ok(Some(byte_index as u64 * 8 + bit));
        }
    }
    Ok(None)
}

/// Up to `n` zero bits, in ascending order.  Returns fewer when the image
/// does not have `n` free blocks.
pub fn first_n_free(stream: &mut ImageStream, blocks: u64, n: u64) -> Result<Vec<u64>> {
    let map = read_bitmap(stream, blocks)?;
    let mut found = Vec::with_capacity(n.min(blocks) as usize);
    'outer: for (byte_index, byte) in map.iter().enumerate() {
        if *byte == 0xFF {
            continue;
        }
        for bit in 0..8u64 {
            if byte & (1 << bit) == 0 {
                found.push(byte_index as u64 * 8 + bit);
                if found.len() as u64 == n {
                    break 'outer;
                }
            }
        }
    }
    Ok(found)
}

/// Popcount over the whole bitmap.
pub fn count_allocated(stream: &mut ImageStream, blocks: u64) -> Result<u64> {
    let map = read_bitmap(stream, blocks)?;
    Ok(map.iter().map(|b| b.count_ones() as u64).sum())
}

// ── Image formatting ─────────────────────────────────────────────────────────

/// Write the encrypted superblock region of a fresh image: block count, an
/// all-zero bitmap, the legacy root entry count, and — unless the image is
/// sparse — every block slot zeroed out.
///
/// Sparse images leave the slot array unwritten; the block builder
/// materializes slots on first touch.
pub fn format_image(
    stream: &mut ImageStream,
    blocks: u64,
    sparse: bool,
    events: &EventSink,
) -> Result<()> {
    events.emit(ProgressEvent::ImageBuildStart { blocks });

    write_block_count(stream, blocks)?;

    // put cursor now sits at BITMAP_OFFSET; the region is written straight
    // through in one pass.
    stream.write(&vec![0u8; bitmap_bytes(blocks) as usize])?;
    stream.write(&0u64.to_be_bytes())?;

    if !sparse {
        let zeroes = [0u8; BLOCK_SIZE as usize];
        for i in 0..blocks {
            stream.write(&zeroes)?;
            events.emit(ProgressEvent::ImageBuildUpdate { blocks_written: i + 1 });
        }
    }

    stream.flush()?;
    events.emit(ProgressEvent::ImageBuildEnd);
    Ok(())
}
