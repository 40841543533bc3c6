//! Folder representation: entry records, cached entry info.
//!
//! A folder's payload is an entry table laid out as
//! `entry_count (u64) || record[0] || record[1] || ...`, where each record
//! is exactly 264 bytes:
//!
//! ```text
//! offset  size  field
//! 0       1     flags: bit 0 = in-use, bit 1 = file (1) / folder (0)
//! 1       255   filename, null-terminated and zero-padded
//! 256     8     first block index (u64, big-endian)
//! ```
//!
//! A record with the in-use bit clear is a tombstone: its slot never moves
//! and a later insert may overwrite it.  Record indices are therefore stable
//! for the lifetime of a folder, which the entry-info caches rely on.

pub mod compound;
pub mod leaf;

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::{FsError, Result};
use crate::superblock::MAX_FILENAME;

pub use compound::CompoundFolder;
pub use leaf::LeafFolder;

// ── Record layout ────────────────────────────────────────────────────────────

pub(crate) const RECORD_BYTES: usize = 1 + MAX_FILENAME + 8;
/// Size of the leading entry-count field.
pub(crate) const COUNT_BYTES: u64 = 8;

const FLAG_IN_USE: u8 = 1 << 0;
const FLAG_FILE: u8 = 1 << 1;

// ── Entry types ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryType {
    File,
    Folder,
}

// ── Entry info ───────────────────────────────────────────────────────────────

/// Cached description of one live folder entry.
#[derive(Debug, Clone)]
pub struct EntryInfo {
    pub name:        String,
    pub entry_type:  EntryType,
    /// Byte size; zero for folders.
    pub size:        u64,
    pub first_block: u64,
    /// Stable record slot within the owning leaf folder.
    pub record_index: u64,
    /// Compound-folder hint: which bucket currently holds this entry.
    /// Bounds-checked on use and evicted on miss.
    pub bucket_index: Option<usize>,
}

/// Entry info shared between a folder's cache and any open file, so the
/// cached size follows writes.
pub type SharedEntryInfo = Rc<RefCell<EntryInfo>>;

// ── Record codec ─────────────────────────────────────────────────────────────

/// Validate a filename destined for a record: non-empty, no separators or
/// NULs, and short enough to keep its null terminator inside the field.
pub(crate) fn check_filename(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(FsError::IllegalFilename("empty name".into()));
    }
    if name.contains('/') || name.contains('\0') {
        return Err(FsError::IllegalFilename(name.to_owned()));
    }
    if name.len() >= MAX_FILENAME {
        return Err(FsError::IllegalFilename(format!(
            "name exceeds {} bytes: {name}",
            MAX_FILENAME - 1
        )));
    }
    Ok(())
}

pub(crate) fn encode_record(
    name: &str,
    entry_type: EntryType,
    first_block: u64,
) -> Result<[u8; RECORD_BYTES]> {
    check_filename(name)?;
    let mut rec = [0u8; RECORD_BYTES];
    rec[0] = FLAG_IN_USE
        | match entry_type {
            EntryType::File => FLAG_FILE,
            EntryType::Folder => 0,
        };
    rec[1..1 + name.len()].copy_from_slice(name.as_bytes());
    rec[1 + MAX_FILENAME..].copy_from_slice(&first_block.to_be_bytes());
    Ok(rec)
}

#[inline]
pub(crate) fn record_in_use(rec: &[u8]) -> bool {
    rec[0] & FLAG_IN_USE != 0
}

#[inline]
pub(crate) fn record_type(rec: &[u8]) -> EntryType {
    if rec[0] & FLAG_FILE != 0 {
        EntryType::File
    } else {
        EntryType::Folder
    }
}

pub(crate) fn record_name(rec: &[u8]) -> Result<String> {
    let field = &rec[1..1 + MAX_FILENAME];
    let end = field
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| FsError::corrupt("folder record name lacks a terminator"))?;
    String::from_utf8(field[..end].to_vec())
        .map_err(|_| FsError::corrupt("folder record name is not valid UTF-8"))
}

#[inline]
pub(crate) fn record_first_block(rec: &[u8]) -> u64 {
    u64::from_be_bytes(rec[1 + MAX_FILENAME..RECORD_BYTES].try_into().unwrap())
}
