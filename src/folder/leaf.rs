//! Leaf folder: an entry table stored in a file's payload.
//!
//! All record access goes through the underlying [`BlockFile`], so folder
//! writes recurse into file writes, block writes, and finally encrypted
//! stream I/O.
//!
//! The persisted `entry_count` is a high-water mark — it counts live and
//! tombstoned slots and only grows.  Inserts prefer overwriting a tombstone
//! to appending, which keeps record indices stable; `check_early_slots`
//! remembers whether such a scan can still succeed, and is re-armed by every
//! delete.

use std::cell::RefCell;
use std::collections::HashMap;
use std::io::SeekFrom;
use std::rc::Rc;

use crate::container::Container;
use crate::error::{FsError, Result};
use crate::file::{BlockFile, OpenMode};
use crate::folder::compound::CompoundFolder;
use crate::folder::{
    encode_record, record_first_block, record_in_use, record_name, record_type, EntryInfo,
    EntryType, SharedEntryInfo, COUNT_BYTES, RECORD_BYTES,
};

pub struct LeafFolder {
    data:              BlockFile,
    start_block:       u64,
    name:              String,
    entry_count:       u64,
    cache:             HashMap<String, SharedEntryInfo>,
    /// Whether a tombstone scan might still find a reusable slot.
    check_early_slots: bool,
}

impl LeafFolder {
    // ── Construction ─────────────────────────────────────────────────────────

    /// Create an empty folder: fresh file, zero entry count.
    pub fn create(io: &mut Container, name: &str, enforce_root: bool) -> Result<LeafFolder> {
        let mut data = if enforce_root {
            BlockFile::create_root(io, name)?
        } else {
            BlockFile::create(io, name)?
        };
        data.write(io, &0u64.to_be_bytes())?;
        data.flush(io)?;
        let start_block = data.start_block();
        Ok(LeafFolder {
            data,
            start_block,
            name: name.to_owned(),
            entry_count: 0,
            cache: HashMap::new(),
            check_early_slots: true,
        })
    }

    /// Open an existing folder by start block and parse its entry count.
    pub fn open(io: &mut Container, start_block: u64, name: &str) -> Result<LeafFolder> {
        let mut data = BlockFile::open(io, name, start_block, OpenMode::Append)?;
        let entry_count = if data.size() >= COUNT_BYTES {
            let mut buf = [0u8; COUNT_BYTES as usize];
            data.seek(SeekFrom::Start(0))?;
            data.read(io, &mut buf)?;
            u64::from_be_bytes(buf)
        } else {
            // block never initialized (sparse image)
            0
        };
        Ok(LeafFolder {
            data,
            start_block,
            name: name.to_owned(),
            entry_count,
            cache: HashMap::new(),
            check_early_slots: true,
        })
    }

    // ── Accessors ────────────────────────────────────────────────────────────

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn start_block(&self) -> u64 {
        self.start_block
    }

    /// High-water slot count (live + tombstoned).
    #[inline]
    pub fn entry_count(&self) -> u64 {
        self.entry_count
    }

    /// Count of records whose in-use bit is set.
    pub fn live_entry_count(&mut self, io: &mut Container) -> Result<u64> {
        let mut live = 0;
        for index in 0..self.entry_count {
            if record_in_use(&self.read_record(io, index)?) {
                live += 1;
            }
        }
        Ok(live)
    }

    /// Whether an insert can land here given a per-folder entry cap.
    pub fn has_room(&mut self, io: &mut Container, cap: u64) -> Result<bool> {
        if self.entry_count < cap {
            return Ok(true);
        }
        Ok(self.find_free_slot(io)?.is_some())
    }

    // ── Record I/O ───────────────────────────────────────────────────────────

    #[inline]
    fn record_offset(index: u64) -> u64 {
        COUNT_BYTES + index * RECORD_BYTES as u64
    }

    fn read_record(&mut self, io: &mut Container, index: u64) -> Result<[u8; RECORD_BYTES]> {
        let mut rec = [0u8; RECORD_BYTES];
        self.data
            .seek(SeekFrom::Start(Self::record_offset(index)))
            .map_err(|_| FsError::corrupt("entry table is shorter than its entry count"))?;
        let got = self.data.read(io, &mut rec)?;
        if got != RECORD_BYTES {
            return Err(FsError::corrupt("entry table is shorter than its entry count"));
        }
        Ok(rec)
    }

    /// Reopen the folder data in overwrite mode for in-place record edits.
    fn reopen_overwrite(&self, io: &mut Container) -> Result<BlockFile> {
        BlockFile::open(io, &self.name, self.start_block, OpenMode::Overwrite)
    }

    /// Find a tombstoned slot to reuse.  Once a full scan comes up empty the
    /// scan is skipped until the next delete re-arms it.
    fn find_free_slot(&mut self, io: &mut Container) -> Result<Option<u64>> {
        if !self.check_early_slots {
            return Ok(None);
        }
        for index in 0..self.entry_count {
            if !record_in_use(&self.read_record(io, index)?) {
                return Ok(Some(index));
            }
        }
        self.check_early_slots = false;
        Ok(None)
    }

    /// Insert a record for `name`, preferring a tombstoned slot over an
    /// append.  The persisted entry count grows only for appends.  Returns
    /// the record index used.
    pub fn write_record(
        &mut self,
        io: &mut Container,
        name: &str,
        entry_type: EntryType,
        first_block: u64,
    ) -> Result<u64> {
        let rec = encode_record(name, entry_type, first_block)?;

        if let Some(index) = self.find_free_slot(io)? {
            let mut edit = self.reopen_overwrite(io)?;
            edit.seek(SeekFrom::Start(Self::record_offset(index)))?;
            edit.write(io, &rec)?;
            edit.flush(io)?;
            return Ok(index);
        }

        let index = self.entry_count;
        self.data.write(io, &rec)?;
        self.data.flush(io)?;
        self.entry_count += 1;
        self.persist_entry_count(io)?;
        Ok(index)
    }

    fn persist_entry_count(&mut self, io: &mut Container) -> Result<()> {
        let count = self.entry_count;
        let mut edit = self.reopen_overwrite(io)?;
        edit.seek(SeekFrom::Start(0))?;
        edit.write(io, &count.to_be_bytes())?;
        edit.flush(io)?;
        Ok(())
    }

    /// Tombstone the record for `name` (flag byte cleared, slot preserved).
    pub fn put_record_out_of_use(&mut self, io: &mut Container, name: &str) -> Result<bool> {
        let index = match self.find_index(io, name)? {
            Some(i) => i,
            None => return Ok(false),
        };
        let mut edit = self.reopen_overwrite(io)?;
        edit.seek(SeekFrom::Start(Self::record_offset(index)))?;
        edit.write(io, &[0u8])?;
        edit.flush(io)?;
        self.check_early_slots = true;
        self.cache.remove(name);
        Ok(true)
    }

    fn find_index(&mut self, io: &mut Container, name: &str) -> Result<Option<u64>> {
        for index in 0..self.entry_count {
            let rec = self.read_record(io, index)?;
            if record_in_use(&rec) && record_name(&rec)? == name {
                return Ok(Some(index));
            }
        }
        Ok(None)
    }

    // ── Entry info ───────────────────────────────────────────────────────────

    /// Look up a live entry by name, consulting the cache first.
    pub fn entry_info(
        &mut self,
        io: &mut Container,
        name: &str,
    ) -> Result<Option<SharedEntryInfo>> {
        if let Some(info) = self.cache.get(name) {
            return Ok(Some(info.clone()));
        }
        for index in 0..self.entry_count {
            let rec = self.read_record(io, index)?;
            if record_in_use(&rec) && record_name(&rec)? == name {
                return Ok(Some(self.build_info(io, &rec, index)?));
            }
        }
        Ok(None)
    }

    fn build_info(
        &mut self,
        io: &mut Container,
        rec: &[u8],
        index: u64,
    ) -> Result<SharedEntryInfo> {
        let name = record_name(rec)?;
        if let Some(info) = self.cache.get(&name) {
            return Ok(info.clone());
        }
        let entry_type = record_type(rec);
        let first_block = record_first_block(rec);
        let size = match entry_type {
            EntryType::File => {
                BlockFile::open(io, &name, first_block, OpenMode::ReadOnly)?.size()
            }
            EntryType::Folder => 0,
        };
        let info = Rc::new(RefCell::new(EntryInfo {
            name: name.clone(),
            entry_type,
            size,
            first_block,
            record_index: index,
            bucket_index: None,
        }));
        self.cache.insert(name, info.clone());
        Ok(info)
    }

    /// All live entries, in record order.
    pub fn list(&mut self, io: &mut Container) -> Result<Vec<SharedEntryInfo>> {
        self.list_by(io, None)
    }

    pub fn list_files(&mut self, io: &mut Container) -> Result<Vec<SharedEntryInfo>> {
        self.list_by(io, Some(EntryType::File))
    }

    pub fn list_folders(&mut self, io: &mut Container) -> Result<Vec<SharedEntryInfo>> {
        self.list_by(io, Some(EntryType::Folder))
    }

    fn list_by(
        &mut self,
        io: &mut Container,
        filter: Option<EntryType>,
    ) -> Result<Vec<SharedEntryInfo>> {
        let mut entries = Vec::new();
        for index in 0..self.entry_count {
            let rec = self.read_record(io, index)?;
            if !record_in_use(&rec) {
                continue;
            }
            if let Some(ty) = filter {
                if record_type(&rec) != ty {
                    continue;
                }
            }
            entries.push(self.build_info(io, &rec, index)?);
        }
        Ok(entries)
    }

    // ── Children ─────────────────────────────────────────────────────────────

    /// Create a file entry: fresh single-block chain plus a record.
    pub fn add_file(&mut self, io: &mut Container, name: &str) -> Result<()> {
        let entry = BlockFile::create(io, name)?;
        self.write_record(io, name, EntryType::File, entry.start_block())?;
        Ok(())
    }

    /// Create a compound sub-folder entry.
    pub fn add_compound(&mut self, io: &mut Container, name: &str) -> Result<()> {
        let child = CompoundFolder::create(io, name, false)?;
        self.write_record(io, name, EntryType::Folder, child.start_block())?;
        Ok(())
    }

    /// Create a bucket sub-folder (used by the compound index folder).
    pub fn add_bucket(&mut self, io: &mut Container, name: &str) -> Result<LeafFolder> {
        let child = LeafFolder::create(io, name, false)?;
        self.write_record(io, name, EntryType::Folder, child.start_block())?;
        Ok(child)
    }

    /// Open a named file entry; the returned file keeps the cached entry
    /// info's size in sync.
    pub fn open_file(
        &mut self,
        io: &mut Container,
        name: &str,
        mode: OpenMode,
    ) -> Result<Option<BlockFile>> {
        let info = match self.entry_info(io, name)? {
            Some(info) if info.borrow().entry_type == EntryType::File => info,
            _ => return Ok(None),
        };
        let first_block = info.borrow().first_block;
        let mut file = BlockFile::open(io, name, first_block, mode)?;
        file.set_info_sync(info);
        Ok(Some(file))
    }

    // ── Removal ──────────────────────────────────────────────────────────────

    /// Unlink a file's chain and tombstone its record.
    pub fn remove_file(&mut self, io: &mut Container, name: &str) -> Result<bool> {
        let mut file = match self.open_file(io, name, OpenMode::Append)? {
            Some(f) => f,
            None => return Ok(false),
        };
        file.unlink(io)?;
        self.put_record_out_of_use(io, name)?;
        Ok(true)
    }

    /// Recursively remove a compound sub-folder: its entries, its buckets,
    /// its index data, then the record here.
    pub fn remove_compound(&mut self, io: &mut Container, name: &str) -> Result<bool> {
        let info = match self.entry_info(io, name)? {
            Some(info) if info.borrow().entry_type == EntryType::Folder => info,
            _ => return Ok(false),
        };
        let first_block = info.borrow().first_block;
        let mut child = CompoundFolder::open(io, first_block, name)?;
        child.remove_all_entries(io)?;
        child.unlink_index_data(io)?;
        self.put_record_out_of_use(io, name)?;
        Ok(true)
    }

    /// Return the folder's own table storage to the bitmap.
    pub(crate) fn unlink_data(&mut self, io: &mut Container) -> Result<()> {
        self.cache.clear();
        self.entry_count = 0;
        self.data.unlink(io)
    }
}
