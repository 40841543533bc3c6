//! Compound folder: an index leaf plus capped bucket leaves.
//!
//! Every user-visible entry lives in a bucket; the index folder's records
//! name only the buckets (`index_0`, `index_1`, ...).  Buckets accept at
//! most [`CONTENT_SIZE`] entries before a new one is created — spreading a
//! big folder over several small entry tables keeps insert scans short.
//!
//! A bucket whose last live entry is removed is itself removed: its table
//! storage is unlinked and its index record tombstoned, so an empty bucket
//! is never observable.
//!
//! The compound-level cache maps names to entry info carrying a bucket
//! hint.  Hints are bounds-checked on use and evicted on miss; bucket
//! removal shifts positions, so it drops the cache wholesale.

use std::collections::HashMap;

use crate::container::Container;
use crate::error::Result;
use crate::file::{BlockFile, OpenMode};
use crate::folder::leaf::LeafFolder;
use crate::folder::{EntryType, SharedEntryInfo};

/// Maximum live entries per bucket.  Smaller buckets make inserts into big
/// folders faster at the cost of more index records.
pub const CONTENT_SIZE: u64 = 10;

pub struct CompoundFolder {
    index:   LeafFolder,
    buckets: Vec<LeafFolder>,
    name:    String,
    /// Ordinal for the next bucket name; always past every existing suffix
    /// so removed-and-recreated buckets never collide.
    next_bucket_ordinal: u64,
    cache:   HashMap<String, SharedEntryInfo>,
}

impl CompoundFolder {
    // ── Construction ─────────────────────────────────────────────────────────

    pub fn create(io: &mut Container, name: &str, enforce_root: bool) -> Result<CompoundFolder> {
        let index = LeafFolder::create(io, name, enforce_root)?;
        Ok(CompoundFolder {
            index,
            buckets: Vec::new(),
            name: name.to_owned(),
            next_bucket_ordinal: 0,
            cache: HashMap::new(),
        })
    }

    pub fn open(io: &mut Container, start_block: u64, name: &str) -> Result<CompoundFolder> {
        let mut index = LeafFolder::open(io, start_block, name)?;
        let mut buckets = Vec::new();
        let mut next_bucket_ordinal = 0;
        for info in index.list_folders(io)? {
            let (bucket_name, first_block) = {
                let info = info.borrow();
                (info.name.clone(), info.first_block)
            };
            if let Some(ordinal) = bucket_name
                .strip_prefix("index_")
                .and_then(|s| s.parse::<u64>().ok())
            {
                next_bucket_ordinal = next_bucket_ordinal.max(ordinal + 1);
            }
            buckets.push(LeafFolder::open(io, first_block, &bucket_name)?);
        }
        Ok(CompoundFolder {
            index,
            buckets,
            name: name.to_owned(),
            next_bucket_ordinal,
            cache: HashMap::new(),
        })
    }

    // ── Accessors ────────────────────────────────────────────────────────────

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Start block of the index folder — the value recorded in a parent.
    #[inline]
    pub fn start_block(&self) -> u64 {
        self.index.start_block()
    }

    // ── Insertion ────────────────────────────────────────────────────────────

    /// First bucket with room, scanning forward; creates a new bucket when
    /// every existing one is full.
    fn bucket_with_room(&mut self, io: &mut Container) -> Result<usize> {
        for i in 0..self.buckets.len() {
            if self.buckets[i].has_room(io, CONTENT_SIZE)? {
                return Ok(i);
            }
        }
        let bucket_name = format!("index_{}", self.next_bucket_ordinal);
        self.next_bucket_ordinal += 1;
        let bucket = self.index.add_bucket(io, &bucket_name)?;
        self.buckets.push(bucket);
        Ok(self.buckets.len() - 1)
    }

    /// Create a file entry in some bucket with room.
    pub fn add_file(&mut self, io: &mut Container, name: &str) -> Result<()> {
        let bi = self.bucket_with_room(io)?;
        self.buckets[bi].add_file(io, name)
    }

    /// Create a compound sub-folder entry in some bucket with room.
    pub fn add_folder(&mut self, io: &mut Container, name: &str) -> Result<()> {
        let bi = self.bucket_with_room(io)?;
        self.buckets[bi].add_compound(io, name)
    }

    /// Insert metadata for already-existing data (the second half of a
    /// rename): same placement rules, no new chain.
    pub fn insert_record(
        &mut self,
        io: &mut Container,
        name: &str,
        entry_type: EntryType,
        first_block: u64,
    ) -> Result<()> {
        let bi = self.bucket_with_room(io)?;
        self.buckets[bi].write_record(io, name, entry_type, first_block)?;
        Ok(())
    }

    // ── Lookup ───────────────────────────────────────────────────────────────

    /// Entry info by name: cache, then forward bucket scan.  The resolved
    /// bucket index is recorded as a hint.
    pub fn entry_info(
        &mut self,
        io: &mut Container,
        name: &str,
    ) -> Result<Option<SharedEntryInfo>> {
        if let Some(info) = self.cache.get(name) {
            return Ok(Some(info.clone()));
        }
        for i in 0..self.buckets.len() {
            if let Some(info) = self.buckets[i].entry_info(io, name)? {
                info.borrow_mut().bucket_index = Some(i);
                self.cache.insert(name.to_owned(), info.clone());
                return Ok(Some(info));
            }
        }
        Ok(None)
    }

    /// Open a named file.  A cached bucket hint short-circuits the scan; a
    /// stale hint (bucket gone, or entry no longer there) is evicted and the
    /// scan falls through.
    pub fn open_file(
        &mut self,
        io: &mut Container,
        name: &str,
        mode: OpenMode,
    ) -> Result<Option<BlockFile>> {
        if let Some(info) = self.cache.get(name).cloned() {
            let hint = info.borrow().bucket_index;
            if let Some(bi) = hint {
                if bi < self.buckets.len() {
                    if let Some(file) = self.buckets[bi].open_file(io, name, mode)? {
                        return Ok(Some(file));
                    }
                }
            }
            self.cache.remove(name);
        }
        for i in 0..self.buckets.len() {
            if let Some(file) = self.buckets[i].open_file(io, name, mode)? {
                if let Some(info) = self.buckets[i].entry_info(io, name)? {
                    info.borrow_mut().bucket_index = Some(i);
                    self.cache.insert(name.to_owned(), info);
                }
                return Ok(Some(file));
            }
        }
        Ok(None)
    }

    /// Open a named compound sub-folder.
    pub fn open_folder(
        &mut self,
        io: &mut Container,
        name: &str,
    ) -> Result<Option<CompoundFolder>> {
        let info = match self.entry_info(io, name)? {
            Some(info) if info.borrow().entry_type == EntryType::Folder => info,
            _ => return Ok(None),
        };
        let first_block = info.borrow().first_block;
        Ok(Some(CompoundFolder::open(io, first_block, name)?))
    }

    /// All user-visible entries across every bucket, hints refreshed.
    pub fn list(&mut self, io: &mut Container) -> Result<Vec<SharedEntryInfo>> {
        let mut entries = Vec::new();
        for i in 0..self.buckets.len() {
            for info in self.buckets[i].list(io)? {
                info.borrow_mut().bucket_index = Some(i);
                let name = info.borrow().name.clone();
                self.cache.entry(name).or_insert_with(|| info.clone());
                entries.push(info);
            }
        }
        Ok(entries)
    }

    // ── Removal ──────────────────────────────────────────────────────────────

    /// Remove a file entry, pruning its bucket if it empties.
    pub fn remove_file(&mut self, io: &mut Container, name: &str) -> Result<bool> {
        for bi in 0..self.buckets.len() {
            if self.buckets[bi].remove_file(io, name)? {
                self.cache.remove(name);
                self.prune_bucket_if_empty(io, bi)?;
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Recursively remove a sub-folder entry, pruning its bucket if it
    /// empties.
    pub fn remove_folder(&mut self, io: &mut Container, name: &str) -> Result<bool> {
        for bi in 0..self.buckets.len() {
            if self.buckets[bi].remove_compound(io, name)? {
                self.cache.remove(name);
                self.prune_bucket_if_empty(io, bi)?;
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Tombstone an entry's metadata without touching its data (the first
    /// half of a rename).  Bucket pruning still applies.
    pub fn remove_record(&mut self, io: &mut Container, name: &str) -> Result<bool> {
        for bi in 0..self.buckets.len() {
            if self.buckets[bi].put_record_out_of_use(io, name)? {
                self.cache.remove(name);
                self.prune_bucket_if_empty(io, bi)?;
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Remove every entry (recursing into sub-folders).  Afterwards no
    /// bucket remains.
    pub fn remove_all_entries(&mut self, io: &mut Container) -> Result<()> {
        let entries: Vec<(String, EntryType)> = self
            .list(io)?
            .into_iter()
            .map(|info| {
                let info = info.borrow();
                (info.name.clone(), info.entry_type)
            })
            .collect();
        for (name, entry_type) in entries {
            match entry_type {
                EntryType::File => self.remove_file(io, &name)?,
                EntryType::Folder => self.remove_folder(io, &name)?,
            };
        }
        Ok(())
    }

    /// Return the index folder's own storage to the bitmap.  Callers remove
    /// all entries first so every bucket is already gone.
    pub(crate) fn unlink_index_data(&mut self, io: &mut Container) -> Result<()> {
        self.cache.clear();
        self.index.unlink_data(io)
    }

    fn prune_bucket_if_empty(&mut self, io: &mut Container, bi: usize) -> Result<()> {
        if self.buckets[bi].live_entry_count(io)? > 0 {
            return Ok(());
        }
        let mut bucket = self.buckets.remove(bi);
        let bucket_name = bucket.name().to_owned();
        bucket.unlink_data(io)?;
        self.index.put_record_out_of_use(io, &bucket_name)?;
        // positions shifted under every hint
        self.cache.clear();
        Ok(())
    }
}
