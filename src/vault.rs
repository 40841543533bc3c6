//! The filesystem facade: absolute paths resolved over the root compound
//! folder.
//!
//! ```no_run
//! use vaultfs::{Vault, CreateOptions, OpenMode};
//!
//! let opts = CreateOptions { blocks: 2048, ..Default::default() };
//! let mut vault = Vault::create("vault.img", "secret", &opts)?;
//! vault.add_file("/readme.txt")?;
//! {
//!     let mut f = vault.open_file("/readme.txt", OpenMode::Append)?;
//!     std::io::Write::write_all(&mut f, b"Hello, world!")?;
//! }
//! # Ok::<(), vaultfs::FsError>(())
//! ```
//!
//! Every operation builds its folder objects from disk, walks the path
//! components, and performs the mutation through them; nothing but the
//! container handle outlives the call.  Trailing slashes are tolerated on
//! folder operations and rejected when creating files.

use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::container::{Container, CreateOptions, OpenOpts};
use crate::error::{FsError, Result};
use crate::event::EventSink;
use crate::file::{BlockFile, OpenMode};
use crate::folder::compound::CompoundFolder;
use crate::folder::{check_filename, EntryInfo, EntryType};

// ── Policies ─────────────────────────────────────────────────────────────────

/// Folder removal policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovePolicy {
    /// Fail with [`FsError::FolderNotEmpty`] unless the folder has no
    /// entries.
    MustBeEmpty,
    /// Remove the folder and everything under it.
    Recursive,
}

// ── Path parsing ─────────────────────────────────────────────────────────────

struct ParsedPath {
    components:     Vec<String>,
    trailing_slash: bool,
}

fn parse_path(path: &str) -> Result<ParsedPath> {
    if !path.starts_with('/') {
        return Err(FsError::IllegalFilename(format!(
            "path must be absolute: {path}"
        )));
    }
    let trailing_slash = path.len() > 1 && path.ends_with('/');
    let components = path
        .split('/')
        .filter(|c| !c.is_empty())
        .map(str::to_owned)
        .collect();
    Ok(ParsedPath { components, trailing_slash })
}

// ── Vault ────────────────────────────────────────────────────────────────────

pub struct Vault {
    io: Container,
}

impl Vault {
    // ── Constructors ─────────────────────────────────────────────────────────

    /// Create a fresh container at `path` with a root folder at block 0.
    pub fn create<P: AsRef<Path>>(
        path: P,
        password: &str,
        opts: &CreateOptions,
    ) -> Result<Vault> {
        Self::create_with_progress(path, password, opts, EventSink::none())
    }

    pub fn create_with_progress<P: AsRef<Path>>(
        path: P,
        password: &str,
        opts: &CreateOptions,
        events: EventSink,
    ) -> Result<Vault> {
        Ok(Vault { io: Container::create(path, password, opts, events)? })
    }

    /// Open an existing container.
    pub fn open<P: AsRef<Path>>(path: P, password: &str, opts: &OpenOpts) -> Result<Vault> {
        Self::open_with_progress(path, password, opts, EventSink::none())
    }

    pub fn open_with_progress<P: AsRef<Path>>(
        path: P,
        password: &str,
        opts: &OpenOpts,
        events: EventSink,
    ) -> Result<Vault> {
        Ok(Vault { io: Container::open(path, password, opts, events)? })
    }

    // ── Container facts ──────────────────────────────────────────────────────

    #[inline]
    pub fn block_count(&self) -> u64 {
        self.io.blocks()
    }

    #[inline]
    pub fn free_block_count(&self) -> u64 {
        self.io.free_blocks()
    }

    /// First unallocated block per the bitmap.
    pub fn next_free_block(&mut self) -> Result<Option<u64>> {
        self.io.next_free_block()
    }

    #[inline]
    pub fn image_path(&self) -> &Path {
        self.io.path()
    }

    pub fn flush(&mut self) -> Result<()> {
        self.io.flush()
    }

    // ── Resolution helpers ───────────────────────────────────────────────────

    fn root(&mut self) -> Result<CompoundFolder> {
        let root_block = self.io.root_block();
        CompoundFolder::open(&mut self.io, root_block, "/")
    }

    fn synthetic_root_info(&self) -> EntryInfo {
        EntryInfo {
            name:         "/".to_owned(),
            entry_type:   EntryType::Folder,
            size:         0,
            first_block:  self.io.root_block(),
            record_index: 0,
            bucket_index: None,
        }
    }

    /// Walk to the parent folder of the last component.  `None` when an
    /// intermediate component is missing or not a folder.
    fn try_resolve_parent(
        &mut self,
        components: &[String],
    ) -> Result<Option<(CompoundFolder, String)>> {
        let (last, parents) = match components.split_last() {
            Some(split) => split,
            None => return Ok(None),
        };
        let mut folder = self.root()?;
        for component in parents {
            folder = match folder.open_folder(&mut self.io, component)? {
                Some(child) => child,
                None => return Ok(None),
            };
        }
        Ok(Some((folder, last.clone())))
    }

    fn resolve_parent(&mut self, components: &[String]) -> Result<(CompoundFolder, String)> {
        self.try_resolve_parent(components)?.ok_or(FsError::NotFound)
    }

    fn try_info(&mut self, path: &str) -> Result<Option<EntryInfo>> {
        let parsed = parse_path(path)?;
        if parsed.components.is_empty() {
            return Ok(Some(self.synthetic_root_info()));
        }
        let (mut parent, name) = match self.try_resolve_parent(&parsed.components)? {
            Some(found) => found,
            None => return Ok(None),
        };
        Ok(parent
            .entry_info(&mut self.io, &name)?
            .map(|info| info.borrow().clone()))
    }

    // ── Queries ──────────────────────────────────────────────────────────────

    /// Entry info for `path`; the root resolves to a synthetic folder entry.
    pub fn entry_info(&mut self, path: &str) -> Result<EntryInfo> {
        self.try_info(path)?.ok_or(FsError::NotFound)
    }

    pub fn file_exists(&mut self, path: &str) -> Result<bool> {
        Ok(matches!(
            self.try_info(path)?,
            Some(info) if info.entry_type == EntryType::File
        ))
    }

    pub fn folder_exists(&mut self, path: &str) -> Result<bool> {
        Ok(matches!(
            self.try_info(path)?,
            Some(info) if info.entry_type == EntryType::Folder
        ))
    }

    /// All entries of the folder at `path`, in bucket order.
    pub fn list(&mut self, path: &str) -> Result<Vec<EntryInfo>> {
        let parsed = parse_path(path)?;
        let mut folder = if parsed.components.is_empty() {
            self.root()?
        } else {
            let (mut parent, name) = self.resolve_parent(&parsed.components)?;
            parent
                .open_folder(&mut self.io, &name)?
                .ok_or(FsError::NotFound)?
        };
        Ok(folder
            .list(&mut self.io)?
            .into_iter()
            .map(|info| info.borrow().clone())
            .collect())
    }

    // ── Mutations ────────────────────────────────────────────────────────────

    /// Create an empty file.  The parent must exist and the target must not.
    pub fn add_file(&mut self, path: &str) -> Result<()> {
        let parsed = parse_path(path)?;
        if parsed.trailing_slash {
            return Err(FsError::IllegalFilename(format!(
                "file path may not end in a slash: {path}"
            )));
        }
        let (mut parent, name) = self.resolve_parent(&parsed.components)?;
        check_filename(&name)?;
        if parent.entry_info(&mut self.io, &name)?.is_some() {
            return Err(FsError::AlreadyExists);
        }
        parent.add_file(&mut self.io, &name)
    }

    /// Create an empty folder.  The parent must exist and the target must
    /// not.
    pub fn add_folder(&mut self, path: &str) -> Result<()> {
        let parsed = parse_path(path)?;
        if parsed.components.is_empty() {
            return Err(FsError::AlreadyExists);
        }
        let (mut parent, name) = self.resolve_parent(&parsed.components)?;
        check_filename(&name)?;
        if parent.entry_info(&mut self.io, &name)?.is_some() {
            return Err(FsError::AlreadyExists);
        }
        parent.add_folder(&mut self.io, &name)
    }

    /// Remove a file and return its blocks to the bitmap.
    pub fn remove_file(&mut self, path: &str) -> Result<()> {
        let parsed = parse_path(path)?;
        let (mut parent, name) = self.resolve_parent(&parsed.components)?;
        match parent.entry_info(&mut self.io, &name)? {
            Some(info) if info.borrow().entry_type == EntryType::File => {}
            _ => return Err(FsError::NotFound),
        }
        parent.remove_file(&mut self.io, &name)?;
        self.io.flush()
    }

    /// Remove a folder.  `MustBeEmpty` refuses folders with entries;
    /// `Recursive` removes everything beneath first.
    pub fn remove_folder(&mut self, path: &str, policy: RemovePolicy) -> Result<()> {
        let parsed = parse_path(path)?;
        if parsed.components.is_empty() {
            return Err(FsError::IllegalFilename("cannot remove the root folder".into()));
        }
        let (mut parent, name) = self.resolve_parent(&parsed.components)?;
        let info = match parent.entry_info(&mut self.io, &name)? {
            Some(info) if info.borrow().entry_type == EntryType::Folder => info,
            _ => return Err(FsError::NotFound),
        };
        if policy == RemovePolicy::MustBeEmpty {
            let first_block = info.borrow().first_block;
            let mut child = CompoundFolder::open(&mut self.io, first_block, &name)?;
            if !child.list(&mut self.io)?.is_empty() {
                return Err(FsError::FolderNotEmpty);
            }
        }
        parent.remove_folder(&mut self.io, &name)?;
        self.io.flush()
    }

    /// Open a file as a seekable byte device.
    pub fn open_file(&mut self, path: &str, mode: OpenMode) -> Result<FileStream<'_>> {
        let parsed = parse_path(path)?;
        let (mut parent, name) = self.resolve_parent(&parsed.components)?;
        let file = parent
            .open_file(&mut self.io, &name, mode)?
            .ok_or(FsError::NotFound)?;
        Ok(FileStream { io: &mut self.io, file })
    }

    /// Resize a file in place.
    pub fn truncate_file(&mut self, path: &str, new_size: u64) -> Result<()> {
        let parsed = parse_path(path)?;
        let (mut parent, name) = self.resolve_parent(&parsed.components)?;
        let mut file = parent
            .open_file(&mut self.io, &name, OpenMode::Overwrite)?
            .ok_or(FsError::NotFound)?;
        file.truncate(&mut self.io, new_size)?;
        file.flush(&mut self.io)
    }

    /// Move an entry.  The destination parent must exist, the destination
    /// must not, and the entry's data chain is untouched: only metadata
    /// moves.
    pub fn rename(&mut self, src: &str, dst: &str) -> Result<()> {
        let src_parsed = parse_path(src)?;
        let dst_parsed = parse_path(dst)?;
        if src_parsed.components.is_empty() {
            return Err(FsError::IllegalFilename("cannot rename the root folder".into()));
        }

        let src_info = self.try_info(src)?.ok_or(FsError::NotFound)?;
        if self.try_info(dst)?.is_some() {
            return Err(FsError::AlreadyExists);
        }

        // a folder cannot be moved underneath itself
        if src_info.entry_type == EntryType::Folder
            && dst_parsed.components.len() > src_parsed.components.len()
            && dst_parsed.components[..src_parsed.components.len()]
                == src_parsed.components[..]
        {
            return Err(FsError::IllegalFilename(
                "cannot move a folder into itself".into(),
            ));
        }

        let (dst_name, dst_parents) = match dst_parsed.components.split_last() {
            Some(split) => split,
            None => return Err(FsError::AlreadyExists),
        };
        check_filename(dst_name)?;
        let (src_name, src_parents) = match src_parsed.components.split_last() {
            Some(split) => split,
            None => return Err(FsError::NotFound),
        };

        if src_parents == dst_parents {
            // single folder object, so the second half sees the first
            let (mut parent, _) = self.resolve_parent(&src_parsed.components)?;
            parent.insert_record(
                &mut self.io,
                dst_name,
                src_info.entry_type,
                src_info.first_block,
            )?;
            parent.remove_record(&mut self.io, src_name)?;
        } else {
            let (mut dst_parent, _) = self.resolve_parent(&dst_parsed.components)?;
            dst_parent.insert_record(
                &mut self.io,
                dst_name,
                src_info.entry_type,
                src_info.first_block,
            )?;
            let (mut src_parent, _) = self.resolve_parent(&src_parsed.components)?;
            src_parent.remove_record(&mut self.io, src_name)?;
        }
        self.io.flush()
    }
}

// ── FileStream ───────────────────────────────────────────────────────────────

/// A seekable byte device over one file, borrowing the vault for its
/// lifetime — the single-opener contract, enforced by the borrow checker.
///
/// Dropping the stream flushes chain pointers on a best-effort basis; call
/// [`Write::flush`] to observe failures.
pub struct FileStream<'a> {
    io:   &'a mut Container,
    file: BlockFile,
}

impl FileStream<'_> {
    #[inline]
    pub fn size(&self) -> u64 {
        self.file.size()
    }
}

impl Read for FileStream<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(self.io, buf).map_err(io::Error::from)
    }
}

impl Write for FileStream<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write(self.io, buf).map_err(io::Error::from)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush(self.io).map_err(io::Error::from)
    }
}

impl Seek for FileStream<'_> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.file.seek(pos).map_err(io::Error::from)
    }
}

impl Drop for FileStream<'_> {
    fn drop(&mut self) {
        let _ = self.file.flush(self.io);
    }
}
