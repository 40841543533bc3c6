//! # vaultfs — encrypted single-file virtual filesystem
//!
//! A container is one opaque file: create it with a fixed block capacity,
//! unlock it with a password, and work with files and folders inside it
//! through a filesystem-style API.
//!
//! Format guarantees (frozen):
//! - Every integer on disk is big-endian; never negotiated
//! - The unit of allocation is a 4096-byte block: a 12-byte header
//!   (u32 size, u64 next index) and 4084 payload bytes
//! - A chain is terminated by a block whose next index is its own; a file's
//!   size is exactly the sum of its blocks' size fields
//! - Folder tables are fixed 264-byte records after a u64 count; deleted
//!   records tombstone in place, so record indices are stable
//! - Every byte past offset 72 is encrypted with a CTR keystream whose
//!   position equals the absolute file offset — any byte range is
//!   independently addressable
//! - The cipher id set is closed (see [`transformer`]); an id this build
//!   cannot supply fails open, with no fallback
//! - There is NO authentication: a flipped ciphertext byte flips a
//!   plaintext byte silently.  Integrity against tampering is out of scope
//!
//! The container is single-threaded and single-opener by contract: no
//! internal locking exists, and the borrow checker enforces one writer via
//! [`vault::FileStream`]'s exclusive borrow.

pub mod block;
pub mod builder;
pub mod container;
pub mod crypto;
pub mod error;
pub mod event;
pub mod file;
pub mod folder;
pub mod shell;
pub mod stream;
pub mod superblock;
pub mod transformer;
pub mod vault;

// Flat re-exports for the most common types.
pub use container::{Container, CreateOptions, OpenOpts};
pub use crypto::KdfParams;
pub use error::{FsError, Result};
pub use event::{EventSink, ProgressEvent};
pub use file::OpenMode;
pub use folder::{EntryInfo, EntryType};
pub use transformer::{CipherError, CipherId};
pub use vault::{FileStream, RemovePolicy, Vault};
