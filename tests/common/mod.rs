//! Shared fixtures: cheap containers for integration tests.
#![allow(dead_code)] // each test binary uses a different subset

use std::path::PathBuf;

use tempfile::TempDir;
use vaultfs::{CipherId, CreateOptions, KdfParams, OpenOpts, Vault};

pub const PASSWORD: &str = "correct horse battery staple";

/// Cheap KDF cost for tests; the production default needs ~1 GiB.
pub fn test_kdf() -> KdfParams {
    KdfParams { log_n: 12, r: 8, p: 1 }
}

pub fn create_opts(blocks: u64, cipher: CipherId) -> CreateOptions {
    CreateOptions {
        blocks,
        cipher,
        kdf: test_kdf(),
        ..Default::default()
    }
}

pub fn open_opts() -> OpenOpts {
    OpenOpts { kdf: test_kdf(), ..Default::default() }
}

/// A fresh pass-through-cipher vault plus the tempdir keeping it alive.
pub fn new_vault(blocks: u64) -> (TempDir, PathBuf, Vault) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("test.vault");
    let vault = Vault::create(&path, PASSWORD, &create_opts(blocks, CipherId::None)).unwrap();
    (dir, path, vault)
}

pub fn reopen(path: &PathBuf) -> Vault {
    Vault::open(path, PASSWORD, &open_opts()).unwrap()
}
