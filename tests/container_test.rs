//! Container-level scenarios: build/reopen, persistence across sessions,
//! rename, hidden volumes, sparse images, and on-disk cipher behavior.

mod common;

use std::io::{Read, Seek, SeekFrom, Write};
use tempfile::TempDir;
use vaultfs::superblock::{block_offset, BLOCK_META};
use vaultfs::{CipherId, CreateOptions, FsError, OpenMode, OpenOpts, Vault};

#[test]
fn fresh_container_reopens_with_expected_shape() {
    let (_dir, path, vault) = common::new_vault(2048);
    drop(vault);

    let mut vault = common::reopen(&path);
    assert_eq!(vault.block_count(), 2048);
    // block 0 holds the root folder, so the first free block is 1
    assert_eq!(vault.next_free_block().unwrap(), Some(1));
    assert!(vault.list("/").unwrap().is_empty());
    assert_eq!(vault.free_block_count(), 2047);
}

#[test]
fn written_bytes_survive_a_reopen() {
    let (_dir, path, mut vault) = common::new_vault(2048);
    let payload = b"Hello, World!".repeat(1000);

    vault.add_file("/a.txt").unwrap();
    {
        let mut f = vault.open_file("/a.txt", OpenMode::Append).unwrap();
        f.write_all(&payload).unwrap();
        f.flush().unwrap();
    }
    vault.flush().unwrap();
    drop(vault);

    let mut vault = common::reopen(&path);
    let mut f = vault.open_file("/a.txt", OpenMode::ReadOnly).unwrap();
    let mut back = vec![0u8; 13000];
    f.read_exact(&mut back).unwrap();
    assert_eq!(back, payload);
}

#[test]
fn free_count_is_consistent_after_reopen() {
    let (_dir, path, mut vault) = common::new_vault(1024);
    vault.add_file("/x").unwrap();
    vault.add_folder("/y").unwrap();
    let free_before = vault.free_block_count();
    vault.flush().unwrap();
    drop(vault);

    let vault = common::reopen(&path);
    assert_eq!(vault.free_block_count(), free_before);
}

#[test]
fn rename_moves_metadata_and_preserves_content() {
    let (_dir, _path, mut vault) = common::new_vault(1024);
    vault.add_folder("/folderA").unwrap();
    vault.add_folder("/folderA/subFolderA").unwrap();
    vault.add_folder("/folderA/subFolderA/subFolderC").unwrap();
    vault.add_file("/folderA/subFolderA/subFolderC/finalFile.txt").unwrap();
    vault.add_file("/folderA/subFolderA/fileX").unwrap();
    {
        let mut f = vault
            .open_file("/folderA/subFolderA/fileX", OpenMode::Append)
            .unwrap();
        f.write_all(b"payload that must survive the move").unwrap();
    }
    let first_block = vault.entry_info("/folderA/subFolderA/fileX").unwrap().first_block;

    vault
        .rename("/folderA/subFolderA/fileX", "/folderA/renamed.txt")
        .unwrap();

    assert!(!vault.file_exists("/folderA/subFolderA/fileX").unwrap());
    assert!(vault.file_exists("/folderA/renamed.txt").unwrap());
    // the data chain is untouched: same first block, same bytes
    assert_eq!(
        vault.entry_info("/folderA/renamed.txt").unwrap().first_block,
        first_block
    );
    let mut f = vault.open_file("/folderA/renamed.txt", OpenMode::ReadOnly).unwrap();
    let mut back = Vec::new();
    f.read_to_end(&mut back).unwrap();
    assert_eq!(back, b"payload that must survive the move");
}

#[test]
fn rename_rejects_conflicts_and_missing_parents() {
    let (_dir, _path, mut vault) = common::new_vault(1024);
    vault.add_file("/src").unwrap();
    vault.add_file("/dst").unwrap();

    assert!(matches!(vault.rename("/src", "/dst"), Err(FsError::AlreadyExists)));
    assert!(matches!(
        vault.rename("/src", "/nosuch/dst"),
        Err(FsError::NotFound)
    ));
    assert!(matches!(vault.rename("/missing", "/new"), Err(FsError::NotFound)));

    vault.add_folder("/dir").unwrap();
    assert!(matches!(
        vault.rename("/dir", "/dir/inside"),
        Err(FsError::IllegalFilename(_))
    ));
}

#[test]
fn recursive_removal_restores_every_block() {
    let (_dir, _path, mut vault) = common::new_vault(1024);
    let free_before = vault.free_block_count();

    vault.add_folder("/tree").unwrap();
    vault.add_folder("/tree/branch").unwrap();
    for i in 0..12 {
        vault.add_file(&format!("/tree/branch/leaf_{i}")).unwrap();
    }
    {
        let mut f = vault
            .open_file("/tree/branch/leaf_0", OpenMode::Append)
            .unwrap();
        f.write_all(&vec![7u8; 9000]).unwrap();
    }

    assert!(matches!(
        vault.remove_folder("/tree", vaultfs::RemovePolicy::MustBeEmpty),
        Err(FsError::FolderNotEmpty)
    ));

    vault
        .remove_folder("/tree", vaultfs::RemovePolicy::Recursive)
        .unwrap();
    assert!(!vault.folder_exists("/tree").unwrap());
    assert_eq!(vault.free_block_count(), free_before);
}

#[test]
fn wrong_password_reads_as_corruption() {
    let (_dir, path, vault) = common::new_vault(256);
    drop(vault);
    let result = Vault::open(&path, "not the password", &common::open_opts());
    assert!(matches!(result, Err(FsError::Corrupt(_))));
}

#[test]
fn null_cipher_stores_plaintext_and_aes_does_not() {
    let payload = b"VISIBLE-ON-DISK-MARKER-0123456789";

    let write_image = |path: &std::path::Path, cipher: CipherId| -> u64 {
        let opts = common::create_opts(256, cipher);
        let mut vault = Vault::create(path, common::PASSWORD, &opts).unwrap();
        vault.add_file("/x.bin").unwrap();
        {
            let mut f = vault.open_file("/x.bin", OpenMode::WriteOnly).unwrap();
            f.write_all(payload).unwrap();
            f.flush().unwrap();
        }
        vault.flush().unwrap();
        vault.entry_info("/x.bin").unwrap().first_block
    };

    let dir = TempDir::new().unwrap();

    // NONE: the bytes sit verbatim at the computed block offset
    let clear_path = dir.path().join("clear.vault");
    let first_block = write_image(&clear_path, CipherId::None);
    let offset = block_offset(first_block, 256) + BLOCK_META;

    let mut raw = std::fs::File::open(&clear_path).unwrap();
    raw.seek(SeekFrom::Start(offset)).unwrap();
    let mut on_disk = vec![0u8; payload.len()];
    raw.read_exact(&mut on_disk).unwrap();
    assert_eq!(on_disk, payload);

    // AES with identical inputs: same offset, different bytes on disk, and
    // the API recovers the plaintext with the right password
    let aes_path = dir.path().join("aes.vault");
    let aes_first_block = write_image(&aes_path, CipherId::Aes);
    assert_eq!(aes_first_block, first_block);

    let mut raw = std::fs::File::open(&aes_path).unwrap();
    raw.seek(SeekFrom::Start(offset)).unwrap();
    let mut on_disk = vec![0u8; payload.len()];
    raw.read_exact(&mut on_disk).unwrap();
    assert_ne!(on_disk, payload);

    let mut vault = Vault::open(&aes_path, common::PASSWORD, &common::open_opts()).unwrap();
    let mut f = vault.open_file("/x.bin", OpenMode::ReadOnly).unwrap();
    let mut back = Vec::new();
    f.read_to_end(&mut back).unwrap();
    assert_eq!(back, payload);
}

#[test]
fn hidden_volume_is_a_disjoint_root() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("dual.vault");
    let opts = CreateOptions {
        blocks: 256,
        cipher: CipherId::None,
        hidden_root: Some(100),
        kdf: common::test_kdf(),
        ..Default::default()
    };
    {
        let mut vault = Vault::create(&path, common::PASSWORD, &opts).unwrap();
        vault.add_file("/outer.txt").unwrap();
        vault.flush().unwrap();
    }
    {
        let hidden = OpenOpts { root_block: 100, kdf: common::test_kdf() };
        let mut vault = Vault::open(&path, common::PASSWORD, &hidden).unwrap();
        assert!(vault.list("/").unwrap().is_empty());
        vault.add_file("/secret.txt").unwrap();
        {
            let mut f = vault.open_file("/secret.txt", OpenMode::Append).unwrap();
            f.write_all(b"deniable").unwrap();
        }
        vault.flush().unwrap();
    }

    // each root sees only its own tree
    let mut outer = common::reopen(&path);
    assert!(outer.file_exists("/outer.txt").unwrap());
    assert!(!outer.file_exists("/secret.txt").unwrap());
    drop(outer);

    let hidden = OpenOpts { root_block: 100, kdf: common::test_kdf() };
    let mut inner = Vault::open(&path, common::PASSWORD, &hidden).unwrap();
    assert!(inner.file_exists("/secret.txt").unwrap());
    assert!(!inner.file_exists("/outer.txt").unwrap());
    let mut f = inner.open_file("/secret.txt", OpenMode::ReadOnly).unwrap();
    let mut back = Vec::new();
    f.read_to_end(&mut back).unwrap();
    assert_eq!(back, b"deniable");
}

#[test]
fn sparse_images_materialize_blocks_on_demand() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("sparse.vault");
    let opts = CreateOptions {
        blocks: 4096,
        cipher: CipherId::None,
        sparse: true,
        kdf: common::test_kdf(),
        ..Default::default()
    };
    {
        let mut vault = Vault::create(&path, common::PASSWORD, &opts).unwrap();
        vault.add_file("/small.bin").unwrap();
        {
            let mut f = vault.open_file("/small.bin", OpenMode::Append).unwrap();
            f.write_all(b"tiny").unwrap();
        }
        vault.flush().unwrap();
    }

    // far smaller than the 16 MiB a fully materialized image would need
    let physical = std::fs::metadata(&path).unwrap().len();
    assert!(physical < 1024 * 1024, "sparse image is {physical} B");

    let mut vault = common::reopen(&path);
    assert_eq!(vault.block_count(), 4096);
    let mut f = vault.open_file("/small.bin", OpenMode::ReadOnly).unwrap();
    let mut back = Vec::new();
    f.read_to_end(&mut back).unwrap();
    assert_eq!(back, b"tiny");
}

#[test]
fn truncate_prefix_matches_original_content() {
    let (_dir, _path, mut vault) = common::new_vault(1024);
    let payload: Vec<u8> = (0..9000u32).map(|i| (i % 253) as u8).collect();
    vault.add_file("/t").unwrap();
    {
        let mut f = vault.open_file("/t", OpenMode::Append).unwrap();
        f.write_all(&payload).unwrap();
    }
    vault.truncate_file("/t", 6000).unwrap();

    let mut f = vault.open_file("/t", OpenMode::ReadOnly).unwrap();
    let mut back = Vec::new();
    f.read_to_end(&mut back).unwrap();
    assert_eq!(back, payload[..6000]);
}
