//! Workload tests: many entries, churn, deep nesting, and large files with
//! scattered overwrites — the shapes a mounted filesystem actually produces.

mod common;

use std::io::{Read, Seek, SeekFrom, Write};
use vaultfs::OpenMode;

#[test]
fn a_hundred_and_twenty_files_survive_a_reopen() {
    let (_dir, path, mut vault) = common::new_vault(2048);

    for i in 0..120 {
        let name = format!("/doc_{i:03}.txt");
        vault.add_file(&name).unwrap();
        let mut f = vault.open_file(&name, OpenMode::Append).unwrap();
        f.write_all(format!("contents of {i}").as_bytes()).unwrap();
    }
    vault.flush().unwrap();
    drop(vault);

    let mut vault = common::reopen(&path);
    assert_eq!(vault.list("/").unwrap().len(), 120);
    for i in (0..120).step_by(17) {
        let name = format!("/doc_{i:03}.txt");
        let mut f = vault.open_file(&name, OpenMode::ReadOnly).unwrap();
        let mut back = String::new();
        f.read_to_string(&mut back).unwrap();
        assert_eq!(back, format!("contents of {i}"));
    }
}

#[test]
fn add_remove_churn_preserves_the_free_count() {
    let (_dir, _path, mut vault) = common::new_vault(2048);
    let baseline = vault.free_block_count();

    for round in 0..5 {
        for i in 0..30 {
            let name = format!("/churn_{round}_{i}");
            vault.add_file(&name).unwrap();
            let mut f = vault.open_file(&name, OpenMode::Append).unwrap();
            f.write_all(&vec![round as u8; 5000]).unwrap();
        }
        for i in 0..30 {
            vault.remove_file(&format!("/churn_{round}_{i}")).unwrap();
        }
        assert_eq!(
            vault.free_block_count(),
            baseline,
            "round {round} leaked blocks"
        );
    }
    assert!(vault.list("/").unwrap().is_empty());
}

#[test]
fn ten_levels_of_nesting_resolve_and_remove() {
    let (_dir, _path, mut vault) = common::new_vault(2048);
    let baseline = vault.free_block_count();

    let mut path = String::new();
    for depth in 0..10 {
        path.push_str(&format!("/level{depth}"));
        vault.add_folder(&path).unwrap();
    }
    let file_path = format!("{path}/bottom.txt");
    vault.add_file(&file_path).unwrap();
    {
        let mut f = vault.open_file(&file_path, OpenMode::Append).unwrap();
        f.write_all(b"all the way down").unwrap();
    }

    assert!(vault.file_exists(&file_path).unwrap());
    assert_eq!(vault.entry_info(&file_path).unwrap().size, 16);

    vault
        .remove_folder("/level0", vaultfs::RemovePolicy::Recursive)
        .unwrap();
    assert!(!vault.folder_exists("/level0").unwrap());
    assert_eq!(vault.free_block_count(), baseline);
}

#[test]
fn large_file_with_scattered_overwrites() {
    let (_dir, path, mut vault) = common::new_vault(2048);

    // ~100 KiB, spanning 26 blocks
    let mut expect: Vec<u8> = (0..102_400u32).map(|i| (i % 241) as u8).collect();
    vault.add_file("/big.bin").unwrap();
    {
        let mut f = vault.open_file("/big.bin", OpenMode::Append).unwrap();
        f.write_all(&expect).unwrap();
    }

    // overwrite short runs at positions spread across the chain
    let patch = b"PATCHED!";
    {
        let mut f = vault.open_file("/big.bin", OpenMode::Overwrite).unwrap();
        for &at in &[0usize, 4080, 4084, 50_000, 102_400 - patch.len()] {
            f.seek(SeekFrom::Start(at as u64)).unwrap();
            f.write_all(patch).unwrap();
            expect[at..at + patch.len()].copy_from_slice(patch);
        }
    }
    vault.flush().unwrap();
    drop(vault);

    let mut vault = common::reopen(&path);
    assert_eq!(vault.entry_info("/big.bin").unwrap().size, 102_400);
    let mut f = vault.open_file("/big.bin", OpenMode::ReadOnly).unwrap();
    let mut back = Vec::new();
    f.read_to_end(&mut back).unwrap();
    assert_eq!(back.len(), expect.len());
    // compare in chunks so a failure points somewhere useful
    for (i, (a, b)) in back.chunks(4096).zip(expect.chunks(4096)).enumerate() {
        assert_eq!(a, b, "mismatch in 4 KiB chunk {i}");
    }
}

#[test]
fn interleaved_reads_and_writes_through_one_stream() {
    let (_dir, _path, mut vault) = common::new_vault(1024);
    vault.add_file("/rw.bin").unwrap();
    {
        let mut f = vault.open_file("/rw.bin", OpenMode::Append).unwrap();
        f.write_all(b"0123456789").unwrap();
    }

    let mut f = vault.open_file("/rw.bin", OpenMode::Overwrite).unwrap();
    let mut got = [0u8; 4];

    f.seek(SeekFrom::Start(2)).unwrap();
    f.read_exact(&mut got).unwrap();
    assert_eq!(&got, b"2345");

    f.seek(SeekFrom::Start(4)).unwrap();
    f.write_all(b"xy").unwrap();

    f.seek(SeekFrom::Start(2)).unwrap();
    f.read_exact(&mut got).unwrap();
    assert_eq!(&got, b"23xy");

    f.seek(SeekFrom::Start(8)).unwrap();
    f.read_exact(&mut [0u8; 2]).unwrap();
    // cursor now at EOF; continuing to write extends
    f.write_all(b"ab").unwrap();
    drop(f);

    assert_eq!(vault.entry_info("/rw.bin").unwrap().size, 12);
}

#[test]
fn rename_shuffles_a_whole_folder() {
    let (_dir, _path, mut vault) = common::new_vault(1024);
    vault.add_folder("/inbox").unwrap();
    vault.add_folder("/archive").unwrap();
    for i in 0..15 {
        let name = format!("/inbox/mail_{i:02}");
        vault.add_file(&name).unwrap();
        let mut f = vault.open_file(&name, OpenMode::Append).unwrap();
        f.write_all(format!("message {i}").as_bytes()).unwrap();
    }

    for i in 0..15 {
        vault
            .rename(
                &format!("/inbox/mail_{i:02}"),
                &format!("/archive/mail_{i:02}"),
            )
            .unwrap();
    }

    assert!(vault.list("/inbox").unwrap().is_empty());
    assert_eq!(vault.list("/archive").unwrap().len(), 15);
    let mut f = vault
        .open_file("/archive/mail_07", OpenMode::ReadOnly)
        .unwrap();
    let mut back = String::new();
    f.read_to_string(&mut back).unwrap();
    assert_eq!(back, "message 7");
}
