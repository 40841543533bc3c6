//! Interactive shell over an open vault.
//!
//! Commands: `ls [path]`, `pwd`, `cd <path>`, `push <frag>`, `pop`,
//! `mkdir <path>`, `rm <path>`, `add file://<host-path>`,
//! `extract <path> file://<host-dir>/`, `help`, `exit`/`quit`.
//!
//! Host-side locations always use the `file://` prefix so a vault path can
//! never be confused with a real one.

use std::io::{self, BufRead, Read, Write};
use std::path::Path;

use crate::error::{FsError, Result};
use crate::file::OpenMode;
use crate::folder::EntryType;
use crate::vault::{RemovePolicy, Vault};

pub fn run(vault: &mut Vault) -> Result<()> {
    let mut cwd = String::from("/");
    println!("vaultfs shell — 'help' lists commands, 'exit' leaves");

    let stdin = io::stdin();
    loop {
        print!("vaultfs:{cwd}> ");
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break; // EOF
        }
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let Some(&command) = tokens.first() else {
            continue;
        };

        let outcome = match (command, tokens.get(1), tokens.get(2)) {
            ("exit" | "quit", _, _) => break,
            ("help", _, _) => {
                print_help();
                Ok(())
            }
            ("pwd", _, _) => {
                println!("{cwd}");
                Ok(())
            }
            ("ls", arg, _) => {
                let path = arg.map_or_else(|| cwd.clone(), |a| join(&cwd, a));
                com_ls(vault, &path)
            }
            ("cd", Some(arg), _) => com_cd(vault, &mut cwd, arg),
            ("push", Some(frag), _) => com_cd(vault, &mut cwd, frag),
            ("pop", _, _) => {
                com_pop(&mut cwd);
                Ok(())
            }
            ("mkdir", Some(arg), _) => vault.add_folder(&join(&cwd, arg)),
            ("rm", Some(arg), _) => com_rm(vault, &join(&cwd, arg)),
            ("add", Some(resource), _) => com_add(vault, &cwd, resource),
            ("extract", Some(arg), Some(dst)) => com_extract(vault, &join(&cwd, arg), dst),
            _ => {
                println!("unrecognized command; try 'help'");
                Ok(())
            }
        };

        if let Err(e) = outcome {
            println!("error: {e}");
        }
    }
    Ok(())
}

fn print_help() {
    println!("ls [path]                     list folder contents");
    println!("pwd                           print the working folder");
    println!("cd <path>                     change the working folder");
    println!("push <frag>                   descend into a sub-folder");
    println!("pop                           ascend one folder");
    println!("mkdir <path>                  create a folder");
    println!("rm <path>                     remove a file or folder tree");
    println!("add file://<host-path>        copy a host file into the vault");
    println!("extract <path> file://<dir>/  copy a vault file out to a host dir");
    println!("exit                          leave the shell");
}

/// Join a possibly-relative fragment onto the working folder.
fn join(cwd: &str, fragment: &str) -> String {
    if fragment.starts_with('/') {
        fragment.to_owned()
    } else if cwd == "/" {
        format!("/{fragment}")
    } else {
        format!("{cwd}/{fragment}")
    }
}

fn strip_file_scheme(resource: &str) -> Result<&str> {
    resource.strip_prefix("file://").ok_or_else(|| {
        FsError::IllegalFilename(format!("host locations need a file:// prefix: {resource}"))
    })
}

fn com_ls(vault: &mut Vault, path: &str) -> Result<()> {
    for info in vault.list(path)? {
        match info.entry_type {
            EntryType::Folder => println!("<folder>  {:>10}  {}", "", info.name),
            EntryType::File => println!("<file>    {:>10}  {}", info.size, info.name),
        }
    }
    Ok(())
}

fn com_cd(vault: &mut Vault, cwd: &mut String, arg: &str) -> Result<()> {
    let target = join(cwd, arg);
    if !vault.folder_exists(&target)? {
        return Err(FsError::NotFound);
    }
    *cwd = normalize(&target);
    Ok(())
}

fn com_pop(cwd: &mut String) {
    if let Some(cut) = cwd.rfind('/') {
        cwd.truncate(cut.max(1));
    }
}

fn normalize(path: &str) -> String {
    if path.len() > 1 && path.ends_with('/') {
        path[..path.len() - 1].to_owned()
    } else {
        path.to_owned()
    }
}

fn com_rm(vault: &mut Vault, path: &str) -> Result<()> {
    let info = vault.entry_info(path)?;
    match info.entry_type {
        EntryType::File => vault.remove_file(path),
        EntryType::Folder => vault.remove_folder(path, RemovePolicy::Recursive),
    }
}

fn com_add(vault: &mut Vault, cwd: &str, resource: &str) -> Result<()> {
    let host_path = strip_file_scheme(resource)?;
    let data = std::fs::read(host_path)?;
    let name = Path::new(host_path)
        .file_name()
        .ok_or_else(|| FsError::IllegalFilename(host_path.to_owned()))?
        .to_string_lossy()
        .into_owned();

    let target = join(cwd, &name);
    vault.add_file(&target)?;
    let mut file = vault.open_file(&target, OpenMode::WriteOnly)?;
    file.write_all(&data)?;
    file.flush()?;
    println!("added {target} ({} B)", data.len());
    Ok(())
}

fn com_extract(vault: &mut Vault, path: &str, dst: &str) -> Result<()> {
    let host_dir = strip_file_scheme(dst)?;
    let name = path.rsplit('/').next().unwrap_or(path);
    let out_path = Path::new(host_dir).join(name);

    let mut file = vault.open_file(path, OpenMode::ReadOnly)?;
    let mut data = Vec::with_capacity(file.size() as usize);
    file.read_to_end(&mut data)?;
    drop(file);

    std::fs::write(&out_path, &data)?;
    println!("extracted {path} -> {} ({} B)", out_path.display(), data.len());
    Ok(())
}
