use std::process::ExitCode;

use log::{error, warn};
use squashfs3::{Error, Filesystem};

const USAGE: &str = "usage: squashfs3 <image> [stat | list | ls <path> | inode <path>]";

fn run(image: &str, command: &[String]) -> Result<bool, Error> {
    let mut fs = Filesystem::open(image)?;
    let argument = command.get(1).map(String::as_str).unwrap_or("/");
    match command.first().map(String::as_str).unwrap_or("stat") {
        "stat" => println!("{}", fs.superblock()),
        "list" => {
            let summary = fs.walk(|path, _| println!("{}", String::from_utf8_lossy(path)))?;
            if summary.skipped > 0 {
                warn!("{} directories could not be listed", summary.skipped);
            }
            println!(
                "{} directories, {} entries",
                summary.directories, summary.entries
            );
        }
        "ls" => {
            let inode = fs.lookup(argument)?;
            if inode.as_directory().is_some() {
                for entry in fs.open_directory(inode.locator)?.entries() {
                    println!(
                        "{:>8} {:<16} {}",
                        entry.inode_number,
                        entry.kind.to_string(),
                        String::from_utf8_lossy(&entry.name)
                    );
                }
            } else {
                println!("{inode}");
            }
        }
        "inode" => {
            let inode = fs.lookup(argument)?;
            println!("{inode}");
            if inode.as_file().is_some() {
                let file = fs.open_file(inode.locator)?;
                for (start, size) in file.block_ranges() {
                    println!("  block at {start:#x}: {size}");
                }
                if let Some(fragment) = file.fragment() {
                    println!("  tail in {fragment}");
                }
            }
        }
        _ => return Ok(false),
    }
    Ok(true)
}

fn main() -> ExitCode {
    env_logger::init();
    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some((image, command)) = args.split_first() else {
        eprintln!("{USAGE}");
        return ExitCode::from(2);
    };
    match run(image, command) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => {
            eprintln!("{USAGE}");
            ExitCode::from(2)
        }
        Err(e) => {
            error!("{image}: {e}");
            if e.is_version_mismatch() {
                eprintln!("{image}: not a version 3 squashfs image");
            } else {
                eprintln!("{image}: {e}");
            }
            let errno: libc::c_int = e.into();
            ExitCode::from(errno.clamp(1, 255) as u8)
        }
    }
}
