use squashfs3::structs::Locator;
use squashfs3::Filesystem;

fn prompt(separator: &str) -> Option<Vec<String>> {
    use std::io::Write;
    let mut line = String::new();
    print!("{separator}");
    std::io::stdout().flush().ok()?;
    match std::io::stdin().read_line(&mut line) {
        Ok(0) | Err(_) => None,
        Ok(_) => Some(line.split_whitespace().map(str::to_string).collect()),
    }
}

fn execute(fs: &mut Filesystem, cmd: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    if cmd.is_empty() {
        return Ok(());
    }
    let locator = || -> Result<Locator, Box<dyn std::error::Error>> {
        Ok(cmd.get(1).ok_or("missing block:offset")?.parse()?)
    };
    match cmd[0].as_str() {
        "s" => println!["{}", fs.superblock()],
        "t" => {
            let tables = fs.tables();
            println!["uids {:?}", tables.uids];
            println!["gids {:?}", tables.gids];
            println!["{} fragments", tables.fragments.len()];
            match &tables.export {
                Some(export) => println!["{} export entries", export.len()],
                None => println!["no export table"],
            }
        }
        "r" => println!["{}", fs.root()?],
        "i" => println!["{}", fs.inode(locator()?)?],
        "d" => {
            for entry in fs.open_directory(locator()?)?.entries() {
                println![
                    "{} {} #{} {}",
                    entry.locator,
                    entry.kind,
                    entry.inode_number,
                    String::from_utf8_lossy(&entry.name)
                ];
            }
        }
        "b" => {
            let file = fs.open_file(locator()?)?;
            for (start, size) in file.block_ranges() {
                println!["{start:#x} {size}"];
            }
            if let Some(fragment) = file.fragment() {
                println!["{fragment}"];
            }
        }
        "l" => println!["{}", fs.lookup(cmd.get(1).map_or("/", String::as_str))?],
        "f" => println!["{}", fs.fragment(cmd.get(1).ok_or("missing index")?.parse()?)?],
        "e" => println!["{}", fs.export_lookup(cmd.get(1).ok_or("missing inode")?.parse()?)?],
        _ => println!["commands: s, t, r, i <b:o>, d <b:o>, b <b:o>, l <path>, f <index>, e <inode>"],
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let image = std::env::args().nth(1).ok_or("usage: debugger <image>")?;
    let mut fs = Filesystem::open(image)?;
    while let Some(cmd) = prompt(">> ") {
        if cmd.first().is_some_and(|c| c == "q") {
            break;
        }
        if let Err(e) = execute(&mut fs, &cmd) {
            eprintln!("{e}");
        }
    }
    Ok(())
}
