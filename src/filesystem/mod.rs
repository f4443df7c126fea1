use std::collections::BTreeSet;
use std::fmt::Display;
use std::path::Path;
use std::sync::Arc;

use log::{debug, info, warn};

use crate::filetypes::{DirEntry, Directory, MetadataCursor, RegularFile};
use crate::structs::*;
use crate::Error;

mod cache;
mod device;
mod tables;

use cache::Cache;
pub use device::{BlockDevice, Device, MetadataBlock};
pub use tables::{index_bytes, metadata_blocks, resolve, IndexedTable, Tables};

/// Decompressed metadata blocks kept around between reads
pub const METADATA_CACHE_ENTRIES: usize = 64;

/// Tables located through the superblock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    Gid,
    Uid,
    Export,
    Fragment,
    Directory,
    Inode,
}

impl Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Gid => "gid",
            Self::Uid => "uid",
            Self::Export => "export",
            Self::Fragment => "fragment",
            Self::Directory => "directory",
            Self::Inode => "inode",
        };
        write!(f, "{name}")
    }
}

/// A mounted image: its superblock, lookup tables and metadata cache
#[derive(Debug)]
pub struct Filesystem {
    pub(crate) superblock: Superblock,
    pub(crate) tables: Tables,
    pub(crate) device: Device,
    pub(crate) cache: Cache,
}

/// Outcome of [`Filesystem::walk`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WalkSummary {
    pub directories: usize,
    pub entries: usize,
    /// Directories left out because their listing failed to decode
    pub skipped: usize,
}

impl Filesystem {
    /// Read the superblock and every lookup table of the image on `device`
    pub fn mount(device: Box<dyn BlockDevice>) -> Result<Self, Error> {
        let mut device = Device::new(device);
        let superblock = Superblock::load(&mut device)?;
        device.configure(&superblock);
        let tables = Tables::load(&mut device, &superblock)?;
        info!(
            "Mounted {} filesystem of {} bytes with {} inodes",
            superblock.endian, superblock.bytes_used, superblock.inode_count
        );
        Ok(Self {
            superblock,
            tables,
            device,
            cache: Cache::default(),
        })
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let file = std::fs::File::open(path)?;
        Self::mount(Box::new(file))
    }

    pub fn superblock(&self) -> &Superblock {
        &self.superblock
    }

    pub fn tables(&self) -> &Tables {
        &self.tables
    }

    /// Metadata block starting at absolute image offset `start`
    pub(crate) fn metadata_block(&mut self, start: u64) -> Result<Arc<MetadataBlock>, Error> {
        if let Some(block) = self.cache.get(start) {
            return Ok(block);
        }
        let block = Arc::new(self.device.read_metadata_block(start, None)?);
        self.cache.set(start, block.clone());
        Ok(block)
    }

    /// Decode the inode at `locator`
    pub fn inode(&mut self, locator: Locator) -> Result<Inode, Error> {
        debug!("Load inode {locator}");
        Inode::load(self, locator)
    }

    pub fn root(&mut self) -> Result<Inode, Error> {
        self.inode(self.superblock.root_inode)
    }

    /// Decode the listing of the directory inode at `locator`
    pub fn open_directory(&mut self, locator: Locator) -> Result<Directory, Error> {
        Directory::load(self, locator)
    }

    /// Decode the regular file inode at `locator` with its block list and
    /// fragment entry
    pub fn open_file(&mut self, locator: Locator) -> Result<RegularFile, Error> {
        RegularFile::load(self, locator)
    }

    /// Read `count` block size words starting at `cursor`. The list grows
    /// one metadata block worth of words at a time, so a bogus count fails
    /// on the first missing block rather than up front.
    pub fn read_block_list(
        &mut self,
        cursor: MetadataCursor,
        count: u64,
    ) -> Result<Vec<DataBlockSize>, Error> {
        const WORD: usize = std::mem::size_of::<DataBlockSize>();
        let endian = self.superblock.endian;
        let mut cursor = cursor;
        let mut blocks: Vec<DataBlockSize> = Vec::new();
        let mut raw = [0u8; METADATA_SIZE];
        let mut remaining = count;
        while remaining > 0 {
            let words = remaining.min((METADATA_SIZE / WORD) as u64) as usize;
            let chunk = &mut raw[..words * WORD];
            cursor.read(self, chunk)?;
            blocks
                .try_reserve(words)
                .map_err(|_| Error::OutOfMemory {
                    bytes: ((blocks.len() + words) * WORD) as u64,
                })?;
            blocks.extend(
                chunk
                    .chunks_exact(WORD)
                    .map(|word| tables::swapped(bytemuck::pod_read_unaligned::<DataBlockSize>(word), endian)),
            );
            remaining -= words as u64;
        }
        Ok(blocks)
    }

    /// Fragment table entry `index`
    pub fn fragment(&self, index: u32) -> Result<FragmentEntry, Error> {
        self.tables
            .fragments
            .get(index as usize)
            .copied()
            .ok_or(Error::OutOfBounds {
                table: Table::Fragment,
                index: index as u64,
            })
    }

    /// Locator of the inode numbered `number`, through the export table
    pub fn export_lookup(&self, number: u32) -> Result<Locator, Error> {
        let export = self
            .tables
            .export
            .as_ref()
            .ok_or(Error::TableAbsent(Table::Export))?;
        number
            .checked_sub(1)
            .and_then(|i| export.get(i as usize))
            .map(|&raw| Locator::from_inode_ref(raw))
            .ok_or(Error::OutOfBounds {
                table: Table::Export,
                index: number as u64,
            })
    }

    /// Resolve a `/` separated path from the root directory
    pub fn lookup(&mut self, path: &str) -> Result<Inode, Error> {
        let mut locator = self.superblock.root_inode;
        for name in path.split('/').filter(|name| !name.is_empty() && *name != ".") {
            let directory = self.open_directory(locator)?;
            locator = directory
                .find(name.as_bytes())
                .ok_or_else(|| Error::NotFound(path.to_owned()))?
                .locator;
        }
        self.inode(locator)
    }

    /// Visit every entry below the root, depth first in name order. Paths
    /// handed to `visit` are relative to the root. Directories whose listing
    /// is corrupt are reported and skipped, fatal errors end the walk.
    pub fn walk<F>(&mut self, mut visit: F) -> Result<WalkSummary, Error>
    where
        F: FnMut(&[u8], &DirEntry),
    {
        let mut summary = WalkSummary::default();
        let mut visited = BTreeSet::new();
        let mut pending = vec![(Vec::new(), self.superblock.root_inode)];
        while let Some((path, locator)) = pending.pop() {
            if !visited.insert(locator) {
                warn!("Directory {locator} is linked twice, skipping");
                summary.skipped += 1;
                continue;
            }
            let directory = match self.open_directory(locator) {
                Ok(directory) => directory,
                Err(e) if !e.is_fatal() => {
                    warn!("Skipping /{}: {e}", String::from_utf8_lossy(&path));
                    summary.skipped += 1;
                    continue;
                }
                Err(e) => return Err(e),
            };
            summary.directories += 1;
            let mut children = Vec::new();
            for entry in &directory.entries {
                let mut child = path.clone();
                if !child.is_empty() {
                    child.push(b'/');
                }
                child.extend_from_slice(&entry.name);
                visit(&child, entry);
                summary.entries += 1;
                if entry.kind.is_directory() {
                    children.push((child, entry.locator));
                }
            }
            pending.extend(children.into_iter().rev());
        }
        Ok(summary)
    }
}
