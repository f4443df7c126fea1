use log::{debug, trace, warn};

use super::{DirEntry, Directory, MetadataCursor};
use crate::error::DirectoryFault;
use crate::structs::*;
use crate::{Error, Filesystem};

/// Empty directories still record this many bytes of listing
const EMPTY_LISTING: u32 = 3;

impl Directory {
    /// Decode the listing of the directory inode at `locator`
    pub fn load(fs: &mut Filesystem, locator: Locator) -> Result<Self, Error> {
        let inode = fs.inode(locator)?;
        let dir = *inode.as_directory().ok_or(Error::WrongKind {
            locator,
            expected: "directory",
            found: inode.kind(),
        })?;
        let corrupt = |position, fault| Error::CorruptDirectory {
            locator,
            position,
            fault,
        };

        if dir.file_size < EMPTY_LISTING {
            return Err(corrupt(0, DirectoryFault::BadSize(dir.file_size)));
        }
        let size = (dir.file_size - EMPTY_LISTING) as u64;
        if size == 0 {
            trace!("Directory {locator} is empty");
            return Ok(Self {
                inode,
                entries: Vec::new(),
            });
        }
        debug!("Load directory {locator}, {size} bytes of listing at {}", dir.listing());

        let table = fs.superblock().directory_table_start;
        let endian = fs.superblock().endian;
        let mut cursor = MetadataCursor::at(table, dir.listing());
        let mut position = 0u64;
        let mut entries = Vec::new();

        while position < size {
            let mut read = |fs: &mut Filesystem, length: usize, position: &mut u64| {
                let bytes = cursor
                    .read_vec(fs, length)
                    .map_err(|e| corrupt(*position, DirectoryFault::Unreadable(e.to_string())))?;
                *position += length as u64;
                Ok::<_, Error>(bytes)
            };

            let header_start = position;
            let header = DirHeader::decode(&read(fs, DirHeader::SIZE, &mut position)?, endian);
            let count = header.count as u32 + 1;
            if count > DIR_COUNT {
                return Err(corrupt(header_start, DirectoryFault::TooManyEntries(count)));
            }
            trace!(
                "Directory header: {count} entries, inode block {}, base inode {}",
                header.start_block,
                header.inode_number
            );

            for _ in 0..count {
                let entry_start = position;
                let entry =
                    DirEntryRecord::decode(&read(fs, DirEntryRecord::SIZE, &mut position)?, endian);
                if entry.size as usize >= NAME_LEN {
                    return Err(corrupt(
                        entry_start,
                        DirectoryFault::NameTooLong(entry.size as usize + 1),
                    ));
                }
                let name = read(fs, entry.size as usize + 1, &mut position)?;
                if !valid_name(&name) {
                    return Err(corrupt(entry_start, DirectoryFault::InvalidName(name)));
                }
                let kind = InodeKind::try_from(entry.entry_type)
                    .map_err(|tag| corrupt(entry_start, DirectoryFault::EntryType(tag)))?;
                entries.push(DirEntry {
                    name,
                    locator: Locator::new(header.start_block, entry.offset),
                    kind,
                    inode_number: header
                        .inode_number
                        .wrapping_add_signed(entry.inode_offset as i32),
                });
            }
        }
        if position > size {
            warn!("Directory {locator} listing overruns its size by {} bytes", position - size);
        }

        check_order(&entries).map_err(|fault| corrupt(position, fault))?;
        Ok(Self { inode, entries })
    }

    pub fn inode(&self) -> &Inode {
        &self.inode
    }

    pub fn entries(&self) -> &[DirEntry] {
        &self.entries
    }

    /// Inode number of the parent directory
    pub fn parent(&self) -> u32 {
        self.inode.as_directory().map_or(0, |dir| dir.parent)
    }

    pub fn find(&self, name: &[u8]) -> Option<&DirEntry> {
        self.entries
            .binary_search_by(|entry| entry.name.as_slice().cmp(name))
            .ok()
            .map(|i| &self.entries[i])
    }
}

/// Names are single path components
fn valid_name(name: &[u8]) -> bool {
    name != b"." && name != b".." && !name.iter().any(|&c| c == b'/' || c == 0)
}

fn check_order(entries: &[DirEntry]) -> Result<(), DirectoryFault> {
    for pair in entries.windows(2) {
        let (previous, next) = (&pair[0].name, &pair[1].name);
        if previous == next {
            return Err(DirectoryFault::Duplicate(next.clone()));
        }
        if previous > next {
            return Err(DirectoryFault::Unsorted {
                previous: previous.clone(),
                next: next.clone(),
            });
        }
    }
    Ok(())
}
