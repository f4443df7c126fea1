//! Builds small version 3 images in memory for unit tests

use std::collections::BTreeMap;
use std::io::{Cursor, Write};

use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::filesystem::Filesystem;
use crate::structs::*;

/// Image offset given to the first data block of every test file
pub(crate) const DATA_START: u64 = 0x80;
/// Bytes reserved for the superblock at the start of the image
const SUPERBLOCK_AREA: usize = 128;

pub(crate) struct ImageBuilder {
    pub endian: Endian,
    pub inode_count: u32,
    pub uids: Vec<u32>,
    pub gids: Vec<u32>,
    pub fragments: Vec<FragmentEntry>,
    /// Write an export table covering every inode number
    pub export: bool,
    pub root: Locator,
    /// Zlib compress metadata blocks. Locators assume stored blocks, so the
    /// inode and directory streams have to fit one block each.
    pub compress: bool,
    /// Set before adding records, locators depend on it
    pub check_data: bool,
    inodes: Vec<u8>,
    directories: Vec<u8>,
    numbers: BTreeMap<u32, Locator>,
}

impl ImageBuilder {
    pub fn new(endian: Endian) -> Self {
        Self {
            endian,
            inode_count: 1,
            uids: vec![0],
            gids: vec![0],
            fragments: Vec::new(),
            export: false,
            root: Locator::default(),
            compress: false,
            check_data: false,
            inodes: Vec::new(),
            directories: Vec::new(),
            numbers: BTreeMap::new(),
        }
    }

    fn locator(&self, position: usize) -> Locator {
        let framed = METADATA_SIZE + 2 + self.check_data as usize;
        Locator::new(
            (position / METADATA_SIZE * framed) as u32,
            (position % METADATA_SIZE) as u16,
        )
    }

    /// Append an inode record to the inode table
    pub fn inode(&mut self, record: &[u8]) -> Locator {
        let locator = self.locator(self.inodes.len());
        let base = BaseInodeHeader::decode(record, self.endian);
        self.numbers.insert(base.inode_number, locator);
        self.inodes.extend_from_slice(record);
        locator
    }

    pub fn inode_padding(&mut self, length: usize) {
        self.inodes.resize(self.inodes.len() + length, 0);
    }

    /// Append block size words right after the last inode
    pub fn block_list(&mut self, sizes: &[u32]) {
        for &size in sizes {
            self.inodes.extend(u32_bytes(self.endian, size));
        }
    }

    /// Append raw bytes to the directory table
    pub fn directory(&mut self, bytes: &[u8]) -> Locator {
        let locator = self.locator(self.directories.len());
        self.directories.extend_from_slice(bytes);
        locator
    }

    /// Append a listing of `(name, inode, kind, inode number)` entries as
    /// given, returning its start and the directory inode file size
    pub fn listing(&mut self, entries: &[(&[u8], Locator, InodeKind, u32)]) -> (Locator, u32) {
        let mut runs: Vec<Vec<&(&[u8], Locator, InodeKind, u32)>> = Vec::new();
        for entry in entries {
            let fits = runs.last().is_some_and(|run| {
                run.len() < DIR_COUNT as usize
                    && run[0].1.block == entry.1.block
                    && i16::try_from(entry.3 as i64 - run[0].3 as i64).is_ok()
            });
            match runs.last_mut() {
                Some(run) if fits => run.push(entry),
                _ => runs.push(vec![entry]),
            }
        }

        let mut bytes = Vec::new();
        for run in runs {
            let (start_block, base_number) = (run[0].1.block, run[0].3);
            bytes.extend(dir_header(
                self.endian,
                (run.len() - 1) as u8,
                start_block,
                base_number,
            ));
            for (name, locator, kind, number) in run {
                let record = DirEntryRecord {
                    offset: locator.offset,
                    entry_type: kind.basic() as u8,
                    size: (name.len() - 1) as u8,
                    inode_offset: (*number as i64 - base_number as i64) as i16,
                };
                bytes.extend(record.encode(self.endian));
                bytes.extend_from_slice(name);
            }
        }
        let size = bytes.len() as u32 + 3;
        (self.directory(&bytes), size)
    }

    fn stream(&self, image: &mut Vec<u8>, contents: &[u8]) -> Vec<u64> {
        assert!(
            !self.compress || contents.len() <= METADATA_SIZE,
            "compressed streams must fit one metadata block"
        );
        let mut offsets = Vec::new();
        let mut chunks: Vec<&[u8]> = contents.chunks(METADATA_SIZE).collect();
        if chunks.is_empty() {
            chunks.push(&[]);
        }
        for chunk in chunks {
            offsets.push(image.len() as u64);
            let (header, stored) = if self.compress {
                let mut encoder = ZlibEncoder::new(Vec::new(), Compression::best());
                encoder.write_all(chunk).unwrap();
                let packed = encoder.finish().unwrap();
                (packed.len() as u16, packed)
            } else {
                (METADATA_UNCOMPRESSED | chunk.len() as u16, chunk.to_vec())
            };
            image.extend(u16_bytes(self.endian, header));
            if self.check_data {
                image.push(0xff);
            }
            image.extend(stored);
        }
        offsets
    }

    fn index(&self, image: &mut Vec<u8>, offsets: &[u64]) -> u64 {
        let start = image.len() as u64;
        for &offset in offsets {
            image.extend(u64_bytes(self.endian, offset));
        }
        start
    }

    pub fn build(&self) -> Vec<u8> {
        let endian = self.endian;
        let mut image = vec![0u8; SUPERBLOCK_AREA];
        let inode_table_start = image.len() as u64;
        self.stream(&mut image, &self.inodes);
        let directory_table_start = image.len() as u64;
        self.stream(&mut image, &self.directories);

        let uids: Vec<u8> = self.uids.iter().flat_map(|&id| u32_bytes(endian, id)).collect();
        let uid_blocks = self.stream(&mut image, &uids);
        let gids: Vec<u8> = self.gids.iter().flat_map(|&id| u32_bytes(endian, id)).collect();
        let gid_blocks = if gids.is_empty() {
            Vec::new()
        } else {
            self.stream(&mut image, &gids)
        };

        let fragments: Vec<u8> = self
            .fragments
            .iter()
            .flat_map(|&entry| {
                let entry = if endian.is_swapped() {
                    entry.swap_bytes()
                } else {
                    entry
                };
                bytemuck::bytes_of(&entry).to_vec()
            })
            .collect();
        let fragment_blocks = if fragments.is_empty() {
            Vec::new()
        } else {
            self.stream(&mut image, &fragments)
        };
        let fragment_table_start = self.index(&mut image, &fragment_blocks);

        let lookup_table_start = if self.export {
            let refs: Vec<u8> = (1..=self.inode_count)
                .flat_map(|number| {
                    let raw = self.numbers.get(&number).map_or(0, |l| l.inode_ref());
                    u64_bytes(endian, raw)
                })
                .collect();
            let blocks = self.stream(&mut image, &refs);
            self.index(&mut image, &blocks)
        } else {
            INVALID_BLOCK
        };

        let uid_start = self.index(&mut image, &uid_blocks);
        let guid_start = if gid_blocks.is_empty() {
            0
        } else {
            self.index(&mut image, &gid_blocks)
        };

        let mut flags = Flags::empty();
        flags.set(Flags::UNCOMPRESSED_INODES, !self.compress);
        flags.set(Flags::CHECK, self.check_data);
        flags.set(Flags::EXPORTABLE, self.export);
        flags.set(Flags::NO_FRAGMENTS, self.fragments.is_empty());

        let mut raw = RawSuperblock::test_default();
        raw.inodes = self.inode_count;
        raw.flags = flags.bits();
        raw.no_uids = self.uids.len() as u8;
        raw.no_guids = self.gids.len() as u8;
        raw.mkfs_time = 1_700_000_000;
        raw.root_inode = self.root.inode_ref();
        raw.fragments = self.fragments.len() as u32;
        raw.bytes_used = image.len() as u64;
        raw.uid_start = uid_start;
        raw.guid_start = guid_start;
        raw.inode_table_start = inode_table_start;
        raw.directory_table_start = directory_table_start;
        raw.fragment_table_start = fragment_table_start;
        raw.lookup_table_start = lookup_table_start;
        let raw = if endian.is_swapped() {
            raw.swap_bytes()
        } else {
            raw
        };
        image[..RawSuperblock::SIZE].copy_from_slice(bytemuck::bytes_of(&raw));
        image
    }

    pub fn mount(&self) -> Filesystem {
        Filesystem::mount(Box::new(Cursor::new(self.build()))).unwrap()
    }
}

fn u16_bytes(endian: Endian, value: u16) -> [u8; 2] {
    match endian {
        Endian::Little => value.to_le_bytes(),
        Endian::Big => value.to_be_bytes(),
    }
}

fn u32_bytes(endian: Endian, value: u32) -> [u8; 4] {
    match endian {
        Endian::Little => value.to_le_bytes(),
        Endian::Big => value.to_be_bytes(),
    }
}

fn u64_bytes(endian: Endian, value: u64) -> [u8; 8] {
    match endian {
        Endian::Little => value.to_le_bytes(),
        Endian::Big => value.to_be_bytes(),
    }
}

pub(crate) fn base(kind: InodeKind, number: u32) -> BaseInodeHeader {
    BaseInodeHeader {
        inode_type: kind as u8,
        mode: 0o755,
        uid: 0,
        guid: 0,
        mtime: 1_700_000_000,
        inode_number: number,
    }
}

/// Encode `base` over the start of `extension`, a full kind-specific record
pub(crate) fn record(endian: Endian, base: &BaseInodeHeader, extension: Option<Vec<u8>>) -> Vec<u8> {
    let header = base.encode(endian);
    let mut bytes = extension.unwrap_or_default();
    if bytes.len() < header.len() {
        bytes.resize(header.len(), 0);
    }
    bytes[..header.len()].copy_from_slice(&header);
    bytes
}

pub(crate) fn dir_inode(
    endian: Endian,
    base: &BaseInodeHeader,
    listing: Locator,
    file_size: u32,
    parent: u32,
) -> Vec<u8> {
    let header = DirInodeHeader {
        nlink: 2,
        file_size,
        offset: listing.offset,
        start_block: listing.block,
        parent_inode: parent,
    };
    record(endian, base, Some(header.encode(endian)))
}

pub(crate) fn file_inode(
    endian: Endian,
    base: &BaseInodeHeader,
    file_size: u32,
    fragment: u32,
    offset: u32,
) -> Vec<u8> {
    let header = RegInodeHeader {
        start_block: DATA_START,
        fragment,
        offset,
        file_size,
    };
    record(endian, base, Some(header.encode(endian)))
}

pub(crate) fn symlink_inode(endian: Endian, base: &BaseInodeHeader, target: &[u8]) -> Vec<u8> {
    let header = SymlinkInodeHeader {
        nlink: 1,
        symlink_size: target.len() as u16,
    };
    let mut bytes = record(endian, base, Some(header.encode(endian)));
    bytes.extend_from_slice(target);
    bytes
}

pub(crate) fn dir_header(endian: Endian, count: u8, start_block: u32, inode_number: u32) -> Vec<u8> {
    DirHeader {
        count,
        start_block,
        inode_number,
    }
    .encode(endian)
}
