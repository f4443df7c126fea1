use std::fmt::Display;

use bitflags::bitflags;
use bytemuck::{Pod, Zeroable};
use log::{debug, warn};

use super::*;
use crate::filesystem::Device;
use crate::Error;

bitflags! {
    /// Superblock build flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Flags: u8 {
        const UNCOMPRESSED_INODES = 1 << 0;
        const UNCOMPRESSED_DATA = 1 << 1;
        /// Every metadata block header is followed by a check byte
        const CHECK = 1 << 2;
        const UNCOMPRESSED_FRAGMENTS = 1 << 3;
        const NO_FRAGMENTS = 1 << 4;
        const ALWAYS_FRAGMENTS = 1 << 5;
        const DUPLICATES = 1 << 6;
        const EXPORTABLE = 1 << 7;
    }
}

/// Version 3 superblock exactly as stored at the start of the image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
#[repr(C, packed)]
pub struct RawSuperblock {
    pub(crate) s_magic: u32,
    pub(crate) inodes: u32,
    pub(crate) bytes_used_2: u32,
    pub(crate) uid_start_2: u32,
    pub(crate) guid_start_2: u32,
    pub(crate) inode_table_start_2: u32,
    pub(crate) directory_table_start_2: u32,
    pub(crate) s_major: u16,
    pub(crate) s_minor: u16,
    pub(crate) block_size_1: u16,
    pub(crate) block_log: u16,
    pub(crate) flags: u8,
    pub(crate) no_uids: u8,
    pub(crate) no_guids: u8,
    pub(crate) mkfs_time: i32,
    pub(crate) root_inode: u64,
    pub(crate) block_size: u32,
    pub(crate) fragments: u32,
    pub(crate) fragment_table_start_2: u32,
    pub(crate) bytes_used: u64,
    pub(crate) uid_start: u64,
    pub(crate) guid_start: u64,
    pub(crate) inode_table_start: u64,
    pub(crate) directory_table_start: u64,
    pub(crate) fragment_table_start: u64,
    pub(crate) lookup_table_start: u64,
}

impl RawSuperblock {
    pub const SIZE: usize = std::mem::size_of::<Self>();
}

impl ByteSwap for RawSuperblock {
    fn swap_bytes(self) -> Self {
        Self {
            s_magic: { self.s_magic }.swap_bytes(),
            inodes: { self.inodes }.swap_bytes(),
            bytes_used_2: { self.bytes_used_2 }.swap_bytes(),
            uid_start_2: { self.uid_start_2 }.swap_bytes(),
            guid_start_2: { self.guid_start_2 }.swap_bytes(),
            inode_table_start_2: { self.inode_table_start_2 }.swap_bytes(),
            directory_table_start_2: { self.directory_table_start_2 }.swap_bytes(),
            s_major: { self.s_major }.swap_bytes(),
            s_minor: { self.s_minor }.swap_bytes(),
            block_size_1: { self.block_size_1 }.swap_bytes(),
            block_log: { self.block_log }.swap_bytes(),
            flags: self.flags,
            no_uids: self.no_uids,
            no_guids: self.no_guids,
            mkfs_time: { self.mkfs_time }.swap_bytes(),
            root_inode: { self.root_inode }.swap_bytes(),
            block_size: { self.block_size }.swap_bytes(),
            fragments: { self.fragments }.swap_bytes(),
            fragment_table_start_2: { self.fragment_table_start_2 }.swap_bytes(),
            bytes_used: { self.bytes_used }.swap_bytes(),
            uid_start: { self.uid_start }.swap_bytes(),
            guid_start: { self.guid_start }.swap_bytes(),
            inode_table_start: { self.inode_table_start }.swap_bytes(),
            directory_table_start: { self.directory_table_start }.swap_bytes(),
            fragment_table_start: { self.fragment_table_start }.swap_bytes(),
            lookup_table_start: { self.lookup_table_start }.swap_bytes(),
        }
    }
}

/// Version-independent view of the superblock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Superblock {
    pub magic: u32,
    pub major: u16,
    pub minor: u16,
    /// Byte order of every multi-byte field in the image
    pub endian: Endian,
    pub inode_count: u32,
    pub fragment_count: u32,
    pub block_size: u32,
    pub block_log: u16,
    pub flags: Flags,
    pub mkfs_time: i32,
    pub root_inode: Locator,
    pub bytes_used: u64,
    pub inode_table_start: u64,
    pub directory_table_start: u64,
    pub fragment_table_start: u64,
    /// [`INVALID_BLOCK`] when the image has no export table
    pub lookup_table_start: u64,
    /// Always [`INVALID_BLOCK`], version 3 has no xattr table
    pub xattr_id_table_start: u64,
    pub uid_count: u32,
    pub uid_start: u64,
    pub gid_count: u32,
    pub gid_start: u64,
}

impl Superblock {
    /// Read and validate the superblock, settling the image byte order
    pub fn load(device: &mut Device) -> Result<Self, Error> {
        let mut raw = [0u8; RawSuperblock::SIZE];
        device.read_bytes(SUPERBLOCK_START, &mut raw)?;
        let raw: RawSuperblock = bytemuck::pod_read_unaligned(&raw);
        let magic = raw.s_magic;
        let (raw, endian) = if magic == MAGIC_SWAP {
            warn!("Reading a different endian filesystem");
            (raw.swap_bytes(), Endian::NATIVE.opposite())
        } else {
            (raw, Endian::NATIVE)
        };
        let superblock = Self::from_raw(raw, endian)?;
        debug!(
            "Found {} superblock, version {}.{}",
            superblock.endian, superblock.major, superblock.minor
        );
        Ok(superblock)
    }

    /// Map a superblock already in host byte order
    pub fn from_raw(raw: RawSuperblock, endian: Endian) -> Result<Self, Error> {
        let (magic, major, minor) = (raw.s_magic, raw.s_major, raw.s_minor);
        if magic != MAGIC || major != VERSION_MAJOR || minor > VERSION_MINOR_MAX {
            return Err(Error::UnsupportedVersion {
                magic,
                major,
                minor,
            });
        }
        let (block_size, block_log) = (raw.block_size, raw.block_log);
        if !(MIN_BLOCK_LOG..=MAX_BLOCK_LOG).contains(&block_log) {
            return Err(Error::BadSuperblock {
                offset: SUPERBLOCK_START,
                reason: "block log out of range",
            });
        }
        if block_size != 1 << block_log {
            return Err(Error::BadSuperblock {
                offset: SUPERBLOCK_START,
                reason: "block size does not match block log",
            });
        }
        Ok(Self {
            magic,
            major,
            minor,
            endian,
            inode_count: raw.inodes,
            fragment_count: raw.fragments,
            block_size,
            block_log,
            flags: Flags::from_bits_retain(raw.flags),
            mkfs_time: raw.mkfs_time,
            root_inode: Locator::from_inode_ref(raw.root_inode),
            bytes_used: raw.bytes_used,
            inode_table_start: raw.inode_table_start,
            directory_table_start: raw.directory_table_start,
            fragment_table_start: raw.fragment_table_start,
            lookup_table_start: raw.lookup_table_start,
            xattr_id_table_start: INVALID_BLOCK,
            uid_count: raw.no_uids as u32,
            uid_start: raw.uid_start,
            gid_count: raw.no_guids as u32,
            gid_start: raw.guid_start,
        })
    }

    pub fn has_export_table(&self) -> bool {
        self.lookup_table_start != INVALID_BLOCK
    }
}

impl Display for Superblock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let yes_no = |flag: bool, word: &'static str| if flag { word } else { "" };
        writeln!(
            f,
            "Found a valid {} SQUASHFS {}:{} superblock",
            self.endian, self.major, self.minor
        )?;
        writeln!(f, "Creation or last append time {}", self.mkfs_time)?;
        writeln!(
            f,
            "Filesystem size {} bytes ({:.2} Kbytes / {:.2} Mbytes)",
            self.bytes_used,
            self.bytes_used as f64 / 1024.0,
            self.bytes_used as f64 / (1024.0 * 1024.0)
        )?;
        writeln!(f, "Block size {}", self.block_size)?;
        writeln!(
            f,
            "Filesystem is {}exportable via NFS",
            yes_no(!self.flags.contains(Flags::EXPORTABLE), "not ")
        )?;
        writeln!(
            f,
            "Inodes are {}compressed",
            yes_no(self.flags.contains(Flags::UNCOMPRESSED_INODES), "un")
        )?;
        writeln!(
            f,
            "Data is {}compressed",
            yes_no(self.flags.contains(Flags::UNCOMPRESSED_DATA), "un")
        )?;
        if self.flags.contains(Flags::NO_FRAGMENTS) {
            writeln!(f, "Fragments are not stored")?;
        } else {
            writeln!(
                f,
                "Fragments are {}compressed",
                yes_no(self.flags.contains(Flags::UNCOMPRESSED_FRAGMENTS), "un")
            )?;
            writeln!(
                f,
                "Always-use-fragments option is {}specified",
                yes_no(!self.flags.contains(Flags::ALWAYS_FRAGMENTS), "not ")
            )?;
        }
        writeln!(
            f,
            "Check data is {}present in the filesystem",
            yes_no(!self.flags.contains(Flags::CHECK), "not ")
        )?;
        writeln!(
            f,
            "Duplicates are {}removed",
            yes_no(!self.flags.contains(Flags::DUPLICATES), "not ")
        )?;
        writeln!(f, "Number of fragments {}", self.fragment_count)?;
        writeln!(f, "Number of inodes {}", self.inode_count)?;
        writeln!(f, "Number of uids {}", self.uid_count)?;
        write!(f, "Number of gids {}", self.gid_count)
    }
}

#[cfg(test)]
impl RawSuperblock {
    /// Superblock in host order for the test image builder
    pub(crate) fn test_default() -> Self {
        Self {
            s_magic: MAGIC,
            s_major: VERSION_MAJOR,
            s_minor: 1,
            block_size: 4096,
            block_size_1: 4096,
            block_log: 12,
            lookup_table_start: INVALID_BLOCK,
            ..Zeroable::zeroed()
        }
    }
}
