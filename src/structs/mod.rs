use std::fmt::Display;
use std::str::FromStr;

use bytemuck::Pod;

/// Declares a [`MetadataRecord`] from `field: type = (bit offset, bit width)`
/// entries. Bit positions follow the on-disk bit field layout: counted from
/// the least significant bit on little endian images, from the most
/// significant bit on big endian ones.
macro_rules! packed_record {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident: $size:literal {
            $($(#[$fmeta:meta])* $field:ident: $ty:ty = ($offset:expr, $width:expr)),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
        $vis struct $name {
            $($(#[$fmeta])* pub(crate) $field: $ty),*
        }

        impl $crate::structs::MetadataRecord for $name {
            const SIZE: usize = $size;

            fn decode(bytes: &[u8], endian: $crate::structs::Endian) -> Self {
                Self {
                    $($field: endian.get_bits(bytes, $offset, $width) as $ty),*
                }
            }

            #[cfg(test)]
            fn encode(&self, endian: $crate::structs::Endian) -> Vec<u8> {
                let mut bytes = vec![0u8; $size];
                $(endian.put_bits(&mut bytes, $offset, $width, self.$field as u64);)*
                bytes
            }
        }
    };
}

mod bitfield;
mod directory;
mod fragment;
mod inode;
mod superblock;

pub use bitfield::Endian;
pub(crate) use directory::{DirEntryRecord, DirHeader};
pub use fragment::{DataBlockSize, FragmentEntry};
pub use inode::*;
pub use superblock::*;

/// Magic signature of an image written in the reader's byte order
pub const MAGIC: u32 = 0x7371_7368;
/// Magic signature of an image written in the opposite byte order
pub const MAGIC_SWAP: u32 = 0x6873_7173;
pub const SUPERBLOCK_START: u64 = 0;
pub const VERSION_MAJOR: u16 = 3;
pub const VERSION_MINOR_MAX: u16 = 1;

/// Largest decompressed size of a metadata block
pub const METADATA_SIZE: usize = 8192;
/// Bit 15 of a metadata block header marks a block stored uncompressed
pub const METADATA_UNCOMPRESSED: u16 = 1 << 15;
/// Bit 24 of a data block or fragment size marks a block stored uncompressed
pub const DATA_UNCOMPRESSED: u32 = 1 << 24;

pub const NAME_LEN: usize = 256;
pub const DIR_COUNT: u32 = 256;
/// Gid index meaning "same as the owning uid"
pub const GID_SAME_AS_UID: u8 = 255;
pub const INVALID_FRAGMENT: u32 = u32::MAX;
pub const INVALID_BLOCK: u64 = u64::MAX;
pub const INVALID_XATTR: u32 = u32::MAX;

pub const MIN_BLOCK_LOG: u16 = 12;
pub const MAX_BLOCK_LOG: u16 = 20;

/// Position of a record inside a metadata table: offset of the metadata
/// block from the table start, and byte offset in its decompressed contents
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Locator {
    pub block: u32,
    pub offset: u16,
}

impl Locator {
    pub const fn new(block: u32, offset: u16) -> Self {
        Self { block, offset }
    }

    /// Split a packed 64-bit inode reference
    pub const fn from_inode_ref(raw: u64) -> Self {
        Self {
            block: (raw >> 16) as u32,
            offset: (raw & 0xffff) as u16,
        }
    }

    pub const fn inode_ref(self) -> u64 {
        ((self.block as u64) << 16) | self.offset as u64
    }
}

impl Display for Locator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.block, self.offset)
    }
}

impl FromStr for Locator {
    type Err = std::num::ParseIntError;

    /// Parses `block:offset`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (block, offset) = s.split_once(':').unwrap_or((s, "0"));
        Ok(Self {
            block: block.trim().parse()?,
            offset: offset.trim().parse()?,
        })
    }
}

/// Fixed-size record packed with bit fields inside a metadata stream
pub(crate) trait MetadataRecord: Sized {
    const SIZE: usize;
    fn decode(bytes: &[u8], endian: Endian) -> Self;
    #[cfg(test)]
    fn encode(&self, endian: Endian) -> Vec<u8>;
}

/// Plain on-disk value whose multi-byte fields are reversed on
/// opposite-endian images
pub trait ByteSwap: Pod {
    fn swap_bytes(self) -> Self;
}

impl ByteSwap for u32 {
    fn swap_bytes(self) -> Self {
        u32::swap_bytes(self)
    }
}

impl ByteSwap for u64 {
    fn swap_bytes(self) -> Self {
        u64::swap_bytes(self)
    }
}
