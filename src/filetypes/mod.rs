mod block_cursor;
mod directory;
mod regular_file;

use crate::structs::{DataBlockSize, FragmentEntry, Inode, InodeKind, Locator};

/// Read position in a chain of metadata blocks: absolute image offset of the
/// current block and byte offset into its decompressed contents
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetadataCursor {
    pub(crate) block: u64,
    pub(crate) offset: usize,
}

/// One name in a directory listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: Vec<u8>,
    /// Where the entry's inode lives in the inode table
    pub locator: Locator,
    pub kind: InodeKind,
    pub inode_number: u32,
}

/// A decoded directory: its inode and entries sorted by name
#[derive(Debug, Clone)]
pub struct Directory {
    pub(crate) inode: Inode,
    pub(crate) entries: Vec<DirEntry>,
}

/// A regular file inode with its block list and tail fragment
#[derive(Debug, Clone)]
pub struct RegularFile {
    pub(crate) inode: Inode,
    pub(crate) blocks: Vec<DataBlockSize>,
    pub(crate) fragment: Option<FragmentEntry>,
}
