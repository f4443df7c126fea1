use std::fmt::Display;

use log::trace;

use super::*;
use crate::error::InodeFault;
use crate::filesystem::Filesystem;
use crate::filetypes::MetadataCursor;
use crate::Error;

/// The nine inode kinds of a version 3 image, numbered as on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum InodeKind {
    Directory = 1,
    File = 2,
    Symlink = 3,
    BlockDevice = 4,
    CharDevice = 5,
    Fifo = 6,
    Socket = 7,
    ExtendedDirectory = 8,
    ExtendedFile = 9,
}

impl InodeKind {
    /// Kind with the extended variants folded into the basic ones, as
    /// stored in directory entries
    pub fn basic(self) -> Self {
        match self {
            Self::ExtendedDirectory => Self::Directory,
            Self::ExtendedFile => Self::File,
            kind => kind,
        }
    }

    pub fn is_directory(self) -> bool {
        self.basic() == Self::Directory
    }

    /// `S_IF*` bits merged into the permission bits of the inode mode
    pub fn file_type_bits(self) -> u32 {
        (match self.basic() {
            Self::Directory | Self::ExtendedDirectory => libc::S_IFDIR,
            Self::File | Self::ExtendedFile => libc::S_IFREG,
            Self::Symlink => libc::S_IFLNK,
            Self::BlockDevice => libc::S_IFBLK,
            Self::CharDevice => libc::S_IFCHR,
            Self::Fifo => libc::S_IFIFO,
            Self::Socket => libc::S_IFSOCK,
        }) as u32
    }
}

impl TryFrom<u8> for InodeKind {
    type Error = u8;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        Ok(match tag {
            1 => Self::Directory,
            2 => Self::File,
            3 => Self::Symlink,
            4 => Self::BlockDevice,
            5 => Self::CharDevice,
            6 => Self::Fifo,
            7 => Self::Socket,
            8 => Self::ExtendedDirectory,
            9 => Self::ExtendedFile,
            tag => return Err(tag),
        })
    }
}

impl Display for InodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Directory => "directory",
            Self::File => "regular file",
            Self::Symlink => "symbolic link",
            Self::BlockDevice => "block device",
            Self::CharDevice => "character device",
            Self::Fifo => "fifo",
            Self::Socket => "socket",
            Self::ExtendedDirectory => "extended directory",
            Self::ExtendedFile => "extended regular file",
        };
        write!(f, "{name}")
    }
}

packed_record! {
    /// Header shared by every inode
    pub(crate) struct BaseInodeHeader: 12 {
        inode_type: u8 = (0, 4),
        mode: u16 = (4, 12),
        uid: u8 = (16, 8),
        guid: u8 = (24, 8),
        mtime: i32 = (32, 32),
        inode_number: u32 = (64, 32),
    }
}

packed_record! {
    pub(crate) struct DirInodeHeader: 28 {
        nlink: u32 = (96, 32),
        file_size: u32 = (128, 19),
        offset: u16 = (147, 13),
        start_block: u32 = (160, 32),
        parent_inode: u32 = (192, 32),
    }
}

packed_record! {
    /// Directory inode followed by `i_count` directory index records
    pub(crate) struct LdirInodeHeader: 31 {
        nlink: u32 = (96, 32),
        file_size: u32 = (128, 27),
        offset: u16 = (155, 13),
        start_block: u32 = (168, 32),
        i_count: u16 = (200, 16),
        parent_inode: u32 = (216, 32),
    }
}

packed_record! {
    /// Regular file inode followed by its block list
    pub(crate) struct RegInodeHeader: 32 {
        start_block: u64 = (96, 64),
        fragment: u32 = (160, 32),
        offset: u32 = (192, 32),
        file_size: u32 = (224, 32),
    }
}

packed_record! {
    pub(crate) struct LregInodeHeader: 40 {
        nlink: u32 = (96, 32),
        start_block: u64 = (128, 64),
        fragment: u32 = (192, 32),
        offset: u32 = (224, 32),
        file_size: u64 = (256, 64),
    }
}

packed_record! {
    /// Symbolic link inode followed by `symlink_size` bytes of target
    pub(crate) struct SymlinkInodeHeader: 18 {
        nlink: u32 = (96, 32),
        symlink_size: u16 = (128, 16),
    }
}

packed_record! {
    pub(crate) struct DevInodeHeader: 18 {
        nlink: u32 = (96, 32),
        rdev: u16 = (128, 16),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectoryInode {
    pub nlink: u32,
    /// Listing length in bytes, plus 3
    pub file_size: u32,
    pub offset: u16,
    pub start_block: u32,
    pub parent: u32,
    /// Directory index records following an extended directory inode
    pub index_count: u16,
}

impl DirectoryInode {
    /// Start of the entry listing in the directory table
    pub fn listing(&self) -> Locator {
        Locator::new(self.start_block, self.offset)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileInode {
    pub nlink: u32,
    /// Image offset of the first data block
    pub start_block: u64,
    pub file_size: u64,
    /// Fragment table index, [`INVALID_FRAGMENT`] when the file has no tail
    pub fragment: u32,
    /// Byte offset of the tail inside its fragment block
    pub fragment_offset: u32,
    /// Number of full data blocks listed in the block list
    pub blocks: u64,
    /// Bytes of the file stored in the fragment
    pub fragment_bytes: u32,
    /// Position of the block list, right after the inode
    pub block_list: MetadataCursor,
}

impl FileInode {
    fn new(
        superblock: &Superblock,
        nlink: u32,
        start_block: u64,
        fragment: u32,
        fragment_offset: u32,
        file_size: u64,
        block_list: MetadataCursor,
    ) -> Self {
        let block_size = superblock.block_size as u64;
        let (blocks, fragment_bytes) = if fragment == INVALID_FRAGMENT {
            (file_size.div_ceil(block_size), 0)
        } else {
            (file_size / block_size, (file_size % block_size) as u32)
        };
        Self {
            nlink,
            start_block,
            file_size,
            fragment,
            fragment_offset,
            blocks,
            fragment_bytes,
            block_list,
        }
    }

    pub fn has_fragment(&self) -> bool {
        self.fragment != INVALID_FRAGMENT
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymlinkInode {
    pub nlink: u32,
    pub target: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceInode {
    pub nlink: u32,
    pub rdev: u16,
}

/// Kind-specific part of an inode
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InodeData {
    Directory(DirectoryInode),
    ExtendedDirectory(DirectoryInode),
    File(FileInode),
    ExtendedFile(FileInode),
    Symlink(SymlinkInode),
    BlockDevice(DeviceInode),
    CharDevice(DeviceInode),
    Fifo,
    Socket,
}

impl InodeData {
    pub fn kind(&self) -> InodeKind {
        match self {
            Self::Directory(_) => InodeKind::Directory,
            Self::ExtendedDirectory(_) => InodeKind::ExtendedDirectory,
            Self::File(_) => InodeKind::File,
            Self::ExtendedFile(_) => InodeKind::ExtendedFile,
            Self::Symlink(_) => InodeKind::Symlink,
            Self::BlockDevice(_) => InodeKind::BlockDevice,
            Self::CharDevice(_) => InodeKind::CharDevice,
            Self::Fifo => InodeKind::Fifo,
            Self::Socket => InodeKind::Socket,
        }
    }
}

/// A decoded inode, owned by the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inode {
    pub locator: Locator,
    /// 1-based inode number
    pub number: u32,
    /// File type bits and permissions
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub mtime: i32,
    /// Always [`INVALID_XATTR`] on version 3 images
    pub xattr: u32,
    pub data: InodeData,
}

impl Inode {
    /// Decode the inode at `locator` in the inode table
    pub fn load(fs: &mut Filesystem, locator: Locator) -> Result<Self, Error> {
        let superblock = *fs.superblock();
        let endian = superblock.endian;
        let corrupt = |fault| Error::CorruptInode { locator, fault };
        trace!("Load inode {locator}");

        let mut cursor = MetadataCursor::at(superblock.inode_table_start, locator);
        let mut record = cursor.read_vec(fs, BaseInodeHeader::SIZE)?;
        let base = BaseInodeHeader::decode(&record, endian);

        let tables = fs.tables();
        let uid = tables
            .uids
            .get(base.uid as usize)
            .copied()
            .ok_or_else(|| {
                corrupt(InodeFault::UidIndex {
                    index: base.uid,
                    count: superblock.uid_count,
                })
            })?;
        let gid = if base.guid == GID_SAME_AS_UID {
            uid
        } else {
            tables
                .gids
                .get(base.guid as usize)
                .copied()
                .ok_or_else(|| {
                    corrupt(InodeFault::GidIndex {
                        index: base.guid,
                        count: superblock.gid_count,
                    })
                })?
        };
        let kind = InodeKind::try_from(base.inode_type)
            .map_err(|tag| corrupt(InodeFault::Type(tag)))?;
        if base.inode_number == 0 {
            return Err(corrupt(InodeFault::NumberZero));
        }
        if base.inode_number > superblock.inode_count {
            return Err(corrupt(InodeFault::NumberTooLarge {
                number: base.inode_number,
                count: superblock.inode_count,
            }));
        }

        let data = match kind {
            InodeKind::Directory => {
                let header: DirInodeHeader = extension(fs, &mut cursor, &mut record)?;
                InodeData::Directory(DirectoryInode {
                    nlink: header.nlink,
                    file_size: header.file_size,
                    offset: header.offset,
                    start_block: header.start_block,
                    parent: header.parent_inode,
                    index_count: 0,
                })
            }
            InodeKind::ExtendedDirectory => {
                let header: LdirInodeHeader = extension(fs, &mut cursor, &mut record)?;
                InodeData::ExtendedDirectory(DirectoryInode {
                    nlink: header.nlink,
                    file_size: header.file_size,
                    offset: header.offset,
                    start_block: header.start_block,
                    parent: header.parent_inode,
                    index_count: header.i_count,
                })
            }
            InodeKind::File => {
                let header: RegInodeHeader = extension(fs, &mut cursor, &mut record)?;
                InodeData::File(FileInode::new(
                    &superblock,
                    1,
                    header.start_block,
                    header.fragment,
                    header.offset,
                    header.file_size as u64,
                    cursor,
                ))
            }
            InodeKind::ExtendedFile => {
                let header: LregInodeHeader = extension(fs, &mut cursor, &mut record)?;
                InodeData::ExtendedFile(FileInode::new(
                    &superblock,
                    header.nlink,
                    header.start_block,
                    header.fragment,
                    header.offset,
                    header.file_size,
                    cursor,
                ))
            }
            InodeKind::Symlink => {
                let header: SymlinkInodeHeader = extension(fs, &mut cursor, &mut record)?;
                let target = cursor.read_vec(fs, header.symlink_size as usize)?;
                InodeData::Symlink(SymlinkInode {
                    nlink: header.nlink,
                    target,
                })
            }
            InodeKind::BlockDevice | InodeKind::CharDevice => {
                let header: DevInodeHeader = extension(fs, &mut cursor, &mut record)?;
                let device = DeviceInode {
                    nlink: header.nlink,
                    rdev: header.rdev,
                };
                if kind == InodeKind::BlockDevice {
                    InodeData::BlockDevice(device)
                } else {
                    InodeData::CharDevice(device)
                }
            }
            InodeKind::Fifo => InodeData::Fifo,
            InodeKind::Socket => InodeData::Socket,
        };

        Ok(Self {
            locator,
            number: base.inode_number,
            mode: kind.file_type_bits() | base.mode as u32,
            uid,
            gid,
            mtime: base.mtime,
            xattr: INVALID_XATTR,
            data,
        })
    }

    pub fn kind(&self) -> InodeKind {
        self.data.kind()
    }

    pub fn permissions(&self) -> u16 {
        (self.mode & 0o7777) as u16
    }

    /// File size for files and directories, target length for symbolic
    /// links, device number for devices
    pub fn size(&self) -> u64 {
        match &self.data {
            InodeData::Directory(dir) | InodeData::ExtendedDirectory(dir) => dir.file_size as u64,
            InodeData::File(file) | InodeData::ExtendedFile(file) => file.file_size,
            InodeData::Symlink(link) => link.target.len() as u64,
            InodeData::BlockDevice(dev) | InodeData::CharDevice(dev) => dev.rdev as u64,
            InodeData::Fifo | InodeData::Socket => 0,
        }
    }

    pub fn as_directory(&self) -> Option<&DirectoryInode> {
        match &self.data {
            InodeData::Directory(dir) | InodeData::ExtendedDirectory(dir) => Some(dir),
            _ => None,
        }
    }

    pub fn as_file(&self) -> Option<&FileInode> {
        match &self.data {
            InodeData::File(file) | InodeData::ExtendedFile(file) => Some(file),
            _ => None,
        }
    }
}

/// Read the rest of a kind-specific record whose base header is already in
/// `record`
fn extension<T: MetadataRecord>(
    fs: &mut Filesystem,
    cursor: &mut MetadataCursor,
    record: &mut Vec<u8>,
) -> Result<T, Error> {
    record.resize(T::SIZE, 0);
    cursor.read(fs, &mut record[BaseInodeHeader::SIZE..])?;
    Ok(T::decode(record, fs.superblock().endian))
}

impl Display for Inode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "inode {} ({}) at {}: mode {:o}, uid {}, gid {}, mtime {}, size {}",
            self.number,
            self.kind(),
            self.locator,
            self.mode,
            self.uid,
            self.gid,
            self.mtime,
            self.size()
        )?;
        match &self.data {
            InodeData::Directory(dir) | InodeData::ExtendedDirectory(dir) => write!(
                f,
                ", listing {}, parent {}, {} links",
                dir.listing(),
                dir.parent,
                dir.nlink
            ),
            InodeData::File(file) | InodeData::ExtendedFile(file) => {
                write!(
                    f,
                    ", data at {:#x}, {} blocks, block list {}",
                    file.start_block, file.blocks, file.block_list
                )?;
                if file.has_fragment() {
                    write!(
                        f,
                        ", fragment {} +{} ({} bytes)",
                        file.fragment, file.fragment_offset, file.fragment_bytes
                    )?;
                }
                Ok(())
            }
            InodeData::Symlink(link) => {
                write!(f, " -> {}", String::from_utf8_lossy(&link.target))
            }
            _ => Ok(()),
        }
    }
}
