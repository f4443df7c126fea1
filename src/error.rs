use std::fmt::Display;

use crate::filesystem::Table;
use crate::structs::{InodeKind, Locator};

#[derive(Debug)]
pub enum Error {
    /// A table's declared element count disagrees with the space reserved
    /// for its index between `start` and `end`
    BadCount {
        table: Table,
        count: u64,
        start: u64,
        end: u64,
    },
    /// A table start offset breaks the back-to-front table chain
    BadTableStart { table: Table, start: u64, limit: u64 },
    /// A byte range or metadata block could not be read as expected
    ReadFailure { offset: u64, reason: String },
    OutOfMemory { bytes: u64 },
    /// Magic or version does not belong to a version 3 filesystem
    UnsupportedVersion { magic: u32, major: u16, minor: u16 },
    BadSuperblock { offset: u64, reason: &'static str },
    CorruptInode { locator: Locator, fault: InodeFault },
    CorruptDirectory {
        locator: Locator,
        position: u64,
        fault: DirectoryFault,
    },
    WrongKind {
        locator: Locator,
        expected: &'static str,
        found: InodeKind,
    },
    TableAbsent(Table),
    OutOfBounds { table: Table, index: u64 },
    NotFound(String),
    Io(std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InodeFault {
    UidIndex { index: u8, count: u32 },
    GidIndex { index: u8, count: u32 },
    Type(u8),
    NumberZero,
    NumberTooLarge { number: u32, count: u32 },
    Unreadable(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectoryFault {
    BadSize(u32),
    TooManyEntries(u32),
    NameTooLong(usize),
    InvalidName(Vec<u8>),
    EntryType(u8),
    Duplicate(Vec<u8>),
    Unsorted { previous: Vec<u8>, next: Vec<u8> },
    Unreadable(String),
}

impl Error {
    /// Recoverable errors fail a single directory listing, the rest
    /// invalidate the whole mount
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Self::CorruptDirectory { .. }
                | Self::WrongKind { .. }
                | Self::NotFound(_)
                | Self::OutOfBounds { .. }
                | Self::TableAbsent(_)
        )
    }

    /// True when the image is simply not a version 3 filesystem and another
    /// decoder may be tried
    pub fn is_version_mismatch(&self) -> bool {
        matches!(self, Self::UnsupportedVersion { .. })
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BadCount {
                table,
                count,
                start,
                end,
            } => write!(
                f,
                "bad {table} count {count} in superblock (index {start:#x}..{end:#x})"
            ),
            Self::BadTableStart {
                table,
                start,
                limit,
            } => write!(
                f,
                "{table} table start {start:#x} invalid in superblock (limit {limit:#x})"
            ),
            Self::ReadFailure { offset, reason } => {
                write!(f, "failed to read at {offset:#x}: {reason}")
            }
            Self::OutOfMemory { bytes } => write!(f, "failed to allocate {bytes} bytes"),
            Self::UnsupportedVersion {
                magic,
                major,
                minor,
            } => write!(
                f,
                "not a version 3 filesystem (magic {magic:#010x}, version {major}.{minor})"
            ),
            Self::BadSuperblock { offset, reason } => {
                write!(f, "corrupted superblock at {offset:#x}: {reason}")
            }
            Self::CorruptInode { locator, fault } => {
                write!(f, "filesystem corrupted, inode {locator}: {fault}")
            }
            Self::CorruptDirectory {
                locator,
                position,
                fault,
            } => write!(
                f,
                "filesystem corrupted, directory {locator} at byte {position}: {fault}"
            ),
            Self::WrongKind {
                locator,
                expected,
                found,
            } => write!(f, "inode {locator} is a {found}, expected {expected}"),
            Self::TableAbsent(table) => write!(f, "filesystem has no {table} table"),
            Self::OutOfBounds { table, index } => {
                write!(f, "index {index} out of bounds in {table} table")
            }
            Self::NotFound(path) => write!(f, "{path}: no such file or directory"),
            Self::Io(e) => write!(f, "{e}"),
        }
    }
}

impl Display for InodeFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UidIndex { index, count } => {
                write!(f, "uid index {index} too large ({count} uids)")
            }
            Self::GidIndex { index, count } => {
                write!(f, "gid index {index} too large ({count} gids)")
            }
            Self::Type(tag) => write!(f, "invalid type {tag}"),
            Self::NumberZero => write!(f, "inode number zero is invalid"),
            Self::NumberTooLarge { number, count } => {
                write!(f, "inode number {number} too large ({count} inodes)")
            }
            Self::Unreadable(reason) => write!(f, "unreadable: {reason}"),
        }
    }
}

impl Display for DirectoryFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BadSize(size) => write!(f, "listing size {size} is too small"),
            Self::TooManyEntries(count) => write!(f, "too many entries ({count}) in header"),
            Self::NameTooLong(length) => write!(f, "filename of {length} bytes too long"),
            Self::InvalidName(name) => write!(
                f,
                "invalid characters in name {:?}",
                String::from_utf8_lossy(name)
            ),
            Self::EntryType(tag) => write!(f, "invalid entry type {tag}"),
            Self::Duplicate(name) => write!(
                f,
                "duplicate name {:?}",
                String::from_utf8_lossy(name)
            ),
            Self::Unsorted { previous, next } => write!(
                f,
                "unsorted names {:?} before {:?}",
                String::from_utf8_lossy(previous),
                String::from_utf8_lossy(next)
            ),
            Self::Unreadable(reason) => write!(f, "unreadable listing: {reason}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<Error> for libc::c_int {
    fn from(value: Error) -> Self {
        match value {
            Error::OutOfMemory { .. } => libc::ENOMEM,
            Error::NotFound(_) | Error::TableAbsent(_) => libc::ENOENT,
            Error::WrongKind { .. } => libc::ENOTDIR,
            Error::OutOfBounds { .. } => libc::EINVAL,
            Error::Io(e) => e.raw_os_error().unwrap_or(libc::EIO),
            _ => libc::EIO,
        }
    }
}
