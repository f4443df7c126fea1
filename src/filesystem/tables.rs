use std::mem::size_of;

use log::{debug, trace};

use super::{Device, Table};
use crate::structs::*;
use crate::Error;

/// Bytes of one index entry: the image offset of a metadata block
pub const INDEX_ENTRY_SIZE: u64 = size_of::<u64>() as u64;

/// Lookup tables read at mount time, in host byte order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tables {
    pub uids: Vec<u32>,
    pub gids: Vec<u32>,
    /// Inode references by inode number minus one
    pub export: Option<Vec<u64>>,
    pub fragments: Vec<FragmentEntry>,
}

/// Elements of an indexed table with the offset of its first metadata block
#[derive(Debug)]
pub struct IndexedTable<T> {
    pub entries: Vec<T>,
    pub first_block: u64,
}

/// Metadata blocks needed for `bytes` of table contents
pub fn metadata_blocks(bytes: u64) -> u64 {
    bytes.div_ceil(METADATA_SIZE as u64)
}

/// Size of the index that locates `count` elements of `T`
pub fn index_bytes<T>(count: u64) -> u64 {
    metadata_blocks(count * size_of::<T>() as u64) * INDEX_ENTRY_SIZE
}

pub(crate) fn zeroed(bytes: u64) -> Result<Vec<u8>, Error> {
    let mut buffer = Vec::new();
    buffer
        .try_reserve_exact(bytes as usize)
        .map_err(|_| Error::OutOfMemory { bytes })?;
    buffer.resize(bytes as usize, 0);
    Ok(buffer)
}

pub(crate) fn swapped<T: ByteSwap>(value: T, endian: Endian) -> T {
    if endian.is_swapped() {
        value.swap_bytes()
    } else {
        value
    }
}

/// Read the index of `table` between `start` and `end`: the image offsets
/// of the metadata blocks holding its `count` elements
fn read_index<T>(
    device: &mut Device,
    table: Table,
    start: u64,
    end: u64,
    count: u64,
) -> Result<Vec<u64>, Error> {
    let blocks = metadata_blocks(count * size_of::<T>() as u64);
    let length = blocks * INDEX_ENTRY_SIZE;
    if end.checked_sub(start) != Some(length) {
        return Err(Error::BadCount {
            table,
            count,
            start,
            end,
        });
    }
    trace!("Read {count} {table} entries through {blocks} index entries at {start:#x}");

    let endian = device.endian();
    let mut index = zeroed(length)?;
    device.read_bytes(start, &mut index)?;
    Ok(index
        .chunks_exact(size_of::<u64>())
        .map(|raw| swapped(bytemuck::pod_read_unaligned::<u64>(raw), endian))
        .collect())
}

/// Read `count` elements of `T` from the metadata blocks at `offsets`
fn read_entries<T: ByteSwap>(
    device: &mut Device,
    offsets: &[u64],
    count: u64,
) -> Result<Vec<T>, Error> {
    let element = size_of::<T>();
    let bytes = count * element as u64;
    let mut contents = Vec::new();
    contents
        .try_reserve_exact(bytes as usize)
        .map_err(|_| Error::OutOfMemory { bytes })?;
    for (i, &offset) in offsets.iter().enumerate() {
        let expected = if i + 1 < offsets.len() {
            METADATA_SIZE
        } else {
            match (bytes % METADATA_SIZE as u64) as usize {
                0 => METADATA_SIZE,
                tail => tail,
            }
        };
        let block = device.read_metadata_block(offset, Some(expected))?;
        contents.extend_from_slice(&block.data);
    }

    let endian = device.endian();
    let mut entries = Vec::new();
    entries
        .try_reserve_exact(count as usize)
        .map_err(|_| Error::OutOfMemory { bytes })?;
    entries.extend(
        contents
            .chunks_exact(element)
            .map(|raw| swapped(bytemuck::pod_read_unaligned::<T>(raw), endian)),
    );
    Ok(entries)
}

/// Read the `count` elements of `table`, whose index of metadata block
/// offsets sits between `start` and `end`
pub fn resolve<T: ByteSwap>(
    device: &mut Device,
    table: Table,
    start: u64,
    end: u64,
    count: u64,
) -> Result<IndexedTable<T>, Error> {
    let offsets = read_index::<T>(device, table, start, end, count)?;
    Ok(IndexedTable {
        entries: read_entries(device, &offsets, count)?,
        first_block: offsets.first().copied().unwrap_or(start),
    })
}

/// Index a table whose metadata blocks have to sit before its index, then
/// read its entries
fn resolve_below_index<T: ByteSwap>(
    device: &mut Device,
    table: Table,
    start: u64,
    end: u64,
    count: u64,
) -> Result<IndexedTable<T>, Error> {
    let offsets = read_index::<T>(device, table, start, end, count)?;
    let first_block = offsets.first().copied().unwrap_or(start);
    if first_block > start {
        return Err(Error::BadTableStart {
            table,
            start: first_block,
            limit: start,
        });
    }
    Ok(IndexedTable {
        entries: read_entries(device, &offsets, count)?,
        first_block,
    })
}

/// Tables in the order they are found walking back from the end of the image
const CHAIN: [Table; 6] = [
    Table::Gid,
    Table::Uid,
    Table::Export,
    Table::Fragment,
    Table::Directory,
    Table::Inode,
];

impl Tables {
    /// Validate the table layout back to front and read the id, export and
    /// fragment tables
    pub fn load(device: &mut Device, superblock: &Superblock) -> Result<Self, Error> {
        let mut tables = Self::default();
        let inode_table_start = CHAIN.iter().try_fold(superblock.bytes_used, |limit, &table| {
            let next = tables.step(device, superblock, table, limit)?;
            trace!("{table} table bounds the next one at {next:#x}");
            Ok::<_, Error>(next)
        })?;
        debug!(
            "Read {} uids, {} gids, {} fragments, export table {}, inode table at {inode_table_start:#x}",
            tables.uids.len(),
            tables.gids.len(),
            tables.fragments.len(),
            if tables.export.is_some() { "present" } else { "absent" }
        );
        Ok(tables)
    }

    /// Check and read one table that has to end before `limit`, returning
    /// the offset where it begins
    fn step(
        &mut self,
        device: &mut Device,
        superblock: &Superblock,
        table: Table,
        limit: u64,
    ) -> Result<u64, Error> {
        let bad_start = |start| Error::BadTableStart {
            table,
            start,
            limit,
        };
        match table {
            Table::Gid => {
                let start = superblock.gid_start;
                if superblock.gid_count == 0 {
                    return if start == 0 { Ok(limit) } else { Err(bad_start(start)) };
                }
                if start >= limit {
                    return Err(bad_start(start));
                }
                self.gids = resolve(device, table, start, limit, superblock.gid_count as u64)?
                    .entries;
                Ok(start)
            }
            Table::Uid => {
                let start = superblock.uid_start;
                if start >= limit {
                    return Err(bad_start(start));
                }
                if superblock.uid_count == 0 {
                    return Err(Error::BadCount {
                        table,
                        count: 0,
                        start,
                        end: limit,
                    });
                }
                self.uids = resolve(device, table, start, limit, superblock.uid_count as u64)?
                    .entries;
                Ok(start)
            }
            Table::Export => {
                let start = superblock.lookup_table_start;
                if !superblock.has_export_table() {
                    return Ok(limit);
                }
                if start >= limit {
                    return Err(bad_start(start));
                }
                let export = resolve_below_index(
                    device,
                    table,
                    start,
                    limit,
                    superblock.inode_count as u64,
                )?;
                self.export = Some(export.entries);
                Ok(export.first_block)
            }
            Table::Fragment => {
                let start = superblock.fragment_table_start;
                let count = superblock.fragment_count;
                if count == 0 {
                    return if start == limit { Ok(limit) } else { Err(bad_start(start)) };
                }
                if start >= limit {
                    return Err(bad_start(start));
                }
                if count > superblock.inode_count {
                    return Err(Error::BadCount {
                        table,
                        count: count as u64,
                        start,
                        end: limit,
                    });
                }
                let fragments = resolve_below_index(device, table, start, limit, count as u64)?;
                self.fragments = fragments.entries;
                Ok(fragments.first_block)
            }
            Table::Directory => {
                let start = superblock.directory_table_start;
                if start > limit {
                    return Err(bad_start(start));
                }
                Ok(start)
            }
            Table::Inode => {
                let start = superblock.inode_table_start;
                if start >= limit {
                    return Err(bad_start(start));
                }
                Ok(start)
            }
        }
    }
}
