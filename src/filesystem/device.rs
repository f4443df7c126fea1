use std::fmt::Debug;
use std::io::{Cursor, Read, Seek, SeekFrom};

use flate2::read::ZlibDecoder;
use log::trace;

use crate::structs::*;
use crate::Error;

pub trait BlockDevice: Read + Seek + Debug {}

impl BlockDevice for std::fs::File {}

impl<T: AsRef<[u8]> + Debug> BlockDevice for Cursor<T> {}

/// Decompressed contents of one metadata block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataBlock {
    pub data: Vec<u8>,
    /// Bytes the block occupies on disk, header included. The next block of
    /// the same table starts right after.
    pub disk_length: u64,
}

/// Positioned reads from the image, aware of its byte order
#[derive(Debug)]
pub struct Device {
    inner: Box<dyn BlockDevice>,
    endian: Endian,
    check: bool,
}

impl Device {
    pub fn new(inner: Box<dyn BlockDevice>) -> Self {
        Self {
            inner,
            endian: Endian::NATIVE,
            check: false,
        }
    }

    /// Adopt byte order and metadata framing of a loaded superblock
    pub fn configure(&mut self, superblock: &Superblock) {
        self.endian = superblock.endian;
        self.check = superblock.flags.contains(Flags::CHECK);
    }

    pub fn endian(&self) -> Endian {
        self.endian
    }

    /// Fill `buffer` from absolute image `offset`
    pub fn read_bytes(&mut self, offset: u64, buffer: &mut [u8]) -> Result<(), Error> {
        trace!("Read {} bytes at {offset:#x}", buffer.len());
        self.inner
            .seek(SeekFrom::Start(offset))
            .and_then(|_| self.inner.read_exact(buffer))
            .map_err(|e| Error::ReadFailure {
                offset,
                reason: e.to_string(),
            })
    }

    /// Read and decompress the metadata block starting at `offset`. When
    /// `expected` is given, the decompressed length has to match it.
    pub fn read_metadata_block(
        &mut self,
        offset: u64,
        expected: Option<usize>,
    ) -> Result<MetadataBlock, Error> {
        let failure = |reason: String| Error::ReadFailure { offset, reason };

        let mut header = [0u8; 2];
        self.read_bytes(offset, &mut header)?;
        let header = self.endian.u16(header);
        let compressed = header & METADATA_UNCOMPRESSED == 0;
        let length = (header & !METADATA_UNCOMPRESSED) as usize;
        if length > METADATA_SIZE {
            return Err(failure(format!("metadata block length {length} too large")));
        }

        let start = offset + 2 + self.check as u64;
        let mut stored = vec![0u8; length];
        self.read_bytes(start, &mut stored)?;

        let data = if compressed {
            let mut data = Vec::with_capacity(METADATA_SIZE);
            ZlibDecoder::new(stored.as_slice())
                .take(METADATA_SIZE as u64 + 1)
                .read_to_end(&mut data)
                .map_err(|e| failure(format!("zlib: {e}")))?;
            if data.len() > METADATA_SIZE {
                return Err(failure("metadata block expands beyond 8192 bytes".into()));
            }
            data
        } else {
            stored
        };

        if let Some(expected) = expected {
            if data.len() != expected {
                return Err(failure(format!(
                    "metadata block holds {} bytes, expected {expected}",
                    data.len()
                )));
            }
        }

        trace!(
            "Metadata block at {offset:#x}: {length} bytes on disk, {} bytes {}",
            data.len(),
            if compressed { "inflated" } else { "stored" }
        );
        Ok(MetadataBlock {
            data,
            disk_length: start - offset + length as u64,
        })
    }
}
