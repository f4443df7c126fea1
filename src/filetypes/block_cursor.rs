use std::fmt::Display;

use super::MetadataCursor;

use crate::structs::Locator;
use crate::{Error, Filesystem};

impl MetadataCursor {
    /// Position of `locator` inside the table starting at `table_start`
    pub fn at(table_start: u64, locator: Locator) -> Self {
        Self {
            block: table_start + locator.block as u64,
            offset: locator.offset as usize,
        }
    }

    pub fn block(&self) -> u64 {
        self.block
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Fill `buffer`, moving on to the next metadata block whenever the
    /// current one runs out
    pub fn read(&mut self, fs: &mut Filesystem, buffer: &mut [u8]) -> Result<(), Error> {
        let mut filled = 0;
        while filled < buffer.len() {
            let block = fs.metadata_block(self.block)?;
            let available = block.data.len();
            if self.offset > available {
                return Err(Error::ReadFailure {
                    offset: self.block,
                    reason: format!(
                        "offset {} past the end of a {available} byte metadata block",
                        self.offset
                    ),
                });
            }
            if self.offset == available {
                self.advance(block.disk_length)?;
                continue;
            }
            let count = (buffer.len() - filled).min(available - self.offset);
            buffer[filled..filled + count]
                .copy_from_slice(&block.data[self.offset..self.offset + count]);
            filled += count;
            self.offset += count;
        }
        Ok(())
    }

    /// Read `length` bytes into a new buffer
    pub fn read_vec(&mut self, fs: &mut Filesystem, length: usize) -> Result<Vec<u8>, Error> {
        let mut buffer = Vec::new();
        buffer
            .try_reserve_exact(length)
            .map_err(|_| Error::OutOfMemory {
                bytes: length as u64,
            })?;
        buffer.resize(length, 0);
        self.read(fs, &mut buffer)?;
        Ok(buffer)
    }

    fn advance(&mut self, disk_length: u64) -> Result<(), Error> {
        self.block = self
            .block
            .checked_add(disk_length)
            .ok_or(Error::ReadFailure {
                offset: self.block,
                reason: "metadata block chain overflows".into(),
            })?;
        self.offset = 0;
        Ok(())
    }
}

impl Display for MetadataCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#x}+{}", self.block, self.offset)
    }
}

#[cfg(test)]
mod tests {
    use super::MetadataCursor;
    use crate::structs::{Endian, Locator, METADATA_SIZE};
    use crate::testing::ImageBuilder;

    fn patterned(endian: Endian, length: usize) -> (ImageBuilder, Locator) {
        let mut image = ImageBuilder::new(endian);
        let bytes: Vec<u8> = (0..length).map(|i| (i % 253) as u8).collect();
        let start = image.directory(&bytes);
        (image, start)
    }

    #[test]
    fn read_within_block() {
        let (image, start) = patterned(Endian::Little, 100);
        let mut fs = image.mount();
        let table = fs.superblock().directory_table_start;
        let mut cursor = MetadataCursor::at(table, Locator::new(start.block, start.offset + 10));
        let bytes = cursor.read_vec(&mut fs, 5).unwrap();
        assert_eq!(bytes, [10, 11, 12, 13, 14]);
        assert_eq!(cursor.offset(), 15);
        assert_eq!(cursor.block(), table);
    }

    #[test]
    fn read_across_blocks() {
        for endian in [Endian::Little, Endian::Big] {
            let (image, _) = patterned(endian, METADATA_SIZE + 50);
            let mut fs = image.mount();
            let table = fs.superblock().directory_table_start;
            let start = Locator::new(0, (METADATA_SIZE - 3) as u16);
            let mut cursor = MetadataCursor::at(table, start);
            let bytes = cursor.read_vec(&mut fs, 6).unwrap();
            let expected: Vec<u8> = (METADATA_SIZE - 3..METADATA_SIZE + 3)
                .map(|i| (i % 253) as u8)
                .collect();
            assert_eq!(bytes, expected);
            assert_eq!(cursor.offset(), 3);
            assert_eq!(cursor.block(), table + METADATA_SIZE as u64 + 2);
        }
    }

    #[test]
    fn offset_beyond_block() {
        let (image, _) = patterned(Endian::Little, 20);
        let mut fs = image.mount();
        let table = fs.superblock().directory_table_start;
        let mut cursor = MetadataCursor::at(table, Locator::new(0, 21));
        assert!(cursor.read_vec(&mut fs, 1).is_err());
        let mut cursor = MetadataCursor::at(table, Locator::new(0, 20));
        assert!(cursor.read_vec(&mut fs, 0).unwrap().is_empty());
    }
}
