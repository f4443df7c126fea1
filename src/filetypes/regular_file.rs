use log::debug;

use super::RegularFile;
use crate::structs::{DataBlockSize, FileInode, FragmentEntry, Inode, Locator};
use crate::{Error, Filesystem};

impl RegularFile {
    pub fn load(fs: &mut Filesystem, locator: Locator) -> Result<Self, Error> {
        let inode = fs.inode(locator)?;
        let file = *inode.as_file().ok_or(Error::WrongKind {
            locator,
            expected: "regular file",
            found: inode.kind(),
        })?;
        let blocks = fs.read_block_list(file.block_list, file.blocks)?;
        let fragment = if file.has_fragment() {
            Some(fs.fragment(file.fragment)?)
        } else {
            None
        };
        debug!(
            "Load regular file {locator}: {} blocks, {}",
            blocks.len(),
            if fragment.is_some() { "with tail fragment" } else { "no fragment" }
        );
        Ok(Self {
            inode,
            blocks,
            fragment,
        })
    }

    pub fn inode(&self) -> &Inode {
        &self.inode
    }

    pub fn blocks(&self) -> &[DataBlockSize] {
        &self.blocks
    }

    pub fn fragment(&self) -> Option<&FragmentEntry> {
        self.fragment.as_ref()
    }

    fn file(&self) -> Option<&FileInode> {
        self.inode.as_file()
    }

    /// Image offset and size word of every data block, in file order
    pub fn block_ranges(&self) -> Vec<(u64, DataBlockSize)> {
        let mut start = self.file().map_or(0, |file| file.start_block);
        self.blocks
            .iter()
            .map(|&size| {
                let range = (start, size);
                start = start.saturating_add(size.size() as u64);
                range
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use crate::structs::*;
    use crate::testing::{self, ImageBuilder};
    use crate::Error;

    #[test]
    fn block_list_and_fragment() {
        for endian in [Endian::Little, Endian::Big] {
            let mut image = ImageBuilder::new(endian);
            image.inode_count = 1;
            image.fragments = vec![FragmentEntry::new(1024, 200)];
            let locator = image.inode(&testing::file_inode(
                endian,
                &testing::base(InodeKind::File, 1),
                10000,
                0,
                64,
            ));
            image.block_list(&[1000, 4096 | DATA_UNCOMPRESSED]);
            image.root = locator;
            let mut fs = image.mount();

            let file = fs.open_file(locator).unwrap();
            assert_eq!(file.blocks().len(), 2);
            assert_eq!(file.blocks()[0].size(), 1000);
            assert!(!file.blocks()[1].is_compressed());
            assert_eq!(file.fragment().unwrap().start(), 1024);
            let ranges = file.block_ranges();
            assert_eq!(ranges[0].0, testing::DATA_START);
            assert_eq!(ranges[1].0, testing::DATA_START + 1000);
        }
    }

    #[test]
    fn fragment_index_out_of_range() {
        let endian = Endian::Little;
        let mut image = ImageBuilder::new(endian);
        let locator = image.inode(&testing::file_inode(
            endian,
            &testing::base(InodeKind::File, 1),
            100,
            7,
            0,
        ));
        image.root = locator;
        let mut fs = image.mount();
        assert!(matches!(
            fs.open_file(locator),
            Err(Error::OutOfBounds { index: 7, .. })
        ));
    }

    #[test]
    fn directories_are_not_files() {
        let endian = Endian::Little;
        let mut image = ImageBuilder::new(endian);
        let locator = image.inode(&testing::dir_inode(
            endian,
            &testing::base(InodeKind::Directory, 1),
            Locator::default(),
            3,
            1,
        ));
        image.root = locator;
        let mut fs = image.mount();
        assert!(matches!(
            fs.open_file(locator),
            Err(Error::WrongKind { .. })
        ));
    }
}
