packed_record! {
    /// Starts a run of entries whose inodes share one inode table block
    pub(crate) struct DirHeader: 9 {
        /// Entries in the run, minus one
        count: u8 = (0, 8),
        start_block: u32 = (8, 32),
        inode_number: u32 = (40, 32),
    }
}

packed_record! {
    /// Directory entry, followed by `size + 1` name bytes
    pub(crate) struct DirEntryRecord: 5 {
        offset: u16 = (0, 13),
        entry_type: u8 = (13, 3),
        size: u8 = (16, 8),
        /// Inode number relative to the run header
        inode_offset: i16 = (24, 16),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structs::{Endian, MetadataRecord};

    #[test]
    fn entry_bit_layout() {
        // offset 0x123, type 2, size 4, inode delta -1
        let little = [0x23, 0x41, 0x04, 0xff, 0xff];
        let entry = DirEntryRecord::decode(&little, Endian::Little);
        assert_eq!(entry.offset, 0x123);
        assert_eq!(entry.entry_type, 2);
        assert_eq!(entry.size, 4);
        assert_eq!(entry.inode_offset, -1);

        let big = entry.encode(Endian::Big);
        assert_eq!(big, [0x09, 0x1a, 0x04, 0xff, 0xff]);
        assert_eq!(DirEntryRecord::decode(&big, Endian::Big), entry);
    }

    #[test]
    fn header_layout() {
        let header = DirHeader {
            count: 3,
            start_block: 0x2010,
            inode_number: 42,
        };
        let bytes = header.encode(Endian::Little);
        assert_eq!(bytes, [3, 0x10, 0x20, 0, 0, 42, 0, 0, 0]);
        assert_eq!(DirHeader::decode(&bytes, Endian::Little), header);
    }
}
