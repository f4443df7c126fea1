use std::fmt::Display;

use bytemuck::{Pod, Zeroable};

use super::{ByteSwap, DATA_UNCOMPRESSED};

/// Size word of a data block or fragment block: on-disk length in the low
/// bits, [`DATA_UNCOMPRESSED`] set when the block is stored as is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Pod, Zeroable)]
#[repr(transparent)]
pub struct DataBlockSize(pub u32);

impl DataBlockSize {
    pub fn raw(self) -> u32 {
        self.0
    }

    /// Bytes occupied on disk
    pub fn size(self) -> u32 {
        self.0 & !DATA_UNCOMPRESSED
    }

    pub fn is_compressed(self) -> bool {
        self.0 & DATA_UNCOMPRESSED == 0
    }

    /// A zero size word marks a sparse block
    pub fn is_sparse(self) -> bool {
        self.size() == 0
    }
}

impl ByteSwap for DataBlockSize {
    fn swap_bytes(self) -> Self {
        Self(self.0.swap_bytes())
    }
}

impl Display for DataBlockSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = if self.is_compressed() {
            "compressed"
        } else {
            "uncompressed"
        };
        write!(f, "{} bytes {state}", self.size())
    }
}

/// Fragment table entry: where a fragment block starts and how big it is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
#[repr(C, packed)]
pub struct FragmentEntry {
    pub(crate) start_block: u64,
    pub(crate) size: u32,
    pub(crate) pending: u32,
}

impl FragmentEntry {
    pub const SIZE: usize = std::mem::size_of::<Self>();

    pub fn new(start_block: u64, size: u32) -> Self {
        Self {
            start_block,
            size,
            pending: 0,
        }
    }

    /// Byte offset of the fragment block in the image
    pub fn start(&self) -> u64 {
        self.start_block
    }

    pub fn size(&self) -> DataBlockSize {
        DataBlockSize(self.size)
    }
}

impl ByteSwap for FragmentEntry {
    fn swap_bytes(self) -> Self {
        Self {
            start_block: { self.start_block }.swap_bytes(),
            size: { self.size }.swap_bytes(),
            pending: { self.pending }.swap_bytes(),
        }
    }
}

impl Display for FragmentEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "fragment block at {:#x}, {}", self.start(), self.size())
    }
}

#[cfg(test)]
mod tests {
    use super::{DataBlockSize, FragmentEntry};
    use crate::structs::ByteSwap;

    #[test]
    fn size_word() {
        let stored = DataBlockSize(4096 | 1 << 24);
        assert_eq!(stored.size(), 4096);
        assert!(!stored.is_compressed());
        let packed = DataBlockSize(1234);
        assert!(packed.is_compressed());
        assert!(DataBlockSize(1 << 24).is_sparse());
    }

    #[test]
    fn fragment_entry_layout() {
        assert_eq!(FragmentEntry::SIZE, 16);
        let entry = FragmentEntry::new(0x1122_3344, 150);
        let swapped = entry.swap_bytes();
        assert_eq!(swapped.start(), 0x4433_2211_0000_0000);
        assert_eq!(swapped.swap_bytes(), entry);
    }
}
