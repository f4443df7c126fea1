use std::fmt::Display;

/// Byte order of an image, decided once from the superblock magic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    Little,
    Big,
}

impl Endian {
    #[cfg(target_endian = "little")]
    pub const NATIVE: Endian = Endian::Little;
    #[cfg(target_endian = "big")]
    pub const NATIVE: Endian = Endian::Big;

    pub fn opposite(self) -> Self {
        match self {
            Self::Little => Self::Big,
            Self::Big => Self::Little,
        }
    }

    /// Image fields have to be byte-reversed on this host
    pub fn is_swapped(self) -> bool {
        self != Self::NATIVE
    }

    /// Extract a `width` bit field starting `offset` bits into `bytes`
    pub(crate) fn get_bits(self, bytes: &[u8], offset: usize, width: usize) -> u64 {
        debug_assert!(width <= 64 && offset + width <= bytes.len() * 8);
        let mut value = 0u64;
        match self {
            Self::Little => {
                for i in (0..width).rev() {
                    value = (value << 1) | bit_lsb(bytes, offset + i);
                }
            }
            Self::Big => {
                for i in 0..width {
                    value = (value << 1) | bit_msb(bytes, offset + i);
                }
            }
        }
        value
    }

    /// Store the low `width` bits of `value` at `offset` bits into `bytes`
    #[cfg(test)]
    pub(crate) fn put_bits(self, bytes: &mut [u8], offset: usize, width: usize, value: u64) {
        for i in 0..width {
            let (position, bit) = match self {
                Self::Little => (offset + i, (value >> i) & 1),
                Self::Big => (offset + i, (value >> (width - 1 - i)) & 1),
            };
            let shift = match self {
                Self::Little => position % 8,
                Self::Big => 7 - position % 8,
            };
            bytes[position / 8] &= !(1 << shift);
            bytes[position / 8] |= (bit as u8) << shift;
        }
    }

    pub fn u16(self, bytes: [u8; 2]) -> u16 {
        match self {
            Self::Little => u16::from_le_bytes(bytes),
            Self::Big => u16::from_be_bytes(bytes),
        }
    }
}

fn bit_lsb(bytes: &[u8], position: usize) -> u64 {
    ((bytes[position / 8] >> (position % 8)) & 1) as u64
}

fn bit_msb(bytes: &[u8], position: usize) -> u64 {
    ((bytes[position / 8] >> (7 - position % 8)) & 1) as u64
}

impl Display for Endian {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Little => write!(f, "little endian"),
            Self::Big => write!(f, "big endian"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Endian;

    #[test]
    fn byte_aligned_fields_match_integers() {
        let bytes = [0x78, 0x56, 0x34, 0x12, 0xaa];
        assert_eq!(Endian::Little.get_bits(&bytes, 0, 32), 0x1234_5678);
        assert_eq!(Endian::Big.get_bits(&bytes, 0, 32), 0x7856_3412);
        assert_eq!(Endian::Little.get_bits(&bytes, 32, 8), 0xaa);
        assert_eq!(Endian::Big.get_bits(&bytes, 8, 16), 0x5634);
    }

    #[test]
    fn little_endian_bit_fields() {
        // type:4 = 0x2, mode:12 = 0x1ed
        let bytes = [0xd2, 0x1e];
        assert_eq!(Endian::Little.get_bits(&bytes, 0, 4), 0x2);
        assert_eq!(Endian::Little.get_bits(&bytes, 4, 12), 0x1ed);
    }

    #[test]
    fn big_endian_bit_fields() {
        // type:4 = 0x2, mode:12 = 0x1ed
        let bytes = [0x21, 0xed];
        assert_eq!(Endian::Big.get_bits(&bytes, 0, 4), 0x2);
        assert_eq!(Endian::Big.get_bits(&bytes, 4, 12), 0x1ed);
    }

    #[test]
    fn put_then_get() {
        for endian in [Endian::Little, Endian::Big] {
            let mut bytes = [0u8; 8];
            endian.put_bits(&mut bytes, 3, 19, 0x5_4321);
            endian.put_bits(&mut bytes, 22, 13, 0x1abc);
            endian.put_bits(&mut bytes, 35, 29, u64::MAX);
            assert_eq!(endian.get_bits(&bytes, 3, 19), 0x5_4321);
            assert_eq!(endian.get_bits(&bytes, 22, 13), 0x1abc);
            assert_eq!(endian.get_bits(&bytes, 35, 29), (1 << 29) - 1);
            assert_eq!(endian.get_bits(&bytes, 0, 3), 0);
        }
    }
}
