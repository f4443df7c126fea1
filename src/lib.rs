//! Reader for the metadata of version 3 squashfs images: superblock,
//! id/fragment/export tables, inodes and directory listings.

pub mod error;
pub mod filesystem;
pub mod filetypes;
pub mod structs;

#[cfg(test)]
mod testing;

pub use error::Error;
pub use filesystem::Filesystem;
