//! Save-game container
//!
//! A save file is a list of cartridge regions captured from the save
//! blocks. Layout (all fields little-endian):
//!
//! ```text
//! +---------+-------------+--------------+
//! | version | block_count | total_length |   file header, 8 bytes
//! +---------+-------------+--------------+
//! | address | length      |                 entry header, 8 bytes
//! +---------+-------------+
//! | length bytes of payload              |
//! +--------------------------------------+
//! ... block_count entries
//! ```
//!
//! `address` is a console address (cartridge base included) and
//! `total_length` covers the whole file including the header.

use alloc::vec::Vec;

use zerocopy::little_endian::{U16, U32};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::error::{Error, FormatError, Result};

/// The only recognised container version
pub const VERSION: u16 = 0x0053;

/// Size of the file header
pub const HEADER_SIZE: usize = core::mem::size_of::<FileHeader>();

/// Size of each entry header
pub const ENTRY_HEADER_SIZE: usize = core::mem::size_of::<EntryHeader>();

#[derive(Debug, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
#[repr(C)]
struct FileHeader {
    version: U16,
    block_count: U16,
    total_length: U32,
}

#[derive(Debug, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
#[repr(C)]
struct EntryHeader {
    address: U32,
    length: U32,
}

/// One captured region
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveBlock {
    /// Console address of the first byte
    pub address: u32,
    /// Region contents
    pub data: Vec<u8>,
}

impl SaveBlock {
    /// Exclusive end address
    pub fn end(&self) -> u64 {
        self.address as u64 + self.data.len() as u64
    }
}

/// A parsed save container
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaveImage {
    blocks: Vec<SaveBlock>,
}

impl SaveImage {
    /// Create an empty image
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a region
    pub fn push(&mut self, address: u32, data: Vec<u8>) {
        self.blocks.push(SaveBlock { address, data });
    }

    /// Regions in file order
    pub fn blocks(&self) -> &[SaveBlock] {
        &self.blocks
    }

    /// Number of regions
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Whether the image holds no regions
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Total payload bytes
    pub fn payload_len(&self) -> usize {
        self.blocks.iter().map(|block| block.data.len()).sum()
    }

    /// Length of the encoded file
    pub fn encoded_len(&self) -> usize {
        HEADER_SIZE + self.blocks.len() * ENTRY_HEADER_SIZE + self.payload_len()
    }

    /// Parse a container, checking every structural field
    pub fn parse(data: &[u8]) -> Result<Self> {
        let (header, mut rest) =
            FileHeader::read_from_prefix(data).map_err(|_| FormatError::Truncated)?;

        let version = header.version.get();
        if version != VERSION {
            return Err(FormatError::BadVersion(version).into());
        }

        let block_count = header.block_count.get() as usize;
        let mut blocks = Vec::with_capacity(block_count);
        let mut computed = HEADER_SIZE as u64;

        for _ in 0..block_count {
            let (entry, tail) =
                EntryHeader::read_from_prefix(rest).map_err(|_| FormatError::Truncated)?;
            let length = entry.length.get() as usize;
            if tail.len() < length {
                return Err(FormatError::Truncated.into());
            }
            let (payload, tail) = tail.split_at(length);

            blocks.push(SaveBlock {
                address: entry.address.get(),
                data: payload.to_vec(),
            });
            computed += (ENTRY_HEADER_SIZE + length) as u64;
            rest = tail;
        }

        let declared = header.total_length.get();
        if declared as u64 != computed {
            return Err(FormatError::LengthMismatch {
                declared,
                actual: computed.min(u32::MAX as u64) as u32,
            }
            .into());
        }
        if !rest.is_empty() {
            return Err(FormatError::LengthMismatch {
                declared,
                actual: data.len().min(u32::MAX as usize) as u32,
            }
            .into());
        }

        Ok(Self { blocks })
    }

    /// Encode the container
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let block_count =
            u16::try_from(self.blocks.len()).map_err(|_| FormatError::TooManyBlocks)?;
        let total_length = u32::try_from(self.encoded_len()).map_err(|_| Error::InvalidLength {
            len: self.encoded_len(),
        })?;

        let header = FileHeader {
            version: U16::new(VERSION),
            block_count: U16::new(block_count),
            total_length: U32::new(total_length),
        };

        let mut out = Vec::with_capacity(total_length as usize);
        out.extend_from_slice(header.as_bytes());
        for block in &self.blocks {
            let entry = EntryHeader {
                address: U32::new(block.address),
                length: U32::new(block.data.len() as u32),
            };
            out.extend_from_slice(entry.as_bytes());
            out.extend_from_slice(&block.data);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    fn sample() -> SaveImage {
        let mut image = SaveImage::new();
        image.push(0x3F_0000, vec![0x11, 0x22, 0x33]);
        image.push(0x3F_8000, vec![0xAA; 4]);
        image
    }

    #[test]
    fn test_encoded_layout() {
        let bytes = sample().to_bytes().unwrap();
        assert_eq!(bytes.len(), 8 + (8 + 3) + (8 + 4));
        assert_eq!(&bytes[0..2], &[0x53, 0x00]);
        assert_eq!(&bytes[2..4], &[0x02, 0x00]);
        assert_eq!(&bytes[4..8], &(bytes.len() as u32).to_le_bytes());
        assert_eq!(&bytes[8..12], &0x3F_0000u32.to_le_bytes());
        assert_eq!(&bytes[12..16], &3u32.to_le_bytes());
        assert_eq!(&bytes[16..19], &[0x11, 0x22, 0x33]);
    }

    #[test]
    fn test_parse_encoded() {
        let image = sample();
        let parsed = SaveImage::parse(&image.to_bytes().unwrap()).unwrap();
        assert_eq!(parsed, image);
        assert_eq!(parsed.payload_len(), 7);
    }

    #[test]
    fn test_empty_image() {
        let bytes = SaveImage::new().to_bytes().unwrap();
        assert_eq!(bytes, [0x53, 0x00, 0x00, 0x00, 0x08, 0x00, 0x00, 0x00]);
        assert!(SaveImage::parse(&bytes).unwrap().is_empty());
    }

    #[test]
    fn test_bad_version() {
        let mut bytes = sample().to_bytes().unwrap();
        bytes[0] = 0x52;
        assert_eq!(
            SaveImage::parse(&bytes),
            Err(Error::Format(FormatError::BadVersion(0x0052)))
        );
    }

    #[test]
    fn test_truncated() {
        let bytes = sample().to_bytes().unwrap();
        assert_eq!(
            SaveImage::parse(&bytes[..5]),
            Err(Error::Format(FormatError::Truncated))
        );
        // Cut inside the second entry header
        assert_eq!(
            SaveImage::parse(&bytes[..22]),
            Err(Error::Format(FormatError::Truncated))
        );
        // Cut inside the last payload
        assert_eq!(
            SaveImage::parse(&bytes[..bytes.len() - 1]),
            Err(Error::Format(FormatError::Truncated))
        );
    }

    #[test]
    fn test_total_length_mismatch() {
        let mut bytes = sample().to_bytes().unwrap();
        bytes[4] = bytes[4].wrapping_add(1);
        assert!(matches!(
            SaveImage::parse(&bytes),
            Err(Error::Format(FormatError::LengthMismatch { .. }))
        ));
    }

    #[test]
    fn test_trailing_bytes() {
        let mut bytes = sample().to_bytes().unwrap();
        let declared = bytes.len() as u32;
        bytes.push(0);
        assert_eq!(
            SaveImage::parse(&bytes),
            Err(Error::Format(FormatError::LengthMismatch {
                declared,
                actual: declared + 1,
            }))
        );
    }
}
