//! On-device directory layout.
//!
//! The 320-byte directory image lives at device address 0. The layout is a
//! fixed wire format shared with other implementations, so it must not drift.
//! All multi-byte fields are little-endian and encoded explicitly; nothing
//! here depends on host struct layout.
//!
//! ```text
//! offset  size  field
//!      0     4  magic        "TLFS" (0x544C4653, little-endian)
//!      4     2  version      0x0100, major.minor
//!      6    10  name         volume label, null-padded
//!     16    12  reserved     zero
//!     28     4  num_files
//!     32  16x18 file entries (start_address u32, name [u8; 10], size u32)
//! ```

use crate::error::Error;
use crate::{FileName, NAME_FIELD_LENGTH};

pub(crate) const MAGIC: u32 = 0x544C_4653; // "TLFS"
pub(crate) const FORMAT_VERSION: u16 = 0x0100;

/// Fixed capacity of the directory table.
pub const MAX_FILE_ENTRIES: usize = 16;

/// Factory-default I2C address of an AT24-style EEPROM.
pub const DEFAULT_DEVICE_ADDRESS: u8 = 0x50;

pub(crate) const DIRECTORY_HEADER_SIZE: usize = 32;
pub(crate) const FILE_ENTRY_SIZE: usize = 18;

/// Size of the directory image at device address 0. File data starts at the
/// first page boundary at or after this offset.
pub const DIRECTORY_SIZE: usize = DIRECTORY_HEADER_SIZE + MAX_FILE_ENTRIES * FILE_ENTRY_SIZE;

// The on-device image is part of the wire contract.
const _: () = assert!(DIRECTORY_SIZE == 320, "directory image must be 320 bytes");

#[inline(always)]
fn read_u16(raw: &[u8]) -> u16 {
    u16::from_le_bytes([raw[0], raw[1]])
}

#[inline(always)]
fn read_u32(raw: &[u8]) -> u32 {
    u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]])
}

/// One directory record: where a file starts, what it is called, how long it is.
///
/// `start_address` is always page-aligned; `size` may end mid-page. Entries in
/// the directory are kept sorted by ascending `start_address`.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FileEntry {
    pub(crate) start_address: u32,
    pub(crate) name: FileName,
    pub(crate) size: u32,
}

impl FileEntry {
    pub(crate) const EMPTY: FileEntry = FileEntry {
        start_address: 0,
        name: FileName::from_array(b""),
        size: 0,
    };

    pub fn start_address(&self) -> u32 {
        self.start_address
    }

    pub fn name(&self) -> &FileName {
        &self.name
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    fn encode(&self, out: &mut [u8]) {
        out[0..4].copy_from_slice(&self.start_address.to_le_bytes());
        out[4..4 + NAME_FIELD_LENGTH].copy_from_slice(self.name.as_bytes());
        out[14..18].copy_from_slice(&self.size.to_le_bytes());
    }

    fn decode(raw: &[u8]) -> FileEntry {
        let mut name = [0u8; NAME_FIELD_LENGTH];
        name.copy_from_slice(&raw[4..4 + NAME_FIELD_LENGTH]);
        FileEntry {
            start_address: read_u32(&raw[0..4]),
            name: FileName(name),
            size: read_u32(&raw[14..18]),
        }
    }
}

/// The in-memory copy of the on-device directory. Loaded wholesale on mount,
/// rewritten wholesale after every mutation.
#[cfg_attr(any(test, feature = "debug-logs"), derive(Debug))]
pub(crate) struct Directory {
    pub(crate) version: u16,
    pub(crate) name: FileName,
    pub(crate) num_files: u32,
    pub(crate) files: [FileEntry; MAX_FILE_ENTRIES],
}

impl Directory {
    pub(crate) fn empty(name: FileName) -> Directory {
        Directory {
            version: FORMAT_VERSION,
            name,
            num_files: 0,
            files: [FileEntry::EMPTY; MAX_FILE_ENTRIES],
        }
    }

    pub(crate) fn encode(&self) -> [u8; DIRECTORY_SIZE] {
        let mut image = [0u8; DIRECTORY_SIZE];
        image[0..4].copy_from_slice(&MAGIC.to_le_bytes());
        image[4..6].copy_from_slice(&self.version.to_le_bytes());
        image[6..6 + NAME_FIELD_LENGTH].copy_from_slice(self.name.as_bytes());
        // bytes 16..28 are reserved and stay zero
        image[28..32].copy_from_slice(&self.num_files.to_le_bytes());
        for (i, entry) in self.files.iter().enumerate() {
            let offset = DIRECTORY_HEADER_SIZE + i * FILE_ENTRY_SIZE;
            entry.encode(&mut image[offset..offset + FILE_ENTRY_SIZE]);
        }
        image
    }

    /// Decodes a directory image, validating the magic, the format version and
    /// the entry count. `Err` means the device holds something other than this
    /// filesystem and must be formatted before use.
    pub(crate) fn decode(image: &[u8; DIRECTORY_SIZE]) -> Result<Directory, Error> {
        let magic = read_u32(&image[0..4]);
        let version = read_u16(&image[4..6]);
        let num_files = read_u32(&image[28..32]);

        if magic != MAGIC || version != FORMAT_VERSION || num_files > MAX_FILE_ENTRIES as u32 {
            return Err(Error::NotMounted);
        }

        let mut name = [0u8; NAME_FIELD_LENGTH];
        name.copy_from_slice(&image[6..6 + NAME_FIELD_LENGTH]);

        let mut files = [FileEntry::EMPTY; MAX_FILE_ENTRIES];
        for (i, entry) in files.iter_mut().enumerate() {
            let offset = DIRECTORY_HEADER_SIZE + i * FILE_ENTRY_SIZE;
            *entry = FileEntry::decode(&image[offset..offset + FILE_ENTRY_SIZE]);
        }

        Ok(Directory {
            version,
            name: FileName(name),
            num_files,
            files,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_directory_image_is_byte_exact() {
        let dir = Directory::empty(FileName::from_array(b"Games"));
        let image = dir.encode();

        assert_eq!(&image[0..4], b"SFLT"); // 0x544C4653 little-endian
        assert_eq!(&image[4..6], &[0x00, 0x01]);
        assert_eq!(&image[6..16], b"Games\0\0\0\0\0");
        assert_eq!(&image[16..32], &[0u8; 16]); // reserved + num_files
        assert!(image[32..].iter().all(|&b| b == 0));
    }

    #[test]
    fn entry_layout_is_byte_exact() {
        let mut dir = Directory::empty(FileName::from_array(b"Vol"));
        dir.num_files = 1;
        dir.files[0] = FileEntry {
            start_address: 0x140,
            name: FileName::from_array(b"Hello"),
            size: 600,
        };
        let image = dir.encode();

        assert_eq!(&image[28..32], &1u32.to_le_bytes());
        let entry = &image[32..50];
        assert_eq!(&entry[0..4], &0x140u32.to_le_bytes());
        assert_eq!(&entry[4..14], b"Hello\0\0\0\0\0");
        assert_eq!(&entry[14..18], &600u32.to_le_bytes());
    }

    #[test]
    fn round_trip() {
        let mut dir = Directory::empty(FileName::from_array(b"Vol"));
        dir.num_files = 2;
        dir.files[0] = FileEntry {
            start_address: 0x140,
            name: FileName::from_array(b"Hello"),
            size: 600,
        };
        dir.files[1] = FileEntry {
            start_address: 0x3c0,
            name: FileName::from_array(b"Data"),
            size: 202,
        };

        let image = dir.encode();
        let loaded = Directory::decode(&image).unwrap();
        assert_eq!(loaded.num_files, 2);
        assert_eq!(loaded.name, FileName::from_array(b"Vol"));
        assert_eq!(loaded.files[..2], dir.files[..2]);
    }

    #[test]
    fn foreign_images_are_rejected() {
        let dir = Directory::empty(FileName::from_array(b"Vol"));

        let mut bad_magic = dir.encode();
        bad_magic[0] ^= 0xFF;
        assert_eq!(Directory::decode(&bad_magic).unwrap_err(), Error::NotMounted);

        let mut bad_version = dir.encode();
        bad_version[5] = 0x02;
        assert_eq!(Directory::decode(&bad_version).unwrap_err(), Error::NotMounted);

        let mut too_many = dir.encode();
        too_many[28] = MAX_FILE_ENTRIES as u8 + 1;
        assert_eq!(Directory::decode(&too_many).unwrap_err(), Error::NotMounted);

        let blank = [0u8; DIRECTORY_SIZE];
        assert_eq!(Directory::decode(&blank).unwrap_err(), Error::NotMounted);
    }
}
