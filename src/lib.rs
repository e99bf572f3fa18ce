#![doc = include_str!("../README.md")]
#![cfg_attr(not(target_arch = "x86_64"), no_std)]

pub mod error;
mod internal;
pub mod platform;
mod raw;
mod record;
mod transport;

/// Maximum file and volume name length is 9 bytes + 1 byte for the null terminator.
const MAX_NAME_LENGTH: usize = 9;
const NAME_FIELD_LENGTH: usize = MAX_NAME_LENGTH + 1;

/// A 10-byte name used for files and the volume label (9 characters + null terminator).
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FileName([u8; NAME_FIELD_LENGTH]);

impl FileName {
    /// Creates a 10 byte, null-padded byte array used to name files and volumes.
    ///
    /// Usage: `FileName::from_array(b"scores")`
    ///
    /// Tip: use a const context if possible to ensure that the name is transformed at
    /// compile time: `let scores = const { FileName::from_array(b"scores") };`
    pub const fn from_array<const M: usize>(src: &[u8; M]) -> Self {
        assert!(M <= MAX_NAME_LENGTH);
        let mut dst = [0u8; NAME_FIELD_LENGTH];
        let mut i = 0;
        while i < M {
            dst[i] = src[i];
            i += 1;
        }
        Self(dst)
    }

    /// Creates a 10 byte, null-padded byte array used to name files and volumes.
    ///
    /// Usage: `FileName::from_slice(b"scores")`
    pub const fn from_slice(src: &[u8]) -> Self {
        assert!(src.len() <= MAX_NAME_LENGTH);
        let mut dst = [0u8; NAME_FIELD_LENGTH];
        let mut i = 0;
        while i < src.len() {
            dst[i] = src[i];
            i += 1;
        }
        Self(dst)
    }

    /// Creates a 10 byte, null-padded byte array used to name files and volumes.
    ///
    /// Usage: `FileName::from_str("scores")`
    pub const fn from_str(s: &str) -> Self {
        Self::from_slice(s.as_bytes())
    }

    /// The raw null-padded bytes as they appear in the directory image.
    pub const fn as_bytes(&self) -> &[u8; NAME_FIELD_LENGTH] {
        &self.0
    }

    /// The name up to the first null byte, for display. Falls back to ""
    /// if the stored bytes are not valid UTF-8.
    pub fn as_str(&self) -> &str {
        let end = self.0.iter().position(|&b| b == 0).unwrap_or(self.0.len());
        core::str::from_utf8(&self.0[..end]).unwrap_or("")
    }
}

impl fmt::Debug for FileName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FileName(b\"")?;

        // skip the trailing byte, which is always null and would only add
        // a confusing \0 to the output for 9-byte names
        for &byte in &self.0[..self.0.len() - 1] {
            if byte == 0 {
                write!(f, "\\0")?;
                continue;
            }
            write!(f, "{}", core::ascii::escape_default(byte))?;
        }

        write!(f, "\")")
    }
}

impl AsRef<[u8]> for FileName {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

pub use error::Error;
pub use raw::{DEFAULT_DEVICE_ADDRESS, DIRECTORY_SIZE, FileEntry, MAX_FILE_ENTRIES};
pub use record::{Load, Store};
pub use transport::{AddressFrame, CapacityClass, Eeprom, MAX_FRAME_LENGTH, address_frame};

use crate::internal::OpenFile;
use crate::platform::{Platform, align_ceil};
use crate::raw::Directory;
use core::fmt;

/// Used and free byte counts over the whole device, counting every region
/// rounded up to page granularity (the next file cannot start mid-page).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Usage {
    pub used_bytes: u32,
    pub free_bytes: u32,
}

/// The flat-file storage engine: a fixed 16-entry directory at device address
/// 0 and one sequentially accessed file at a time.
///
/// The engine assumes exclusive ownership of the device. Nothing is cached
/// beyond the directory image and the open-file cursor; every read and write
/// goes straight to the bus.
pub struct FlashFs<P: Platform> {
    pub(crate) eeprom: Eeprom<P>,
    pub(crate) dir: Directory,
    pub(crate) mounted: bool,
    pub(crate) open_file: Option<OpenFile>,
}

impl<P: Platform> FlashFs<P> {
    /// Creates the engine without touching the bus. Call [`open_device`] to
    /// mount an existing filesystem or [`format`] to start fresh.
    ///
    /// [`open_device`]: FlashFs::open_device
    /// [`format`]: FlashFs::format
    pub fn new(
        platform: P,
        device_address: u8,
        capacity: CapacityClass,
        page_size: u32,
    ) -> Result<FlashFs<P>, Error> {
        Ok(FlashFs {
            eeprom: Eeprom::new(platform, device_address, capacity, page_size)?,
            dir: Directory::empty(FileName::from_array(b"")),
            mounted: false,
            open_file: None,
        })
    }

    /// Reads the directory from the device and validates it. `Ok(true)` means
    /// the filesystem is mounted; `Ok(false)` means the device holds a
    /// foreign or corrupt image and only [`format`] will make it usable.
    /// Any open file is closed either way.
    ///
    /// [`format`]: FlashFs::format
    pub fn open_device(&mut self) -> Result<bool, Error> {
        self.close();
        self.load_directory()
    }

    /// Re-parameterizes the transport, then mounts as [`open_device`] does.
    ///
    /// [`open_device`]: FlashFs::open_device
    pub fn open_device_with(
        &mut self,
        device_address: u8,
        capacity: CapacityClass,
        page_size: u32,
    ) -> Result<bool, Error> {
        self.eeprom.reconfigure(device_address, capacity, page_size)?;
        self.open_device()
    }

    /// Resets the directory to an empty volume named `name` and persists it
    /// immediately. Recovers foreign or corrupt devices.
    pub fn format(&mut self, name: &FileName) -> Result<(), Error> {
        self.close();
        self.dir = Directory::empty(*name);
        self.mounted = true;
        match self.persist_directory() {
            Ok(()) => Ok(()),
            Err(e) => {
                self.mounted = false;
                Err(e)
            }
        }
    }

    /// The volume label.
    pub fn storage_name(&self) -> &FileName {
        &self.dir.name
    }

    /// The on-device format version, major in the high byte.
    pub fn storage_version(&self) -> u16 {
        self.dir.version
    }

    /// Number of valid directory entries.
    pub fn file_count(&self) -> usize {
        self.dir.num_files as usize
    }

    /// The directory entry at `index`, if valid. Entries are ordered by
    /// ascending start address, not by creation time.
    pub fn entry(&self, index: usize) -> Option<&FileEntry> {
        if index < self.file_count() {
            Some(&self.dir.files[index])
        } else {
            None
        }
    }

    /// All valid directory entries in address order.
    pub fn entries(&self) -> impl Iterator<Item = &FileEntry> {
        self.dir.files[..self.file_count()].iter()
    }

    /// Whether a file named `name` exists.
    pub fn exists(&self, name: &FileName) -> bool {
        self.find_file(name).is_some()
    }

    /// Used/free summary for directory listings.
    pub fn usage(&self) -> Usage {
        let page_size = self.eeprom.page_size();
        let mut used_bytes = align_ceil(DIRECTORY_SIZE as u32, page_size);
        for entry in self.entries() {
            used_bytes += align_ceil(entry.size, page_size);
        }
        Usage {
            used_bytes,
            free_bytes: self.eeprom.capacity().size_bytes().saturating_sub(used_bytes),
        }
    }

    /// Creates a file of fixed `size` bytes and opens it, returning the size.
    ///
    /// If `name` already exists the old entry is removed first, so re-creating
    /// doubles as relocate-and-resize. When no slot or gap can host the new
    /// file, the removal is rolled back and the directory is left untouched.
    /// The start address comes from a best-fit search over the free gaps,
    /// aligned up to the next page boundary.
    pub fn create_file(&mut self, name: &FileName, size: u32) -> Result<u32, Error> {
        self.require_mounted()?;

        let previous = match self.find_file(name) {
            Some(index) => {
                if self.open_file.as_ref().is_some_and(|f| f.index == index) {
                    self.close();
                }
                Some((index, self.remove_entry(index)))
            }
            None => None,
        };

        let gap = if self.file_count() == MAX_FILE_ENTRIES {
            Err(Error::DirTableFull)
        } else {
            self.find_best_fitting_gap(size)
        };
        let gap = match gap {
            Ok(gap) => gap,
            Err(e) => {
                if let Some((index, entry)) = previous {
                    self.insert_entry(index, entry);
                }
                return Err(e);
            }
        };

        self.insert_entry(
            gap.insert_at,
            FileEntry {
                start_address: gap.start_address,
                name: *name,
                size,
            },
        );
        self.persist_directory()?;

        self.open_file(name)
    }

    /// Opens the file named `name` with the cursor at 0, returning its size.
    /// Any previously open file is closed first.
    pub fn open_file(&mut self, name: &FileName) -> Result<u32, Error> {
        self.require_mounted()?;
        self.close();

        let index = self.find_file(name).ok_or(Error::FileNotFound)?;
        let entry = &self.dir.files[index];
        self.open_file = Some(OpenFile {
            index,
            position: 0,
            start_address: entry.start_address,
            size: entry.size,
        });
        Ok(entry.size)
    }

    /// Removes the entry named `name`, force-closing it if it is the open
    /// file, and persists the directory. The file's bytes stay on the device
    /// until something else is allocated over them.
    pub fn delete_file(&mut self, name: &FileName) -> Result<(), Error> {
        self.require_mounted()?;

        let index = self.find_file(name).ok_or(Error::FileNotFound)?;
        if self.open_file.as_ref().is_some_and(|f| f.index == index) {
            self.close(); // forced close
        }
        self.remove_entry(index);
        self.persist_directory()
    }

    /// Closes the open file, if any. Idempotent.
    pub fn close(&mut self) {
        self.open_file = None;
    }

    /// True when no file is open or the cursor sits at or past the file end.
    pub fn eof(&self) -> bool {
        match &self.open_file {
            None => true,
            Some(file) => file.position >= file.size,
        }
    }

    /// Cursor position of the open file, 0 when closed.
    pub fn pos(&self) -> u32 {
        self.open_file.as_ref().map_or(0, |f| f.position)
    }

    /// Absolute seek. Only positions strictly below the file size are
    /// admitted; the cursor stays put on failure.
    pub fn set_pos(&mut self, pos: i32) -> Result<u32, Error> {
        let file = self.open_file.as_mut().ok_or(Error::FileNotOpened)?;
        if pos < 0 {
            return Err(Error::PositionNegative);
        }
        let pos = pos as u32;
        if pos >= file.size {
            return Err(Error::PositionBeyondEof);
        }
        file.position = pos;
        Ok(pos)
    }

    /// Relative seek, with the same bounds as [`set_pos`].
    ///
    /// [`set_pos`]: FlashFs::set_pos
    pub fn move_pos(&mut self, offset: i32) -> Result<u32, Error> {
        let position = self
            .open_file
            .as_ref()
            .ok_or(Error::FileNotOpened)?
            .position;
        let target = position as i64 + offset as i64;
        if target < 0 {
            return Err(Error::PositionNegative);
        }
        // file sizes sit far below i32::MAX, anything larger is past the end
        let target = i32::try_from(target).map_err(|_| Error::PositionBeyondEof)?;
        self.set_pos(target)
    }

    /// Reads `buf.len()` bytes at the cursor and advances it, returning the
    /// byte count. Fails without moving the cursor if the read would run past
    /// the file end.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
        let file = self.open_file.as_ref().ok_or(Error::FileNotOpened)?;
        if file.position as u64 + buf.len() as u64 > file.size as u64 {
            return Err(Error::ReadingBeyondEof);
        }
        if buf.is_empty() {
            return Ok(0);
        }

        let address = file.start_address + file.position;
        self.eeprom.read(address, buf)?;
        if let Some(file) = self.open_file.as_mut() {
            file.position += buf.len() as u32;
        }
        Ok(buf.len())
    }

    /// Writes `data` at the cursor and advances it, returning the byte count.
    /// Fails without moving the cursor if the write would run past the file
    /// end; files cannot grow.
    pub fn write(&mut self, data: &[u8]) -> Result<usize, Error> {
        let file = self.open_file.as_ref().ok_or(Error::FileNotOpened)?;
        if file.position as u64 + data.len() as u64 > file.size as u64 {
            return Err(Error::WritingBeyondEof);
        }
        if data.is_empty() {
            return Ok(0);
        }

        let address = file.start_address + file.position;
        self.eeprom.write(address, data)?;
        if let Some(file) = self.open_file.as_mut() {
            file.position += data.len() as u32;
        }
        Ok(data.len())
    }

    /// Overwrites the whole open file with `fill_word` repeated little-endian,
    /// restoring the cursor afterwards. Returns the file size.
    pub fn clean_file(&mut self, fill_word: u32) -> Result<u32, Error> {
        let (size, restore) = {
            let file = self.open_file.as_ref().ok_or(Error::FileNotOpened)?;
            (file.size, file.position)
        };

        let word = fill_word.to_le_bytes();
        let mut pattern = [0u8; 64];
        for (i, byte) in pattern.iter_mut().enumerate() {
            *byte = word[i % 4];
        }

        if let Some(file) = self.open_file.as_mut() {
            file.position = 0;
        }
        let mut remaining = size;
        let result = loop {
            if remaining == 0 {
                break Ok(size);
            }
            let chunk = remaining.min(pattern.len() as u32);
            match self.write(&pattern[..chunk as usize]) {
                Ok(_) => remaining -= chunk,
                Err(e) => break Err(e),
            }
        };

        if let Some(file) = self.open_file.as_mut() {
            file.position = restore;
        }
        result
    }

    /// Reads one fixed-width record at the cursor.
    ///
    /// Supported types are bool and the signed and unsigned integers up to
    /// 64-bit width, always encoded little-endian.
    pub fn load<R>(&mut self) -> Result<R, Error>
    where
        Self: Load<R>,
    {
        Load::load(self)
    }

    /// Writes one fixed-width record at the cursor. See [`load`](FlashFs::load)
    /// for the supported types.
    pub fn store<R>(&mut self, value: R) -> Result<(), Error>
    where
        Self: Store<R>,
    {
        Store::store(self, value)
    }
}
