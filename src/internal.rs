//! Directory engine internals: mounting, persistence, the best-fit gap
//! search and the sorted entry table bookkeeping.

use crate::error::Error;
use crate::platform::{Platform, align_ceil};
use crate::raw::{DIRECTORY_SIZE, Directory, FileEntry, MAX_FILE_ENTRIES};
use crate::{FileName, FlashFs};
#[cfg(feature = "defmt")]
use defmt::trace;

/// Where a new file would go: the insertion slot that keeps the table sorted,
/// the page-aligned start address, and the size of the hosting gap.
#[cfg_attr(any(test, feature = "debug-logs"), derive(Debug))]
#[derive(Copy, Clone, PartialEq, Eq)]
pub(crate) struct GapInfo {
    pub(crate) insert_at: usize,
    pub(crate) start_address: u32,
    pub(crate) gap_size: u32,
}

/// Cursor state of the one file that may be open at a time. Start address and
/// size are snapshotted at open time; entries do not move while open.
pub(crate) struct OpenFile {
    pub(crate) index: usize,
    pub(crate) position: u32,
    pub(crate) start_address: u32,
    pub(crate) size: u32,
}

impl<P: Platform> FlashFs<P> {
    pub(crate) fn require_mounted(&self) -> Result<(), Error> {
        if self.mounted { Ok(()) } else { Err(Error::NotMounted) }
    }

    /// Reads and validates the directory image at address 0. `Ok(false)`
    /// means the device holds a foreign or corrupt image and stays unmounted.
    pub(crate) fn load_directory(&mut self) -> Result<bool, Error> {
        self.mounted = false;
        let mut image = [0u8; DIRECTORY_SIZE];
        self.eeprom.read(0, &mut image)?;

        match Directory::decode(&image) {
            Ok(dir) if self.entries_are_plausible(&dir) => {
                self.dir = dir;
                self.mounted = true;
                Ok(true)
            }
            _ => {
                self.dir = Directory::empty(FileName::from_array(b""));
                Ok(false)
            }
        }
    }

    /// Entry fields come straight off the bus. An image whose entries sit
    /// below the directory, overlap, run out of address order or reach past
    /// the device end cannot have been written by this crate and must not
    /// feed the allocator's address arithmetic.
    fn entries_are_plausible(&self, dir: &Directory) -> bool {
        let capacity = self.eeprom.capacity().size_bytes() as u64;
        let mut previous_end = DIRECTORY_SIZE as u64;
        for entry in &dir.files[..dir.num_files as usize] {
            let start = entry.start_address as u64;
            let end = start + entry.size as u64;
            if start < previous_end || end > capacity {
                return false;
            }
            previous_end = end;
        }
        true
    }

    /// Rewrites the whole directory image at address 0. Not atomic: a power
    /// loss mid-write leaves the directory undefined until the next `format`.
    pub(crate) fn persist_directory(&mut self) -> Result<(), Error> {
        #[cfg(feature = "defmt")]
        trace!("flashing directory, {} files", self.dir.num_files);

        let image = self.dir.encode();
        self.eeprom.write(0, &image)
    }

    /// Full-name lookup over the valid entries.
    pub(crate) fn find_file(&self, name: &FileName) -> Option<usize> {
        self.entries().position(|entry| entry.name == *name)
    }

    /// Best-fit search over the address-sorted table: for every insertion
    /// slot the candidate gap runs from the page-aligned end of the previous
    /// region (the directory image for slot 0) to the start of the next entry
    /// (the device end for the last slot). The smallest gap that fits wins;
    /// ties go to the lowest slot, favoring low addresses.
    pub(crate) fn find_best_fitting_gap(&self, size: u32) -> Result<GapInfo, Error> {
        let page_size = self.eeprom.page_size();
        let num_files = self.dir.num_files as usize;

        let mut best: Option<GapInfo> = None;
        for insert_at in 0..=num_files {
            let start_address = if insert_at == 0 {
                align_ceil(DIRECTORY_SIZE as u32, page_size)
            } else {
                let previous = &self.dir.files[insert_at - 1];
                align_ceil(previous.start_address + previous.size, page_size)
            };

            let end = if insert_at == num_files {
                self.eeprom.capacity().size_bytes()
            } else {
                self.dir.files[insert_at].start_address // page-aligned already
            };

            let gap_size = end.saturating_sub(start_address);
            if gap_size < size {
                continue;
            }

            if best.is_none_or(|b| gap_size < b.gap_size) {
                best = Some(GapInfo {
                    insert_at,
                    start_address,
                    gap_size,
                });
            }
        }

        best.ok_or(Error::NotEnoughSpace)
    }

    /// Inserts `entry` at slot `at`, shifting later entries right. The caller
    /// guarantees `at` is the sorted position, so the address order holds by
    /// construction.
    pub(crate) fn insert_entry(&mut self, at: usize, entry: FileEntry) {
        let num_files = self.dir.num_files as usize;
        debug_assert!(num_files < MAX_FILE_ENTRIES);

        let mut i = num_files;
        while i > at {
            self.dir.files[i] = self.dir.files[i - 1];
            i -= 1;
        }
        self.dir.files[at] = entry;
        self.dir.num_files += 1;

        if let Some(open) = self.open_file.as_mut()
            && open.index >= at
        {
            open.index += 1;
        }
    }

    /// Removes the entry at slot `at` by shifting later entries left,
    /// returning the removed entry so a failed re-create can roll back. An
    /// open file above the removed slot is renumbered; the caller closes the
    /// open file first if it is the one being removed.
    pub(crate) fn remove_entry(&mut self, at: usize) -> FileEntry {
        let num_files = self.dir.num_files as usize;
        let removed = self.dir.files[at];

        for i in at..num_files - 1 {
            self.dir.files[i] = self.dir.files[i + 1];
        }
        // keep the vacated tail slot zeroed so persisted images are stable
        self.dir.files[num_files - 1] = FileEntry::EMPTY;
        self.dir.num_files -= 1;

        if let Some(open) = self.open_file.as_mut()
            && open.index > at
        {
            open.index -= 1;
        }

        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CapacityClass;

    struct NullBus;

    impl crate::platform::Bus for NullBus {
        type Error = ();

        fn write(&mut self, _device_address: u8, _frame: &[u8]) -> Result<(), ()> {
            Ok(())
        }

        fn write_read(
            &mut self,
            _device_address: u8,
            _frame: &[u8],
            _buf: &mut [u8],
        ) -> Result<(), ()> {
            Ok(())
        }
    }

    impl crate::platform::Delay for NullBus {
        fn delay_ms(&mut self, _ms: u32) {}
    }

    fn fs_with_entries(entries: &[(u32, u32)]) -> FlashFs<NullBus> {
        let mut fs = FlashFs::new(NullBus, 0x50, CapacityClass::Size32k, 64).unwrap();
        fs.mounted = true;
        fs.dir = Directory::empty(FileName::from_array(b"t"));
        for &(start_address, size) in entries {
            let at = fs.dir.num_files as usize;
            fs.dir.files[at] = FileEntry {
                start_address,
                name: FileName::from_array(b"f"),
                size,
            };
            fs.dir.num_files += 1;
        }
        fs
    }

    #[test]
    fn empty_table_allocates_after_directory() {
        let fs = fs_with_entries(&[]);
        let gap = fs.find_best_fitting_gap(100).unwrap();
        // 320 is already a multiple of 64
        assert_eq!(
            gap,
            GapInfo {
                insert_at: 0,
                start_address: 320,
                gap_size: 32768 - 320,
            }
        );
    }

    #[test]
    fn smallest_eligible_gap_wins() {
        // gap of 12 pages between the entries, 5 pages at the end
        let fs = fs_with_entries(&[(320, 64), (384 + 12 * 64, 32768 - (384 + 12 * 64) - 5 * 64)]);
        let gap = fs.find_best_fitting_gap(4 * 64).unwrap();
        assert_eq!(gap.insert_at, 2);
        assert_eq!(gap.gap_size, 5 * 64);
    }

    #[test]
    fn ties_go_to_the_lowest_slot() {
        // two one-page gaps: after the directory and between the entries
        let fs = fs_with_entries(&[(384, 64), (512, 32768 - 512)]);
        let gap = fs.find_best_fitting_gap(64).unwrap();
        assert_eq!(gap.insert_at, 0);
        assert_eq!(gap.start_address, 320);
        assert_eq!(gap.gap_size, 64);
    }

    #[test]
    fn unaligned_file_end_rounds_up() {
        let fs = fs_with_entries(&[(320, 100)]);
        let gap = fs.find_best_fitting_gap(64).unwrap();
        assert_eq!(gap.insert_at, 1);
        assert_eq!(gap.start_address, 448); // 320 + 100 = 420, next page is 448
    }

    #[test]
    fn no_gap_large_enough() {
        let fs = fs_with_entries(&[(320, 32768 - 320 - 63)]);
        assert_eq!(fs.find_best_fitting_gap(64).unwrap_err(), Error::NotEnoughSpace);
    }

    #[test]
    fn insert_and_remove_keep_order_and_count() {
        let mut fs = fs_with_entries(&[(320, 64), (448, 64)]);
        fs.insert_entry(
            1,
            FileEntry {
                start_address: 384,
                name: FileName::from_array(b"mid"),
                size: 64,
            },
        );
        assert_eq!(fs.dir.num_files, 3);
        let starts: Vec<u32> = fs.entries().map(|e| e.start_address()).collect();
        assert_eq!(starts, vec![320, 384, 448]);

        let removed = fs.remove_entry(0);
        assert_eq!(removed.start_address(), 320);
        assert_eq!(fs.dir.num_files, 2);
        let starts: Vec<u32> = fs.entries().map(|e| e.start_address()).collect();
        assert_eq!(starts, vec![384, 448]);
        assert_eq!(fs.dir.files[2], FileEntry::EMPTY);
    }

    #[test]
    fn open_index_follows_removals_and_insertions() {
        let mut fs = fs_with_entries(&[(320, 64), (448, 64), (576, 64)]);
        fs.open_file = Some(OpenFile {
            index: 2,
            position: 0,
            start_address: 576,
            size: 64,
        });

        fs.remove_entry(0);
        assert_eq!(fs.open_file.as_ref().map(|f| f.index), Some(1));

        fs.insert_entry(
            0,
            FileEntry {
                start_address: 320,
                name: FileName::from_array(b"n"),
                size: 64,
            },
        );
        assert_eq!(fs.open_file.as_ref().map(|f| f.index), Some(2));
    }
}
