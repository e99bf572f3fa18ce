//! The paged device transport: capacity tiers, address framing and the
//! chunker that keeps every bus transfer page-safe and size-bounded.

use crate::error::Error;
use crate::platform::{Platform, align_floor};
#[cfg(feature = "defmt")]
use defmt::trace;

/// Upper bound for one bus frame, address header included. Matches the
/// 32-byte transfer buffer of common microcontroller I2C stacks.
pub const MAX_FRAME_LENGTH: usize = 32;

/// Settle time after each write frame while the EEPROM runs its internal
/// write cycle.
const WRITE_CYCLE_MS: u32 = 5;

/// Device size classes for AT24-style I2C EEPROMs.
///
/// The tier decides how a byte address is split between the bus-selector bits
/// of the device address and the inline address bytes of the frame. The
/// discriminant is the device size in bytes, so a tier can be resolved from a
/// plain size via `CapacityClass::from_repr`:
///
/// ```
/// use flashfs::CapacityClass;
/// assert_eq!(CapacityClass::from_repr(32 * 1024), Some(CapacityClass::Size32k));
/// assert_eq!(CapacityClass::from_repr(1000), None);
/// ```
///
/// Parts smaller than 2k cannot hold the 320-byte directory and are not
/// supported.
#[derive(strum::FromRepr, Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u32)]
pub enum CapacityClass {
    /// e.g. Atmel AT24C16: address bits 8..11 travel in the selector bits.
    Size2k = 1 << 11,
    Size4k = 1 << 12,
    Size8k = 1 << 13,
    Size16k = 1 << 14,
    Size32k = 1 << 15,
    Size64k = 1 << 16,
    /// e.g. Atmel AT24CM01: address bit 16 travels in the selector bits.
    Size128k = 1 << 17,
    /// e.g. Atmel AT24CM02: address bits 16..17 travel in the selector bits.
    Size256k = 1 << 18,
}

impl CapacityClass {
    pub const fn size_bytes(self) -> u32 {
        self as u32
    }

    /// Number of address bytes sent inline at the start of each frame,
    /// most significant first.
    pub const fn inline_address_bytes(self) -> usize {
        match self {
            CapacityClass::Size2k => 1,
            _ => 2,
        }
    }

    /// Mask of the device-address bits repurposed as memory-page selectors
    /// (P0..P2 replacing the external A0..A2 pins).
    pub const fn selector_mask(self) -> u8 {
        match self {
            CapacityClass::Size2k => 0x07,
            CapacityClass::Size128k => 0x01,
            CapacityClass::Size256k => 0x03,
            _ => 0x00,
        }
    }

    const fn selector_shift(self) -> u32 {
        match self {
            CapacityClass::Size2k => 8,
            _ => 16,
        }
    }
}

/// A fully encoded bus address: the (possibly selector-modified) device
/// address and the inline address bytes that open the frame.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AddressFrame {
    pub device_address: u8,
    bytes: [u8; 2],
    len: u8,
}

impl AddressFrame {
    /// The inline address bytes, most significant first.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }
}

/// Splits a byte address into selector bits and inline address bytes for the
/// given capacity tier. Pure; the bit layout must match the device datasheets
/// exactly, since the hardware decodes it.
pub fn address_frame(class: CapacityClass, device_address: u8, address: u32) -> AddressFrame {
    let mask = class.selector_mask();
    let selector = (address >> class.selector_shift()) as u8 & mask;
    let device_address = (device_address & !mask) | selector;

    let mut bytes = [0u8; 2];
    let len = class.inline_address_bytes();
    if len == 2 {
        bytes[0] = (address >> 8) as u8;
        bytes[1] = address as u8;
    } else {
        bytes[0] = address as u8;
    }

    AddressFrame {
        device_address,
        bytes,
        len: len as u8,
    }
}

/// One EEPROM behind a [`Platform`], seen as a flat byte-addressable device.
///
/// `read` and `write` accept arbitrary lengths and split them into frames
/// that never exceed [`MAX_FRAME_LENGTH`] and, for writes, never cross a
/// device page boundary.
pub struct Eeprom<P: Platform> {
    platform: P,
    device_address: u8,
    capacity: CapacityClass,
    page_size: u32,
}

impl<P: Platform> Eeprom<P> {
    pub fn new(
        platform: P,
        device_address: u8,
        capacity: CapacityClass,
        page_size: u32,
    ) -> Result<Eeprom<P>, Error> {
        if page_size == 0 || page_size > capacity.size_bytes() {
            return Err(Error::InvalidPageSize);
        }
        Ok(Eeprom {
            platform,
            device_address,
            capacity,
            page_size,
        })
    }

    pub fn capacity(&self) -> CapacityClass {
        self.capacity
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub(crate) fn reconfigure(
        &mut self,
        device_address: u8,
        capacity: CapacityClass,
        page_size: u32,
    ) -> Result<(), Error> {
        if page_size == 0 || page_size > capacity.size_bytes() {
            return Err(Error::InvalidPageSize);
        }
        self.device_address = device_address;
        self.capacity = capacity;
        self.page_size = page_size;
        Ok(())
    }

    /// Reads `buf.len()` bytes starting at `address`. Reads are split only at
    /// the transfer ceiling; the device's internal address counter rolls over
    /// page boundaries on its own during sequential reads.
    pub fn read(&mut self, address: u32, buf: &mut [u8]) -> Result<(), Error> {
        self.check_range(address, buf.len())?;

        let mut address = address;
        for chunk in buf.chunks_mut(MAX_FRAME_LENGTH) {
            #[cfg(feature = "defmt")]
            trace!("rd: addr {:#08x}, chunk {}", address, chunk.len());

            let frame = address_frame(self.capacity, self.device_address, address);
            self.platform
                .write_read(frame.device_address, frame.bytes(), chunk)
                .map_err(|_| Error::Bus)?;
            address += chunk.len() as u32;
        }
        Ok(())
    }

    /// Writes `data` starting at `address`. Every frame stays within one
    /// device page and within the transfer ceiling (address header included),
    /// and is followed by the write-cycle settle delay.
    pub fn write(&mut self, address: u32, data: &[u8]) -> Result<(), Error> {
        self.check_range(address, data.len())?;

        let max_payload = MAX_FRAME_LENGTH - self.capacity.inline_address_bytes();
        let mut address = address;
        let mut data = data;
        while !data.is_empty() {
            let space_on_page = (align_floor(address, self.page_size) + self.page_size - address) as usize;
            let chunk_len = data.len().min(max_payload).min(space_on_page);

            #[cfg(feature = "defmt")]
            trace!("wr: addr {:#08x}, chunk {}", address, chunk_len);

            let frame = address_frame(self.capacity, self.device_address, address);
            let header_len = frame.bytes().len();
            let mut buf = [0u8; MAX_FRAME_LENGTH];
            buf[..header_len].copy_from_slice(frame.bytes());
            buf[header_len..header_len + chunk_len].copy_from_slice(&data[..chunk_len]);

            self.platform
                .write(frame.device_address, &buf[..header_len + chunk_len])
                .map_err(|_| Error::Bus)?;
            // give the EEPROM time to flash the page
            self.platform.delay_ms(WRITE_CYCLE_MS);

            address += chunk_len as u32;
            data = &data[chunk_len..];
        }
        Ok(())
    }

    fn check_range(&self, address: u32, len: usize) -> Result<(), Error> {
        let end = address as u64 + len as u64;
        if end > self.capacity.size_bytes() as u64 {
            return Err(Error::OutOfBounds);
        }
        Ok(())
    }
}

impl<P: Platform> embedded_storage::ReadStorage for Eeprom<P> {
    type Error = Error;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        Eeprom::read(self, offset, bytes)
    }

    fn capacity(&self) -> usize {
        self.capacity.size_bytes() as usize
    }
}

impl<P: Platform> embedded_storage::Storage for Eeprom<P> {
    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        Eeprom::write(self, offset, bytes)
    }
}
