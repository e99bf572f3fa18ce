#![allow(dead_code)]

// filename according to https://doc.rust-lang.org/book/ch11-03-test-organization.html
use flashfs::CapacityClass;
use flashfs::platform::{Bus, Delay};

pub const PAGE_SIZE: u32 = 64;

/// In-memory I2C EEPROM model. Decodes selector bits and inline address
/// bytes independently of the crate (straight from the AT24 datasheets), so
/// a framing bug on either side shows up as a mismatch, and enforces the two
/// hardware rules as asserts: frames never exceed the 32-byte Wire buffer
/// and write payloads never cross a page boundary.
pub struct I2cEeprom {
    pub mem: Vec<u8>,
    pub base_address: u8,
    pub capacity: CapacityClass,
    pub page_size: u32,
    pub operations: Vec<Operation>,
    pub fail_after_operation: usize,
    pub settle_ms: u32,
}

#[derive(Debug, PartialEq, Clone)]
pub enum Operation {
    Write { address: u32, len: usize },
    Read { address: u32, len: usize },
}

#[derive(Debug)]
pub struct BusFault;

impl I2cEeprom {
    pub fn new(capacity: CapacityClass, page_size: u32) -> Self {
        Self {
            mem: vec![0xFF; capacity.size_bytes() as usize],
            base_address: flashfs::DEFAULT_DEVICE_ADDRESS,
            capacity,
            page_size,
            operations: Vec::new(),
            fail_after_operation: usize::MAX,
            settle_ms: 0,
        }
    }

    pub fn new_with_fault(capacity: CapacityClass, page_size: u32, fail_after_operation: usize) -> Self {
        Self {
            fail_after_operation,
            ..Self::new(capacity, page_size)
        }
    }

    pub fn disable_faults(&mut self) {
        self.fail_after_operation = usize::MAX;
    }

    pub fn writes(&self) -> usize {
        self.operations
            .iter()
            .filter(|op| matches!(op, Operation::Write { .. }))
            .count()
    }

    pub fn dump_operations(&self) {
        println!("Operations:");
        for op in &self.operations {
            println!("  {:?}", op);
        }
    }

    /// Reassembles the byte address from the device-address selector bits and
    /// the inline address bytes, per capacity tier. Returns the address and
    /// the header length consumed from the frame.
    fn decode_address(&self, device_address: u8, frame: &[u8]) -> (u32, usize) {
        let (mask, shift, inline) = match self.capacity {
            CapacityClass::Size2k => (0x07u8, 8u32, 1usize),
            CapacityClass::Size128k => (0x01, 16, 2),
            CapacityClass::Size256k => (0x03, 16, 2),
            _ => (0x00, 0, 2),
        };

        assert_eq!(
            device_address & !mask,
            self.base_address & !mask,
            "fixed device-address bits changed"
        );

        let selector = u32::from(device_address & mask) << shift;
        let inline_value = frame[..inline]
            .iter()
            .fold(0u32, |acc, &b| (acc << 8) | u32::from(b));
        (selector | inline_value, inline)
    }
}

impl Bus for I2cEeprom {
    type Error = BusFault;

    fn write(&mut self, device_address: u8, frame: &[u8]) -> Result<(), BusFault> {
        assert!(frame.len() <= 32, "frame exceeds the 32-byte Wire buffer");
        let (address, header) = self.decode_address(device_address, frame);
        let data = &frame[header..];
        assert!(!data.is_empty(), "write frame without payload");
        assert!(
            address % self.page_size + data.len() as u32 <= self.page_size,
            "write of {} bytes at {:#06x} crosses a page boundary",
            data.len(),
            address
        );

        println!(
            "    eeprom: write: 0x{address:05X}[0x{:02X}] #{:>2}",
            data.len(),
            self.operations.len()
        );
        if self.operations.len() >= self.fail_after_operation {
            println!("    eeprom: FAULT");
            return Err(BusFault);
        }
        self.operations.push(Operation::Write {
            address,
            len: data.len(),
        });

        let address = address as usize;
        self.mem[address..address + data.len()].copy_from_slice(data);
        Ok(())
    }

    fn write_read(
        &mut self,
        device_address: u8,
        frame: &[u8],
        buf: &mut [u8],
    ) -> Result<(), BusFault> {
        assert!(buf.len() <= 32, "read exceeds the 32-byte Wire buffer");
        let (address, header) = self.decode_address(device_address, frame);
        assert_eq!(frame.len(), header, "read frame must be address-only");

        println!(
            "    eeprom: read:  0x{address:05X}[0x{:02X}] #{:>2}",
            buf.len(),
            self.operations.len()
        );
        if self.operations.len() >= self.fail_after_operation {
            println!("    eeprom: FAULT");
            return Err(BusFault);
        }
        self.operations.push(Operation::Read {
            address,
            len: buf.len(),
        });

        let address = address as usize;
        buf.copy_from_slice(&self.mem[address..address + buf.len()]);
        Ok(())
    }
}

impl Delay for I2cEeprom {
    fn delay_ms(&mut self, ms: u32) {
        self.settle_ms += ms;
    }
}
