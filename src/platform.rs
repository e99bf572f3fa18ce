//! The hardware seam: a minimal I2C-style frame bus plus a blocking delay.
//!
//! The crate never talks to a concrete peripheral. It assembles address
//! frames (see [`crate::transport::address_frame`]) and hands them to a
//! [`Bus`] implementation, which on real hardware wraps the platform's I2C
//! driver. See README.md for an example implementation backed by RAM.

pub trait Platform: Bus + Delay {}

impl<T: Bus + Delay> Platform for T {}

/// One I2C target, frame-oriented. A frame is the address header followed by
/// payload bytes; the whole frame is bounded by
/// [`crate::transport::MAX_FRAME_LENGTH`].
pub trait Bus {
    type Error;

    /// Transmit one write frame to `device_address`.
    fn write(&mut self, device_address: u8, frame: &[u8]) -> Result<(), Self::Error>;

    /// Transmit an address-only frame to `device_address`, then read exactly
    /// `buf.len()` bytes back. A short read must be reported as an error.
    fn write_read(
        &mut self,
        device_address: u8,
        frame: &[u8],
        buf: &mut [u8],
    ) -> Result<(), Self::Error>;
}

/// EEPROMs need a settle period after every write frame while the internal
/// write cycle runs; the device does not acknowledge during that window.
pub trait Delay {
    fn delay_ms(&mut self, ms: u32);
}

impl<T: Bus> Bus for &mut T {
    type Error = T::Error;

    fn write(&mut self, device_address: u8, frame: &[u8]) -> Result<(), Self::Error> {
        (*self).write(device_address, frame)
    }

    fn write_read(
        &mut self,
        device_address: u8,
        frame: &[u8],
        buf: &mut [u8],
    ) -> Result<(), Self::Error> {
        (*self).write_read(device_address, frame, buf)
    }
}

impl<T: Delay> Delay for &mut T {
    fn delay_ms(&mut self, ms: u32) {
        (*self).delay_ms(ms)
    }
}

#[inline(always)]
pub(crate) const fn align_ceil(address: u32, page_size: u32) -> u32 {
    let offset = address % page_size;
    if offset == 0 {
        address
    } else {
        address - offset + page_size
    }
}

#[inline(always)]
pub(crate) const fn align_floor(address: u32, page_size: u32) -> u32 {
    address - address % page_size
}
