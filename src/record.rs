//! The `Load<R>` and `Store<R>` traits provide a single generic, overloaded
//! pair of functions `load<R>()` / `store<R>()` for fixed-width records over
//! the sequential file cursor.
//!
//! Every record is encoded little-endian with an explicit width, so the
//! on-device bytes are independent of the host's type layout and stay
//! readable across controller families.

use crate::FlashFs;
use crate::error::Error;
use crate::platform::Platform;

pub trait Load<R> {
    fn load(&mut self) -> Result<R, Error>;
}

pub trait Store<R> {
    fn store(&mut self, value: R) -> Result<(), Error>;
}

impl<R, L: Load<R>> Load<R> for &mut L {
    fn load(&mut self) -> Result<R, Error> {
        (*self).load()
    }
}

impl<R, S: Store<R>> Store<R> for &mut S {
    fn store(&mut self, value: R) -> Result<(), Error> {
        (*self).store(value)
    }
}

macro_rules! int_record {
    ($($t:ty),*) => {
        $(
            impl<P: Platform> Load<$t> for FlashFs<P> {
                fn load(&mut self) -> Result<$t, Error> {
                    let mut buf = [0u8; size_of::<$t>()];
                    self.read(&mut buf)?;
                    Ok(<$t>::from_le_bytes(buf))
                }
            }

            impl<P: Platform> Store<$t> for FlashFs<P> {
                fn store(&mut self, value: $t) -> Result<(), Error> {
                    self.write(&value.to_le_bytes())?;
                    Ok(())
                }
            }
        )*
    };
}

int_record!(u8, u16, u32, u64, i8, i16, i32, i64);

impl<P: Platform> Load<bool> for FlashFs<P> {
    fn load(&mut self) -> Result<bool, Error> {
        let value: u8 = Load::load(self)?;
        Ok(value != 0)
    }
}

impl<P: Platform> Store<bool> for FlashFs<P> {
    fn store(&mut self, value: bool) -> Result<(), Error> {
        Store::store(self, value as u8)
    }
}
