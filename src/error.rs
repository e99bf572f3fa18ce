use thiserror::Error;

/// Errors that can occur during storage operations. Marked as non-exhaustive to allow for
/// future additions without breaking the API. [`Error::code`] maps each variant to a
/// negative sentinel for callers that interoperate with firmware-style status values.
#[derive(Error, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[non_exhaustive]
pub enum Error {
    /// No directory entry matches the requested name.
    #[error("file not found")]
    FileNotFound,

    /// The operation requires an open file but none is open.
    #[error("file not opened")]
    FileNotOpened,

    /// The write would run past the end of the file. Files have a fixed size
    /// chosen at creation; the cursor is left unchanged.
    #[error("writing beyond end of file")]
    WritingBeyondEof,

    /// The read would run past the end of the file. The cursor is left unchanged.
    #[error("reading beyond end of file")]
    ReadingBeyondEof,

    /// A seek resolved to a negative position. The cursor is left unchanged.
    #[error("position is negative")]
    PositionNegative,

    /// A seek resolved to a position at or past the end of the file.
    /// The cursor is left unchanged.
    #[error("position beyond end of file")]
    PositionBeyondEof,

    /// The directory already holds the maximum number of entries.
    #[error("directory table full")]
    DirTableFull,

    /// No free gap is large enough to hold the requested file.
    #[error("not enough space")]
    NotEnoughSpace,

    /// No valid filesystem is mounted. Either `open_device` has not been called,
    /// or it found a foreign or corrupt directory image. `format` recovers.
    #[error("no filesystem mounted")]
    NotMounted,

    /// The page size must be non-zero.
    #[error("invalid page size")]
    InvalidPageSize,

    /// A transfer would reach past the end of the device.
    #[error("address out of bounds")]
    OutOfBounds,

    /// The bus implementation reported a fault. Short reads count as faults.
    #[error("bus fault")]
    Bus,
}

impl Error {
    /// The negative status code for this error, for firmware-style callers
    /// that expect an `i32` sentinel instead of a `Result`.
    pub const fn code(&self) -> i32 {
        match self {
            Error::FileNotFound => -1,
            Error::FileNotOpened => -2,
            Error::WritingBeyondEof => -3,
            Error::ReadingBeyondEof => -4,
            Error::PositionNegative => -5,
            Error::PositionBeyondEof => -6,
            Error::DirTableFull => -7,
            Error::NotEnoughSpace => -8,
            Error::NotMounted => -9,
            Error::InvalidPageSize => -10,
            Error::OutOfBounds => -11,
            Error::Bus => -12,
        }
    }
}
