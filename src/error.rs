use core::fmt;

use crate::registers::Channel;

/// Errors reported by the driver. `E` is the error type of the I2C bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<E> {
    /// The bus transfer failed. Not retried.
    Bus(E),
    /// The conversion on this channel has not finished yet; wait at least
    /// `remaining_us` and read again.
    NotReady { remaining_us: u32 },
    /// No conversion is running on the channel, either because none was
    /// started or because a later conversion or a reset superseded it.
    NotStarted(Channel),
    /// Compensation needs calibration data and raw readings that have not been
    /// loaded yet.
    Uninitialized,
    /// The PROM contents failed the CRC-4 check.
    CrcMismatch { stored: u8, computed: u8 },
}

impl<E: fmt::Debug> fmt::Display for Error<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Bus(e) => write!(f, "i2c bus error: {e:?}"),
            Error::NotReady { remaining_us } => {
                write!(f, "conversion not ready, {remaining_us} us remaining")
            }
            Error::NotStarted(channel) => write!(f, "no {channel:?} conversion in flight"),
            Error::Uninitialized => f.write_str("calibration or raw readings missing"),
            Error::CrcMismatch { stored, computed } => write!(
                f,
                "PROM CRC mismatch: stored {stored:#x}, computed {computed:#x}"
            ),
        }
    }
}

impl<E: fmt::Debug> core::error::Error for Error<E> {}
