//! Driver for the MS5611-01BA barometric pressure sensor over I2C.
//!
//! The sensor reports two raw 24-bit values, D1 (pressure) and D2
//! (temperature). They are turned into temperature in 0.01 °C and pressure in
//! 0.01 mbar with the six factory coefficients C1..C6 stored in its PROM,
//! using the datasheet's integer arithmetic, with optional second-order
//! correction below 20 °C.
//!
//! The compensation is available on its own:
//!
//! ```
//! use ms5611_baro::Calibration;
//!
//! let cal = Calibration::new(40127, 36924, 23317, 23282, 33464, 28312);
//! let result = cal.compensate(9_085_466, 8_569_150, true);
//! assert_eq!(result.temperature, 2007); // 20.07 °C
//! assert_eq!(result.pressure, 100_009); // 1000.09 mbar
//! ```
//!
//! and through [`Ms5611`], which drives the bus:
//!
//! ```no_run
//! use embedded_hal::{delay::DelayNs, i2c::I2c};
//! use ms5611_baro::{Channel, Clock, Error, Ms5611, Oversampling};
//!
//! fn read<I: I2c, C: Clock, D: DelayNs>(
//!     i2c: I,
//!     clock: C,
//!     delay: &mut D,
//! ) -> Result<(i32, i32), Error<I::Error>> {
//!     let mut baro = Ms5611::new(i2c, clock);
//!     baro.init(delay)?;
//!
//!     // blocking
//!     let reading = baro.measure(delay, Oversampling::Osr4096, true)?;
//!
//!     // or poll
//!     baro.start_conversion(Channel::Temperature, Oversampling::Osr1024)?;
//!     let d2 = loop {
//!         match baro.read_conversion(Channel::Temperature) {
//!             Err(Error::NotReady { remaining_us }) => delay.delay_us(remaining_us),
//!             other => break other?,
//!         }
//!     };
//!     let _ = d2;
//!
//!     Ok((reading.temperature, reading.pressure))
//! }
//! ```
//!
//! # Features
//!
//! - `defmt`: `defmt::Format` on public types and driver logging.
//! - `embassy-time`: [`EmbassyClock`].
//! - `serde`: `Serialize`/`Deserialize` on the data types.
//! - `firmware`: the `baro-logger` binary for the STM32U545 board.
#![no_std]
#![deny(unsafe_code)]

#[cfg(test)]
#[macro_use]
extern crate std;

// This mod MUST go first, so that the others see its macros.
mod fmt;

mod calibration;
mod clock;
mod compensation;
mod conversion;
mod driver;
mod error;
pub mod registers;

pub use calibration::{Calibration, crc4, stored_crc4};
#[cfg(feature = "embassy-time")]
pub use clock::EmbassyClock;
pub use clock::Clock;
pub use compensation::{Compensation, LOW_TEMPERATURE_THRESHOLD, SECOND_ORDER_THRESHOLD, SecondOrder};
pub use conversion::ConversionState;
pub use driver::Ms5611;
pub use error::Error;
pub use registers::{ALTERNATE_ADDRESS, Channel, DEFAULT_ADDRESS, Oversampling};
