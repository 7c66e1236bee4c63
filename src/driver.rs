use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::{ErrorType, I2c};

use crate::calibration::{Calibration, crc4, stored_crc4};
use crate::clock::Clock;
use crate::compensation::Compensation;
use crate::conversion::ConversionState;
use crate::error::Error;
use crate::registers::{Channel, Command, DEFAULT_ADDRESS, Oversampling, PROM_WORDS, RESET_TIME_US};

/// MS5611 on an I2C bus.
///
/// Conversions are split in two steps so the caller decides how to wait:
/// [`start_conversion`](Self::start_conversion) returns right after the
/// command is sent, and [`read_conversion`](Self::read_conversion) refuses to
/// touch the ADC until the conversion time for the chosen oversampling has
/// passed on `clock`. [`measure`](Self::measure) does both with a blocking
/// delay.
pub struct Ms5611<I2C, CLK> {
    i2c: I2C,
    clock: CLK,
    address: u8,
    calibration: Option<Calibration>,
    pressure: ConversionState,
    temperature: ConversionState,
    d1: Option<u32>,
    d2: Option<u32>,
}

impl<I2C, CLK> Ms5611<I2C, CLK> {
    pub fn new(i2c: I2C, clock: CLK) -> Self {
        Self::with_address(i2c, clock, DEFAULT_ADDRESS)
    }

    pub fn with_address(i2c: I2C, clock: CLK, address: u8) -> Self {
        Self {
            i2c,
            clock,
            address,
            calibration: None,
            pressure: ConversionState::default(),
            temperature: ConversionState::default(),
            d1: None,
            d2: None,
        }
    }

    /// Gives back the bus and the clock.
    pub fn destroy(self) -> (I2C, CLK) {
        (self.i2c, self.clock)
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    pub fn calibration(&self) -> Option<&Calibration> {
        self.calibration.as_ref()
    }

    /// Uses the given coefficients instead of the ones in PROM.
    pub fn set_calibration(&mut self, calibration: Calibration) {
        self.calibration = Some(calibration);
    }

    /// Latest raw pressure reading, D1.
    pub fn raw_pressure(&self) -> Option<u32> {
        self.d1
    }

    /// Latest raw temperature reading, D2.
    pub fn raw_temperature(&self) -> Option<u32> {
        self.d2
    }

    pub fn conversion_state(&self, channel: Channel) -> &ConversionState {
        match channel {
            Channel::Pressure => &self.pressure,
            Channel::Temperature => &self.temperature,
        }
    }

    fn conversion_state_mut(&mut self, channel: Channel) -> &mut ConversionState {
        match channel {
            Channel::Pressure => &mut self.pressure,
            Channel::Temperature => &mut self.temperature,
        }
    }
}

impl<I2C, CLK> Ms5611<I2C, CLK>
where
    I2C: I2c,
    CLK: Clock,
{
    fn command(&mut self, command: Command) -> Result<(), Error<I2C::Error>> {
        let byte = u8::from(command);
        self.i2c.write(self.address, &[byte]).map_err(|e| {
            error!("Failed to send command {:#X}", byte);
            Error::Bus(e)
        })
    }

    /// Resets the sensor. Running conversions and stored readings are
    /// discarded, calibration is kept. The sensor needs
    /// [`RESET_TIME_US`] before it answers again.
    pub fn reset(&mut self) -> Result<(), Error<I2C::Error>> {
        self.command(Command::Reset)?;
        self.pressure.abandon();
        self.temperature.abandon();
        self.d1 = None;
        self.d2 = None;
        debug!("MS5611 reset");
        Ok(())
    }

    /// Resets the sensor, waits for the PROM reload and reads the calibration.
    pub fn init<D: DelayNs>(&mut self, delay: &mut D) -> Result<Calibration, Error<I2C::Error>> {
        self.reset()?;
        delay.delay_us(RESET_TIME_US);
        self.read_calibration()
    }

    /// Reads all eight PROM words.
    pub fn read_prom(&mut self) -> Result<[u16; PROM_WORDS], Error<I2C::Error>> {
        let mut prom = [0u16; PROM_WORDS];
        for (i, word) in prom.iter_mut().enumerate() {
            let cmd = u8::from(Command::PromRead(i as u8));
            let mut buf = [0u8; 2];
            self.i2c
                .write_read(self.address, &[cmd], &mut buf)
                .map_err(|e| {
                    error!("Failed to read PROM word {:#X}", cmd);
                    Error::Bus(e)
                })?;
            *word = u16::from_be_bytes(buf);
        }
        Ok(prom)
    }

    /// Reads C1..C6 from PROM, checks the CRC and keeps the result.
    pub fn read_calibration(&mut self) -> Result<Calibration, Error<I2C::Error>> {
        let prom = self.read_prom()?;
        match Calibration::from_prom_checked(&prom) {
            Ok(calibration) => {
                debug!("PROM calibration data: {:?}", calibration);
                self.calibration = Some(calibration);
                Ok(calibration)
            }
            Err((stored, computed)) => {
                warn!("PROM CRC mismatch: stored {:#X}, computed {:#X}", stored, computed);
                Err(Error::CrcMismatch { stored, computed })
            }
        }
    }

    /// Checks that a sensor answers at the address with a consistent PROM.
    pub fn probe(&mut self) -> Result<bool, Error<I2C::Error>> {
        let prom = self.read_prom()?;
        Ok(stored_crc4(&prom) == crc4(&prom))
    }

    /// Sends the convert command for `channel` and returns immediately.
    ///
    /// The sensor has a single ADC, so a conversion still running on the other
    /// channel is superseded and can no longer be read.
    pub fn start_conversion(
        &mut self,
        channel: Channel,
        oversampling: Oversampling,
    ) -> Result<(), Error<I2C::Error>> {
        self.command(Command::Convert(channel, oversampling))?;
        let now = self.clock.now_micros();

        let other = match channel {
            Channel::Pressure => Channel::Temperature,
            Channel::Temperature => Channel::Pressure,
        };
        if self.conversion_state(other).is_in_flight() {
            warn!("{:?} conversion superseded by {:?}", other, channel);
            self.conversion_state_mut(other).abandon();
        }

        self.conversion_state_mut(channel).begin(oversampling, now);
        trace!("{:?} conversion started, OSR {}", channel, oversampling.ratio());
        Ok(())
    }

    /// Reads the 24-bit result of the conversion running on `channel`.
    ///
    /// Fails with [`Error::NotReady`] without touching the bus while the
    /// conversion time has not elapsed. A failed bus read leaves the
    /// conversion in flight so it can be read again.
    pub fn read_conversion(&mut self, channel: Channel) -> Result<u32, Error<I2C::Error>> {
        let state = *self.conversion_state(channel);
        if !state.is_in_flight() {
            return Err(Error::NotStarted(channel));
        }

        let remaining_us = state.remaining_us(self.clock.now_micros());
        if remaining_us > 0 {
            return Err(Error::NotReady { remaining_us });
        }

        // ADC is 24bit but we are storing in u32.
        let mut buf = [0u8; 4];
        self.i2c
            .write_read(self.address, &[u8::from(Command::AdcRead)], &mut buf[1..])
            .map_err(|e| {
                error!("Failed to read {:?} ADC result", channel);
                Error::Bus(e)
            })?;
        let raw = u32::from_be_bytes(buf);

        self.conversion_state_mut(channel).abandon();
        match channel {
            Channel::Pressure => self.d1 = Some(raw),
            Channel::Temperature => self.d2 = Some(raw),
        }
        trace!("{:?} ADC result: {:#X}", channel, raw);
        Ok(raw)
    }

    /// Converts D2 then D1, blocking on `delay` for each, and compensates.
    pub fn measure<D: DelayNs>(
        &mut self,
        delay: &mut D,
        oversampling: Oversampling,
        second_order: bool,
    ) -> Result<Compensation, Error<I2C::Error>> {
        self.convert(delay, Channel::Temperature, oversampling)?;
        self.convert(delay, Channel::Pressure, oversampling)?;
        self.compensate(second_order)
    }

    fn convert<D: DelayNs>(
        &mut self,
        delay: &mut D,
        channel: Channel,
        oversampling: Oversampling,
    ) -> Result<u32, Error<I2C::Error>> {
        self.start_conversion(channel, oversampling)?;
        delay.delay_us(oversampling.conversion_time_us());
        loop {
            match self.read_conversion(channel) {
                // clock is coarser than the delay
                Err(Error::NotReady { remaining_us }) => delay.delay_us(remaining_us),
                result => return result,
            }
        }
    }
}

impl<I2C, CLK> Ms5611<I2C, CLK>
where
    I2C: ErrorType,
{
    fn temperature_inputs(&self) -> Result<(&Calibration, u32), Error<I2C::Error>> {
        match (self.calibration.as_ref(), self.d2) {
            (Some(calibration), Some(d2)) => Ok((calibration, d2)),
            _ => Err(Error::Uninitialized),
        }
    }

    fn all_inputs(&self) -> Result<(&Calibration, u32, u32), Error<I2C::Error>> {
        let (calibration, d2) = self.temperature_inputs()?;
        let d1 = self.d1.ok_or(Error::Uninitialized)?;
        Ok((calibration, d1, d2))
    }

    /// dT from the latest D2.
    pub fn delta_temp(&self) -> Result<i32, Error<I2C::Error>> {
        let (calibration, d2) = self.temperature_inputs()?;
        Ok(calibration.delta_temp(d2))
    }

    /// TEMP in 0.01 °C from the latest D2.
    pub fn temperature(&self, second_order: bool) -> Result<i32, Error<I2C::Error>> {
        let (calibration, d2) = self.temperature_inputs()?;
        Ok(calibration.temperature(d2, second_order))
    }

    /// OFF from the latest D2.
    pub fn offset(&self, second_order: bool) -> Result<i64, Error<I2C::Error>> {
        let (calibration, d2) = self.temperature_inputs()?;
        Ok(calibration.offset(d2, second_order))
    }

    /// SENS from the latest D2.
    pub fn sensitivity(&self, second_order: bool) -> Result<i64, Error<I2C::Error>> {
        let (calibration, d2) = self.temperature_inputs()?;
        Ok(calibration.sensitivity(d2, second_order))
    }

    /// P in 0.01 mbar from the latest D1 and D2.
    pub fn pressure(&self, second_order: bool) -> Result<i32, Error<I2C::Error>> {
        let (calibration, d1, d2) = self.all_inputs()?;
        Ok(calibration.pressure(d1, d2, second_order))
    }

    pub fn compensate(&self, second_order: bool) -> Result<Compensation, Error<I2C::Error>> {
        let (calibration, d1, d2) = self.all_inputs()?;
        Ok(calibration.compensate(d1, d2, second_order))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal::i2c::ErrorKind;
    use embedded_hal_mock::eh1::i2c::{Mock as I2cMock, Transaction as I2cTransaction};
    use std::cell::Cell;
    use std::rc::Rc;
    use std::vec::Vec;

    const ADDR: u8 = DEFAULT_ADDRESS;

    /// Shared simulated time; delays move the clock forward.
    #[derive(Clone, Default)]
    struct FakeTime(Rc<Cell<u64>>);

    impl FakeTime {
        fn advance(&self, us: u64) {
            self.0.set(self.0.get() + us);
        }
    }

    impl Clock for FakeTime {
        fn now_micros(&mut self) -> u64 {
            self.0.get()
        }
    }

    impl DelayNs for FakeTime {
        fn delay_ns(&mut self, ns: u32) {
            self.advance((ns as u64).div_ceil(1000));
        }
    }

    fn prom_transactions() -> Vec<I2cTransaction> {
        let prom: [u16; PROM_WORDS] = [0x1234, 0x9CBF, 0x903C, 0x5B15, 0x5AF2, 0x82B8, 0x6E98, 0x0006];
        prom.iter()
            .enumerate()
            .map(|(i, word)| {
                I2cTransaction::write_read(ADDR, vec![0xA0 + 2 * i as u8], word.to_be_bytes().to_vec())
            })
            .collect()
    }

    fn calibrated(expectations: &[I2cTransaction], time: &FakeTime) -> Ms5611<I2cMock, FakeTime> {
        let mut sensor = Ms5611::new(I2cMock::new(expectations), time.clone());
        sensor.set_calibration(Calibration::default());
        sensor
    }

    fn finish(sensor: Ms5611<I2cMock, FakeTime>) {
        let (mut i2c, _) = sensor.destroy();
        i2c.done();
    }

    #[test]
    fn init_resets_and_reads_calibration() {
        let mut expectations = vec![I2cTransaction::write(ADDR, vec![0x1E])];
        expectations.extend(prom_transactions());
        let time = FakeTime::default();
        let mut sensor = Ms5611::new(I2cMock::new(&expectations), time.clone());

        let calibration = sensor.init(&mut time.clone()).unwrap();
        assert_eq!(calibration, Calibration::default());
        assert_eq!(sensor.calibration(), Some(&Calibration::default()));
        assert!(time.0.get() >= RESET_TIME_US as u64);
        finish(sensor);
    }

    #[test]
    fn corrupt_prom_is_rejected() {
        let mut expectations = prom_transactions();
        expectations[6] = I2cTransaction::write_read(ADDR, vec![0xAC], vec![0x6E, 0x99]);
        let mut sensor = Ms5611::new(I2cMock::new(&expectations), FakeTime::default());

        assert_eq!(
            sensor.read_calibration(),
            Err(Error::CrcMismatch { stored: 0x6, computed: 0x9 })
        );
        assert_eq!(sensor.calibration(), None);
        finish(sensor);
    }

    #[test]
    fn connection_check_verifies_prom_crc() {
        let mut expectations = prom_transactions();
        expectations.extend(prom_transactions());
        expectations[15] = I2cTransaction::write_read(ADDR, vec![0xAE], vec![0x00, 0x07]);
        let mut sensor = Ms5611::new(I2cMock::new(&expectations), FakeTime::default());

        assert_eq!(sensor.probe(), Ok(true));
        assert_eq!(sensor.probe(), Ok(false));
        finish(sensor);
    }

    #[test]
    fn connection_check_reports_missing_device() {
        let expectations = [I2cTransaction::write_read(ADDR, vec![0xA0], vec![0, 0]).with_error(ErrorKind::Other)];
        let mut sensor = Ms5611::new(I2cMock::new(&expectations), FakeTime::default());

        assert_eq!(sensor.probe(), Err(Error::Bus(ErrorKind::Other)));
        finish(sensor);
    }

    #[test]
    fn read_within_10ms_of_a_4096_start_is_not_ready() {
        let expectations = [
            I2cTransaction::write(ADDR, vec![0x58]),
            I2cTransaction::write_read(ADDR, vec![0x00], vec![0x82, 0xC1, 0x3E]),
        ];
        let time = FakeTime::default();
        let mut sensor = calibrated(&expectations, &time);

        sensor
            .start_conversion(Channel::Temperature, Oversampling::Osr4096)
            .unwrap();
        assert_eq!(
            sensor.read_conversion(Channel::Temperature),
            Err(Error::NotReady { remaining_us: 10_000 })
        );

        time.advance(9_500);
        assert_eq!(
            sensor.read_conversion(Channel::Temperature),
            Err(Error::NotReady { remaining_us: 500 })
        );

        time.advance(499);
        assert_eq!(
            sensor.read_conversion(Channel::Temperature),
            Err(Error::NotReady { remaining_us: 1 })
        );

        time.advance(1);
        assert_eq!(sensor.read_conversion(Channel::Temperature), Ok(8_569_150));
        assert_eq!(sensor.raw_temperature(), Some(8_569_150));
        assert!(!sensor.conversion_state(Channel::Temperature).is_in_flight());

        // result was consumed
        assert_eq!(
            sensor.read_conversion(Channel::Temperature),
            Err(Error::NotStarted(Channel::Temperature))
        );
        finish(sensor);
    }

    #[test]
    fn unknown_ratio_uses_slowest_conversion() {
        let expectations = [I2cTransaction::write(ADDR, vec![0x48])];
        let time = FakeTime::default();
        let mut sensor = calibrated(&expectations, &time);

        sensor
            .start_conversion(Channel::Pressure, Oversampling::from_ratio(3000))
            .unwrap();
        time.advance(5000);
        assert_eq!(
            sensor.read_conversion(Channel::Pressure),
            Err(Error::NotReady { remaining_us: 5000 })
        );
        finish(sensor);
    }

    #[test]
    fn read_without_start_does_not_touch_the_bus() {
        let mut sensor = calibrated(&[], &FakeTime::default());
        assert_eq!(
            sensor.read_conversion(Channel::Pressure),
            Err(Error::NotStarted(Channel::Pressure))
        );
        finish(sensor);
    }

    #[test]
    fn new_conversion_supersedes_the_other_channel() {
        let expectations = [
            I2cTransaction::write(ADDR, vec![0x50]),
            I2cTransaction::write(ADDR, vec![0x40]),
            I2cTransaction::write_read(ADDR, vec![0x00], vec![0x8A, 0xA2, 0x1A]),
        ];
        let time = FakeTime::default();
        let mut sensor = calibrated(&expectations, &time);

        sensor
            .start_conversion(Channel::Temperature, Oversampling::Osr256)
            .unwrap();
        sensor
            .start_conversion(Channel::Pressure, Oversampling::Osr256)
            .unwrap();
        time.advance(600);

        assert_eq!(
            sensor.read_conversion(Channel::Temperature),
            Err(Error::NotStarted(Channel::Temperature))
        );
        assert_eq!(sensor.read_conversion(Channel::Pressure), Ok(9_085_466));
        finish(sensor);
    }

    #[test]
    fn failed_start_leaves_channel_idle() {
        let expectations = [I2cTransaction::write(ADDR, vec![0x48]).with_error(ErrorKind::Other)];
        let time = FakeTime::default();
        let mut sensor = calibrated(&expectations, &time);

        assert_eq!(
            sensor.start_conversion(Channel::Pressure, Oversampling::Osr4096),
            Err(Error::Bus(ErrorKind::Other))
        );
        assert!(!sensor.conversion_state(Channel::Pressure).is_in_flight());
        finish(sensor);
    }

    #[test]
    fn failed_adc_read_can_be_retried() {
        let expectations = [
            I2cTransaction::write(ADDR, vec![0x40]),
            I2cTransaction::write_read(ADDR, vec![0x00], vec![0, 0, 0]).with_error(ErrorKind::Other),
            I2cTransaction::write_read(ADDR, vec![0x00], vec![0x8A, 0xA2, 0x1A]),
        ];
        let time = FakeTime::default();
        let mut sensor = calibrated(&expectations, &time);

        sensor
            .start_conversion(Channel::Pressure, Oversampling::Osr256)
            .unwrap();
        time.advance(600);
        assert_eq!(
            sensor.read_conversion(Channel::Pressure),
            Err(Error::Bus(ErrorKind::Other))
        );
        assert_eq!(sensor.raw_pressure(), None);
        assert_eq!(sensor.read_conversion(Channel::Pressure), Ok(9_085_466));
        finish(sensor);
    }

    #[test]
    fn compensation_requires_calibration_and_readings() {
        let expectations = [
            I2cTransaction::write(ADDR, vec![0x50]),
            I2cTransaction::write_read(ADDR, vec![0x00], vec![0x82, 0xC1, 0x3E]),
        ];
        let time = FakeTime::default();
        let mut sensor = Ms5611::new(I2cMock::new(&expectations), time.clone());
        assert_eq!(sensor.delta_temp(), Err(Error::Uninitialized));

        sensor.set_calibration(Calibration::default());
        assert_eq!(sensor.delta_temp(), Err(Error::Uninitialized));
        assert_eq!(sensor.offset(false), Err(Error::Uninitialized));
        assert_eq!(sensor.sensitivity(false), Err(Error::Uninitialized));

        sensor
            .start_conversion(Channel::Temperature, Oversampling::Osr256)
            .unwrap();
        time.advance(600);
        sensor.read_conversion(Channel::Temperature).unwrap();

        // D2 alone covers the temperature side
        assert_eq!(sensor.delta_temp(), Ok(2366));
        assert_eq!(sensor.temperature(true), Ok(2007));
        assert_eq!(sensor.offset(true), Ok(2_420_281_617));
        assert_eq!(sensor.sensitivity(true), Ok(1_315_097_036));
        assert_eq!(sensor.pressure(true), Err(Error::Uninitialized));
        assert_eq!(sensor.compensate(true), Err(Error::Uninitialized));
        finish(sensor);
    }

    #[test]
    fn measure_reproduces_datasheet_example() {
        let expectations = [
            I2cTransaction::write(ADDR, vec![0x58]),
            I2cTransaction::write_read(ADDR, vec![0x00], vec![0x82, 0xC1, 0x3E]),
            I2cTransaction::write(ADDR, vec![0x48]),
            I2cTransaction::write_read(ADDR, vec![0x00], vec![0x8A, 0xA2, 0x1A]),
        ];
        let time = FakeTime::default();
        let mut sensor = calibrated(&expectations, &time);

        let result = sensor
            .measure(&mut time.clone(), Oversampling::Osr4096, true)
            .unwrap();
        assert_eq!(result.temperature, 2007);
        assert_eq!(result.pressure, 100_009);
        assert_eq!(time.0.get(), 2 * 10_000);

        // unchanged inputs, unchanged results
        assert_eq!(sensor.compensate(true), Ok(result));
        assert_eq!(sensor.pressure(true), Ok(100_009));
        finish(sensor);
    }

    #[test]
    fn reset_discards_readings_and_conversions() {
        let expectations = [
            I2cTransaction::write(ADDR, vec![0x50]),
            I2cTransaction::write_read(ADDR, vec![0x00], vec![0x82, 0xC1, 0x3E]),
            I2cTransaction::write(ADDR, vec![0x40]),
            I2cTransaction::write(ADDR, vec![0x1E]),
        ];
        let time = FakeTime::default();
        let mut sensor = calibrated(&expectations, &time);

        sensor
            .start_conversion(Channel::Temperature, Oversampling::Osr256)
            .unwrap();
        time.advance(600);
        sensor.read_conversion(Channel::Temperature).unwrap();
        sensor
            .start_conversion(Channel::Pressure, Oversampling::Osr256)
            .unwrap();

        sensor.reset().unwrap();
        assert_eq!(sensor.raw_temperature(), None);
        assert_eq!(sensor.temperature(false), Err(Error::Uninitialized));
        assert!(!sensor.conversion_state(Channel::Pressure).is_in_flight());
        assert_eq!(sensor.calibration(), Some(&Calibration::default()));
        finish(sensor);
    }

    #[test]
    fn alternate_address_is_used_on_the_bus() {
        let expectations = [I2cTransaction::write(0x77, vec![0x1E])];
        let mut sensor = Ms5611::with_address(I2cMock::new(&expectations), FakeTime::default(), 0x77);
        assert_eq!(sensor.address(), 0x77);
        sensor.reset().unwrap();
        finish(sensor);
    }
}
