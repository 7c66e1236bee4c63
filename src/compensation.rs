//! Fixed-point compensation from the MS5611 datasheet.
//!
//! Every division truncates toward zero, which is what the datasheet's
//! reference arithmetic does. Shifts would floor negative values instead and
//! give different results whenever dT < 0.

use crate::calibration::Calibration;

/// First-order TEMP below which the second-order correction applies (20.00 °C).
pub const SECOND_ORDER_THRESHOLD: i32 = 2000;
/// First-order TEMP below which the extra low temperature terms apply (-15.00 °C).
pub const LOW_TEMPERATURE_THRESHOLD: i32 = -1500;

/// D1 and D2 are 24-bit ADC results; higher bits are ignored.
pub const ADC_MASK: u32 = 0x00FF_FFFF;

/// Second-order correction terms. All zero at or above 20.00 °C.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SecondOrder {
    pub t2: i32,
    pub off2: i64,
    pub sens2: i64,
}

impl SecondOrder {
    /// Correction for a given dT and the first-order TEMP derived from it.
    pub fn new(dt: i32, temp: i32) -> Self {
        if temp >= SECOND_ORDER_THRESHOLD {
            return Self::default();
        }

        let dt = dt as i64;
        let t2 = dt * dt / 2_147_483_648;

        let below = (temp - SECOND_ORDER_THRESHOLD) as i64;
        let mut off2 = 5 * below * below / 2;
        let mut sens2 = 5 * below * below / 4;

        if temp < LOW_TEMPERATURE_THRESHOLD {
            let very_low = (temp - LOW_TEMPERATURE_THRESHOLD) as i64;
            off2 += 7 * very_low * very_low;
            sens2 += 11 * very_low * very_low / 2;
        }

        Self { t2: t2 as i32, off2, sens2 }
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::default()
    }
}

/// Every quantity derived from one (C1..C6, D1, D2) triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Compensation {
    /// Difference between actual and reference temperature.
    pub dt: i32,
    /// Temperature in hundredths of a degree Celsius.
    pub temperature: i32,
    /// Offset at actual temperature.
    pub offset: i64,
    /// Sensitivity at actual temperature.
    pub sensitivity: i64,
    /// Pressure in hundredths of a millibar.
    pub pressure: i32,
    /// Correction already subtracted from `temperature`, `offset` and
    /// `sensitivity`. Zero when compensation ran first-order only.
    pub second_order: SecondOrder,
}

impl Calibration {
    /// `dT = D2 - C5 * 2^8`
    pub fn delta_temp(&self, d2: u32) -> i32 {
        ((d2 & ADC_MASK) as i64 - self.c5 as i64 * 256) as i32
    }

    // TEMP before any second-order correction
    fn first_order_temperature(&self, dt: i32) -> i32 {
        (2000 + dt as i64 * self.c6 as i64 / 8_388_608) as i32
    }

    fn correction(&self, dt: i32, second_order: bool) -> SecondOrder {
        if second_order {
            SecondOrder::new(dt, self.first_order_temperature(dt))
        } else {
            SecondOrder::default()
        }
    }

    fn first_order_offset(&self, dt: i32) -> i64 {
        self.c2 as i64 * 65536 + self.c4 as i64 * dt as i64 / 128
    }

    fn first_order_sensitivity(&self, dt: i32) -> i64 {
        self.c1 as i64 * 32768 + self.c3 as i64 * dt as i64 / 256
    }

    /// `TEMP = 2000 + dT * C6 / 2^23`, minus T2 with second order.
    pub fn temperature(&self, d2: u32, second_order: bool) -> i32 {
        let dt = self.delta_temp(d2);
        self.first_order_temperature(dt) - self.correction(dt, second_order).t2
    }

    /// `OFF = C2 * 2^16 + C4 * dT / 2^7`, minus OFF2 with second order.
    pub fn offset(&self, d2: u32, second_order: bool) -> i64 {
        let dt = self.delta_temp(d2);
        self.first_order_offset(dt) - self.correction(dt, second_order).off2
    }

    /// `SENS = C1 * 2^15 + C3 * dT / 2^8`, minus SENS2 with second order.
    pub fn sensitivity(&self, d2: u32, second_order: bool) -> i64 {
        let dt = self.delta_temp(d2);
        self.first_order_sensitivity(dt) - self.correction(dt, second_order).sens2
    }

    /// `P = (D1 * SENS / 2^21 - OFF) / 2^15`
    pub fn pressure(&self, d1: u32, d2: u32, second_order: bool) -> i32 {
        self.compensate(d1, d2, second_order).pressure
    }

    /// Runs the whole chain dT -> TEMP -> {OFF, SENS} -> P.
    pub fn compensate(&self, d1: u32, d2: u32, second_order: bool) -> Compensation {
        let dt = self.delta_temp(d2);
        let correction = self.correction(dt, second_order);

        let temperature = self.first_order_temperature(dt) - correction.t2;
        let offset = self.first_order_offset(dt) - correction.off2;
        let sensitivity = self.first_order_sensitivity(dt) - correction.sens2;
        let pressure = (((d1 & ADC_MASK) as i64 * sensitivity / 2_097_152 - offset) / 32768) as i32;

        Compensation {
            dt,
            temperature,
            offset,
            sensitivity,
            pressure,
            second_order: correction,
        }
    }
}
