use crate::registers::PROM_WORDS;

/// Factory calibration coefficients C1..C6 from the sensor PROM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Calibration {
    /// Pressure sensitivity, SENS_T1.
    pub c1: u16,
    /// Pressure offset, OFF_T1.
    pub c2: u16,
    /// Temperature coefficient of pressure sensitivity, TCS.
    pub c3: u16,
    /// Temperature coefficient of pressure offset, TCO.
    pub c4: u16,
    /// Reference temperature, T_REF.
    pub c5: u16,
    /// Temperature coefficient of the temperature, TEMPSENS.
    pub c6: u16,
}

impl Calibration {
    pub const fn new(c1: u16, c2: u16, c3: u16, c4: u16, c5: u16, c6: u16) -> Self {
        Self { c1, c2, c3, c4, c5, c6 }
    }

    /// Takes C1..C6 from words 1..=6 of a PROM image. The CRC is not checked
    /// here, see [`Calibration::from_prom_checked`].
    pub fn from_prom(prom: &[u16; PROM_WORDS]) -> Self {
        Self::new(prom[1], prom[2], prom[3], prom[4], prom[5], prom[6])
    }

    /// Like [`Calibration::from_prom`] but rejects images whose CRC-4 does not
    /// match. On mismatch returns `(stored, computed)`.
    pub fn from_prom_checked(prom: &[u16; PROM_WORDS]) -> Result<Self, (u8, u8)> {
        let stored = stored_crc4(prom);
        let computed = crc4(prom);
        if stored != computed {
            return Err((stored, computed));
        }
        Ok(Self::from_prom(prom))
    }
}

impl Default for Calibration {
    /// Typical values from the datasheet's worked example.
    fn default() -> Self {
        Self::new(40127, 36924, 23317, 23282, 33464, 28312)
    }
}

/// CRC-4 stored in the low nibble of the last PROM word.
pub fn stored_crc4(prom: &[u16; PROM_WORDS]) -> u8 {
    (prom[PROM_WORDS - 1] & 0x000F) as u8
}

/// CRC-4 over the PROM image as described in application note AN520.
pub fn crc4(prom: &[u16; PROM_WORDS]) -> u8 {
    let mut n_rem: u16 = 0x00;

    let mut prom_bytes = [0u8; 2 * PROM_WORDS];
    for (i, word) in prom.iter().enumerate() {
        prom_bytes[2 * i..2 * i + 2].copy_from_slice(&word.to_be_bytes());
    }

    // CRC byte must be replaced with zero during calculation
    prom_bytes[2 * PROM_WORDS - 1] = 0;

    for byte in prom_bytes {
        n_rem ^= byte as u16;
        for _ in 0..8 {
            if (n_rem & 0x8000) != 0 {
                n_rem = (n_rem << 1) ^ 0x3000;
            } else {
                n_rem <<= 1;
            }
        }
    }

    ((n_rem >> 12) & 0xF) as u8 // final 4-bit CRC
}
