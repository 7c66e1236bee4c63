//! Bus address and command set of the MS5611-01BA.

/// Address with CSB tied high.
pub const DEFAULT_ADDRESS: u8 = 0x76;
/// Address with CSB tied low.
pub const ALTERNATE_ADDRESS: u8 = 0x77;

// commands
pub const RESET_CMD: u8 = 0x1E;
pub const ADC_READ_CMD: u8 = 0x00;
pub const PROM_READ_CMD: u8 = 0xA0;
pub const CONVERT_PRESSURE_CMD: u8 = 0x40;
pub const CONVERT_TEMP_CMD: u8 = 0x50;

/// Number of 16-bit words in the PROM, 0xA0..=0xAE.
pub const PROM_WORDS: usize = 8;

/// Time the sensor needs to reload its PROM after a reset, in microseconds.
pub const RESET_TIME_US: u32 = 2800;

/// ADC input selected by a conversion command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Channel {
    /// D1, digital pressure.
    Pressure,
    /// D2, digital temperature.
    Temperature,
}

/// Oversampling ratio of a conversion. Higher ratios are slower and less noisy.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Oversampling {
    Osr256,
    Osr512,
    Osr1024,
    Osr2048,
    #[default]
    Osr4096,
}

impl Oversampling {
    /// Maps a ratio such as `1024` to its setting. Anything unrecognized falls
    /// back to 4096, the slowest and most precise setting.
    pub fn from_ratio(ratio: u16) -> Self {
        match ratio {
            256 => Oversampling::Osr256,
            512 => Oversampling::Osr512,
            1024 => Oversampling::Osr1024,
            2048 => Oversampling::Osr2048,
            _ => Oversampling::Osr4096,
        }
    }

    pub fn ratio(self) -> u16 {
        match self {
            Oversampling::Osr256 => 256,
            Oversampling::Osr512 => 512,
            Oversampling::Osr1024 => 1024,
            Oversampling::Osr2048 => 2048,
            Oversampling::Osr4096 => 4096,
        }
    }

    /// Time before a conversion result may be read, in microseconds. The
    /// datasheet maximum for each ratio, with a 10 ms window at 4096.
    pub fn conversion_time_us(self) -> u32 {
        match self {
            Oversampling::Osr256 => 600,
            Oversampling::Osr512 => 1170,
            Oversampling::Osr1024 => 2280,
            Oversampling::Osr2048 => 4540,
            Oversampling::Osr4096 => 10_000,
        }
    }

    // offset added to the convert command base
    fn command_offset(self) -> u8 {
        match self {
            Oversampling::Osr256 => 0x00,
            Oversampling::Osr512 => 0x02,
            Oversampling::Osr1024 => 0x04,
            Oversampling::Osr2048 => 0x06,
            Oversampling::Osr4096 => 0x08,
        }
    }
}

/// A single command byte understood by the sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Reset,
    Convert(Channel, Oversampling),
    AdcRead,
    /// PROM word 0..=7.
    PromRead(u8),
}

impl From<Command> for u8 {
    fn from(cmd: Command) -> u8 {
        match cmd {
            Command::Reset => RESET_CMD,
            Command::Convert(Channel::Pressure, osr) => CONVERT_PRESSURE_CMD | osr.command_offset(),
            Command::Convert(Channel::Temperature, osr) => CONVERT_TEMP_CMD | osr.command_offset(),
            Command::AdcRead => ADC_READ_CMD,
            Command::PromRead(word) => PROM_READ_CMD + ((word & 0x07) << 1),
        }
    }
}
