use crate::registers::Oversampling;

/// Bookkeeping for one ADC channel: whether a conversion is running and when
/// it was started.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ConversionState {
    in_flight: bool,
    started_at: u64,
    oversampling: Oversampling,
}

impl ConversionState {
    pub fn begin(&mut self, oversampling: Oversampling, now_us: u64) {
        self.in_flight = true;
        self.started_at = now_us;
        self.oversampling = oversampling;
    }

    /// Drops the conversion without reading it.
    pub fn abandon(&mut self) {
        self.in_flight = false;
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    pub fn oversampling(&self) -> Oversampling {
        self.oversampling
    }

    /// Microseconds left until the result may be read, zero once it is ready.
    /// A clock that went backwards counts as no time elapsed.
    pub fn remaining_us(&self, now_us: u64) -> u32 {
        let elapsed = now_us.saturating_sub(self.started_at);
        let needed = self.oversampling.conversion_time_us() as u64;
        needed.saturating_sub(elapsed) as u32
    }
}
