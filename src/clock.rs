/// Monotonic microsecond time source used to enforce conversion times.
pub trait Clock {
    fn now_micros(&mut self) -> u64;
}

impl<C: Clock + ?Sized> Clock for &mut C {
    fn now_micros(&mut self) -> u64 {
        (**self).now_micros()
    }
}

/// [`Clock`] backed by the embassy time driver.
#[cfg(feature = "embassy-time")]
#[derive(Debug, Default, Clone, Copy)]
pub struct EmbassyClock;

#[cfg(feature = "embassy-time")]
impl Clock for EmbassyClock {
    fn now_micros(&mut self) -> u64 {
        embassy_time::Instant::now().as_micros()
    }
}
