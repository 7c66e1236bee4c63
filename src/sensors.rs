use defmt::*;
use embassy_embedded_hal::shared_bus::blocking::i2c::I2cDevice;
use embassy_stm32::i2c::I2c;
use embassy_stm32::mode::Async;
use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embassy_sync::pubsub::WaitResult;
use embassy_time::{Duration, Timer};
use embedded_hal::i2c::ErrorType;
use ms5611_baro::registers::RESET_TIME_US;
use ms5611_baro::{Channel, EmbassyClock, Error, Ms5611, Oversampling};

use crate::BARO_PUBSUB;

// millisecond wait between samples
const WAIT_TIME: u64 = 50;

// millisecond wait before retrying a sensor that did not come up
const RETRY_TIME: u64 = 500;

type BaroBus = I2cDevice<'static, NoopRawMutex, I2c<'static, Async>>;
type BaroError = Error<<BaroBus as ErrorType>::Error>;

/// One compensated reading together with the raw values it came from.
#[derive(Debug, Default, Clone)]
pub struct BaroPacket {
    /// 0.01 °C
    pub temperature: i32,
    /// 0.01 mbar
    pub pressure: i32,
    pub d1: u32,
    pub d2: u32,
}

#[embassy_executor::task]
pub async fn baro_task(i2c: BaroBus, oversampling: Oversampling) {
    let mut baro = Ms5611::new(i2c, EmbassyClock);
    setup_ms5611(&mut baro).await;

    loop {
        match sample_ms5611(&mut baro, oversampling).await {
            // drops the oldest packet if a subscriber lags
            Ok(packet) => BARO_PUBSUB.publish_immediate(packet),
            Err(e) => error!("Failed to sample MS5611: {}", Debug2Format(&e)),
        }

        Timer::after(Duration::from_millis(WAIT_TIME)).await;
    }
}

async fn setup_ms5611(baro: &mut Ms5611<BaroBus, EmbassyClock>) {
    loop {
        info!("Resetting MS5611 at 0x{:02X}", baro.address());
        match baro.reset() {
            Ok(()) => Timer::after_micros(RESET_TIME_US as u64).await,
            Err(e) => {
                error!("MS5611 reset failed: {}", Debug2Format(&e));
                Timer::after_millis(RETRY_TIME).await;
                continue;
            }
        }

        match baro.read_calibration() {
            Ok(calibration) => {
                info!("PROM calibration data: {}", calibration);
                return;
            }
            Err(e) => error!("Failed to get PROM data: {}", Debug2Format(&e)),
        }
        Timer::after_millis(RETRY_TIME).await;
    }
}

async fn sample_ms5611(
    baro: &mut Ms5611<BaroBus, EmbassyClock>,
    oversampling: Oversampling,
) -> Result<BaroPacket, BaroError> {
    let d2 = convert(baro, Channel::Temperature, oversampling).await?;
    let d1 = convert(baro, Channel::Pressure, oversampling).await?;
    let reading = baro.compensate(true)?;

    Ok(BaroPacket {
        temperature: reading.temperature,
        pressure: reading.pressure,
        d1,
        d2,
    })
}

// Start a conversion and yield to other tasks until it is done
async fn convert(
    baro: &mut Ms5611<BaroBus, EmbassyClock>,
    channel: Channel,
    oversampling: Oversampling,
) -> Result<u32, BaroError> {
    baro.start_conversion(channel, oversampling)?;
    loop {
        match baro.read_conversion(channel) {
            Err(Error::NotReady { remaining_us }) => Timer::after_micros(remaining_us as u64).await,
            result => return result,
        }
    }
}

#[embassy_executor::task]
pub async fn baro_log_task() {
    let Ok(mut subscriber) = BARO_PUBSUB.subscriber() else {
        error!("No free subscriber slot for the baro log");
        return;
    };

    loop {
        match subscriber.next_message().await {
            WaitResult::Message(packet) => info!(
                "MS5611: TEMP = {} (0.01 C), P = {} (0.01 mbar), D1 = {}, D2 = {}",
                packet.temperature, packet.pressure, packet.d1, packet.d2
            ),
            WaitResult::Lagged(n) => warn!("Baro log lagged by {} packets", n),
        }
    }
}
