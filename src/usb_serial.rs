use defmt::*;
use embassy_futures::join::join;
use embassy_stm32::usb::{DmPin, DpPin, Driver, Instance};
use embassy_stm32::{bind_interrupts, peripherals, usb, Peri};
use embassy_stm32::peripherals::USB;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::pubsub::{PubSubChannel, WaitResult};
use embassy_usb::class::cdc_acm::{CdcAcmClass, State};
use embassy_usb::Builder;
use embassy_usb::driver::EndpointError;
use core::fmt::Write;
use heapless::String;

use crate::sensors::BaroPacket;
use crate::{BARO_PUBLISHERS, BARO_SUBSCRIBERS};

bind_interrupts!(struct Irqs {
    USB => usb::InterruptHandler<peripherals::USB>;
});

async fn usb_print<'a, T: Instance>(
    class: &mut CdcAcmClass<'a, Driver<'a, T>>,
    args: core::fmt::Arguments<'_>,
) -> Result<(), EndpointError> {
    let mut buffer: String<128> = String::new();
    let _ = buffer.write_fmt(args);

    for chunk in buffer.as_bytes().chunks(64) {
        class.write_packet(chunk).await?;
    }
    // full last packet needs a ZLP
    if buffer.len() % 64 == 0 {
        class.write_packet(&[]).await?;
    }
    Ok(())
}

macro_rules! usb_write {
    ($usb:expr, $($arg:tt)*) => {
        usb_print($usb, format_args!($($arg)*)).await
    };
}

/// Streams barometer packets as CSV lines over a CDC-ACM serial port.
pub async fn setup_usb<'d>(
    usb: Peri<'d, USB>,
    dp: Peri<'d, impl DpPin<USB>>,
    dm: Peri<'d, impl DmPin<USB>>,
    pub_sub_channel: &PubSubChannel<CriticalSectionRawMutex, BaroPacket, 8, BARO_SUBSCRIBERS, BARO_PUBLISHERS>,
) {
    let driver = Driver::new(usb, Irqs, dp, dm);

    let mut config = embassy_usb::Config::new(0xc0de, 0xcafe);
    config.manufacturer = Some("Embassy");
    config.product = Some("MS5611 baro logger");
    config.serial_number = Some("12345678");

    let mut config_descriptor = [0; 256];
    let mut bos_descriptor = [0; 256];
    let mut control_buf = [0; 64];

    let mut state = State::new();

    let mut builder = Builder::new(
        driver,
        config,
        &mut config_descriptor,
        &mut bos_descriptor,
        &mut [], // no msos descriptors
        &mut control_buf,
    );

    let mut class = CdcAcmClass::new(&mut builder, &mut state, 64);
    let mut usb = builder.build();
    let usb_fut = usb.run();

    let Ok(mut usb_subscriber) = pub_sub_channel.subscriber() else {
        error!("No free subscriber slot for USB");
        return;
    };

    let stream_fut = async {
        loop {
            class.wait_connection().await;
            info!("USB Connected");
            if let Err(e) = usb_write!(&mut class, "temp_centi_c,pressure_centi_mbar,d1,d2\r\n") {
                warn!("USB write error: {:?}", e);
                continue;
            }

            loop {
                let written = match usb_subscriber.next_message().await {
                    WaitResult::Message(packet) => usb_write!(&mut class, "{},{},{},{}\r\n",
                        packet.temperature, packet.pressure, packet.d1, packet.d2),
                    WaitResult::Lagged(e) => {
                        info!("USB Lagged {:?}", e);
                        Ok(())
                    }
                };
                // host went away, wait for the next connection
                if let Err(e) = written {
                    warn!("USB write error: {:?}", e);
                    break;
                }
            }
        }
    };

    join(usb_fut, stream_fut).await;
}
