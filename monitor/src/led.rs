use std::time::Duration;

use anyhow::Context;
use esp_idf_hal::{
    gpio::OutputPin,
    peripheral::Peripheral,
    rmt::{config::TransmitConfig, PinState, Pulse, RmtChannel, TxRmtDriver, VariableLengthSignal},
};
use log::warn;

use watering_common::{PixelStrip, Rgb};

const BITS_PER_PIXEL: usize = 24;

/// WS2812B strip clocked out over one RMT channel.
pub struct Ws2812Strip {
    tx: TxRmtDriver<'static>,
    pixels: Vec<Rgb>,
    zero: [Pulse; 2],
    one: [Pulse; 2],
}

impl Ws2812Strip {
    pub fn new<C, P>(
        channel: impl Peripheral<P = C> + 'static,
        pin: impl Peripheral<P = P> + 'static,
        len: usize,
    ) -> anyhow::Result<Self>
    where
        C: RmtChannel,
        P: OutputPin,
    {
        let config = TransmitConfig::new().clock_divider(1);
        let tx = TxRmtDriver::new(channel, pin, &config).context("failed to init RMT LED driver")?;

        let ticks_hz = tx.counter_clock()?;
        let pulse =
            |state, ns| Pulse::new_with_duration(ticks_hz, state, &Duration::from_nanos(ns));
        let zero = [pulse(PinState::High, 350)?, pulse(PinState::Low, 800)?];
        let one = [pulse(PinState::High, 700)?, pulse(PinState::Low, 600)?];

        Ok(Self {
            tx,
            pixels: vec![Rgb::OFF; len],
            zero,
            one,
        })
    }

    fn encode(&self) -> anyhow::Result<VariableLengthSignal> {
        let mut signal =
            VariableLengthSignal::with_capacity(self.pixels.len() * BITS_PER_PIXEL * 2);
        for pixel in &self.pixels {
            // WS2812 expects green first.
            let grb = (u32::from(pixel.g) << 16) | (u32::from(pixel.r) << 8) | u32::from(pixel.b);
            for bit in (0..BITS_PER_PIXEL).rev() {
                let symbol = if grb & (1 << bit) != 0 {
                    &self.one
                } else {
                    &self.zero
                };
                signal
                    .push(symbol.iter())
                    .context("failed to encode LED frame")?;
            }
        }
        Ok(signal)
    }
}

impl PixelStrip for Ws2812Strip {
    fn len(&self) -> usize {
        self.pixels.len()
    }

    fn set_pixel(&mut self, index: usize, color: Rgb) {
        if let Some(pixel) = self.pixels.get_mut(index) {
            *pixel = color;
        }
    }

    fn show(&mut self) {
        let result = self.encode().and_then(|signal| {
            self.tx
                .start_blocking(&signal)
                .context("failed to transmit LED frame")
        });
        if let Err(err) = result {
            warn!("failed to refresh LED strip: {err:#}");
        }
    }
}
