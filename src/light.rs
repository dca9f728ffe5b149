//! Physical light output. The shared `current_color` is the source of truth;
//! a strip only mirrors what animations write.

use anyhow::Result;
#[cfg(test)]
use std::sync::Mutex;

use crate::spell::Rgb;

pub trait LightStrip: Send + Sync {
    fn fill(&self, color: Rgb) -> Result<()>;
}

/// Drops every color, for runs without LED hardware.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullStrip;

impl LightStrip for NullStrip {
    fn fill(&self, color: Rgb) -> Result<()> {
        tracing::trace!(?color, "fill");
        Ok(())
    }
}

/// SPI clock that yields the 800 kHz WS2812 bit rate at three SPI bits per data bit.
pub const WS2812_SPI_HZ: u32 = 2_400_000;

/// Zero bytes after the pixel data; at 2.4 MHz this holds the line low for
/// the >280us reset latch.
const WS2812_RESET_BYTES: usize = 90;

/// SPI payload that sets `count` WS2812 pixels to `color`.
///
/// Each data bit becomes `110` (one) or `100` (zero), MSB first, in the
/// strip's GRB byte order.
pub fn ws2812_frame(color: Rgb, count: usize) -> Vec<u8> {
    let mut pixel = [0u8; 9];
    for (chunk, byte) in pixel.chunks_exact_mut(3).zip([color.g, color.r, color.b]) {
        let mut bits: u32 = 0;
        for i in (0..8).rev() {
            bits = (bits << 3) | if byte & (1 << i) != 0 { 0b110 } else { 0b100 };
        }
        chunk.copy_from_slice(&bits.to_be_bytes()[1..]);
    }

    let mut frame = Vec::with_capacity(count * pixel.len() + WS2812_RESET_BYTES);
    for _ in 0..count {
        frame.extend_from_slice(&pixel);
    }
    frame.resize(frame.len() + WS2812_RESET_BYTES, 0);
    frame
}

#[cfg(feature = "gpio")]
pub use spi::SpiStrip;

#[cfg(feature = "gpio")]
mod spi {
    use anyhow::{bail, Context, Result};
    use rppal::spi::{Bus, Mode, SlaveSelect, Spi};
    use std::sync::Mutex;

    use super::{ws2812_frame, LightStrip, WS2812_SPI_HZ};
    use crate::spell::Rgb;

    /// WS2812 (NeoPixel) strip with its data line on the bus's MOSI pin.
    pub struct SpiStrip {
        spi: Mutex<Spi>,
        count: usize,
    }

    impl SpiStrip {
        pub fn new(bus: u8, count: usize) -> Result<Self> {
            let bus = match bus {
                0 => Bus::Spi0,
                1 => Bus::Spi1,
                2 => Bus::Spi2,
                3 => Bus::Spi3,
                4 => Bus::Spi4,
                5 => Bus::Spi5,
                6 => Bus::Spi6,
                other => bail!("no SPI bus {other}"),
            };
            let spi = Spi::new(bus, SlaveSelect::Ss0, WS2812_SPI_HZ, Mode::Mode0)
                .with_context(|| format!("failed to open SPI bus {bus:?}"))?;
            tracing::info!(?bus, count, "light strip opened");
            Ok(Self {
                spi: Mutex::new(spi),
                count,
            })
        }
    }

    impl LightStrip for SpiStrip {
        fn fill(&self, color: Rgb) -> Result<()> {
            let frame = ws2812_frame(color, self.count);
            let spi = self
                .spi
                .lock()
                .map_err(|_| anyhow::anyhow!("light strip lock poisoned"))?;
            let written = spi.write(&frame).context("SPI write failed")?;
            if written != frame.len() {
                bail!("short SPI write: {written} of {} bytes", frame.len());
            }
            Ok(())
        }
    }
}

/// Remembers every color written, in order.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct RecordingStrip {
    colors: Mutex<Vec<Rgb>>,
}

#[cfg(test)]
impl RecordingStrip {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn colors(&self) -> Vec<Rgb> {
        self.colors.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn last(&self) -> Option<Rgb> {
        self.colors.lock().ok().and_then(|c| c.last().copied())
    }
}

#[cfg(test)]
impl LightStrip for RecordingStrip {
    fn fill(&self, color: Rgb) -> Result<()> {
        self.colors
            .lock()
            .map_err(|_| anyhow::anyhow!("strip lock poisoned"))?
            .push(color);
        Ok(())
    }
}
