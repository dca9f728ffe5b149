//! Infrared emitters that light the wand tip for the camera.
//!
//! Best effort: callers log failures and carry on.

use anyhow::Result;

pub trait Illuminator: Send + Sync {
    fn set(&self, on: bool) -> Result<()>;
}

/// No emitter hardware attached.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullIlluminator;

impl Illuminator for NullIlluminator {
    fn set(&self, on: bool) -> Result<()> {
        tracing::debug!(on, "illuminator (none attached)");
        Ok(())
    }
}

#[cfg(feature = "gpio")]
pub use gpio::GpioIlluminator;

#[cfg(feature = "gpio")]
mod gpio {
    use anyhow::{Context, Result};
    use rppal::gpio::{Gpio, OutputPin};
    use std::sync::Mutex;

    use super::Illuminator;

    /// Emitters switched through a BCM-numbered output pin.
    pub struct GpioIlluminator {
        pin: Mutex<OutputPin>,
    }

    impl GpioIlluminator {
        pub fn new(bcm_pin: u8) -> Result<Self> {
            let pin = Gpio::new()
                .context("failed to open GPIO")?
                .get(bcm_pin)
                .with_context(|| format!("failed to claim GPIO {bcm_pin}"))?
                .into_output_low();
            Ok(Self { pin: Mutex::new(pin) })
        }
    }

    impl Illuminator for GpioIlluminator {
        fn set(&self, on: bool) -> Result<()> {
            let mut pin = self
                .pin
                .lock()
                .map_err(|_| anyhow::anyhow!("illuminator pin lock poisoned"))?;
            if on {
                pin.set_high();
            } else {
                pin.set_low();
            }
            Ok(())
        }
    }
}
