//! Real GPIO backend via `rppal`, the idiomatic crate for driving GPIO
//! lines from a Linux SBC (Raspberry Pi and compatible). Sourced from the
//! broader example pack rather than the teacher, which carries no GPIO
//! dependency of its own (see DESIGN.md).

use futures::future::{BoxFuture, FutureExt};
use std::sync::{atomic::AtomicBool, atomic::Ordering, Mutex};

use super::{Hal, IndicatorColor};
use crate::error::SupervisorError;

#[cfg(feature = "gpio")]
pub struct GpioHal {
    ready_pin: Mutex<rppal::gpio::OutputPin>,
    red_pin: Mutex<rppal::gpio::OutputPin>,
    green_pin: Mutex<rppal::gpio::OutputPin>,
    yellow_pin: Mutex<rppal::gpio::OutputPin>,
    buzzer_pin: Mutex<rppal::gpio::OutputPin>,
    last_ready: AtomicBool,
}

#[cfg(feature = "gpio")]
pub struct GpioPins {
    pub ready: u8,
    pub red: u8,
    pub green: u8,
    pub yellow: u8,
    pub buzzer: u8,
}

#[cfg(feature = "gpio")]
impl GpioHal {
    pub fn open(pins: GpioPins) -> Result<Self, SupervisorError> {
        let gpio = rppal::gpio::Gpio::new().map_err(hal_err)?;

        let open_low = |pin: u8| -> Result<rppal::gpio::OutputPin, SupervisorError> {
            let mut out = gpio.get(pin).map_err(hal_err)?.into_output();
            out.set_low();
            Ok(out)
        };

        Ok(GpioHal {
            // §4.1 startup policy: READY must be driven LOW before the
            // serial port is opened, and only raised on entering ARMED.
            ready_pin: Mutex::new(open_low(pins.ready)?),
            red_pin: Mutex::new(open_low(pins.red)?),
            green_pin: Mutex::new(open_low(pins.green)?),
            yellow_pin: Mutex::new(open_low(pins.yellow)?),
            buzzer_pin: Mutex::new(open_low(pins.buzzer)?),
            last_ready: AtomicBool::new(false),
        })
    }

    fn pin_for(&self, color: IndicatorColor) -> &Mutex<rppal::gpio::OutputPin> {
        match color {
            IndicatorColor::Red => &self.red_pin,
            IndicatorColor::Green => &self.green_pin,
            IndicatorColor::Yellow => &self.yellow_pin,
        }
    }
}

#[cfg(feature = "gpio")]
fn hal_err(err: rppal::gpio::Error) -> SupervisorError {
    SupervisorError::Hal(err.to_string())
}

#[cfg(feature = "gpio")]
impl Hal for GpioHal {
    fn set_ready(&self, ready: bool) -> BoxFuture<'_, Result<(), SupervisorError>> {
        async move {
            // Idempotent: skip the redundant pin write (§4.1).
            if self.last_ready.swap(ready, Ordering::SeqCst) == ready {
                return Ok(());
            }
            let mut pin = self.ready_pin.lock().expect("ready pin mutex poisoned");
            if ready {
                pin.set_high();
            } else {
                pin.set_low();
            }
            Ok(())
        }
        .boxed()
    }

    fn indicator(&self, color: IndicatorColor, duration_ms: u64) -> BoxFuture<'_, Result<(), SupervisorError>> {
        async move {
            {
                let mut pin = self.pin_for(color).lock().expect("indicator pin mutex poisoned");
                pin.set_high();
            }
            tokio::time::sleep(std::time::Duration::from_millis(duration_ms)).await;
            let mut pin = self.pin_for(color).lock().expect("indicator pin mutex poisoned");
            pin.set_low();
            Ok(())
        }
        .boxed()
    }

    fn buzz(&self, duration_ms: u64) -> BoxFuture<'_, Result<(), SupervisorError>> {
        async move {
            {
                let mut pin = self.buzzer_pin.lock().expect("buzzer pin mutex poisoned");
                pin.set_high();
            }
            tokio::time::sleep(std::time::Duration::from_millis(duration_ms)).await;
            let mut pin = self.buzzer_pin.lock().expect("buzzer pin mutex poisoned");
            pin.set_low();
            Ok(())
        }
        .boxed()
    }
}
