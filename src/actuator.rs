use anyhow::{Context as _, Result};
use log::debug;
use rppal::gpio::{Gpio, OutputPin};

use crate::control::ActuatorCommand;

/// The one digital output line the supervisory loop drives. Only the
/// supervisor holds a handle; nothing else may command the line.
pub trait Actuator {
    fn apply(&mut self, command: ActuatorCommand) -> Result<()>;
}

/// Relay on a Raspberry Pi GPIO line.
///
/// `active_low` covers relay boards that energize on a low pin. Applying
/// the command the line already carries is a no-op at the hardware.
pub struct Relay {
    pin: OutputPin,
    active_low: bool,
    state: Option<ActuatorCommand>,
}

impl Relay {
    pub fn open(bcm_pin: u8, active_low: bool) -> Result<Self> {
        let gpio = Gpio::new().context("failed to access GPIO")?;
        let mut pin = gpio
            .get(bcm_pin)
            .with_context(|| format!("failed to claim GPIO pin {}", bcm_pin))?
            .into_output();

        // Start de-energized regardless of the pin's prior level.
        if active_low {
            pin.set_high();
        } else {
            pin.set_low();
        }

        Ok(Self {
            pin,
            active_low,
            state: Some(ActuatorCommand::Disengaged),
        })
    }
}

impl Actuator for Relay {
    fn apply(&mut self, command: ActuatorCommand) -> Result<()> {
        if self.state == Some(command) {
            return Ok(());
        }

        let energize = command == ActuatorCommand::Engaged;
        if energize != self.active_low {
            self.pin.set_high();
        } else {
            self.pin.set_low();
        }
        debug!("relay pin {} -> {}", self.pin.pin(), command.as_str());
        self.state = Some(command);

        Ok(())
    }
}

impl Drop for Relay {
    fn drop(&mut self) {
        // Leave the line de-energized when the handle is released.
        if self.active_low {
            self.pin.set_high();
        } else {
            self.pin.set_low();
        }
    }
}
