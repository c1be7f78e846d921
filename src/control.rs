use crate::phase::Phase;

/// Wet mode engages the actuator while the chamber is below this floor.
pub const WET_FLOOR_C: f64 = 27.0;

/// Dry mode engages the actuator while the chamber is above this ceiling.
pub const DRY_CEILING_C: f64 = -10.0;

/// Command applied to the single relay/output line. Re-issuing the
/// current command is a no-op at the pin but is still recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActuatorCommand {
    Engaged,
    Disengaged,
}

impl ActuatorCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActuatorCommand::Engaged => "ON",
            ActuatorCommand::Disengaged => "OFF",
        }
    }
}

/// Threshold control law for the heater/valve relay.
///
/// There is deliberately no hysteresis band: a temperature sitting exactly
/// on a threshold flaps the command tick by tick. An absent temperature
/// (sensor gone or sentinel channel state) always fails safe to
/// `Disengaged`.
pub fn evaluate(phase: Phase, temp_ch0: Option<f64>) -> ActuatorCommand {
    let Some(temp) = temp_ch0 else {
        return ActuatorCommand::Disengaged;
    };

    let engage = match phase {
        Phase::Wet => temp < WET_FLOOR_C,
        Phase::Dry => temp > DRY_CEILING_C,
    };

    if engage {
        ActuatorCommand::Engaged
    } else {
        ActuatorCommand::Disengaged
    }
}
