use std::io::Write as _;
use std::path::PathBuf;

use chrono::Duration;

use crate::control::ActuatorCommand;
use crate::phase::Phase;
use crate::reading::{GasReading, TcValue, ThermocoupleReading};

/// Everything the live panel shows for one tick.
#[derive(Debug, Clone)]
pub struct TickView {
    pub phase: Phase,
    pub elapsed: Duration,
    pub cycle: Duration,
    pub log_path: Option<PathBuf>,
    pub h2o_setpoint_mmol: f64,
    pub gas: Option<GasReading>,
    pub thermocouple: Option<ThermocoupleReading>,
    pub command: ActuatorCommand,
    pub switched: bool,
}

/// Periodically refreshed terminal panel. Advisory only: rendering must
/// never block or fail the supervisory tick.
pub struct Dashboard {
    enabled: bool,
}

impl Dashboard {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn show(&self, view: &TickView) {
        if !self.enabled {
            return;
        }
        let mut stdout = std::io::stdout().lock();
        // Clear and home; a write error here is nobody's problem.
        let _ = write!(stdout, "\x1b[2J\x1b[H{}", render(view));
        let _ = stdout.flush();
    }
}

fn hms(d: Duration) -> String {
    let secs = d.num_seconds().max(0);
    format!("{}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
}

pub fn render(view: &TickView) -> String {
    let mut out = String::new();
    let mut row = |label: &str, value: String| {
        out.push_str(&format!("{:<18} {}\n", label, value));
    };

    row("Mode", view.phase.as_str().to_uppercase());
    if view.switched {
        row("", "(phase switched this tick)".to_string());
    }
    row("Elapsed", hms(view.elapsed));
    row("Cycle", format!("{} min", view.cycle.num_minutes()));
    row(
        "Logging",
        match &view.log_path {
            Some(path) => format!("ON ({})", path.display()),
            None => "OFF".to_string(),
        },
    );
    row(
        "H2O setpoint",
        format!("{:.2} mmol/mol", view.h2o_setpoint_mmol),
    );

    match view.gas {
        Some(gas) => {
            row("CO2", format!("{:.2} ppm", gas.co2_ppm));
            row("H2O", format!("{:.2} mmol/mol", gas.h2o_mmol));
            row("Cell temp", format!("{:.2} C", gas.cell_temp_c));
            row("Cell pressure", format!("{:.2} kPa", gas.cell_pressure_kpa));
            row("Dew point", format!("{:.2} C", gas.dew_point_c));
        }
        None => row("Gas analyzer", "waiting...".to_string()),
    }

    match &view.thermocouple {
        Some(reading) => {
            for (ch, value) in &reading.channels {
                let shown = match value {
                    TcValue::Celsius(c) => format!("{:.2} C", c),
                    sentinel => sentinel.as_str().to_string(),
                };
                row(&format!("Temp ch{}", ch), shown);
            }
        }
        None => row("Thermocouple", "waiting...".to_string()),
    }

    row("Relay", view.command.as_str().to_string());
    out
}

#[cfg(test)]
mod tests {
    use indexmap::IndexMap;

    use super::*;

    #[test]
    fn renders_waiting_placeholders_and_relay_state() {
        let view = TickView {
            phase: Phase::Wet,
            elapsed: Duration::seconds(3725),
            cycle: Duration::minutes(80),
            log_path: None,
            h2o_setpoint_mmol: 15.0,
            gas: None,
            thermocouple: None,
            command: ActuatorCommand::Disengaged,
            switched: false,
        };

        let panel = render(&view);
        assert!(panel.contains("WET"));
        assert!(panel.contains("1:02:05"));
        assert!(panel.contains("waiting..."));
        assert!(panel.contains("OFF"));
    }

    #[test]
    fn renders_sentinel_channel_states() {
        let view = TickView {
            phase: Phase::Dry,
            elapsed: Duration::zero(),
            cycle: Duration::minutes(80),
            log_path: Some(PathBuf::from("/tmp/run.csv")),
            h2o_setpoint_mmol: 0.0,
            gas: None,
            thermocouple: Some(ThermocoupleReading {
                channels: IndexMap::from([(0, TcValue::Open)]),
            }),
            command: ActuatorCommand::Disengaged,
            switched: true,
        };

        let panel = render(&view);
        assert!(panel.contains("Open"));
        assert!(panel.contains("/tmp/run.csv"));
        assert!(panel.contains("phase switched"));
    }
}
