use std::fs::File;
use std::io::Write;
use std::path::Path;

use anyhow::{Context as _, Result};
use chrono::DateTime;
use chrono_tz::Tz;

use crate::control::ActuatorCommand;
use crate::phase::Phase;
use crate::reading::GasReading;

/// Column order of the experiment log. Fixed; written once as the header.
pub const COLUMNS: [&str; 10] = [
    "timestamp",
    "cycle_state",
    "elapsed_min",
    "co2_ppm",
    "h2o_mmol",
    "irga_temp_C",
    "pressure_kPa",
    "dewpoint_C",
    "temp_ch0_C",
    "gpio_state",
];

/// One supervisory-loop tick, frozen into the experiment's record.
/// Never mutated after it is appended.
#[derive(Debug, Clone)]
pub struct TickRecord {
    pub timestamp: DateTime<Tz>,

    pub phase: Phase,

    pub elapsed_min: f64,

    pub gas: Option<GasReading>,

    pub temp_ch0: Option<f64>,

    pub command: ActuatorCommand,
}

/// Append-only CSV sink for tick records, flushed after every row so a
/// crash loses at most the in-flight row. A failed append is fatal to
/// the loop; the log is the experiment's scientific record, not
/// best-effort telemetry.
pub struct TickLog<W: Write> {
    writer: csv::Writer<W>,
}

impl TickLog<File> {
    /// Open the log at `path`, truncating any prior file of that name.
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path)
            .with_context(|| format!("failed to create experiment log at {:?}", path))?;
        Self::new(file)
    }
}

impl<W: Write> TickLog<W> {
    pub fn new(inner: W) -> Result<Self> {
        let mut writer = csv::Writer::from_writer(inner);
        writer
            .write_record(COLUMNS)
            .context("failed to write experiment log header")?;
        writer.flush().context("failed to flush experiment log")?;
        Ok(Self { writer })
    }

    pub fn append(&mut self, record: &TickRecord) -> Result<()> {
        let opt = |v: Option<f64>| v.map(|v| v.to_string()).unwrap_or_default();
        let gas = record.gas;

        self.writer
            .write_record([
                record.timestamp.to_rfc3339(),
                record.phase.as_str().to_string(),
                format!("{:.2}", record.elapsed_min),
                opt(gas.map(|g| g.co2_ppm)),
                opt(gas.map(|g| g.h2o_mmol)),
                opt(gas.map(|g| g.cell_temp_c)),
                opt(gas.map(|g| g.cell_pressure_kpa)),
                opt(gas.map(|g| g.dew_point_c)),
                opt(record.temp_ch0),
                record.command.as_str().to_string(),
            ])
            .context("failed to append to experiment log")?;
        self.writer
            .flush()
            .context("failed to flush experiment log")
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer
            .flush()
            .context("failed to flush experiment log")
    }

    pub fn into_inner(self) -> Result<W> {
        self.writer
            .into_inner()
            .map_err(|err| anyhow::Error::from(err.into_error()))
            .context("failed to finish experiment log")
    }
}
