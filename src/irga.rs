use std::io::{BufRead, BufReader};
use std::time::Duration;

use anyhow::{Context as _, Result};
use log::{debug, warn};
use serialport::SerialPort;

use crate::poller::Sensor;
use crate::reading::GasReading;

/// Parse one line of analyzer XML into a complete reading.
///
/// The analyzer emits a self-contained payload per line, e.g.
/// `<li850><data><co2>412.1</co2><h2o>11.4</h2o>...</data></li850>`.
/// A payload with any field missing or unparseable yields `None`; a
/// half-filled reading is never surfaced.
pub fn parse_payload(line: &str) -> Option<GasReading> {
    let doc = roxmltree::Document::parse(line).ok()?;

    let field = |tag: &str| -> Option<f64> {
        let node = doc.descendants().find(|n| n.has_tag_name(tag))?;
        node.text()?.trim().parse::<f64>().ok()
    };

    Some(GasReading {
        co2_ppm: field("co2")?,
        h2o_mmol: field("h2o")?,
        cell_temp_c: field("celltemp")?,
        cell_pressure_kpa: field("cellpressure")?,
        dew_point_c: field("h2odewpoint")?,
    })
}

/// Infrared gas analyzer on a serial line.
pub struct Irga {
    reader: BufReader<Box<dyn SerialPort>>,
}

impl Irga {
    /// Open the serial port. Failure here is an initialization fault:
    /// the caller reports it once and runs without this sensor.
    pub fn open(port: &str, baud_rate: u32) -> Result<Self> {
        let port = serialport::new(port, baud_rate)
            .timeout(Duration::from_secs(1))
            .open()
            .with_context(|| format!("failed to open gas analyzer port {}", port))?;

        Ok(Self {
            reader: BufReader::new(port),
        })
    }
}

impl Sensor for Irga {
    type Reading = GasReading;

    fn label(&self) -> &'static str {
        "irga"
    }

    /// Read one line and parse it. Timeouts, I/O errors, and malformed
    /// payloads are all transient: they yield no reading, never an error.
    fn poll(&mut self) -> Option<GasReading> {
        let mut line = String::new();
        match self.reader.read_line(&mut line) {
            Ok(0) => None,
            Ok(_) => {
                let reading = parse_payload(line.trim());
                if reading.is_none() {
                    warn!("discarding malformed analyzer payload: {}", line.trim());
                }
                reading
            }
            Err(err) => {
                debug!("gas analyzer read failed: {}", err);
                None
            }
        }
    }

    fn raw_log_header(&self) -> Vec<String> {
        ["timestamp", "co2_ppm", "h2o_mmol", "celltemp_C", "cellpressure_kPa", "dewpoint_C"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    fn raw_log_row(&self, reading: &GasReading) -> Vec<String> {
        vec![
            reading.co2_ppm.to_string(),
            reading.h2o_mmol.to_string(),
            reading.cell_temp_c.to_string(),
            reading.cell_pressure_kpa.to_string(),
            reading.dew_point_c.to_string(),
        ]
    }
}
