use std::path::PathBuf;

use chrono_tz::Tz;
use clap::Parser;
use wetdry_rig::phase::Phase;

#[derive(Debug, Parser)]
#[command(about = "Wet/dry cycling chamber supervisor")]
pub struct Args {
    /// Starting experiment phase.
    #[arg(long, value_enum)]
    pub phase: Phase,

    /// Minutes between automatic phase switches.
    #[arg(long, default_value_t = 80.0)]
    pub cycle_minutes: f64,

    /// Experiment log path; omit to run without the tick log.
    #[arg(long)]
    pub log_path: Option<PathBuf>,

    /// Directory for the per-sensor raw CSVs; omit to disable them.
    #[arg(long)]
    pub sensor_log_dir: Option<PathBuf>,

    /// H2O setpoint in mmol/mol. Recorded and displayed, not used by
    /// the control law.
    #[arg(long, default_value_t = 0.0)]
    pub h2o_setpoint: f64,

    #[arg(long, env = "TZ")]
    pub timezone: Tz,

    #[arg(long, env = "IRGA_PORT", default_value = "/dev/ttyUSB0")]
    pub irga_port: String,

    #[arg(long, default_value_t = 9600)]
    pub irga_baud: u32,

    /// MCC 134 HAT address.
    #[arg(long, default_value_t = 0)]
    pub daq_address: u8,

    /// Thermocouple channels to read; channel 0 drives the control law.
    #[arg(long, value_delimiter = ',', default_value = "0")]
    pub tc_channels: Vec<u8>,

    /// BCM pin of the relay line.
    #[arg(long, default_value_t = 14)]
    pub relay_pin: u8,

    /// Relay board that energizes on a low pin level.
    #[arg(long)]
    pub active_low: bool,

    /// Disable the live terminal panel.
    #[arg(long)]
    pub no_dashboard: bool,
}
