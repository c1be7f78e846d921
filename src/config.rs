use std::path::PathBuf;
use std::time::Duration as StdDuration;

use anyhow::{Result, bail};
use chrono::Duration;
use chrono_tz::Tz;

use crate::phase::Phase;

/// Supervisory tick interval.
pub const TICK: StdDuration = StdDuration::from_secs(1);

/// Per-sensor poll cadence.
pub const POLL_INTERVAL: StdDuration = StdDuration::from_secs(1);

/// Warm-up cache poll cadence.
pub const WARMUP_POLL: StdDuration = StdDuration::from_millis(500);

/// Immutable experiment parameters, assembled once from the command line
/// before the control loop starts. The core never re-prompts.
#[derive(Debug, Clone)]
pub struct ExperimentConfig {
    pub initial_phase: Phase,

    /// Duration after which the phase auto-flips.
    pub cycle: Duration,

    /// Tick log path; `None` disables tick logging.
    pub log_path: Option<PathBuf>,

    /// Directory for the optional per-sensor raw CSVs.
    pub sensor_log_dir: Option<PathBuf>,

    /// Captured from the operator but not referenced by the control law.
    pub h2o_setpoint_mmol: f64,

    pub timezone: Tz,
}

impl ExperimentConfig {
    pub fn new(
        initial_phase: Phase,
        cycle_minutes: f64,
        log_path: Option<PathBuf>,
        sensor_log_dir: Option<PathBuf>,
        h2o_setpoint_mmol: f64,
        timezone: Tz,
    ) -> Result<Self> {
        if !cycle_minutes.is_finite() || cycle_minutes <= 0.0 {
            bail!("cycle time must be a positive number of minutes");
        }
        if !h2o_setpoint_mmol.is_finite() || h2o_setpoint_mmol < 0.0 {
            bail!("H2O setpoint must be a non-negative number");
        }

        Ok(Self {
            initial_phase,
            cycle: Duration::milliseconds((cycle_minutes * 60_000.0) as i64),
            log_path,
            sensor_log_dir,
            h2o_setpoint_mmol,
            timezone,
        })
    }
}
