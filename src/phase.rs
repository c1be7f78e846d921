use std::str::FromStr;

use anyhow::{Error, bail};
use chrono::{DateTime, Duration};
use chrono_tz::Tz;

/// The experiment's current regime. Each phase has its own actuator
/// threshold rule in [`crate::control`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Phase {
    Wet,
    Dry,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Wet => "wet",
            Phase::Dry => "dry",
        }
    }

    pub fn flipped(&self) -> Self {
        match self {
            Phase::Wet => Phase::Dry,
            Phase::Dry => Phase::Wet,
        }
    }
}

impl FromStr for Phase {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "wet" => Ok(Phase::Wet),
            "dry" => Ok(Phase::Dry),
            _ => bail!("unknown phase: {} (expected 'wet' or 'dry')", s),
        }
    }
}

/// Flips the experiment phase every `cycle`, independent of sensor health.
///
/// The transition is edge-triggered and evaluated once per supervisory
/// tick, so the actual switch lags the configured boundary by at most one
/// tick interval.
#[derive(Debug)]
pub struct PhaseScheduler {
    phase: Phase,
    last_switch: DateTime<Tz>,
    cycle: Duration,
}

impl PhaseScheduler {
    pub fn new(initial: Phase, started_at: DateTime<Tz>, cycle: Duration) -> Self {
        Self {
            phase: initial,
            last_switch: started_at,
            cycle,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn cycle(&self) -> Duration {
        self.cycle
    }

    /// Flip the phase if the cycle boundary has been reached.
    /// Returns whether a switch occurred on this tick.
    pub fn tick(&mut self, now: DateTime<Tz>) -> bool {
        if now - self.last_switch < self.cycle {
            return false;
        }
        self.phase = self.phase.flipped();
        self.last_switch = now;
        true
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use chrono_tz::UTC;

    use super::*;

    fn at(secs: i64) -> DateTime<Tz> {
        UTC.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn parse_round_trip() {
        assert_eq!("wet".parse::<Phase>().unwrap(), Phase::Wet);
        assert_eq!("dry".parse::<Phase>().unwrap(), Phase::Dry);
        assert!("damp".parse::<Phase>().is_err());
    }

    #[test]
    fn holds_phase_before_boundary() {
        let mut scheduler = PhaseScheduler::new(Phase::Wet, at(0), Duration::minutes(80));
        for secs in 1..(80 * 60) {
            assert!(!scheduler.tick(at(secs)));
            assert_eq!(scheduler.phase(), Phase::Wet);
        }
    }

    #[test]
    fn flips_exactly_once_per_boundary() {
        // 80 min cycle ticked at 1 s resolution: one flip at the first tick
        // where now - last_switch >= cycle, never twice for the same boundary.
        let cycle_secs = 80 * 60;
        let mut scheduler = PhaseScheduler::new(Phase::Wet, at(0), Duration::minutes(80));

        let mut switches = Vec::new();
        for secs in 1..=(2 * cycle_secs + 5) {
            if scheduler.tick(at(secs)) {
                switches.push(secs);
            }
        }

        assert_eq!(switches, vec![cycle_secs, 2 * cycle_secs]);
        assert_eq!(scheduler.phase(), Phase::Wet);
    }

    #[test]
    fn late_tick_resets_from_actual_switch_time() {
        // If a tick arrives late the next boundary is measured from the
        // switch that actually happened, not from the nominal schedule.
        let mut scheduler = PhaseScheduler::new(Phase::Dry, at(0), Duration::seconds(10));
        assert!(scheduler.tick(at(13)));
        assert_eq!(scheduler.phase(), Phase::Wet);
        assert!(!scheduler.tick(at(22)));
        assert!(scheduler.tick(at(23)));
        assert_eq!(scheduler.phase(), Phase::Dry);
    }
}
