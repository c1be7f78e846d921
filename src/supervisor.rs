use std::io::Write;

use anyhow::{Context as _, Result};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use log::{info, warn};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::actuator::Actuator;
use crate::cache::ReadingCache;
use crate::config::{ExperimentConfig, TICK, WARMUP_POLL};
use crate::control::{self, ActuatorCommand};
use crate::display::{Dashboard, TickView};
use crate::logfile::{TickLog, TickRecord};
use crate::phase::PhaseScheduler;
use crate::reading::{GasReading, ThermocoupleReading};

/// The supervisory loop: once per tick it merges the latest cached
/// readings, evaluates the control law, drives the relay, appends one
/// record to the experiment log, and refreshes the live panel.
///
/// Lifecycle is WarmingUp -> Running -> Stopped. No commands and no log
/// rows are emitted until both sensors have produced at least one
/// reading; on stopping, the relay is unconditionally de-energized and
/// the log flushed, even when a tick errored mid-flight.
pub struct Supervisor<A: Actuator, W: Write> {
    config: ExperimentConfig,
    scheduler: PhaseScheduler,
    gas_cache: ReadingCache<GasReading>,
    tc_cache: ReadingCache<ThermocoupleReading>,
    actuator: A,
    log: Option<TickLog<W>>,
    dashboard: Dashboard,
    started_at: Option<DateTime<Tz>>,
    stopped: bool,
}

impl<A: Actuator, W: Write> Supervisor<A, W> {
    pub fn new(
        config: ExperimentConfig,
        gas_cache: ReadingCache<GasReading>,
        tc_cache: ReadingCache<ThermocoupleReading>,
        actuator: A,
        log: Option<TickLog<W>>,
        dashboard: Dashboard,
    ) -> Self {
        let now = Utc::now().with_timezone(&config.timezone);
        let scheduler = PhaseScheduler::new(config.initial_phase, now, config.cycle);
        Self {
            config,
            scheduler,
            gas_cache,
            tc_cache,
            actuator,
            log,
            dashboard,
            started_at: None,
            stopped: false,
        }
    }

    fn now(&self) -> DateTime<Tz> {
        Utc::now().with_timezone(&self.config.timezone)
    }

    /// Enter Running at `now`: elapsed time and the first cycle boundary
    /// are both measured from here.
    pub fn begin(&mut self, now: DateTime<Tz>) {
        self.scheduler = PhaseScheduler::new(self.config.initial_phase, now, self.config.cycle);
        self.started_at = Some(now);
        info!(
            "running {} mode control loop, cycle {} min",
            self.config.initial_phase.as_str(),
            self.config.cycle.num_minutes()
        );
    }

    /// WarmingUp: poll both caches until each holds a reading. Returns
    /// `false` if shutdown was signalled first. A sensor that never
    /// reports keeps the experiment here indefinitely; that is the
    /// deliberate observable failure mode for a dead device.
    pub async fn warm_up(&mut self, shutdown: &mut watch::Receiver<()>) -> bool {
        info!("waiting for sensors to warm up...");
        loop {
            if self.gas_cache.get().is_some() && self.tc_cache.get().is_some() {
                self.begin(self.now());
                return true;
            }
            tokio::select! {
                _ = tokio::time::sleep(WARMUP_POLL) => {}
                _ = shutdown.changed() => return false,
            }
        }
    }

    /// Running: one tick per interval until shutdown or a tick error.
    /// The caller must invoke [`Supervisor::shutdown`] afterwards in
    /// every case.
    pub async fn run(&mut self, shutdown: &mut watch::Receiver<()>) -> Result<()> {
        let mut interval = tokio::time::interval(TICK);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let now = self.now();
                    self.tick(now)?;
                }
                _ = shutdown.changed() => return Ok(()),
            }
        }
    }

    /// One decision epoch. Fails only on actuator or log-append errors;
    /// both are fatal to the loop.
    pub fn tick(&mut self, now: DateTime<Tz>) -> Result<()> {
        let started_at = self.started_at.unwrap_or(now);
        let elapsed = now - started_at;

        let switched = self.scheduler.tick(now);
        if switched {
            info!(
                "auto-switched to {} mode after {} min",
                self.scheduler.phase().as_str(),
                self.config.cycle.num_minutes()
            );
        }

        let gas = self.gas_cache.get().map(|stamped| stamped.value);
        let thermocouple = self.tc_cache.get().map(|stamped| stamped.value);

        // A sentinel channel state is "no usable temperature".
        let temp_ch0 = thermocouple
            .as_ref()
            .and_then(|reading| reading.channel(0))
            .and_then(|value| value.as_celsius());

        let command = control::evaluate(self.scheduler.phase(), temp_ch0);
        self.actuator
            .apply(command)
            .context("failed to drive the relay")?;

        if let Some(log) = self.log.as_mut() {
            log.append(&TickRecord {
                timestamp: now,
                phase: self.scheduler.phase(),
                elapsed_min: elapsed.num_milliseconds() as f64 / 60_000.0,
                gas,
                temp_ch0,
                command,
            })?;
        }

        self.dashboard.show(&TickView {
            phase: self.scheduler.phase(),
            elapsed,
            cycle: self.config.cycle,
            log_path: self.config.log_path.clone(),
            h2o_setpoint_mmol: self.config.h2o_setpoint_mmol,
            gas,
            thermocouple,
            command,
            switched,
        });

        Ok(())
    }

    /// Stopped: de-energize the relay and flush the log. Idempotent and
    /// safe to call whether or not the loop ever ran; both steps are
    /// attempted even if one fails.
    pub fn shutdown(&mut self) -> Result<()> {
        if self.stopped {
            return Ok(());
        }
        self.stopped = true;

        let relay = self
            .actuator
            .apply(ActuatorCommand::Disengaged)
            .context("failed to de-energize the relay on shutdown");
        if relay.is_err() {
            warn!("relay was not confirmed off during shutdown");
        }

        let log = match self.log.as_mut() {
            Some(log) => log.flush(),
            None => Ok(()),
        };

        info!("experiment stopped");
        relay.and(log)
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::{Arc, Mutex};
    use std::time::Duration as StdDuration;

    use chrono::TimeZone;
    use chrono_tz::{Tz, UTC};
    use indexmap::IndexMap;

    use super::*;
    use crate::phase::Phase;
    use crate::reading::TcValue;

    #[derive(Clone, Default)]
    struct MockRelay {
        // Pin-level transitions only; re-applying the current command
        // must not add an entry.
        transitions: Arc<Mutex<Vec<ActuatorCommand>>>,
        state: Option<ActuatorCommand>,
        fail: bool,
    }

    impl Actuator for MockRelay {
        fn apply(&mut self, command: ActuatorCommand) -> Result<()> {
            if self.fail {
                anyhow::bail!("relay driver fault");
            }
            if self.state != Some(command) {
                self.transitions.lock().unwrap().push(command);
                self.state = Some(command);
            }
            Ok(())
        }
    }

    /// Writer whose sink fails after a byte budget is spent; used to
    /// inject a log-append fault mid-run.
    struct FailAfter {
        written: Arc<Mutex<Vec<u8>>>,
        budget: usize,
    }

    impl Write for FailAfter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let mut written = self.written.lock().unwrap();
            if written.len() + buf.len() > self.budget {
                return Err(io::Error::new(io::ErrorKind::StorageFull, "disk full"));
            }
            written.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn config(phase: Phase) -> ExperimentConfig {
        ExperimentConfig::new(phase, 80.0, None, None, 0.0, UTC).unwrap()
    }

    fn tc_reading(value: TcValue) -> ThermocoupleReading {
        ThermocoupleReading {
            channels: IndexMap::from([(0, value)]),
        }
    }

    fn at(secs: i64) -> DateTime<Tz> {
        UTC.timestamp_opt(secs, 0).unwrap()
    }

    fn supervisor(
        phase: Phase,
        relay: MockRelay,
        log: Option<TickLog<Vec<u8>>>,
    ) -> (
        Supervisor<MockRelay, Vec<u8>>,
        ReadingCache<GasReading>,
        ReadingCache<ThermocoupleReading>,
    ) {
        let gas_cache = ReadingCache::new();
        let tc_cache = ReadingCache::new();
        let supervisor = Supervisor::new(
            config(phase),
            gas_cache.clone(),
            tc_cache.clone(),
            relay,
            log,
            Dashboard::new(false),
        );
        (supervisor, gas_cache, tc_cache)
    }

    fn logged_rows(written: &Arc<Mutex<Vec<u8>>>) -> Vec<String> {
        String::from_utf8(written.lock().unwrap().clone())
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn wet_mode_engages_then_disengages_across_the_floor() {
        let relay = MockRelay::default();
        let transitions = relay.transitions.clone();
        let log = TickLog::new(Vec::new()).unwrap();
        let (mut supervisor, _gas, tc) = supervisor(Phase::Wet, relay, Some(log));
        supervisor.begin(at(0));

        tc.set(tc_reading(TcValue::Celsius(26.0)), at(1));
        supervisor.tick(at(1)).unwrap();
        tc.set(tc_reading(TcValue::Celsius(28.0)), at(2));
        supervisor.tick(at(2)).unwrap();

        assert_eq!(
            *transitions.lock().unwrap(),
            vec![ActuatorCommand::Engaged, ActuatorCommand::Disengaged]
        );
    }

    #[test]
    fn missing_gas_reading_leaves_gas_columns_empty() {
        let written = Arc::new(Mutex::new(Vec::new()));
        let log = TickLog::new(FailAfter {
            written: written.clone(),
            budget: usize::MAX,
        })
        .unwrap();

        let relay = MockRelay::default();
        let (mut supervisor, _gas, tc) = {
            let gas_cache = ReadingCache::new();
            let tc_cache = ReadingCache::new();
            let supervisor = Supervisor::new(
                config(Phase::Wet),
                gas_cache.clone(),
                tc_cache.clone(),
                relay,
                Some(log),
                Dashboard::new(false),
            );
            (supervisor, gas_cache, tc_cache)
        };
        supervisor.begin(at(0));

        tc.set(tc_reading(TcValue::Celsius(26.0)), at(1));
        supervisor.tick(at(1)).unwrap();

        let rows = logged_rows(&written);
        assert_eq!(rows.len(), 2);
        // co2/h2o/celltemp/pressure/dewpoint all empty, relay ON.
        assert!(rows[1].contains(",wet,"));
        assert!(rows[1].contains(",,,,,,26,ON"));
    }

    #[test]
    fn sentinel_channel_state_fails_safe() {
        let relay = MockRelay::default();
        let transitions = relay.transitions.clone();
        let (mut supervisor, _gas, tc) = supervisor(Phase::Dry, relay, None);
        supervisor.begin(at(0));

        tc.set(tc_reading(TcValue::Celsius(20.0)), at(1));
        supervisor.tick(at(1)).unwrap();
        tc.set(tc_reading(TcValue::Open), at(2));
        supervisor.tick(at(2)).unwrap();

        assert_eq!(
            *transitions.lock().unwrap(),
            vec![ActuatorCommand::Engaged, ActuatorCommand::Disengaged]
        );
    }

    #[test]
    fn repeated_commands_produce_one_pin_transition_but_a_row_per_tick() {
        let written = Arc::new(Mutex::new(Vec::new()));
        let log = TickLog::new(FailAfter {
            written: written.clone(),
            budget: usize::MAX,
        })
        .unwrap();
        let relay = MockRelay::default();
        let transitions = relay.transitions.clone();

        let gas_cache = ReadingCache::new();
        let tc_cache = ReadingCache::new();
        let mut supervisor = Supervisor::new(
            config(Phase::Wet),
            gas_cache.clone(),
            tc_cache.clone(),
            relay,
            Some(log),
            Dashboard::new(false),
        );
        supervisor.begin(at(0));

        tc_cache.set(tc_reading(TcValue::Celsius(25.0)), at(1));
        for secs in 1..=3 {
            supervisor.tick(at(secs)).unwrap();
        }

        assert_eq!(*transitions.lock().unwrap(), vec![ActuatorCommand::Engaged]);
        let rows = logged_rows(&written);
        assert_eq!(rows.len(), 4);
        assert!(rows[1..].iter().all(|row| row.ends_with(",ON")));
    }

    #[test]
    fn log_fault_halts_the_loop_and_shutdown_still_disengages() {
        let written = Arc::new(Mutex::new(Vec::new()));
        let header_only = {
            // Budget covers the header plus one row, then the disk is full.
            let probe = TickLog::new(Vec::new()).unwrap();
            probe.into_inner().unwrap().len()
        };
        let log = TickLog::new(FailAfter {
            written: written.clone(),
            budget: header_only + 60,
        })
        .unwrap();
        let relay = MockRelay::default();
        let transitions = relay.transitions.clone();

        let gas_cache = ReadingCache::new();
        let tc_cache = ReadingCache::new();
        let mut supervisor = Supervisor::new(
            config(Phase::Wet),
            gas_cache,
            tc_cache.clone(),
            relay,
            Some(log),
            Dashboard::new(false),
        );
        supervisor.begin(at(0));
        tc_cache.set(tc_reading(TcValue::Celsius(26.0)), at(1));

        supervisor.tick(at(1)).unwrap();
        let fault = supervisor.tick(at(2));
        assert!(fault.is_err());

        // The shutdown sequence still de-energizes the relay, and rows
        // flushed before the fault survive.
        let _ = supervisor.shutdown();
        assert_eq!(
            transitions.lock().unwrap().last(),
            Some(&ActuatorCommand::Disengaged)
        );
        let rows = logged_rows(&written);
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn relay_fault_aborts_the_tick_and_is_reported_by_shutdown() {
        let relay = MockRelay {
            fail: true,
            ..MockRelay::default()
        };
        let (mut supervisor, _gas, tc) = supervisor(Phase::Wet, relay, None);
        supervisor.begin(at(0));
        tc.set(tc_reading(TcValue::Celsius(26.0)), at(1));

        assert!(supervisor.tick(at(1)).is_err());
        // The de-energize attempt also fails; shutdown surfaces it
        // instead of pretending the line is safe.
        assert!(supervisor.shutdown().is_err());
    }

    #[test]
    fn shutdown_is_idempotent() {
        let relay = MockRelay::default();
        let transitions = relay.transitions.clone();
        let (mut supervisor, _gas, _tc) = supervisor(Phase::Wet, relay, None);

        supervisor.shutdown().unwrap();
        supervisor.shutdown().unwrap();

        // De-energize is commanded once; the second call is a no-op.
        assert_eq!(
            *transitions.lock().unwrap(),
            vec![ActuatorCommand::Disengaged]
        );
    }

    #[tokio::test]
    async fn warm_up_blocks_until_both_sensors_report() {
        let relay = MockRelay::default();
        let (mut supervisor, gas, tc) = supervisor(Phase::Wet, relay, None);
        let (_tx, mut shutdown) = watch::channel(());

        gas.set(
            GasReading {
                co2_ppm: 400.0,
                h2o_mmol: 10.0,
                cell_temp_c: 50.0,
                cell_pressure_kpa: 99.0,
                dew_point_c: 8.0,
            },
            at(0),
        );
        tc.set(tc_reading(TcValue::Celsius(20.0)), at(0));

        assert!(supervisor.warm_up(&mut shutdown).await);
    }

    #[tokio::test]
    async fn warm_up_cancels_on_shutdown_when_a_sensor_never_reports() {
        let relay = MockRelay::default();
        // Gas cache stays empty for the whole test: a permanently absent
        // analyzer keeps the experiment in warm-up until cancelled.
        let (mut supervisor, _gas, tc) = supervisor(Phase::Wet, relay, None);
        tc.set(tc_reading(TcValue::Celsius(20.0)), at(0));

        let (tx, mut shutdown) = watch::channel(());
        tokio::spawn(async move {
            tokio::time::sleep(StdDuration::from_millis(50)).await;
            let _ = tx.send(());
        });

        assert!(!supervisor.warm_up(&mut shutdown).await);
    }
}
