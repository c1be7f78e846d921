use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context as _, Result};
use chrono::Utc;
use chrono_tz::Tz;
use log::{info, warn};

use crate::cache::ReadingCache;

/// A background-polled sensor source.
///
/// `poll` blocks on device I/O with a bounded timeout and swallows every
/// transient failure into `None`; it never returns an error to the
/// caller. The raw-log hooks describe the optional per-sensor CSV.
pub trait Sensor: Send {
    type Reading: Clone + Send + 'static;

    fn label(&self) -> &'static str;

    fn poll(&mut self) -> Option<Self::Reading>;

    fn raw_log_header(&self) -> Vec<String>;

    /// Row fields for one reading, without the timestamp column.
    fn raw_log_row(&self, reading: &Self::Reading) -> Vec<String>;
}

/// Handle to a running poller thread.
pub struct Poller {
    label: &'static str,
    running: Arc<AtomicBool>,
    handle: thread::JoinHandle<()>,
}

impl Poller {
    /// Flag the poll loop to stop and join it. Blocks for at most about
    /// one poll interval plus one device timeout.
    pub fn stop(self) {
        self.running.store(false, Ordering::Relaxed);
        if self.handle.join().is_err() {
            warn!("{} poller panicked", self.label);
        } else {
            info!("{} poller stopped", self.label);
        }
    }
}

/// Start a poller thread that owns `sensor` exclusively and publishes
/// each successful reading to `cache`. The supervisory loop only ever
/// reads the cache; a stalled poll never stalls the loop.
pub fn spawn<S>(
    mut sensor: S,
    cache: ReadingCache<S::Reading>,
    interval: Duration,
    timezone: Tz,
    raw_log: Option<&Path>,
) -> Result<Poller>
where
    S: Sensor + 'static,
{
    let label = sensor.label();

    let mut raw_writer = match raw_log {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("failed to create {} raw log at {:?}", label, path))?;
            let mut writer = csv::Writer::from_writer(file);
            writer
                .write_record(sensor.raw_log_header())
                .with_context(|| format!("failed to write {} raw log header", label))?;
            writer
                .flush()
                .with_context(|| format!("failed to flush {} raw log", label))?;
            info!("{} raw log: {:?}", label, path);
            Some(writer)
        }
        None => None,
    };

    let running = Arc::new(AtomicBool::new(true));
    let thread_running = Arc::clone(&running);

    let handle = thread::Builder::new()
        .name(format!("{}-poller", label))
        .spawn(move || {
            while thread_running.load(Ordering::Relaxed) {
                let started = Instant::now();

                if let Some(reading) = sensor.poll() {
                    let now = Utc::now().with_timezone(&timezone);

                    let mut disable_raw = false;
                    if let Some(writer) = raw_writer.as_mut() {
                        let mut row = vec![now.to_rfc3339()];
                        row.extend(sensor.raw_log_row(&reading));
                        let appended: Result<()> = (|| {
                            writer.write_record(&row)?;
                            writer.flush()?;
                            Ok(())
                        })();
                        if let Err(err) = appended {
                            // The raw log is advisory; the tick log is the
                            // scientific record. Stop writing, keep polling.
                            warn!("{} raw log write failed, disabling: {}", label, err);
                            disable_raw = true;
                        }
                    }
                    if disable_raw {
                        raw_writer = None;
                    }

                    cache.set(reading, now);
                }

                let spent = started.elapsed();
                if spent < interval {
                    thread::sleep(interval - spent);
                }
            }
        })
        .with_context(|| format!("failed to spawn {} poller thread", label))?;

    Ok(Poller {
        label,
        running,
        handle,
    })
}
