mod args;

use std::process::ExitCode;

use anyhow::{Context as _, Result};
use args::Args;
use clap::Parser as _;
use log::{error, info};
use tokio::sync::watch;
use wetdry_rig::actuator::Relay;
use wetdry_rig::cache::ReadingCache;
use wetdry_rig::config::{ExperimentConfig, POLL_INTERVAL};
use wetdry_rig::daq::{Mcc134, TC_TYPE_K};
use wetdry_rig::display::Dashboard;
use wetdry_rig::irga::Irga;
use wetdry_rig::logfile::TickLog;
use wetdry_rig::poller;
use wetdry_rig::supervisor::Supervisor;

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();

    if let Err(e) = run().await {
        eprintln!("{e:#}");
        return ExitCode::from(1);
    }

    ExitCode::from(0)
}

async fn run() -> Result<()> {
    let args = Args::parse();

    let config = ExperimentConfig::new(
        args.phase,
        args.cycle_minutes,
        args.log_path,
        args.sensor_log_dir,
        args.h2o_setpoint,
        args.timezone,
    )?;

    if let Some(dir) = &config.sensor_log_dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create sensor log directory {:?}", dir))?;
    }

    let relay =
        Relay::open(args.relay_pin, args.active_low).context("failed to open the relay line")?;

    let gas_cache = ReadingCache::new();
    let tc_cache = ReadingCache::new();
    let mut pollers = Vec::new();

    // A device that cannot be opened is reported once and gets no
    // poller; the supervisor then sits in warm-up until the operator
    // intervenes, which is the intended failure mode.
    match Irga::open(&args.irga_port, args.irga_baud) {
        Ok(irga) => {
            let raw = config.sensor_log_dir.as_ref().map(|dir| dir.join("irga.csv"));
            pollers.push(poller::spawn(
                irga,
                gas_cache.clone(),
                POLL_INTERVAL,
                config.timezone,
                raw.as_deref(),
            )?);
        }
        Err(err) => error!("gas analyzer unavailable: {err:#}"),
    }

    match Mcc134::open(args.daq_address, &args.tc_channels, TC_TYPE_K) {
        Ok(board) => {
            let raw = config
                .sensor_log_dir
                .as_ref()
                .map(|dir| dir.join("thermocouple.csv"));
            pollers.push(poller::spawn(
                board,
                tc_cache.clone(),
                POLL_INTERVAL,
                config.timezone,
                raw.as_deref(),
            )?);
        }
        Err(err) => error!("thermocouple board unavailable: {err:#}"),
    }

    let log = match &config.log_path {
        Some(path) => {
            info!("experiment log: {:?}", path);
            Some(TickLog::create(path)?)
        }
        None => None,
    };

    let mut supervisor = Supervisor::new(
        config,
        gas_cache,
        tc_cache,
        relay,
        log,
        Dashboard::new(!args.no_dashboard),
    );

    let (shutdown_tx, mut shutdown_rx) = watch::channel(());
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("stop requested");
            let _ = shutdown_tx.send(());
        }
    });

    let outcome = async {
        if supervisor.warm_up(&mut shutdown_rx).await {
            supervisor.run(&mut shutdown_rx).await
        } else {
            Ok(())
        }
    }
    .await;

    // Stopped-state teardown runs whether the loop finished cleanly,
    // errored mid-tick, or was cancelled during warm-up.
    let teardown = supervisor.shutdown();
    for poller in pollers {
        poller.stop();
    }

    outcome.and(teardown)
}
