mod args;

use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context as _, Result};
use args::Args;
use clap::Parser as _;
use wetdry_rig::actuator::{Actuator, Relay};
use wetdry_rig::control::ActuatorCommand;

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

    let mut relay =
        Relay::open(args.relay_pin, args.active_low).context("failed to open the relay line")?;

    println!(
        "Toggling relay on BCM {} every {} s. Press Ctrl+C to stop.",
        args.relay_pin, args.period_secs
    );

    let mut command = ActuatorCommand::Engaged;
    loop {
        relay.apply(command)?;
        println!("relay {}", command.as_str());

        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(args.period_secs)) => {}
            _ = tokio::signal::ctrl_c() => break,
        }

        command = match command {
            ActuatorCommand::Engaged => ActuatorCommand::Disengaged,
            ActuatorCommand::Disengaged => ActuatorCommand::Engaged,
        };
    }

    relay.apply(ActuatorCommand::Disengaged)?;
    println!("relay OFF");

    Ok(())
}
