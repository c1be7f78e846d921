use clap::Parser;

#[derive(Debug, Parser)]
#[command(about = "Exercise the heater/valve relay without the control loop")]
pub struct Args {
    /// BCM pin of the relay line.
    #[arg(long, default_value_t = 14)]
    pub relay_pin: u8,

    /// Relay board that energizes on a low pin level.
    #[arg(long)]
    pub active_low: bool,

    /// Seconds to hold each state.
    #[arg(long, default_value_t = 3)]
    pub period_secs: u64,
}
