//! Wet/dry cycling chamber rig: polls an infrared gas analyzer and a
//! thermocouple board, drives a heater/valve relay from a threshold
//! control law, and records every decision epoch to a CSV log.

pub mod actuator;
pub mod cache;
pub mod config;
pub mod control;
pub mod daq;
pub mod display;
pub mod irga;
pub mod logfile;
pub mod phase;
pub mod poller;
pub mod reading;
pub mod supervisor;
