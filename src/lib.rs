//! A supervisory watchdog that restarts unhealthy containers on a local
//! container runtime: polls (and optionally listens for events on) a
//! configured set of container names, applies a bounded retry verifier
//! before escalating to a restart, and exposes pause/resume/force-restart/
//! reload as an operator command surface.

pub mod audit;
pub mod cli;
pub mod commands;
pub mod config;
pub mod docker;
pub mod error;
pub mod events;
pub mod executor;
pub mod health;
pub mod logging;
pub mod poller;
pub mod registry;
pub mod state_machine;
pub mod utils;
pub mod watchdog;

pub use error::{WatchdogError, WatchdogResult};
