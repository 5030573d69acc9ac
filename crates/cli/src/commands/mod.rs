//! Subcommand implementations

pub mod alerts;
pub mod events;
pub mod monitor;
