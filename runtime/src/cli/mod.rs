//! CLI subcommand implementations for the case-harvest binary.

pub mod doctor;
pub mod harvest_cmd;
pub mod logging;
pub mod output;
pub mod setup;
