//! fleetctl library - exposes command handlers for integration tests

pub mod commands;
pub mod output;
