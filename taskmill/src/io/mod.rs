//! Side-effectful layer: configuration, persistence, subprocesses.

pub mod agent;
pub mod config;
pub mod events;
pub mod hook;
pub mod paths;
pub mod prompt;
pub mod runner;
pub mod schema;
pub mod store;
