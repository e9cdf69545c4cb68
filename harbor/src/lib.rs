//! Support modules for the harbor server binary: configuration, logging
//! bring-up, and the connection handlers it can serve.

pub mod apps;
pub mod config;
pub mod telemetry;
