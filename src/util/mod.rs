//! Utility modules

pub mod telemetry;
pub mod time;
