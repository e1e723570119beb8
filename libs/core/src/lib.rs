//! Shared infrastructure for graphload binaries: tracing setup and build metadata.

pub mod build_info;
pub mod telemetry;
