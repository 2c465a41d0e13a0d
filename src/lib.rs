//! AMG Telemetry Bridge library
//! Receives live telemetry from the ESP32 sensor unit over BLE, decodes it,
//! fans it out to subscribers and smooths it into dashboard gauge values.

// Module declarations
pub mod commands;
pub mod config;
pub mod core;
pub mod dashboard;
pub mod logging;
pub mod state;
pub mod utils;
