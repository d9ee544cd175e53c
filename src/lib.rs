//! SAJ Sununo Inverter Monitor Library
//!
//! This library polls a SAJ Sununo-TL series inverter's local XML endpoint at
//! a short scan interval, buffers the numeric readings, and publishes an
//! averaged snapshot once per storage interval so consumers see smoothed
//! telemetry instead of raw per-poll jitter.

pub mod client;
pub mod config;
pub mod coordinator;
pub mod fields;
pub mod parser;
pub mod sample_buffer;

// Re-export commonly used types for easier access
pub use client::{validate_setup, FetchError, SajClient};
pub use config::{ConfigError, MonitorConfig};
pub use coordinator::{MonitorCoordinator, MonitorState};
pub use fields::{FieldValue, Sample};
pub use parser::{DeviceInfo, ParseError};
pub use sample_buffer::SampleBuffer;
